//! # Render Surface
//!
//! Graphics surface and swapchain lifecycle management for a cross-platform
//! renderer, with Vulkan, GL and software backends.
//!
//! ## Features
//!
//! - **Vulkan swapchains**: creation, resize-driven recreation, double-buffered
//!   semaphore pairing and present-queue coordination
//! - **Per-thread GPU contexts**: a registry that caches one drawing context per
//!   worker thread and can tear the whole context family down when provably unused
//! - **Backend-agnostic surfaces**: one `RenderSurface` contract over Vulkan,
//!   EGL-style GL contexts and CPU raster targets
//! - **Vsync delivery**: a background client forwarding compositor frame ticks
//!   to a registered callback
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use render_surface::prelude::*;
//! use render_surface::vulkan::AshDriver;
//!
//! # fn factory() -> Arc<dyn render_surface::drawing::DrawingContextFactory> { unimplemented!() }
//! # fn window() -> Arc<dyn render_surface::window::NativeWindow> { unimplemented!() }
//! fn main() {
//!     render_surface::logging::init();
//!
//!     let driver = Arc::new(AshDriver::new().expect("vulkan loader"));
//!     let config = RenderSurfaceConfig::default();
//!     let registry = ContextRegistry::new(driver, factory(), config);
//!
//!     let mut surface = VulkanSurface::new(
//!         registry,
//!         RenderContextSelector::basic(),
//!         Some(window()),
//!     )
//!     .expect("surface");
//!
//!     if let Some(frame) = surface.request_frame(1280, 720, 0, FrameHints::empty()) {
//!         // draw into frame.surface() ...
//!         surface.flush_frame(frame, 0);
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod drawing;
pub mod error;
pub mod surface;
pub mod vsync;
pub mod vulkan;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, RenderSurfaceConfig};
pub use error::{VulkanError, VulkanResult};

/// Logging bootstrap for binaries and tests.
pub mod logging {
    pub use log::{debug, error, info, trace, warn};

    /// Initialize the logging system from the environment.
    pub fn init() {
        env_logger::init();
    }
}

/// Common imports for crate users.
pub mod prelude {
    pub use crate::config::RenderSurfaceConfig;
    pub use crate::drawing::ColorGamut;
    pub use crate::surface::{
        CpuSurface, FrameHints, GlSurface, RenderSurface, SurfaceFrame, VulkanSurface,
    };
    pub use crate::vsync::{VsyncClient, VsyncSource};
    pub use crate::vulkan::{ContextRegistry, InterfaceKind, RenderContextSelector};
}
