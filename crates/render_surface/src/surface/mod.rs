//! Platform surface family
//!
//! One [`RenderSurface`] contract over the per-platform backends: Vulkan
//! swapchains, EGL-style GL contexts and CPU raster targets. A renderer
//! requests a frame, draws into it, and flushes it back; every failure mode
//! degrades to a dropped frame, never a crash.

pub mod cpu;
pub mod frame;
pub mod gl;
pub mod vulkan;

pub use cpu::{CpuSurface, LayerPresenter};
pub use frame::SurfaceFrame;
pub use gl::{GlRenderContext, GlSurface, GlSurfaceHandle};
pub use vulkan::VulkanSurface;

use bitflags::bitflags;

use crate::drawing::ColorGamut;

bitflags! {
    /// Per-request rendering hints forwarded to the backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameHints: u32 {
        /// Ask the producer for framebuffer compression when available.
        const AFBC = 1 << 0;
        /// Render into protected memory (DRM content).
        const PROTECTED = 1 << 1;
    }
}

/// A drawable window surface.
///
/// The frame returned by [`request_frame`](Self::request_frame) is exclusively
/// owned by the caller until it is passed back to
/// [`flush_frame`](Self::flush_frame); it must not outlive the flush.
pub trait RenderSurface {
    /// Whether the surface is bound to a usable native window.
    fn is_valid(&self) -> bool;

    /// Acquire a drawable frame at the requested size.
    ///
    /// Returns `None` when the window or backend is unavailable or the
    /// acquisition failed; the caller's render loop simply retries next
    /// frame.
    fn request_frame(
        &mut self,
        width: i32,
        height: i32,
        ui_timestamp: u64,
        hints: FrameHints,
    ) -> Option<SurfaceFrame>;

    /// Submit a frame's rendering and present it.
    fn flush_frame(&mut self, frame: SurfaceFrame, ui_timestamp: u64) -> bool;

    /// Attach a UI timestamp to a pending frame.
    fn set_ui_timestamp(&mut self, frame: &SurfaceFrame, ui_timestamp: u64) {
        let _ = (frame, ui_timestamp);
    }

    /// Producer-side buffer queue depth.
    fn queue_size(&self) -> u32 {
        3
    }

    /// Clear the current buffer.
    fn clear_buffer(&mut self) {}

    /// Reset buffer-age tracking.
    fn reset_buffer_age(&mut self) {}

    /// Current color gamut.
    fn color_space(&self) -> ColorGamut;

    /// Select the color gamut for subsequent frames.
    fn set_color_space(&mut self, color_space: ColorGamut);
}
