//! Vulkan device, swapchain and context-registry management
//!
//! The layering mirrors the driver: a [`VulkanDriver`](driver::VulkanDriver)
//! capability table at the bottom, one [`DeviceContext`](device::DeviceContext)
//! per logical device above it, the per-window [`Swapchain`](swapchain::Swapchain)
//! ring, and the process-wide [`ContextRegistry`](registry::ContextRegistry)
//! arbitrating device and GPU-context access on top.

pub mod ash_driver;
pub mod device;
pub mod driver;
pub mod registry;
pub mod semaphore;
pub mod swapchain;

pub use ash_driver::AshDriver;
pub use device::{DeviceContext, DeviceStatus, QueueFamilyIndices, SwapchainSupportDetails};
pub use driver::{DeviceDesc, DeviceDriver, PresentRequest, SwapchainDesc, VulkanDriver};
pub use registry::{ContextRegistry, RenderContextSelector};
pub use semaphore::{SemaphoreTicket, SemaphoreTracker};
pub use swapchain::{Swapchain, MAX_FRAMES_IN_FLIGHT};

/// Which device context variant a caller renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    /// The always-on rendering device
    BasicRender,
    /// Protected-memory redraw device for DRM content
    ProtectedRedraw,
    /// Unprotected redraw device
    UnprotectedRedraw,
}
