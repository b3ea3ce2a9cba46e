//! Driver capability tables
//!
//! All Vulkan entry points the crate uses are resolved once at startup into
//! two capability tables: [`VulkanDriver`] for loader/instance-level calls and
//! [`DeviceDriver`] for device-level calls. Resolution failures surface as
//! [`VulkanError`] values instead of null function pointers, and the tables
//! are trait objects so tests can substitute a scripted driver.

use std::sync::Arc;

use ash::vk;

use crate::error::VulkanResult;
use crate::window::NativeWindow;

/// Parameters for logical device creation.
#[derive(Debug, Clone)]
pub struct DeviceDesc {
    /// Physical device to create the logical device on
    pub physical_device: vk::PhysicalDevice,
    /// Unique queue family indices to create one queue each for
    pub queue_families: Vec<u32>,
    /// Device extensions to enable
    pub extensions: Vec<String>,
    /// Chain in the protected-memory feature structs
    pub protected_memory: bool,
    /// Vendor scheduling hint for the hardware-tuned submit path. Loaders
    /// without the vendor bit ignore this.
    pub hts_enable: bool,
}

/// Parameters for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainDesc {
    /// Window surface the swapchain presents to
    pub surface: vk::SurfaceKHR,
    /// Minimum image count requested from the driver
    pub min_image_count: u32,
    /// Selected surface format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Image usage flags
    pub usage: vk::ImageUsageFlags,
    /// CONCURRENT when graphics and present families differ, else EXCLUSIVE
    pub sharing_mode: vk::SharingMode,
    /// Queue families for CONCURRENT sharing; empty for EXCLUSIVE
    pub queue_families: Vec<u32>,
    /// Surface pre-transform
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Composite alpha mode
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    /// Present mode
    pub present_mode: vk::PresentModeKHR,
    /// Whether the driver may clip obscured pixels
    pub clipped: bool,
}

/// Parameters for presenting one swapchain image.
#[derive(Debug, Clone)]
pub struct PresentRequest {
    /// Swapchain to present from
    pub swapchain: vk::SwapchainKHR,
    /// Index of the image to present
    pub image_index: u32,
    /// Semaphore presentation waits on; NULL_HANDLE to skip the wait
    pub wait_semaphore: vk::Semaphore,
}

/// Loader/instance-level Vulkan capability table.
pub trait VulkanDriver: Send + Sync {
    /// Create (or return the already-created) Vulkan instance.
    fn create_instance(&self) -> VulkanResult<vk::Instance>;

    /// Enumerate physical devices on the instance.
    fn enumerate_physical_devices(&self) -> VulkanResult<Vec<vk::PhysicalDevice>>;

    /// Queue family properties of a physical device.
    fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties>;

    /// Names of the device extensions the physical device supports.
    fn supported_device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Vec<String>>;

    /// Whether a queue family of the device can present to `surface`.
    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<bool>;

    /// Create a logical device and resolve its capability table.
    fn create_device(&self, desc: &DeviceDesc) -> VulkanResult<Arc<dyn DeviceDriver>>;

    /// Create a window surface from a platform window handle.
    fn create_window_surface(&self, window: &dyn NativeWindow) -> VulkanResult<vk::SurfaceKHR>;

    /// Destroy a window surface.
    fn destroy_surface(&self, surface: vk::SurfaceKHR);

    /// Surface capabilities of a physical device.
    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<vk::SurfaceCapabilitiesKHR>;

    /// Surface formats the device offers for `surface`.
    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Vec<vk::SurfaceFormatKHR>>;

    /// Present modes the device offers for `surface`.
    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Vec<vk::PresentModeKHR>>;
}

/// Device-level Vulkan capability table.
///
/// Dropping the last reference destroys the logical device (after an idle
/// wait), so everything holding swapchains or semaphores keeps an `Arc`.
pub trait DeviceDriver: Send + Sync {
    /// Raw device handle for backend descriptors.
    fn device(&self) -> vk::Device;

    /// Fetch a queue created with the device.
    fn get_queue(&self, queue_family_index: u32, queue_index: u32) -> vk::Queue;

    /// Create a swapchain.
    fn create_swapchain(&self, desc: &SwapchainDesc) -> VulkanResult<vk::SwapchainKHR>;

    /// Destroy a swapchain.
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// Retrieve the driver-owned images backing a swapchain.
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>>;

    /// Acquire the next presentable image.
    ///
    /// Returns `(image_index, suboptimal)`; an out-of-date swapchain arrives
    /// as `Err(VulkanError::Api(ERROR_OUT_OF_DATE_KHR))`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<(u32, bool)>;

    /// Queue one image for presentation. `Ok(true)` means suboptimal.
    fn queue_present(&self, queue: vk::Queue, request: &PresentRequest) -> VulkanResult<bool>;

    /// Create a binary semaphore.
    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore>;

    /// Destroy a semaphore.
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// Create a fence, optionally pre-signaled.
    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence>;

    /// Whether a fence has signaled.
    fn fence_status(&self, fence: vk::Fence) -> VulkanResult<bool>;

    /// Block until all `fences` signal or `timeout` nanoseconds pass.
    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> VulkanResult<()>;

    /// Destroy a fence.
    fn destroy_fence(&self, fence: vk::Fence);

    /// Block until the device is idle.
    fn device_wait_idle(&self);
}
