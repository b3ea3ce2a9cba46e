//! Native-window-bound swapchain management
//!
//! Owns the presentable-image ring for one window: creation, recreation on
//! resize or out-of-date, per-frame semaphore pairs, and thin acquire/present
//! wrappers. All real error interpretation (out-of-date, suboptimal) is left
//! to the owning surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ash::vk;

use crate::error::{VulkanError, VulkanResult};
use crate::vulkan::device::DeviceContext;
use crate::vulkan::driver::{DeviceDriver, PresentRequest, SwapchainDesc};
use crate::window::NativeWindow;

/// Number of frames the renderer may have in flight; semaphore pairs rotate
/// modulo this.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

struct SwapchainState {
    swapchain: vk::SwapchainKHR,
    /// Driver-owned; fixed between creation and recreation.
    images: Vec<vk::Image>,
    format: vk::Format,
    extent: vk::Extent2D,
    image_available: Vec<vk::Semaphore>,
    render_finished: Vec<vk::Semaphore>,
}

/// The presentable-image ring bound to one native window.
pub struct Swapchain {
    context: Arc<DeviceContext>,
    window: Mutex<Option<Arc<dyn NativeWindow>>>,
    state: Mutex<Option<SwapchainState>>,
    recreate_mutex: Mutex<()>,
    is_recreating: AtomicBool,
    need_recreate: AtomicBool,
    pending_size: Mutex<(i32, i32)>,
}

impl Swapchain {
    /// Create an empty swapchain wrapper on a device context.
    pub fn new(context: Arc<DeviceContext>) -> Self {
        Self {
            context,
            window: Mutex::new(None),
            state: Mutex::new(None),
            recreate_mutex: Mutex::new(()),
            is_recreating: AtomicBool::new(false),
            need_recreate: AtomicBool::new(false),
            pending_size: Mutex::new((0, 0)),
        }
    }

    /// Bind the native window the swapchain will present to.
    pub fn initialize(&self, window: Arc<dyn NativeWindow>) {
        *self.window.lock().unwrap_or_else(PoisonError::into_inner) = Some(window);
    }

    // Choose optimal surface format from what the driver offers.
    fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
        formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_SRGB
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .copied()
            .unwrap_or(formats[0])
    }

    // Clamp the requested size into the surface capabilities.
    fn choose_extent(
        capabilities: &vk::SurfaceCapabilitiesKHR,
        width: i32,
        height: i32,
    ) -> vk::Extent2D {
        vk::Extent2D {
            width: capabilities
                .min_image_extent
                .width
                .max(capabilities.max_image_extent.width.min(width.max(0) as u32)),
            height: capabilities
                .min_image_extent
                .height
                .max(capabilities.max_image_extent.height.min(height.max(0) as u32)),
        }
    }

    fn create_sync_objects(
        device: &Arc<dyn DeviceDriver>,
    ) -> Option<(Vec<vk::Semaphore>, Vec<vk::Semaphore>)> {
        let mut image_available = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut render_finished = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for i in 0..MAX_FRAMES_IN_FLIGHT {
            match (device.create_semaphore(), device.create_semaphore()) {
                (Ok(available), Ok(finished)) => {
                    image_available.push(available);
                    render_finished.push(finished);
                }
                (available, finished) => {
                    log::info!("Failed to create sync objects for frame {}", i);
                    if let Ok(semaphore) = available {
                        device.destroy_semaphore(semaphore);
                    }
                    if let Ok(semaphore) = finished {
                        device.destroy_semaphore(semaphore);
                    }
                    for semaphore in image_available.drain(..) {
                        device.destroy_semaphore(semaphore);
                    }
                    for semaphore in render_finished.drain(..) {
                        device.destroy_semaphore(semaphore);
                    }
                    return None;
                }
            }
        }
        Some((image_available, render_finished))
    }

    /// Create the swapchain at the requested size.
    ///
    /// Fails fast when the driver reports no formats or present modes; that
    /// is transient and the caller may retry next frame.
    pub fn create(&self, width: i32, height: i32) -> bool {
        if width <= 0 || height <= 0 {
            log::debug!("Invalid dimensions for swapchain: {}x{}", width, height);
            return false;
        }
        let window = self
            .window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(window) = window else {
            log::debug!("Swapchain create: native window is not bound");
            return false;
        };
        let Some(device) = self.context.device() else {
            log::debug!("Swapchain create: device context is not initialized");
            return false;
        };

        if self.context.window_surface() == vk::SurfaceKHR::null() {
            if let Err(e) = self.context.create_window_surface(window.as_ref()) {
                log::debug!("Swapchain create: failed to create window surface: {}", e);
                return false;
            }
        }

        let support = match self.context.query_swapchain_support() {
            Ok(support) => support,
            Err(e) => {
                log::debug!("Swapchain create: support query failed: {}", e);
                return false;
            }
        };
        if support.formats.is_empty() || support.present_modes.is_empty() {
            log::info!("Swapchain support details are incomplete");
            return false;
        }

        let format = Self::choose_surface_format(&support.formats);
        let extent = Self::choose_extent(&support.capabilities, width, height);
        let indices = self.context.find_queue_families();
        let (sharing_mode, queue_families) = match (indices.graphics, indices.present) {
            (Some(graphics), Some(present)) if graphics != present => {
                (vk::SharingMode::CONCURRENT, vec![graphics, present])
            }
            _ => (vk::SharingMode::EXCLUSIVE, Vec::new()),
        };

        let desc = SwapchainDesc {
            surface: self.context.window_surface(),
            min_image_count: support.capabilities.min_image_count,
            format,
            extent,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            sharing_mode,
            queue_families,
            // Rotated surfaces pass through; the compositor applies the transform.
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            // FIFO is vsync-locked and universally available.
            present_mode: vk::PresentModeKHR::FIFO,
            clipped: true,
        };

        let swapchain = match device.create_swapchain(&desc) {
            Ok(swapchain) => swapchain,
            Err(e) => {
                log::debug!("Failed to create swapchain: {}", e);
                return false;
            }
        };
        let images = match device.swapchain_images(swapchain) {
            Ok(images) => images,
            Err(e) => {
                log::debug!("Failed to get swapchain images: {}", e);
                device.destroy_swapchain(swapchain);
                return false;
            }
        };
        let Some((image_available, render_finished)) = Self::create_sync_objects(&device) else {
            device.destroy_swapchain(swapchain);
            return false;
        };

        let old = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(SwapchainState {
                swapchain,
                images,
                format: format.format,
                extent,
                image_available,
                render_finished,
            });
        if let Some(old) = old {
            self.destroy_state(&device, old);
        }
        true
    }

    /// Tear down and rebuild the swapchain and its window surface.
    ///
    /// Concurrent recreation requests collapse to a no-op: only the first
    /// caller recreates, later callers observe the in-progress flag and
    /// return `false` without side effects.
    pub fn recreate(&self, width: i32, height: i32) -> bool {
        if self.is_recreating.swap(true, Ordering::SeqCst) {
            log::debug!("Swapchain recreation already in progress");
            return false;
        }
        let _guard = self
            .recreate_mutex
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let result = self.recreate_locked(width, height);
        self.is_recreating.store(false, Ordering::SeqCst);
        result
    }

    fn recreate_locked(&self, width: i32, height: i32) -> bool {
        self.need_recreate.store(false, Ordering::SeqCst);

        let Some(device) = self.context.device() else {
            log::debug!("Swapchain recreate: device context is not initialized");
            return false;
        };
        // In-flight GPU work referencing the old images must finish first.
        device.device_wait_idle();

        let window_bound = self
            .window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if !window_bound {
            log::debug!("Swapchain recreate: native window is not bound");
            return false;
        }

        if let Some(old) = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.destroy_state(&device, old);
        }
        let old_surface = self.context.window_surface();
        if old_surface != vk::SurfaceKHR::null() {
            self.context.destroy_window_surface(old_surface);
        }

        if !self.create(width, height) {
            // Don't leak a surface bound to no usable swapchain.
            let fresh_surface = self.context.window_surface();
            if fresh_surface != vk::SurfaceKHR::null() {
                self.context.destroy_window_surface(fresh_surface);
            }
            return false;
        }
        true
    }

    fn destroy_state(&self, device: &Arc<dyn DeviceDriver>, state: SwapchainState) {
        for semaphore in state.image_available {
            device.destroy_semaphore(semaphore);
        }
        for semaphore in state.render_finished {
            device.destroy_semaphore(semaphore);
        }
        device.destroy_swapchain(state.swapchain);
    }

    /// Destroy the swapchain and its sync objects.
    pub fn cleanup(&self) {
        let Some(device) = self.context.device() else {
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            return;
        };
        if let Some(state) = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.destroy_state(&device, state);
        }
    }

    /// Acquire the next presentable image.
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<(u32, bool)> {
        let handle = self.handle();
        if handle == vk::SwapchainKHR::null() {
            return Err(VulkanError::Api(vk::Result::ERROR_INITIALIZATION_FAILED));
        }
        let device = self
            .context
            .device()
            .ok_or(VulkanError::Api(vk::Result::ERROR_INITIALIZATION_FAILED))?;
        device.acquire_next_image(handle, timeout, semaphore)
    }

    /// Present one image, waiting on the render-finished semaphore.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VulkanResult<bool> {
        let handle = self.handle();
        if handle == vk::SwapchainKHR::null() || queue == vk::Queue::null() {
            return Err(VulkanError::Api(vk::Result::ERROR_INITIALIZATION_FAILED));
        }
        let device = self
            .context
            .device()
            .ok_or(VulkanError::Api(vk::Result::ERROR_INITIALIZATION_FAILED))?;
        device.queue_present(
            queue,
            &PresentRequest {
                swapchain: handle,
                image_index,
                wait_semaphore,
            },
        )
    }

    /// Current swapchain handle, NULL_HANDLE when not created.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.swapchain)
            .unwrap_or(vk::SwapchainKHR::null())
    }

    /// Whether a usable swapchain exists.
    pub fn is_created(&self) -> bool {
        self.handle() != vk::SwapchainKHR::null()
    }

    /// Number of images in the ring.
    pub fn image_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.images.len())
            .unwrap_or(0)
    }

    /// Image handle at `index`.
    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|s| s.images.get(index as usize).copied())
    }

    /// Selected image format.
    pub fn format(&self) -> vk::Format {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.format)
            .unwrap_or(vk::Format::UNDEFINED)
    }

    /// Current image extent.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.extent)
    }

    /// Image-available semaphore for a frame slot.
    pub fn image_available_semaphore(&self, frame_index: usize) -> Option<vk::Semaphore> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|s| s.image_available.get(frame_index).copied())
    }

    /// Render-finished semaphore for a frame slot.
    pub fn render_finished_semaphore(&self, frame_index: usize) -> Option<vk::Semaphore> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|s| s.render_finished.get(frame_index).copied())
    }

    /// Whether a recreation has been requested.
    pub fn needs_recreate(&self) -> bool {
        self.need_recreate.load(Ordering::SeqCst)
    }

    /// Request (or clear a request for) a recreation before the next frame.
    pub fn set_needs_recreate(&self, needed: bool) {
        self.need_recreate.store(needed, Ordering::SeqCst);
    }

    /// Whether a recreation is currently running.
    pub fn is_recreating(&self) -> bool {
        self.is_recreating.load(Ordering::SeqCst)
    }

    /// Stage the size for the next recreation.
    pub fn set_pending_size(&self, width: i32, height: i32) {
        *self
            .pending_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = (width, height);
    }

    /// Staged recreation size; zero components mean "use the request size".
    pub fn pending_size(&self) -> (i32, i32) {
        *self
            .pending_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.cleanup();
    }
}
