//! Shared test doubles
//!
//! Scripted implementations of the driver, drawing and platform seams so the
//! lifecycle logic runs hermetically in unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex, PoisonError};

use ash::vk::{self, Handle};
use raw_window_handle::{
    AndroidDisplayHandle, AndroidNdkWindowHandle, RawDisplayHandle, RawWindowHandle,
};

use crate::drawing::{
    BackendContext, ColorGamut, DrawingContextFactory, DrawingSurface, FlushInfo, FlushOutcome,
    GpuContext, TextureInfo,
};
use crate::error::{VulkanError, VulkanResult};
use crate::surface::cpu::LayerPresenter;
use crate::surface::gl::{GlRenderContext, GlSurfaceHandle};
use crate::vsync::VsyncSource;
use crate::vulkan::driver::{DeviceDesc, DeviceDriver, PresentRequest, SwapchainDesc, VulkanDriver};
use crate::window::NativeWindow;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Native window

/// Window double recording buffer-geometry requests.
pub(crate) struct MockWindow {
    geometry: Mutex<(i32, i32)>,
    geometry_calls: AtomicU64,
}

impl MockWindow {
    pub(crate) fn new() -> Self {
        Self {
            geometry: Mutex::new((0, 0)),
            geometry_calls: AtomicU64::new(0),
        }
    }

    #[allow(dead_code)]
    pub(crate) fn geometry(&self) -> (i32, i32) {
        *lock(&self.geometry)
    }

    #[allow(dead_code)]
    pub(crate) fn geometry_calls(&self) -> u64 {
        self.geometry_calls.load(Ordering::SeqCst)
    }
}

impl NativeWindow for MockWindow {
    fn raw_display_handle(&self) -> RawDisplayHandle {
        RawDisplayHandle::Android(AndroidDisplayHandle::empty())
    }

    fn raw_window_handle(&self) -> RawWindowHandle {
        RawWindowHandle::AndroidNdk(AndroidNdkWindowHandle::empty())
    }

    fn set_buffer_geometry(&self, width: i32, height: i32) -> bool {
        *lock(&self.geometry) = (width, height);
        self.geometry_calls.fetch_add(1, Ordering::SeqCst);
        true
    }
}

// ---------------------------------------------------------------------------
// Vulkan driver

/// Loader/instance driver double with scriptable surface properties.
pub(crate) struct MockDriver {
    capabilities: Mutex<vk::SurfaceCapabilitiesKHR>,
    formats: Mutex<Vec<vk::SurfaceFormatKHR>>,
    present_modes: Mutex<Vec<vk::PresentModeKHR>>,
    device_extensions: Mutex<Vec<String>>,
    fail_device_creation: AtomicBool,
    next_handle: AtomicU64,
    surfaces_created: AtomicU64,
    surfaces_destroyed: AtomicU64,
    last_device_desc: Mutex<Option<DeviceDesc>>,
    device: Mutex<Option<Arc<MockDeviceDriver>>>,
}

impl MockDriver {
    pub(crate) fn new() -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let extensions = [
            "VK_KHR_external_semaphore_fd",
            "VK_KHR_sampler_ycbcr_conversion",
            "VK_KHR_maintenance1",
            "VK_KHR_maintenance2",
            "VK_KHR_maintenance3",
            "VK_KHR_get_memory_requirements2",
            "VK_KHR_bind_memory2",
            "VK_KHR_swapchain",
            "VK_KHR_synchronization2",
            "VK_KHR_timeline_semaphore",
        ];
        Self {
            capabilities: Mutex::new(capabilities),
            formats: Mutex::new(formats),
            present_modes: Mutex::new(vec![
                vk::PresentModeKHR::FIFO,
                vk::PresentModeKHR::MAILBOX,
            ]),
            device_extensions: Mutex::new(extensions.iter().map(|s| s.to_string()).collect()),
            fail_device_creation: AtomicBool::new(false),
            next_handle: AtomicU64::new(0x100),
            surfaces_created: AtomicU64::new(0),
            surfaces_destroyed: AtomicU64::new(0),
            last_device_desc: Mutex::new(None),
            device: Mutex::new(None),
        }
    }

    pub(crate) fn fail_device_creation(&self) {
        self.fail_device_creation.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_device_extensions(&self, extensions: Vec<String>) {
        *lock(&self.device_extensions) = extensions;
    }

    pub(crate) fn set_surface_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        *lock(&self.formats) = formats;
    }

    pub(crate) fn set_extent_limits(&self, min: (u32, u32), max: (u32, u32)) {
        let mut capabilities = lock(&self.capabilities);
        capabilities.min_image_extent = vk::Extent2D {
            width: min.0,
            height: min.1,
        };
        capabilities.max_image_extent = vk::Extent2D {
            width: max.0,
            height: max.1,
        };
    }

    pub(crate) fn last_device_desc(&self) -> Option<DeviceDesc> {
        lock(&self.last_device_desc).clone()
    }

    /// The most recently created device double.
    pub(crate) fn device(&self) -> Option<Arc<MockDeviceDriver>> {
        lock(&self.device).clone()
    }

    pub(crate) fn surfaces_created(&self) -> u64 {
        self.surfaces_created.load(Ordering::SeqCst)
    }

    pub(crate) fn surfaces_destroyed(&self) -> u64 {
        self.surfaces_destroyed.load(Ordering::SeqCst)
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }
}

impl VulkanDriver for MockDriver {
    fn create_instance(&self) -> VulkanResult<vk::Instance> {
        Ok(vk::Instance::from_raw(1))
    }

    fn enumerate_physical_devices(&self) -> VulkanResult<Vec<vk::PhysicalDevice>> {
        Ok(vec![vk::PhysicalDevice::from_raw(2)])
    }

    fn queue_family_properties(
        &self,
        _physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        vec![vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
            queue_count: 1,
            ..Default::default()
        }]
    }

    fn supported_device_extensions(
        &self,
        _physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Vec<String>> {
        Ok(lock(&self.device_extensions).clone())
    }

    fn surface_support(
        &self,
        _physical_device: vk::PhysicalDevice,
        _queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<bool> {
        Ok(surface != vk::SurfaceKHR::null())
    }

    fn create_device(&self, desc: &DeviceDesc) -> VulkanResult<Arc<dyn DeviceDriver>> {
        if self.fail_device_creation.load(Ordering::SeqCst) {
            return Err(VulkanError::Api(vk::Result::ERROR_INITIALIZATION_FAILED));
        }
        *lock(&self.last_device_desc) = Some(desc.clone());
        let image_count = lock(&self.capabilities).min_image_count;
        let device = Arc::new(MockDeviceDriver::new(image_count));
        *lock(&self.device) = Some(device.clone());
        Ok(device)
    }

    fn create_window_surface(&self, _window: &dyn NativeWindow) -> VulkanResult<vk::SurfaceKHR> {
        self.surfaces_created.fetch_add(1, Ordering::SeqCst);
        Ok(vk::SurfaceKHR::from_raw(self.next_handle()))
    }

    fn destroy_surface(&self, _surface: vk::SurfaceKHR) {
        self.surfaces_destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn surface_capabilities(
        &self,
        _physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        Ok(*lock(&self.capabilities))
    }

    fn surface_formats(
        &self,
        _physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(lock(&self.formats).clone())
    }

    fn surface_present_modes(
        &self,
        _physical_device: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        Ok(lock(&self.present_modes).clone())
    }
}

/// Device driver double with scriptable acquire/present outcomes.
pub(crate) struct MockDeviceDriver {
    image_count: u32,
    next_handle: AtomicU64,
    swapchains_created: AtomicU64,
    swapchains_destroyed: AtomicU64,
    semaphores_created: AtomicU64,
    semaphores_destroyed: AtomicU64,
    wait_idle_calls: AtomicU64,
    acquire_cursor: AtomicU64,
    acquire_results: Mutex<VecDeque<VulkanResult<(u32, bool)>>>,
    present_results: Mutex<VecDeque<VulkanResult<bool>>>,
    presented: Mutex<Vec<u32>>,
    wait_idle_gate: Mutex<Option<Arc<Barrier>>>,
    last_swapchain_desc: Mutex<Option<SwapchainDesc>>,
}

impl MockDeviceDriver {
    pub(crate) fn new(image_count: u32) -> Self {
        Self {
            image_count,
            next_handle: AtomicU64::new(0x1000),
            swapchains_created: AtomicU64::new(0),
            swapchains_destroyed: AtomicU64::new(0),
            semaphores_created: AtomicU64::new(0),
            semaphores_destroyed: AtomicU64::new(0),
            wait_idle_calls: AtomicU64::new(0),
            acquire_cursor: AtomicU64::new(0),
            acquire_results: Mutex::new(VecDeque::new()),
            present_results: Mutex::new(VecDeque::new()),
            presented: Mutex::new(Vec::new()),
            wait_idle_gate: Mutex::new(None),
            last_swapchain_desc: Mutex::new(None),
        }
    }

    pub(crate) fn push_acquire_result(&self, result: VulkanResult<(u32, bool)>) {
        lock(&self.acquire_results).push_back(result);
    }

    #[allow(dead_code)]
    pub(crate) fn push_present_result(&self, result: VulkanResult<bool>) {
        lock(&self.present_results).push_back(result);
    }

    /// One-shot barrier the next `device_wait_idle` call parks on.
    pub(crate) fn set_wait_idle_gate(&self, gate: Arc<Barrier>) {
        *lock(&self.wait_idle_gate) = Some(gate);
    }

    pub(crate) fn swapchains_created(&self) -> u64 {
        self.swapchains_created.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn swapchains_destroyed(&self) -> u64 {
        self.swapchains_destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn semaphores_created(&self) -> u64 {
        self.semaphores_created.load(Ordering::SeqCst)
    }

    pub(crate) fn semaphores_destroyed(&self) -> u64 {
        self.semaphores_destroyed.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn wait_idle_calls(&self) -> u64 {
        self.wait_idle_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn presented(&self) -> Vec<u32> {
        lock(&self.presented).clone()
    }

    #[allow(dead_code)]
    pub(crate) fn last_swapchain_desc(&self) -> Option<SwapchainDesc> {
        lock(&self.last_swapchain_desc).clone()
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }
}

impl DeviceDriver for MockDeviceDriver {
    fn device(&self) -> vk::Device {
        vk::Device::from_raw(0x10)
    }

    fn get_queue(&self, _queue_family_index: u32, _queue_index: u32) -> vk::Queue {
        vk::Queue::from_raw(0x20)
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VulkanResult<vk::SwapchainKHR> {
        *lock(&self.last_swapchain_desc) = Some(desc.clone());
        self.swapchains_created.fetch_add(1, Ordering::SeqCst);
        Ok(vk::SwapchainKHR::from_raw(self.next_handle()))
    }

    fn destroy_swapchain(&self, _swapchain: vk::SwapchainKHR) {
        self.swapchains_destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>> {
        Ok((0..self.image_count)
            .map(|i| vk::Image::from_raw(0x8000 + u64::from(i)))
            .collect())
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _semaphore: vk::Semaphore,
    ) -> VulkanResult<(u32, bool)> {
        if let Some(result) = lock(&self.acquire_results).pop_front() {
            return result;
        }
        let cursor = self.acquire_cursor.fetch_add(1, Ordering::SeqCst);
        Ok(((cursor % u64::from(self.image_count)) as u32, false))
    }

    fn queue_present(&self, _queue: vk::Queue, request: &PresentRequest) -> VulkanResult<bool> {
        if let Some(result) = lock(&self.present_results).pop_front() {
            return result;
        }
        lock(&self.presented).push(request.image_index);
        Ok(false)
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        self.semaphores_created.fetch_add(1, Ordering::SeqCst);
        Ok(vk::Semaphore::from_raw(self.next_handle()))
    }

    fn destroy_semaphore(&self, _semaphore: vk::Semaphore) {
        self.semaphores_destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn create_fence(&self, _signaled: bool) -> VulkanResult<vk::Fence> {
        Ok(vk::Fence::from_raw(self.next_handle()))
    }

    fn fence_status(&self, _fence: vk::Fence) -> VulkanResult<bool> {
        Ok(true)
    }

    fn wait_for_fences(&self, _fences: &[vk::Fence], _timeout: u64) -> VulkanResult<()> {
        Ok(())
    }

    fn destroy_fence(&self, _fence: vk::Fence) {}

    fn device_wait_idle(&self) {
        self.wait_idle_calls.fetch_add(1, Ordering::SeqCst);
        let gate = lock(&self.wait_idle_gate).take();
        if let Some(gate) = gate {
            gate.wait();
        }
    }
}

// ---------------------------------------------------------------------------
// Drawing backend

/// Drawable surface double; completes flushes synchronously.
pub(crate) struct MockDrawingSurface {
    width: i32,
    height: i32,
    flush_calls: AtomicU64,
    clear_calls: AtomicU64,
    fail_next_flush: Arc<AtomicBool>,
}

impl MockDrawingSurface {
    fn new(width: i32, height: i32, fail_next_flush: Arc<AtomicBool>) -> Self {
        Self {
            width,
            height,
            flush_calls: AtomicU64::new(0),
            clear_calls: AtomicU64::new(0),
            fail_next_flush,
        }
    }

    #[allow(dead_code)]
    pub(crate) fn flush_calls(&self) -> u64 {
        self.flush_calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn clear_calls(&self) -> u64 {
        self.clear_calls.load(Ordering::SeqCst)
    }
}

impl DrawingSurface for MockDrawingSurface {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn clear_drawing_area(&self) {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn flush(&self, info: FlushInfo) -> FlushOutcome {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_flush.swap(false, Ordering::SeqCst) {
            return FlushOutcome::NotSubmitted;
        }
        // the mock GPU completes instantly
        (info.finished)();
        FlushOutcome::SemaphoresSubmitted
    }
}

/// GPU context double recording cache and lifecycle calls.
pub(crate) struct MockGpuContext {
    cache_limits: Mutex<(i32, usize)>,
    purge_calls: AtomicU64,
    free_calls: AtomicU64,
    reset_calls: AtomicU64,
    submit_calls: AtomicU64,
    flush_and_submit_calls: AtomicU64,
    waited_semaphores: Mutex<Vec<vk::Semaphore>>,
    fail_surface_creation: AtomicBool,
    fail_next_flush: Arc<AtomicBool>,
}

impl MockGpuContext {
    pub(crate) fn new(cache_limits: (i32, usize)) -> Self {
        Self {
            cache_limits: Mutex::new(cache_limits),
            purge_calls: AtomicU64::new(0),
            free_calls: AtomicU64::new(0),
            reset_calls: AtomicU64::new(0),
            submit_calls: AtomicU64::new(0),
            flush_and_submit_calls: AtomicU64::new(0),
            waited_semaphores: Mutex::new(Vec::new()),
            fail_surface_creation: AtomicBool::new(false),
            fail_next_flush: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn purge_calls(&self) -> u64 {
        self.purge_calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn free_calls(&self) -> u64 {
        self.free_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_calls(&self) -> u64 {
        self.reset_calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn submit_calls(&self) -> u64 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn waited_semaphores(&self) -> Vec<vk::Semaphore> {
        lock(&self.waited_semaphores).clone()
    }

    #[allow(dead_code)]
    pub(crate) fn fail_surface_creation(&self) {
        self.fail_surface_creation.store(true, Ordering::SeqCst);
    }

    /// Make the next drawing-surface flush report no submitted semaphores.
    pub(crate) fn fail_next_flush(&self) {
        self.fail_next_flush.store(true, Ordering::SeqCst);
    }
}

impl GpuContext for MockGpuContext {
    fn resource_cache_limits(&self) -> (i32, usize) {
        *lock(&self.cache_limits)
    }

    fn set_resource_cache_limits(&self, max_resources: i32, max_bytes: usize) {
        *lock(&self.cache_limits) = (max_resources, max_bytes);
    }

    fn purge_unlocked_resources(&self, _scratch_only: bool) {
        self.purge_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn free_gpu_resources(&self) {
        self.free_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn reset_context(&self) {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn flush_and_submit(&self, _sync_cpu: bool) {
        self.flush_and_submit_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn submit(&self) {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_semaphore(&self, semaphore: vk::Semaphore) {
        lock(&self.waited_semaphores).push(semaphore);
    }

    fn create_surface_from_backend_render_target(
        &self,
        info: &TextureInfo,
    ) -> Option<Arc<dyn DrawingSurface>> {
        if self.fail_surface_creation.load(Ordering::SeqCst) {
            return None;
        }
        Some(Arc::new(MockDrawingSurface::new(
            info.width,
            info.height,
            self.fail_next_flush.clone(),
        )))
    }
}

/// Factory double tracking every context it builds.
pub(crate) struct MockFactory {
    contexts: Mutex<Vec<Arc<MockGpuContext>>>,
    default_cache_limits: Mutex<(i32, usize)>,
    rasters_created: AtomicU64,
}

impl MockFactory {
    pub(crate) fn new() -> Self {
        Self {
            contexts: Mutex::new(Vec::new()),
            default_cache_limits: Mutex::new((4096, 48 * (1 << 20))),
            rasters_created: AtomicU64::new(0),
        }
    }

    pub(crate) fn contexts_created(&self) -> u64 {
        lock(&self.contexts).len() as u64
    }

    pub(crate) fn contexts(&self) -> Vec<Arc<MockGpuContext>> {
        lock(&self.contexts).clone()
    }

    pub(crate) fn set_default_cache_limits(&self, max_resources: i32, max_bytes: usize) {
        *lock(&self.default_cache_limits) = (max_resources, max_bytes);
    }

    #[allow(dead_code)]
    pub(crate) fn rasters_created(&self) -> u64 {
        self.rasters_created.load(Ordering::SeqCst)
    }
}

impl DrawingContextFactory for MockFactory {
    fn create_context(
        &self,
        _backend: &BackendContext,
        _cache_dir: Option<&str>,
    ) -> Option<Arc<dyn GpuContext>> {
        let context = Arc::new(MockGpuContext::new(*lock(&self.default_cache_limits)));
        lock(&self.contexts).push(context.clone());
        Some(context)
    }

    fn create_raster_surface(&self, width: i32, height: i32) -> Option<Arc<dyn DrawingSurface>> {
        self.rasters_created.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(MockDrawingSurface::new(
            width,
            height,
            Arc::new(AtomicBool::new(false)),
        )))
    }
}

// ---------------------------------------------------------------------------
// GL render context

/// GL context double recording lifecycle calls.
pub(crate) struct MockGlContext {
    gpu: Arc<MockGpuContext>,
    next_handle: AtomicU64,
    surfaces_created: AtomicU64,
    surfaces_destroyed: AtomicU64,
    make_current_calls: AtomicU64,
    render_calls: AtomicU64,
    swap_calls: AtomicU64,
    color_space: Mutex<ColorGamut>,
}

impl MockGlContext {
    pub(crate) fn new() -> Self {
        Self {
            gpu: Arc::new(MockGpuContext::new((4096, 48 * (1 << 20)))),
            next_handle: AtomicU64::new(1),
            surfaces_created: AtomicU64::new(0),
            surfaces_destroyed: AtomicU64::new(0),
            make_current_calls: AtomicU64::new(0),
            render_calls: AtomicU64::new(0),
            swap_calls: AtomicU64::new(0),
            color_space: Mutex::new(ColorGamut::Srgb),
        }
    }

    pub(crate) fn gpu(&self) -> Arc<MockGpuContext> {
        self.gpu.clone()
    }

    pub(crate) fn surfaces_created(&self) -> u64 {
        self.surfaces_created.load(Ordering::SeqCst)
    }

    pub(crate) fn surfaces_destroyed(&self) -> u64 {
        self.surfaces_destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn make_current_calls(&self) -> u64 {
        self.make_current_calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn render_calls(&self) -> u64 {
        self.render_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn swap_calls(&self) -> u64 {
        self.swap_calls.load(Ordering::SeqCst)
    }
}

impl GlRenderContext for MockGlContext {
    fn init(&self) -> bool {
        true
    }

    fn setup_gpu_context(&self) -> bool {
        true
    }

    fn gpu_context(&self) -> Option<Arc<dyn GpuContext>> {
        Some(self.gpu.clone())
    }

    fn create_window_surface(&self, _window: &dyn NativeWindow) -> Option<GlSurfaceHandle> {
        self.surfaces_created.fetch_add(1, Ordering::SeqCst);
        Some(GlSurfaceHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    fn destroy_window_surface(&self, _handle: GlSurfaceHandle) {
        self.surfaces_destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn make_current(&self, _handle: GlSurfaceHandle) -> bool {
        self.make_current_calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn render_frame(&self) {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn swap_buffers(&self, _handle: GlSurfaceHandle) -> bool {
        self.swap_calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn frame_surface(
        &self,
        _handle: GlSurfaceHandle,
        width: i32,
        height: i32,
    ) -> Option<Arc<dyn DrawingSurface>> {
        Some(Arc::new(MockDrawingSurface::new(
            width,
            height,
            Arc::new(AtomicBool::new(false)),
        )))
    }

    fn set_color_space(&self, color_space: ColorGamut) {
        *lock(&self.color_space) = color_space;
    }

    fn color_space(&self) -> ColorGamut {
        *lock(&self.color_space)
    }
}

// ---------------------------------------------------------------------------
// Platform layer and vsync

/// Layer double counting presented raster frames.
pub(crate) struct MockLayerPresenter {
    presented: AtomicU64,
}

impl MockLayerPresenter {
    pub(crate) fn new() -> Self {
        Self {
            presented: AtomicU64::new(0),
        }
    }

    pub(crate) fn presented(&self) -> u64 {
        self.presented.load(Ordering::SeqCst)
    }
}

impl LayerPresenter for MockLayerPresenter {
    fn present(&self, _surface: &dyn DrawingSurface) -> bool {
        self.presented.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Tick source double driven by the test through a channel.
pub(crate) struct MockTickSource {
    tx: Mutex<Sender<Option<i64>>>,
    rx: Mutex<Receiver<Option<i64>>>,
    schedule_calls: AtomicU64,
}

impl MockTickSource {
    pub(crate) fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
            schedule_calls: AtomicU64::new(0),
        }
    }

    pub(crate) fn deliver_tick(&self, timestamp: i64) {
        let _ = lock(&self.tx).send(Some(timestamp));
    }

    pub(crate) fn schedule_calls(&self) -> u64 {
        self.schedule_calls.load(Ordering::SeqCst)
    }
}

impl VsyncSource for MockTickSource {
    fn wait_for_tick(&self) -> Option<i64> {
        lock(&self.rx).recv().ok().flatten()
    }

    fn schedule(&self) {
        self.schedule_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn wake(&self) {
        let _ = lock(&self.tx).send(None);
    }
}
