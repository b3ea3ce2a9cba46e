//! Logical device context
//!
//! Brings up one Vulkan device + queue binding and packages it for the
//! drawing library. A context that fails to initialize is terminal: callers
//! must construct a fresh context rather than retry the same instance.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use ash::vk;

use crate::drawing::{BackendContext, DrawingContextFactory, GpuContext};
use crate::error::{VulkanError, VulkanResult};
use crate::vulkan::driver::{DeviceDesc, DeviceDriver, VulkanDriver};
use crate::vulkan::semaphore::SemaphoreTracker;
use crate::vulkan::InterfaceKind;
use crate::window::NativeWindow;

const GR_CACHE_MAX_COUNT: i32 = 8192;
const GR_CACHE_MAX_BYTE_SIZE: usize = 96 * (1 << 20);
const CACHE_LIMITS_TIMES: i32 = 2; // this changes renderer memory use

/// Extensions every created device enables.
const MANDATORY_DEVICE_EXTENSIONS: &[&str] = &[
    "VK_KHR_external_semaphore_fd",
    "VK_KHR_sampler_ycbcr_conversion",
    "VK_KHR_maintenance1",
    "VK_KHR_maintenance2",
    "VK_KHR_maintenance3",
    "VK_KHR_get_memory_requirements2",
    "VK_KHR_bind_memory2",
    "VK_KHR_swapchain",
];

/// Extensions enabled only when the physical device advertises them.
const OPTIONAL_DEVICE_EXTENSIONS: &[&str] = &[
    "VK_KHR_synchronization2",
    "VK_KHR_timeline_semaphore",
    "VK_EXT_device_fault",
];

/// Lifecycle state of a device context. The transition is one-way:
/// `Uninitialized` moves to exactly one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// `init` has not completed yet
    Uninitialized,
    /// Device and queue are usable
    CreateSuccess,
    /// Device creation failed; this context is unusable
    CreateFail,
}

/// Graphics and present queue family indices for the bound window surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family with graphics support
    pub graphics: Option<u32>,
    /// First family that can present to the current window surface
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both families were found.
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Whether graphics and present work land on different families, which
    /// forces CONCURRENT image sharing.
    pub fn queues_differ(&self) -> bool {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => graphics != present,
            _ => false,
        }
    }
}

/// Snapshot of what the driver offers for the current window surface.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (image counts, extents, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Offered surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Offered present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

struct DeviceState {
    physical_device: vk::PhysicalDevice,
    device: Arc<dyn DeviceDriver>,
    queue: vk::Queue,
    graphics_queue_family_index: u32,
    backend: BackendContext,
    semaphores: SemaphoreTracker,
}

/// One logical Vulkan device binding.
pub struct DeviceContext {
    driver: Arc<dyn VulkanDriver>,
    interface_kind: InterfaceKind,
    status: AtomicU32,
    state: OnceLock<DeviceState>,
    window_surface: Mutex<vk::SurfaceKHR>,
    graphics_queue_mutex: Mutex<()>,
    hardware_queue_mutex: Mutex<()>,
}

impl DeviceContext {
    /// Create an uninitialized context for one interface variant.
    pub fn new(driver: Arc<dyn VulkanDriver>, interface_kind: InterfaceKind) -> Self {
        Self {
            driver,
            interface_kind,
            status: AtomicU32::new(DeviceStatus::Uninitialized as u32),
            state: OnceLock::new(),
            window_surface: Mutex::new(vk::SurfaceKHR::null()),
            graphics_queue_mutex: Mutex::new(()),
            hardware_queue_mutex: Mutex::new(()),
        }
    }

    /// Bring up instance, physical device, logical device and queue.
    ///
    /// On failure the context moves to [`DeviceStatus::CreateFail`] and stays
    /// there; the registry never retries a failed context.
    pub fn init(&self, protected: bool, hts_enable: bool) -> VulkanResult<()> {
        if self.state.get().is_some() {
            return Ok(());
        }
        match self.do_init(protected, hts_enable) {
            Ok(state) => {
                let _ = self.state.set(state);
                self.transition_status(DeviceStatus::CreateSuccess);
                Ok(())
            }
            Err(e) => {
                self.transition_status(DeviceStatus::CreateFail);
                log::error!("Vulkan device context init failed: {}", e);
                Err(e)
            }
        }
    }

    fn do_init(&self, protected: bool, hts_enable: bool) -> VulkanResult<DeviceState> {
        let instance = self.driver.create_instance()?;

        let physical_devices = self.driver.enumerate_physical_devices()?;
        let physical_device = physical_devices.first().copied().ok_or_else(|| {
            VulkanError::InitializationFailed("no Vulkan physical devices".to_string())
        })?;

        let extensions = self.resolve_extensions(physical_device);

        let graphics_family = self
            .driver
            .queue_family_properties(physical_device)
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|index| index as u32)
            .ok_or_else(|| {
                VulkanError::InitializationFailed("no graphics queue family".to_string())
            })?;

        let desc = DeviceDesc {
            physical_device,
            queue_families: vec![graphics_family],
            extensions: extensions.clone(),
            protected_memory: protected,
            hts_enable,
        };
        let device = self.driver.create_device(&desc)?;
        let queue = device.get_queue(graphics_family, 0);

        let backend = BackendContext {
            instance,
            physical_device,
            device: device.device(),
            queue,
            graphics_queue_family_index: graphics_family,
            max_api_version: vk::API_VERSION_1_3,
            extensions,
            protected,
        };
        let semaphores = SemaphoreTracker::new(device.clone());

        Ok(DeviceState {
            physical_device,
            device,
            queue,
            graphics_queue_family_index: graphics_family,
            backend,
            semaphores,
        })
    }

    fn resolve_extensions(&self, physical_device: vk::PhysicalDevice) -> Vec<String> {
        let mut extensions: Vec<String> = MANDATORY_DEVICE_EXTENSIONS
            .iter()
            .map(|name| (*name).to_string())
            .collect();
        match self.driver.supported_device_extensions(physical_device) {
            Ok(supported) => {
                for name in OPTIONAL_DEVICE_EXTENSIONS {
                    if supported.iter().any(|s| s == name) {
                        extensions.push((*name).to_string());
                    }
                }
                for name in MANDATORY_DEVICE_EXTENSIONS {
                    if !supported.iter().any(|s| s == name) {
                        log::error!(
                            "Mandatory device extension {} not found, enabling it anyway",
                            name
                        );
                    }
                }
            }
            Err(e) => {
                log::error!(
                    "Failed to query device extensions, creating device with the mandatory set only: {}",
                    e
                );
            }
        }
        extensions
    }

    fn transition_status(&self, status: DeviceStatus) {
        // One-way: only the first transition out of Uninitialized sticks.
        let _ = self.status.compare_exchange(
            DeviceStatus::Uninitialized as u32,
            status as u32,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Current lifecycle status.
    pub fn status(&self) -> DeviceStatus {
        match self.status.load(Ordering::SeqCst) {
            s if s == DeviceStatus::CreateSuccess as u32 => DeviceStatus::CreateSuccess,
            s if s == DeviceStatus::CreateFail as u32 => DeviceStatus::CreateFail,
            _ => DeviceStatus::Uninitialized,
        }
    }

    /// Whether the device is usable.
    pub fn is_valid(&self) -> bool {
        self.state.get().is_some()
    }

    /// Which interface variant this context backs.
    pub fn interface_kind(&self) -> InterfaceKind {
        self.interface_kind
    }

    /// Device capability table, once initialized.
    pub fn device(&self) -> Option<Arc<dyn DeviceDriver>> {
        self.state.get().map(|state| state.device.clone())
    }

    /// The combined graphics/present queue.
    pub fn queue(&self) -> Option<vk::Queue> {
        self.state.get().map(|state| state.queue)
    }

    /// Selected physical device.
    pub fn physical_device(&self) -> Option<vk::PhysicalDevice> {
        self.state.get().map(|state| state.physical_device)
    }

    /// Queue family the device queue was created on.
    pub fn graphics_queue_family_index(&self) -> Option<u32> {
        self.state.get().map(|state| state.graphics_queue_family_index)
    }

    /// Drawing-library backend descriptor.
    pub fn backend_context(&self) -> Option<BackendContext> {
        self.state.get().map(|state| state.backend.clone())
    }

    /// Tracker for flush-signal semaphores.
    pub fn semaphores(&self) -> Option<&SemaphoreTracker> {
        self.state.get().map(|state| &state.semaphores)
    }

    /// Create a window surface and remember it for capability queries.
    pub fn create_window_surface(&self, window: &dyn NativeWindow) -> VulkanResult<vk::SurfaceKHR> {
        let surface = self.driver.create_window_surface(window)?;
        *self
            .window_surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = surface;
        Ok(surface)
    }

    /// Currently bound window surface, NULL_HANDLE when absent.
    pub fn window_surface(&self) -> vk::SurfaceKHR {
        *self
            .window_surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Destroy a window surface, clearing the bound one if it matches.
    pub fn destroy_window_surface(&self, surface: vk::SurfaceKHR) {
        if surface == vk::SurfaceKHR::null() {
            return;
        }
        self.driver.destroy_surface(surface);
        let mut bound = self
            .window_surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *bound == surface {
            *bound = vk::SurfaceKHR::null();
        }
    }

    /// Discover graphics/present families against the bound window surface.
    pub fn find_queue_families(&self) -> QueueFamilyIndices {
        let mut indices = QueueFamilyIndices::default();
        let Some(state) = self.state.get() else {
            return indices;
        };
        let surface = self.window_surface();

        for (i, family) in self
            .driver
            .queue_family_properties(state.physical_device)
            .iter()
            .enumerate()
        {
            let i = i as u32;
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && indices.graphics.is_none() {
                indices.graphics = Some(i);
            }
            if surface != vk::SurfaceKHR::null()
                && indices.present.is_none()
                && self
                    .driver
                    .surface_support(state.physical_device, i, surface)
                    .unwrap_or(false)
            {
                indices.present = Some(i);
            }
            if indices.is_complete() {
                break;
            }
        }
        indices
    }

    /// Query surface capabilities, formats and present modes for the bound
    /// window surface.
    pub fn query_swapchain_support(&self) -> VulkanResult<SwapchainSupportDetails> {
        let state = self.state.get().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "device not initialized".to_string(),
        })?;
        let surface = self.window_surface();
        if surface == vk::SurfaceKHR::null() {
            return Err(VulkanError::InvalidOperation {
                reason: "no window surface bound".to_string(),
            });
        }
        Ok(SwapchainSupportDetails {
            capabilities: self
                .driver
                .surface_capabilities(state.physical_device, surface)?,
            formats: self.driver.surface_formats(state.physical_device, surface)?,
            present_modes: self
                .driver
                .surface_present_modes(state.physical_device, surface)?,
        })
    }

    /// Build a GPU drawing context from the backend descriptor.
    ///
    /// Doubles the library's default resource-cache limits, capped at a fixed
    /// byte ceiling. Each call allocates a new context; consult the registry's
    /// per-thread cache before calling.
    pub fn create_drawing_context(
        &self,
        factory: &dyn DrawingContextFactory,
        cache_dir: Option<&str>,
    ) -> Option<Arc<dyn GpuContext>> {
        let backend = self.backend_context()?;
        if cache_dir.is_none() {
            log::debug!("creating drawing context without cache dir, shader compiles will not be reused");
        }
        let context = factory.create_context(&backend, cache_dir)?;

        let (max_resources, max_bytes) = context.resource_cache_limits();
        if max_bytes > 0 {
            context.set_resource_cache_limits(
                CACHE_LIMITS_TIMES * max_resources,
                CACHE_LIMITS_TIMES as usize * max_bytes.min(GR_CACHE_MAX_BYTE_SIZE),
            );
        } else {
            context.set_resource_cache_limits(GR_CACHE_MAX_COUNT, GR_CACHE_MAX_BYTE_SIZE);
        }
        Some(context)
    }

    /// Run `f` with exclusive access to this context's submission queue.
    ///
    /// A `VkQueue` is not thread-safe for concurrent submission; redraw
    /// variants serialize on the hardware queue mutex, basic render on its
    /// own.
    pub fn submit_serialized<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard: MutexGuard<'_, ()> = match self.interface_kind {
            InterfaceKind::BasicRender => self
                .graphics_queue_mutex
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            InterfaceKind::ProtectedRedraw | InterfaceKind::UnprotectedRedraw => self
                .hardware_queue_mutex
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        };
        f()
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        let surface = self.window_surface();
        if surface != vk::SurfaceKHR::null() {
            self.driver.destroy_surface(surface);
        }
        if let Some(state) = self.state.get() {
            // Pending GPU work must finish before the semaphore tracker and
            // the device itself are torn down.
            state.device.device_wait_idle();
        }
    }
}
