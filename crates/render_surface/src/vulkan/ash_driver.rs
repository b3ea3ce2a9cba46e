//! Production driver backed by `ash`
//!
//! Loads the system Vulkan library dynamically, creates one instance per
//! process and resolves the device-level table when a logical device is
//! created. Instance teardown is reference-counted so a device table can
//! never outlive the instance it was resolved from.

use std::ffi::{c_char, CStr, CString};
use std::sync::{Arc, Mutex, PoisonError};

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};

use crate::error::{VulkanError, VulkanResult};
use crate::vulkan::driver::{DeviceDesc, DeviceDriver, PresentRequest, SwapchainDesc, VulkanDriver};
use crate::window::NativeWindow;

/// Instance-level loader state, destroyed only after every device table
/// resolved from it has been dropped.
struct InstanceHolder {
    entry: Entry,
    instance: Instance,
    surface_loader: Surface,
}

impl Drop for InstanceHolder {
    fn drop(&mut self) {
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

/// Loader/instance capability table over the system Vulkan library.
pub struct AshDriver {
    entry: Entry,
    holder: Mutex<Option<Arc<InstanceHolder>>>,
}

impl AshDriver {
    /// Load the Vulkan library and build the loader-level table.
    pub fn new() -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e))
        })?;
        Ok(Self {
            entry,
            holder: Mutex::new(None),
        })
    }

    fn holder(&self) -> VulkanResult<Arc<InstanceHolder>> {
        self.holder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .cloned()
            .ok_or_else(|| {
                VulkanError::InitializationFailed("Vulkan instance not created".to_string())
            })
    }

    fn instance_extensions() -> Vec<*const c_char> {
        #[allow(unused_mut)] // platform extensions are appended per target
        let mut extensions = vec![
            Surface::name().as_ptr(),
            vk::KhrGetPhysicalDeviceProperties2Fn::name().as_ptr(),
        ];
        #[cfg(target_os = "android")]
        extensions.push(ash::extensions::khr::AndroidSurface::name().as_ptr());
        #[cfg(target_os = "windows")]
        extensions.push(ash::extensions::khr::Win32Surface::name().as_ptr());
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        extensions.push(ash::extensions::ext::MetalSurface::name().as_ptr());
        #[cfg(all(
            unix,
            not(target_os = "android"),
            not(target_os = "macos"),
            not(target_os = "ios")
        ))]
        {
            extensions.push(ash::extensions::khr::XlibSurface::name().as_ptr());
            extensions.push(ash::extensions::khr::WaylandSurface::name().as_ptr());
        }
        extensions
    }
}

impl VulkanDriver for AshDriver {
    fn create_instance(&self) -> VulkanResult<vk::Instance> {
        let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = holder.as_ref() {
            return Ok(existing.instance.handle());
        }

        let app_name = CString::new("render_surface").unwrap();
        let engine_name = CString::new("render_surface").unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let extensions = Self::instance_extensions();
        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions);

        let instance = unsafe {
            self.entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        let surface_loader = Surface::new(&self.entry, &instance);

        let created = Arc::new(InstanceHolder {
            entry: self.entry.clone(),
            instance,
            surface_loader,
        });
        let handle = created.instance.handle();
        *holder = Some(created);
        Ok(handle)
    }

    fn enumerate_physical_devices(&self) -> VulkanResult<Vec<vk::PhysicalDevice>> {
        let holder = self.holder()?;
        unsafe {
            holder
                .instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)
        }
    }

    fn queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        match self.holder() {
            Ok(holder) => unsafe {
                holder
                    .instance
                    .get_physical_device_queue_family_properties(physical_device)
            },
            Err(_) => {
                log::error!("queue_family_properties called before instance creation");
                Vec::new()
            }
        }
    }

    fn supported_device_extensions(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Vec<String>> {
        let holder = self.holder()?;
        let properties = unsafe {
            holder
                .instance
                .enumerate_device_extension_properties(physical_device)
                .map_err(VulkanError::Api)?
        };
        Ok(properties
            .iter()
            .map(|prop| {
                unsafe { CStr::from_ptr(prop.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect())
    }

    fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<bool> {
        let holder = self.holder()?;
        unsafe {
            holder
                .surface_loader
                .get_physical_device_surface_support(physical_device, queue_family_index, surface)
                .map_err(VulkanError::Api)
        }
    }

    fn create_device(&self, desc: &DeviceDesc) -> VulkanResult<Arc<dyn DeviceDriver>> {
        let holder = self.holder()?;

        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = desc
            .queue_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_cstrings: Vec<CString> = desc
            .extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|_| VulkanError::InvalidOperation {
                reason: "device extension name contains an interior NUL".to_string(),
            })?;
        let extension_ptrs: Vec<*const c_char> =
            extension_cstrings.iter().map(|c| c.as_ptr()).collect();

        // Feature chain: query what the device offers, then enable exactly that.
        let mut ycbcr = vk::PhysicalDeviceSamplerYcbcrConversionFeatures::default();
        let mut sync2 = vk::PhysicalDeviceSynchronization2Features::default();
        let mut bindless = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
        let mut timeline = vk::PhysicalDeviceTimelineSemaphoreFeatures::default();
        let mut protected_memory = vk::PhysicalDeviceProtectedMemoryFeatures::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::builder()
            .push_next(&mut ycbcr)
            .push_next(&mut sync2)
            .push_next(&mut bindless)
            .push_next(&mut timeline);
        if desc.protected_memory {
            features2 = features2.push_next(&mut protected_memory);
        }
        unsafe {
            holder
                .instance
                .get_physical_device_features2(desc.physical_device, &mut features2);
        }

        if desc.hts_enable {
            // The vendor scheduling bit is not part of the standard headers.
            log::debug!("hts scheduling hint requested; loader has no vendor flag, ignoring");
        }

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .push_next(&mut features2);

        let device = unsafe {
            holder
                .instance
                .create_device(desc.physical_device, &create_info, None)
                .map_err(VulkanError::Api)?
        };
        let swapchain_loader = SwapchainLoader::new(&holder.instance, &device);

        Ok(Arc::new(AshDeviceDriver {
            _holder: holder,
            device,
            swapchain_loader,
        }))
    }

    fn create_window_surface(&self, window: &dyn NativeWindow) -> VulkanResult<vk::SurfaceKHR> {
        let holder = self.holder()?;
        unsafe {
            ash_window::create_surface(
                &holder.entry,
                &holder.instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
            .map_err(VulkanError::Api)
        }
    }

    fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        if surface == vk::SurfaceKHR::null() {
            return;
        }
        if let Ok(holder) = self.holder() {
            unsafe {
                holder.surface_loader.destroy_surface(surface, None);
            }
        }
    }

    fn surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        let holder = self.holder()?;
        unsafe {
            holder
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(VulkanError::Api)
        }
    }

    fn surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        let holder = self.holder()?;
        unsafe {
            holder
                .surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(VulkanError::Api)
        }
    }

    fn surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        let holder = self.holder()?;
        unsafe {
            holder
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(VulkanError::Api)
        }
    }
}

/// Device capability table resolved for one logical device.
struct AshDeviceDriver {
    // Keeps the instance alive until this device is destroyed.
    _holder: Arc<InstanceHolder>,
    device: Device,
    swapchain_loader: SwapchainLoader,
}

impl DeviceDriver for AshDeviceDriver {
    fn device(&self) -> vk::Device {
        self.device.handle()
    }

    fn get_queue(&self, queue_family_index: u32, queue_index: u32) -> vk::Queue {
        unsafe { self.device.get_device_queue(queue_family_index, queue_index) }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VulkanResult<vk::SwapchainKHR> {
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(desc.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.usage)
            .image_sharing_mode(desc.sharing_mode)
            .pre_transform(desc.pre_transform)
            .composite_alpha(desc.composite_alpha)
            .present_mode(desc.present_mode)
            .clipped(desc.clipped)
            .old_swapchain(vk::SwapchainKHR::null());
        if desc.sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(&desc.queue_families);
        }

        unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        if swapchain == vk::SwapchainKHR::null() {
            return;
        }
        unsafe {
            self.swapchain_loader.destroy_swapchain(swapchain, None);
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VulkanResult<Vec<vk::Image>> {
        unsafe {
            self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
                .map_err(VulkanError::Api)
        }
    }

    fn queue_present(&self, queue: vk::Queue, request: &PresentRequest) -> VulkanResult<bool> {
        let swapchains = [request.swapchain];
        let image_indices = [request.image_index];
        let wait_semaphores = [request.wait_semaphore];

        let mut present_info = vk::PresentInfoKHR::builder()
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        if request.wait_semaphore != vk::Semaphore::null() {
            present_info = present_info.wait_semaphores(&wait_semaphores);
        }

        unsafe {
            self.swapchain_loader
                .queue_present(queue, &present_info)
                .map_err(VulkanError::Api)
        }
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        unsafe {
            self.device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        if semaphore == vk::Semaphore::null() {
            return;
        }
        unsafe {
            self.device.destroy_semaphore(semaphore, None);
        }
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe {
            self.device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn fence_status(&self, fence: vk::Fence) -> VulkanResult<bool> {
        unsafe { self.device.get_fence_status(fence).map_err(VulkanError::Api) }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(fences, true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        if fence == vk::Fence::null() {
            return;
        }
        unsafe {
            self.device.destroy_fence(fence, None);
        }
    }

    fn device_wait_idle(&self) {
        let result = unsafe { self.device.device_wait_idle() };
        if let Err(e) = result {
            log::error!("device_wait_idle failed: {:?}", e);
        }
    }
}

impl Drop for AshDeviceDriver {
    fn drop(&mut self) {
        unsafe {
            // Ensure device is idle before destruction
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}
