//! Vulkan-backed window surface
//!
//! Each frame acquires a swapchain image, wraps it as a drawable surface
//! (cached per image index) and flushes with a semaphore-ordered
//! flush/submit/present sequence. Resize and out-of-date handling goes
//! through staged swapchain recreation; a frame produced before a recreation
//! is rejected at flush time instead of presenting against the wrong ring.

use std::sync::Arc;

use ash::vk;

use crate::drawing::{
    color_space_for_gamut, color_type_for_vk_format, ColorGamut, DrawingSurface, FlushInfo,
    FlushOutcome, GpuContext, TextureInfo,
};
use crate::surface::frame::SurfaceFrame;
use crate::surface::{FrameHints, RenderSurface};
use crate::vulkan::device::DeviceContext;
use crate::vulkan::registry::{ContextRegistry, RenderContextSelector};
use crate::vulkan::semaphore::SemaphoreTicket;
use crate::vulkan::swapchain::{Swapchain, MAX_FRAMES_IN_FLIGHT};
use crate::window::NativeWindow;

/// Window surface rendering through a Vulkan swapchain.
pub struct VulkanSurface {
    registry: Arc<ContextRegistry>,
    selector: RenderContextSelector,
    device_context: Arc<DeviceContext>,
    window: Option<Arc<dyn NativeWindow>>,
    swapchain: Swapchain,
    gpu_context: Option<Arc<dyn GpuContext>>,
    /// Cached drawable per swapchain image index, rebuilt when the backing
    /// dimensions or color space change.
    drawing_surfaces: Vec<Option<Arc<dyn DrawingSurface>>>,
    color_space: ColorGamut,
    current_frame: usize,
    last_presented: Option<u32>,
    current_width: i32,
    current_height: i32,
}

impl VulkanSurface {
    /// Create a surface on a native window.
    ///
    /// Returns `None` when the registry has no usable device context for the
    /// selector.
    pub fn new(
        registry: Arc<ContextRegistry>,
        selector: RenderContextSelector,
        window: Option<Arc<dyn NativeWindow>>,
    ) -> Option<Self> {
        let Some(device_context) = registry.interface(selector) else {
            log::error!("VulkanSurface: no device context available");
            return None;
        };
        let swapchain = Swapchain::new(device_context.clone());
        if let Some(window) = &window {
            swapchain.initialize(window.clone());
        }
        Some(Self {
            registry,
            selector,
            device_context,
            window,
            swapchain,
            gpu_context: None,
            drawing_surfaces: Vec::new(),
            color_space: ColorGamut::Srgb,
            current_frame: 0,
            last_presented: None,
            current_width: -1,
            current_height: -1,
        })
    }

    fn setup_gpu_context(&mut self) -> bool {
        if self.gpu_context.is_none() {
            self.gpu_context = self.registry.drawing_context(self.selector);
        }
        self.gpu_context.is_some()
    }

    fn set_native_window_info(&mut self, window: &Arc<dyn NativeWindow>, width: i32, height: i32) {
        if width == self.current_width && height == self.current_height {
            return;
        }
        if !window.set_buffer_geometry(width, height) {
            log::error!("set_buffer_geometry failed for {}x{}", width, height);
        }
        if !self.swapchain.needs_recreate() {
            self.swapchain.set_needs_recreate(true);
            self.swapchain.set_pending_size(width, height);
        }
        self.current_width = width;
        self.current_height = height;
    }

    fn recreate_swapchain_if_needed(&mut self, width: i32, height: i32) -> bool {
        if !self.swapchain.needs_recreate() && self.swapchain.is_created() {
            return true;
        }
        if self.swapchain.is_recreating() {
            log::debug!("request_frame: swapchain is being recreated, dropping frame");
            return false;
        }

        let (mut recreate_width, mut recreate_height) = self.swapchain.pending_size();
        if recreate_width == 0 {
            recreate_width = width;
        }
        if recreate_height == 0 {
            recreate_height = height;
        }

        // Surfaces wrapping the old ring are invalid after recreation.
        self.drawing_surfaces.clear();
        if let Some(context) = &self.gpu_context {
            context.free_gpu_resources();
        }

        self.swapchain.recreate(recreate_width, recreate_height);
        self.swapchain.set_pending_size(0, 0);
        self.last_presented = None;
        self.current_frame = 0;
        true
    }

    fn acquire_image(&mut self) -> Option<u32> {
        let semaphore = self.swapchain.image_available_semaphore(self.current_frame)?;
        match self.swapchain.acquire_next_image(u64::MAX, semaphore) {
            Ok((index, false)) => Some(index),
            Ok((_, true)) => {
                log::error!("request_frame: swapchain suboptimal, will recreate next frame");
                self.swapchain.set_needs_recreate(true);
                None
            }
            Err(e) if e.is_out_of_date() => {
                log::error!("request_frame: swapchain out of date, will recreate next frame");
                self.swapchain.set_needs_recreate(true);
                None
            }
            Err(e) => {
                log::debug!("request_frame: failed to acquire swapchain image: {}", e);
                None
            }
        }
    }

    fn create_drawing_surface(
        &self,
        image_index: u32,
        width: i32,
        height: i32,
        protected: bool,
    ) -> Option<Arc<dyn DrawingSurface>> {
        let Some(image) = self.swapchain.image(image_index) else {
            log::info!("invalid swapchain image index: {}", image_index);
            return None;
        };
        let format = self.swapchain.format();
        let indices = self.device_context.find_queue_families();

        let info = TextureInfo {
            image,
            format,
            width,
            height,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            sharing_mode: if indices.queues_differ() {
                vk::SharingMode::CONCURRENT
            } else {
                vk::SharingMode::EXCLUSIVE
            },
            sample_count: 1,
            level_count: 1,
            protected,
            color_type: color_type_for_vk_format(format),
            color_space: color_space_for_gamut(self.color_space),
        };

        let context = self.gpu_context.as_ref()?;
        let surface = context.create_surface_from_backend_render_target(&info);
        if surface.is_none() {
            log::debug!(
                "failed to create drawing surface for image index {}",
                image_index
            );
        }
        surface
    }

    fn drawing_surface_for(
        &mut self,
        image_index: u32,
        width: i32,
        height: i32,
        protected: bool,
    ) -> Option<Arc<dyn DrawingSurface>> {
        let index = image_index as usize;
        if index >= self.drawing_surfaces.len() {
            self.drawing_surfaces.resize_with(index + 1, || None);
        }
        let needs_rebuild = match &self.drawing_surfaces[index] {
            Some(surface) => surface.width() != width || surface.height() != height,
            None => true,
        };
        if needs_rebuild {
            let created = self.create_drawing_surface(image_index, width, height, protected);
            self.drawing_surfaces[index] = created;
        }
        self.drawing_surfaces[index].clone()
    }

    fn flush_drawing_surface(
        &self,
        surface: &Arc<dyn DrawingSurface>,
        ticket: &SemaphoreTicket,
    ) -> bool {
        let Some(tracker) = self.device_context.semaphores() else {
            return false;
        };
        let info = FlushInfo {
            signal_semaphore: ticket.semaphore,
            finished: tracker.completion_callback(ticket.id),
        };
        match surface.flush(info) {
            FlushOutcome::SemaphoresSubmitted => true,
            FlushOutcome::NotSubmitted => {
                log::info!("flush_frame: drawing flush submitted no semaphores, dropping frame");
                tracker.release_engine_defensive(ticket.id);
                tracker.release_renderer(ticket.id);
                false
            }
        }
    }

    fn wait_and_submit(&mut self) {
        // The acquired image must actually be ready before the submit that
        // renders into it.
        if let (Some(context), Some(wait_semaphore)) = (
            self.gpu_context.clone(),
            self.swapchain.image_available_semaphore(self.current_frame),
        ) {
            context.wait_semaphore(wait_semaphore);
            self.device_context.submit_serialized(|| context.submit());
        }
    }

    fn present_image(
        &mut self,
        queue: vk::Queue,
        image_index: u32,
        render_finished: vk::Semaphore,
    ) -> bool {
        match self.swapchain.present(queue, image_index, render_finished) {
            Ok(false) => {
                self.last_presented = Some(image_index);
                true
            }
            Ok(true) => {
                log::debug!("flush_frame: swapchain suboptimal at present");
                true
            }
            Err(e) if e.is_out_of_date() => {
                log::debug!("flush_frame: swapchain out of date, will recreate next frame");
                self.swapchain.set_needs_recreate(true);
                false
            }
            Err(e) => {
                log::debug!("flush_frame: present failed: {}", e);
                false
            }
        }
    }

    fn flush_frame_inner(&mut self, frame: &SurfaceFrame) -> bool {
        if self.swapchain.is_recreating() || self.swapchain.needs_recreate() {
            log::debug!("flush_frame: swapchain is being recreated, dropping frame");
            return false;
        }
        let Some(image_index) = frame.swapchain_image_index() else {
            log::debug!("flush_frame: frame carries no swapchain image");
            return false;
        };
        if image_index as usize >= self.swapchain.image_count() {
            log::debug!(
                "flush_frame: stale image index {} (swapchain has {} images), dropping frame",
                image_index,
                self.swapchain.image_count()
            );
            return false;
        }
        if !self.swapchain.is_created() {
            log::debug!("flush_frame: swapchain is not available");
            return false;
        }

        let Some(render_finished) = self.swapchain.render_finished_semaphore(self.current_frame)
        else {
            return false;
        };
        let device_context = self.device_context.clone();
        let Some(tracker) = device_context.semaphores() else {
            return false;
        };
        let ticket = tracker.register_flush(render_finished);

        let surface = frame.surface();
        if !self.flush_drawing_surface(&surface, &ticket) {
            return false;
        }
        self.wait_and_submit();

        let Some(queue) = device_context.queue() else {
            log::error!("flush_frame: device queue is unavailable");
            tracker.release_renderer(ticket.id);
            return false;
        };
        let presented = self.present_image(queue, image_index, render_finished);
        tracker.release_renderer(ticket.id);
        presented
    }

    #[cfg(test)]
    pub(crate) fn current_frame_index(&self) -> usize {
        self.current_frame
    }
}

impl RenderSurface for VulkanSurface {
    fn is_valid(&self) -> bool {
        self.window.is_some()
    }

    fn request_frame(
        &mut self,
        width: i32,
        height: i32,
        _ui_timestamp: u64,
        hints: FrameHints,
    ) -> Option<SurfaceFrame> {
        let Some(window) = self.window.clone() else {
            log::debug!("request_frame: native window is not bound");
            return None;
        };
        if !self.setup_gpu_context() {
            log::debug!("request_frame: drawing context is unavailable");
            return None;
        }

        self.set_native_window_info(&window, width, height);
        if !self.recreate_swapchain_if_needed(width, height) {
            return None;
        }
        if !self.swapchain.is_created() {
            log::debug!("request_frame: swapchain is not available after recreation attempt");
            return None;
        }

        let image_index = self.acquire_image()?;
        let extent = self.swapchain.extent()?;
        let physical_width = extent.width as i32;
        let physical_height = extent.height as i32;

        let surface = self.drawing_surface_for(
            image_index,
            physical_width,
            physical_height,
            hints.contains(FrameHints::PROTECTED),
        )?;
        surface.clear_drawing_area();

        let buffer_age = match self.last_presented {
            Some(last) if image_index != last => 1,
            _ => 0,
        };

        let mut frame = SurfaceFrame::new(surface, width, height, buffer_age);
        frame.set_swapchain_image_index(image_index);
        frame.set_physical_size(physical_width, physical_height);
        Some(frame)
    }

    fn flush_frame(&mut self, frame: SurfaceFrame, _ui_timestamp: u64) -> bool {
        let result = self.flush_frame_inner(&frame);
        // The semaphore slots rotate in lockstep with acquisitions regardless
        // of the present outcome, so frame pacing never stalls permanently.
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        result
    }

    fn color_space(&self) -> ColorGamut {
        self.color_space
    }

    fn set_color_space(&mut self, color_space: ColorGamut) {
        log::debug!("set_color_space {:?}", color_space);
        if self.color_space == color_space {
            log::debug!("set_color_space: unchanged, skip");
            return;
        }
        self.color_space = color_space;
        // Cached surfaces carry the old color space and must be rebuilt.
        self.drawing_surfaces.clear();
    }
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        if let Some(context) = &self.gpu_context {
            context.flush_and_submit(true);
            context.free_gpu_resources();
        }
        self.drawing_surfaces.clear();
        self.swapchain.cleanup();
    }
}
