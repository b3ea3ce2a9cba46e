//! Contracts for the drawing library collaborator
//!
//! The 2D drawing library (the GPU rasterizer the renderer draws with) is an
//! external dependency of this crate. These traits describe the narrow slice
//! of it the surface layer relies on: building a GPU context from a Vulkan
//! backend descriptor, wrapping swapchain images as drawable surfaces, and
//! flushing with a signal semaphore plus a completion callback.

use std::sync::Arc;

use ash::vk;

/// Color gamut requested by the window producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorGamut {
    /// Standard sRGB
    Srgb,
    /// Display P3
    DisplayP3,
    /// DCI-P3
    DciP3,
    /// Adobe RGB
    AdobeRgb,
    /// BT.2020
    Bt2020,
}

/// Drawing-library color space a surface is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// sRGB transfer function over the DCI-P3 matrix
    DciP3,
    /// sRGB transfer function over the Adobe RGB matrix
    AdobeRgb,
    /// sRGB transfer function over the Rec.2020 matrix
    Rec2020,
}

/// Map a requested gamut onto the drawing library's color space.
///
/// sRGB (and anything unrecognized) maps to `None` so the library keeps its
/// historical default instead of an explicit sRGB space.
pub fn color_space_for_gamut(gamut: ColorGamut) -> Option<ColorSpace> {
    match gamut {
        ColorGamut::DisplayP3 | ColorGamut::DciP3 => Some(ColorSpace::DciP3),
        ColorGamut::AdobeRgb => Some(ColorSpace::AdobeRgb),
        ColorGamut::Bt2020 => Some(ColorSpace::Rec2020),
        ColorGamut::Srgb => None,
    }
}

/// Pixel interpretation of a drawable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorType {
    /// 8-bit RGBA
    Rgba8888,
    /// 5-6-5 packed RGB
    Rgb565,
    /// 10-10-10-2 packed RGBA
    Rgba1010102,
}

/// Translate a swapchain image format into a drawing-library color type.
pub fn color_type_for_vk_format(format: vk::Format) -> ColorType {
    match format {
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R8G8B8A8_SRGB => ColorType::Rgba8888,
        vk::Format::R5G6B5_UNORM_PACK16 => ColorType::Rgb565,
        vk::Format::A2B10G10R10_UNORM_PACK32 => ColorType::Rgba1010102,
        _ => {
            log::warn!(
                "Unsupported Vulkan format for drawing: {:?}, defaulting to RGBA_8888",
                format
            );
            ColorType::Rgba8888
        }
    }
}

/// Backend descriptor handed to the drawing library when building a GPU
/// context. All handles stay owned by the device context that produced this.
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// Vulkan instance handle
    pub instance: vk::Instance,
    /// Selected physical device
    pub physical_device: vk::PhysicalDevice,
    /// Logical device handle
    pub device: vk::Device,
    /// Combined graphics/present queue
    pub queue: vk::Queue,
    /// Queue family index of `queue`
    pub graphics_queue_family_index: u32,
    /// Highest Vulkan API version the device was created against
    pub max_api_version: u32,
    /// Device extensions enabled at creation
    pub extensions: Vec<String>,
    /// Whether the device was created with protected memory
    pub protected: bool,
}

/// Description of a swapchain image wrapped as a backend render target.
#[derive(Debug, Clone)]
pub struct TextureInfo {
    /// The swapchain image (driver-owned, never freed by the drawing library)
    pub image: vk::Image,
    /// Image format
    pub format: vk::Format,
    /// Logical width in pixels
    pub width: i32,
    /// Logical height in pixels
    pub height: i32,
    /// Image tiling
    pub tiling: vk::ImageTiling,
    /// Usage flags the image was created with
    pub usage: vk::ImageUsageFlags,
    /// Sharing mode derived from queue-family equality
    pub sharing_mode: vk::SharingMode,
    /// Sample count
    pub sample_count: u32,
    /// Mip level count
    pub level_count: u32,
    /// Whether the image lives in protected memory
    pub protected: bool,
    /// Color type derived from `format`
    pub color_type: ColorType,
    /// Color space for the surface, `None` for the library default
    pub color_space: Option<ColorSpace>,
}

/// Whether the drawing library actually submitted the flush semaphores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// GPU work was submitted and the signal semaphore will fire
    SemaphoresSubmitted,
    /// Nothing was submitted; the semaphore will never signal
    NotSubmitted,
}

/// Parameters for flushing a drawable surface.
pub struct FlushInfo {
    /// Semaphore the drawing library signals when the GPU work completes
    pub signal_semaphore: vk::Semaphore,
    /// Invoked once the GPU has actually finished the flushed work. Only
    /// called when the flush reported [`FlushOutcome::SemaphoresSubmitted`].
    pub finished: Box<dyn FnOnce() + Send>,
}

impl std::fmt::Debug for FlushInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushInfo")
            .field("signal_semaphore", &self.signal_semaphore)
            .finish()
    }
}

/// One drawable target, backed by a swapchain image, a GL surface or a raster
/// buffer depending on the backend.
pub trait DrawingSurface: Send + Sync {
    /// Surface width in pixels
    fn width(&self) -> i32;

    /// Surface height in pixels
    fn height(&self) -> i32;

    /// Reset the drawing area before handing the surface to the renderer.
    fn clear_drawing_area(&self) {}

    /// Flush recorded drawing commands.
    fn flush(&self, info: FlushInfo) -> FlushOutcome;
}

/// GPU context of the drawing library.
///
/// A context is thread-affine: it is created for and used by exactly one
/// thread, which is why the registry keys its cache by thread id.
pub trait GpuContext: Send + Sync {
    /// Current resource cache limits as (max resource count, max bytes).
    fn resource_cache_limits(&self) -> (i32, usize);

    /// Replace the resource cache limits.
    fn set_resource_cache_limits(&self, max_resources: i32, max_bytes: usize);

    /// Purge unlocked resources; `scratch_only` keeps textures alive.
    fn purge_unlocked_resources(&self, scratch_only: bool);

    /// Free all GPU resources not referenced by pending work.
    fn free_gpu_resources(&self);

    /// Reset internal context state after the underlying device state changed.
    fn reset_context(&self);

    /// Flush and submit all pending work, optionally syncing the CPU.
    fn flush_and_submit(&self, sync_cpu: bool);

    /// Submit pending command buffers.
    fn submit(&self);

    /// Queue a GPU-side wait on `semaphore` before subsequent submissions.
    fn wait_semaphore(&self, semaphore: vk::Semaphore);

    /// Wrap a backend render target as a drawable surface.
    fn create_surface_from_backend_render_target(
        &self,
        info: &TextureInfo,
    ) -> Option<Arc<dyn DrawingSurface>>;
}

/// Factory the embedder supplies for building GPU contexts and raster
/// surfaces. Injected into the registry so this crate never links the drawing
/// library directly.
pub trait DrawingContextFactory: Send + Sync {
    /// Build a GPU context from a Vulkan backend descriptor.
    ///
    /// `cache_dir` points the library's shader cache; without it every
    /// process start recompiles shaders.
    fn create_context(
        &self,
        backend: &BackendContext,
        cache_dir: Option<&str>,
    ) -> Option<Arc<dyn GpuContext>>;

    /// Build a CPU raster surface for software rendering.
    fn create_raster_surface(&self, width: i32, height: i32) -> Option<Arc<dyn DrawingSurface>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srgb_gamut_keeps_library_default() {
        assert_eq!(color_space_for_gamut(ColorGamut::Srgb), None);
    }

    #[test]
    fn test_wide_gamuts_map_to_color_spaces() {
        assert_eq!(
            color_space_for_gamut(ColorGamut::DisplayP3),
            Some(ColorSpace::DciP3)
        );
        assert_eq!(
            color_space_for_gamut(ColorGamut::DciP3),
            Some(ColorSpace::DciP3)
        );
        assert_eq!(
            color_space_for_gamut(ColorGamut::AdobeRgb),
            Some(ColorSpace::AdobeRgb)
        );
        assert_eq!(
            color_space_for_gamut(ColorGamut::Bt2020),
            Some(ColorSpace::Rec2020)
        );
    }

    #[test]
    fn test_color_type_conversion() {
        assert_eq!(
            color_type_for_vk_format(vk::Format::B8G8R8A8_SRGB),
            ColorType::Rgba8888
        );
        assert_eq!(
            color_type_for_vk_format(vk::Format::R5G6B5_UNORM_PACK16),
            ColorType::Rgb565
        );
        assert_eq!(
            color_type_for_vk_format(vk::Format::A2B10G10R10_UNORM_PACK32),
            ColorType::Rgba1010102
        );
        // unknown formats fall back to RGBA_8888
        assert_eq!(
            color_type_for_vk_format(vk::Format::D32_SFLOAT),
            ColorType::Rgba8888
        );
    }
}
