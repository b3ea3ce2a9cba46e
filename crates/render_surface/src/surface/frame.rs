//! One render target for exactly one frame

use std::sync::Arc;

use crate::drawing::DrawingSurface;

/// A render target handed to the renderer between request and flush.
///
/// `buffer_age` counts frames since this backing buffer was last presented:
/// 0 means never presented or just presented, 1 means one frame of stale
/// content. Partial-redraw consumers use it to size their damage regions.
pub struct SurfaceFrame {
    surface: Arc<dyn DrawingSurface>,
    width: i32,
    height: i32,
    buffer_age: i32,
    image_index: Option<u32>,
    physical_width: i32,
    physical_height: i32,
}

impl SurfaceFrame {
    /// Wrap a drawable surface as a frame.
    pub fn new(surface: Arc<dyn DrawingSurface>, width: i32, height: i32, buffer_age: i32) -> Self {
        Self {
            surface,
            width,
            height,
            buffer_age,
            image_index: None,
            physical_width: width,
            physical_height: height,
        }
    }

    /// The drawable surface backing this frame.
    pub fn surface(&self) -> Arc<dyn DrawingSurface> {
        self.surface.clone()
    }

    /// Requested logical width.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Requested logical height.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Frames since this buffer was last presented.
    pub fn buffer_age(&self) -> i32 {
        self.buffer_age
    }

    /// Swapchain image index backing this frame (Vulkan only).
    pub fn swapchain_image_index(&self) -> Option<u32> {
        self.image_index
    }

    /// Record which swapchain image backs this frame.
    pub fn set_swapchain_image_index(&mut self, index: u32) {
        self.image_index = Some(index);
    }

    /// Actual backing-store size, which may differ from the logical size
    /// after extent clamping.
    pub fn physical_size(&self) -> (i32, i32) {
        (self.physical_width, self.physical_height)
    }

    /// Record the actual backing-store size.
    pub fn set_physical_size(&mut self, width: i32, height: i32) {
        self.physical_width = width;
        self.physical_height = height;
    }
}
