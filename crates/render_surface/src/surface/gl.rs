//! GL-backed window surface
//!
//! Adapts an EGL-style render context: the context owns the GL/EGL state and
//! this surface drives the per-window lifecycle (surface creation once per
//! native window, make-current before drawing, swap on flush).

use std::sync::Arc;

use crate::drawing::{ColorGamut, DrawingSurface, GpuContext};
use crate::surface::frame::SurfaceFrame;
use crate::surface::{FrameHints, RenderSurface};
use crate::window::NativeWindow;

/// Opaque handle to a window surface owned by the GL render context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlSurfaceHandle(pub u64);

/// The EGL-style render context collaborator the GL surface drives.
pub trait GlRenderContext: Send + Sync {
    /// Initialize the underlying GL/EGL context; idempotent.
    fn init(&self) -> bool;

    /// Build (or reuse) the GPU drawing context; idempotent.
    fn setup_gpu_context(&self) -> bool;

    /// The drawing context, once set up.
    fn gpu_context(&self) -> Option<Arc<dyn GpuContext>>;

    /// Create a window surface for a native window.
    fn create_window_surface(&self, window: &dyn NativeWindow) -> Option<GlSurfaceHandle>;

    /// Destroy a window surface.
    fn destroy_window_surface(&self, handle: GlSurfaceHandle);

    /// Bind a window surface to the context.
    fn make_current(&self, handle: GlSurfaceHandle) -> bool;

    /// Flush pending GL rendering.
    fn render_frame(&self);

    /// Swap the back buffer of a window surface.
    fn swap_buffers(&self, handle: GlSurfaceHandle) -> bool;

    /// Drawable surface for the currently bound window surface.
    fn frame_surface(
        &self,
        handle: GlSurfaceHandle,
        width: i32,
        height: i32,
    ) -> Option<Arc<dyn DrawingSurface>>;

    /// Forwarded color gamut selection.
    fn set_color_space(&self, color_space: ColorGamut);

    /// Currently selected color gamut.
    fn color_space(&self) -> ColorGamut;
}

/// Window surface rendering through a GL render context.
pub struct GlSurface {
    window: Option<Arc<dyn NativeWindow>>,
    context: Option<Arc<dyn GlRenderContext>>,
    surface_handle: Option<GlSurfaceHandle>,
    color_space: ColorGamut,
}

impl GlSurface {
    /// Create a surface on a native window.
    pub fn new(
        window: Option<Arc<dyn NativeWindow>>,
        context: Option<Arc<dyn GlRenderContext>>,
    ) -> Self {
        Self {
            window,
            context,
            surface_handle: None,
            color_space: ColorGamut::Srgb,
        }
    }

    /// Attach the render context after construction.
    pub fn set_render_context(&mut self, context: Arc<dyn GlRenderContext>) {
        self.context = Some(context);
    }

    fn setup_gpu_context(&self, context: &Arc<dyn GlRenderContext>) -> bool {
        context.init();
        context.setup_gpu_context();
        context.set_color_space(self.color_space);
        true
    }
}

impl RenderSurface for GlSurface {
    fn is_valid(&self) -> bool {
        self.window.is_some()
    }

    fn request_frame(
        &mut self,
        width: i32,
        height: i32,
        _ui_timestamp: u64,
        _hints: FrameHints,
    ) -> Option<SurfaceFrame> {
        let Some(window) = self.window.clone() else {
            log::error!("GlSurface::request_frame, producer is unavailable");
            return None;
        };
        let Some(context) = self.context.clone() else {
            log::error!("GlSurface::request_frame, render context is unavailable");
            return None;
        };
        if !self.setup_gpu_context(&context) {
            return None;
        }

        window.set_buffer_geometry(width, height);
        if self.surface_handle.is_none() {
            self.surface_handle = context.create_window_surface(window.as_ref());
        }
        let Some(handle) = self.surface_handle else {
            log::debug!("GlSurface::request_frame, window surface creation failed");
            return None;
        };

        context.make_current(handle);
        let surface = context.frame_surface(handle, width, height)?;
        Some(SurfaceFrame::new(surface, width, height, 0))
    }

    fn flush_frame(&mut self, _frame: SurfaceFrame, _ui_timestamp: u64) -> bool {
        let Some(context) = &self.context else {
            log::error!("GlSurface::flush_frame, render context is unavailable");
            return false;
        };
        let Some(handle) = self.surface_handle else {
            log::debug!("GlSurface::flush_frame, no window surface");
            return false;
        };

        context.render_frame();
        context.swap_buffers(handle);
        if let Some(gpu_context) = context.gpu_context() {
            gpu_context.purge_unlocked_resources(true);
        }
        true
    }

    fn color_space(&self) -> ColorGamut {
        match &self.context {
            Some(context) => context.color_space(),
            None => self.color_space,
        }
    }

    fn set_color_space(&mut self, color_space: ColorGamut) {
        self.color_space = color_space;
        match &self.context {
            Some(context) => context.set_color_space(color_space),
            None => log::error!("GlSurface::set_color_space, render context is unavailable"),
        }
    }
}

impl Drop for GlSurface {
    fn drop(&mut self) {
        if let (Some(context), Some(handle)) = (&self.context, self.surface_handle.take()) {
            context.destroy_window_surface(handle);
        }
    }
}
