//! Software-rendered surface
//!
//! Draws into a CPU raster target and hands the pixels to an opaque platform
//! layer on flush. Used on targets without a usable GPU context.

use std::sync::Arc;

use crate::drawing::{ColorGamut, DrawingContextFactory, DrawingSurface};
use crate::surface::frame::SurfaceFrame;
use crate::surface::{FrameHints, RenderSurface};

/// The platform layer (a `CALayer` or equivalent) raster frames are
/// presented to.
pub trait LayerPresenter: Send + Sync {
    /// Push the rendered pixels of `surface` to the layer.
    fn present(&self, surface: &dyn DrawingSurface) -> bool;
}

/// Window surface rendering on the CPU.
pub struct CpuSurface {
    layer: Option<Arc<dyn LayerPresenter>>,
    factory: Arc<dyn DrawingContextFactory>,
    surface: Option<Arc<dyn DrawingSurface>>,
    color_space: ColorGamut,
}

impl CpuSurface {
    /// Create a surface presenting to a platform layer.
    pub fn new(
        layer: Option<Arc<dyn LayerPresenter>>,
        factory: Arc<dyn DrawingContextFactory>,
    ) -> Self {
        Self {
            layer,
            factory,
            surface: None,
            color_space: ColorGamut::Srgb,
        }
    }
}

impl RenderSurface for CpuSurface {
    fn is_valid(&self) -> bool {
        self.layer.is_some()
    }

    fn request_frame(
        &mut self,
        width: i32,
        height: i32,
        _ui_timestamp: u64,
        _hints: FrameHints,
    ) -> Option<SurfaceFrame> {
        if self.layer.is_none() {
            log::error!("CpuSurface::request_frame, layer is unavailable");
            return None;
        }

        let needs_rebuild = match &self.surface {
            Some(surface) => surface.width() != width || surface.height() != height,
            None => true,
        };
        if needs_rebuild {
            self.surface = self.factory.create_raster_surface(width, height);
            if self.surface.is_none() {
                log::error!("CpuSurface::request_frame, raster surface creation failed");
                return None;
            }
        }

        let surface = self.surface.clone()?;
        surface.clear_drawing_area();
        Some(SurfaceFrame::new(surface, width, height, 0))
    }

    fn flush_frame(&mut self, frame: SurfaceFrame, _ui_timestamp: u64) -> bool {
        let Some(layer) = &self.layer else {
            log::error!("CpuSurface::flush_frame, layer is unavailable");
            return false;
        };
        layer.present(frame.surface().as_ref())
    }

    fn color_space(&self) -> ColorGamut {
        self.color_space
    }

    fn set_color_space(&mut self, color_space: ColorGamut) {
        if self.color_space == color_space {
            return;
        }
        self.color_space = color_space;
        // Raster target must be rebuilt with the new color space.
        self.surface = None;
    }
}
