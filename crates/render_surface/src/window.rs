//! Native window abstraction
//!
//! Surfaces are constructed against a platform window handle (an
//! `ANativeWindow*`, a `CALayer`, an X11 window, ...). The handle is the only
//! wire input the surface layer needs; everything else is queried from the
//! driver.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// A platform window the surface layer can bind a swapchain or GL surface to.
///
/// Implementations wrap whatever the embedder owns and must keep the
/// underlying handle alive for as long as the surface exists.
pub trait NativeWindow: Send + Sync {
    /// Raw display handle for driver surface creation.
    fn raw_display_handle(&self) -> RawDisplayHandle;

    /// Raw window handle for driver surface creation.
    fn raw_window_handle(&self) -> RawWindowHandle;

    /// Stage the producer-side buffer geometry.
    ///
    /// Returns `false` when the platform rejects the request; callers log and
    /// continue, the driver will clamp on its own.
    fn set_buffer_geometry(&self, width: i32, height: i32) -> bool {
        let _ = (width, height);
        true
    }
}
