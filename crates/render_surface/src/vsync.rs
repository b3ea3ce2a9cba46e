//! Vsync tick delivery
//!
//! A dedicated background thread forwards compositor frame ticks to a
//! registered callback. At most one tick request is outstanding at a time;
//! the in-flight flag is cleared before the callback runs so the callback
//! may immediately request the next vsync.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Frame callback, invoked with the tick timestamp in nanoseconds.
pub type VsyncCallback = Box<dyn Fn(i64) + Send>;

/// The platform tick source (choreographer, compositor loop, or a timer).
pub trait VsyncSource: Send + Sync {
    /// Block until the next frame tick; `None` means the source is gone.
    fn wait_for_tick(&self) -> Option<i64>;

    /// Ask the platform to schedule one frame callback.
    fn schedule(&self) {}

    /// Best-effort wake of a blocked [`wait_for_tick`](Self::wait_for_tick).
    ///
    /// Sources without a wake mechanism rely on their own scheduling to
    /// observe shutdown, which can delay the delivery thread's join by up to
    /// one tick interval.
    fn wake(&self) {}
}

/// Fixed-interval fallback source for platforms without a choreographer.
pub struct SoftwareTickSource {
    interval: Duration,
    epoch: Instant,
}

impl SoftwareTickSource {
    /// Tick at a fixed interval (16ms approximates a 60fps vsync rate).
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            epoch: Instant::now(),
        }
    }

    /// Source ticking at the configured soft-vsync interval.
    pub fn from_config(config: &crate::config::RenderSurfaceConfig) -> Self {
        Self::new(Duration::from_millis(config.soft_vsync_interval_ms))
    }
}

impl VsyncSource for SoftwareTickSource {
    fn wait_for_tick(&self) -> Option<i64> {
        std::thread::sleep(self.interval);
        Some(self.epoch.elapsed().as_nanos() as i64)
    }
}

/// Background client delivering frame ticks to a registered callback.
pub struct VsyncClient {
    running: Arc<AtomicBool>,
    having: Arc<AtomicBool>,
    need_once: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<VsyncCallback>>>,
    source: Arc<dyn VsyncSource>,
    thread: Option<JoinHandle<()>>,
}

impl VsyncClient {
    /// Spawn the delivery thread over a tick source.
    pub fn new(source: Arc<dyn VsyncSource>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let having = Arc::new(AtomicBool::new(false));
        let need_once = Arc::new(AtomicBool::new(false));
        let callback: Arc<Mutex<Option<VsyncCallback>>> = Arc::new(Mutex::new(None));

        let thread = {
            let running = running.clone();
            let having = having.clone();
            let need_once = need_once.clone();
            let callback = callback.clone();
            let source = source.clone();
            std::thread::Builder::new()
                .name("vsync-client".to_string())
                .spawn(move || Self::thread_main(&running, &having, &need_once, &callback, &source))
        };
        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("failed to spawn vsync thread: {}", e);
                running.store(false, Ordering::SeqCst);
                None
            }
        };

        Self {
            running,
            having,
            need_once,
            callback,
            source,
            thread,
        }
    }

    fn thread_main(
        running: &AtomicBool,
        having: &AtomicBool,
        need_once: &AtomicBool,
        callback: &Mutex<Option<VsyncCallback>>,
        source: &Arc<dyn VsyncSource>,
    ) {
        // A request that raced thread startup still gets its tick.
        if need_once.swap(false, Ordering::SeqCst) {
            log::debug!("vsync requested before delivery thread was ready");
            source.schedule();
        }
        while running.load(Ordering::SeqCst) {
            let Some(timestamp) = source.wait_for_tick() else {
                break;
            };
            if !running.load(Ordering::SeqCst) {
                break;
            }
            // Clear the in-flight flag first: the callback may re-request.
            having.store(false, Ordering::SeqCst);
            let guard = callback.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(callback) = guard.as_ref() {
                callback(timestamp);
            }
        }
    }

    /// Request one frame tick; idempotent while a request is in flight.
    pub fn request_next_vsync(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        if !self.having.swap(true, Ordering::SeqCst) {
            self.source.schedule();
        } else {
            self.need_once.store(true, Ordering::SeqCst);
        }
    }

    /// Register the frame callback.
    pub fn set_vsync_callback(&self, callback: VsyncCallback) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }
}

impl Drop for VsyncClient {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.source.wake();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
