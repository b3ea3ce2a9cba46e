//! Deferred release of flush-signal semaphores
//!
//! A semaphore handed to the drawing library as a flush signal must stay
//! alive until the GPU has actually signaled it. The tracker keeps one entry
//! per in-flight semaphore with a reference from each side (the renderer and
//! the 2D engine); the engine's finished-callback delivers its release as a
//! channel message, and entries are reaped on the next flush. A hard cap
//! bounds memory growth when completions stop arriving.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use ash::vk;

use crate::error::VulkanResult;
use crate::vulkan::driver::DeviceDriver;

/// Hard cap on tracked entries before a force-wait purge bounds memory growth.
const MAX_TRACKED_SEMAPHORES: usize = 3000;

/// Log print interval: print semaphore statistics once every ~20 minutes.
/// Assuming 120fps: 144000 frames / 120 fps / 60 seconds = 20 minutes.
const STATISTICS_LOG_INTERVAL: u64 = 144_000;

/// Handle to a tracked semaphore, given out at registration time.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreTicket {
    /// Tracker entry id
    pub id: u64,
    /// The tracked semaphore
    pub semaphore: vk::Semaphore,
}

struct TrackedSemaphore {
    id: u64,
    semaphore: vk::Semaphore,
    fence: Option<vk::Fence>,
    /// Whether the tracker owns (and eventually destroys) the semaphore.
    owned: bool,
    renderer_refs: u32,
    engine_refs: u32,
}

/// Tracks flush-signal semaphores until both sides released them.
pub struct SemaphoreTracker {
    device: Arc<dyn DeviceDriver>,
    entries: Mutex<Vec<TrackedSemaphore>>,
    completions_tx: Mutex<Sender<u64>>,
    completions_rx: Mutex<Receiver<u64>>,
    next_id: AtomicU64,
    flush_count: AtomicU64,
    renderer_deref_count: AtomicU64,
    engine_call_count: AtomicU64,
    engine_deref_count: AtomicU64,
    engine_defensive_deref_count: AtomicU64,
}

impl SemaphoreTracker {
    /// Create a tracker bound to one logical device.
    pub fn new(device: Arc<dyn DeviceDriver>) -> Self {
        let (tx, rx) = channel();
        Self {
            device,
            entries: Mutex::new(Vec::new()),
            completions_tx: Mutex::new(tx),
            completions_rx: Mutex::new(rx),
            next_id: AtomicU64::new(1),
            flush_count: AtomicU64::new(0),
            renderer_deref_count: AtomicU64::new(0),
            engine_call_count: AtomicU64::new(0),
            engine_deref_count: AtomicU64::new(0),
            engine_defensive_deref_count: AtomicU64::new(0),
        }
    }

    /// Create and track a new semaphore owned by the tracker.
    ///
    /// Opportunistically reaps completed entries first so steady-state usage
    /// never grows the list.
    pub fn require_semaphore(&self) -> VulkanResult<SemaphoreTicket> {
        self.cleanup_used_semaphores();
        self.maybe_log_statistics();
        let semaphore = self.device.create_semaphore()?;
        Ok(self.track(semaphore, true))
    }

    /// Track an externally owned semaphore for one flush.
    ///
    /// The semaphore itself (typically a swapchain render-finished semaphore)
    /// stays owned by its creator; only the bookkeeping entry is reaped here.
    pub fn register_flush(&self, semaphore: vk::Semaphore) -> SemaphoreTicket {
        self.cleanup_used_semaphores();
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        self.maybe_log_statistics();
        self.track(semaphore, false)
    }

    fn track(&self, semaphore: vk::Semaphore, owned: bool) -> SemaphoreTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TrackedSemaphore {
                id,
                semaphore,
                fence: None,
                owned,
                renderer_refs: 1,
                engine_refs: 1,
            });
        SemaphoreTicket { id, semaphore }
    }

    /// Build the finished-callback for the drawing library.
    ///
    /// The callback only enqueues a completion message; the entry is reaped
    /// on a later [`cleanup_used_semaphores`](Self::cleanup_used_semaphores)
    /// pass, never on the engine's callback thread.
    pub fn completion_callback(&self, id: u64) -> Box<dyn FnOnce() + Send> {
        let tx = self
            .completions_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Box::new(move || {
            // Tracker may already be gone during teardown.
            let _ = tx.send(id);
        })
    }

    /// Drop the renderer-side reference of an entry.
    pub fn release_renderer(&self, id: u64) {
        self.renderer_deref_count.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.renderer_refs = entry.renderer_refs.saturating_sub(1);
        }
    }

    /// Drop the engine-side reference without a completion message, for
    /// flushes the engine reported it did not submit.
    pub fn release_engine_defensive(&self, id: u64) {
        self.engine_defensive_deref_count
            .fetch_add(1, Ordering::Relaxed);
        self.deref_engine(id);
    }

    fn deref_engine(&self, id: u64) {
        self.engine_deref_count.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.engine_refs = entry.engine_refs.saturating_sub(1);
        }
    }

    fn drain_completions(&self) {
        loop {
            let id = {
                let rx = self
                    .completions_rx
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                rx.try_recv()
            };
            match id {
                Ok(id) => {
                    self.engine_call_count.fetch_add(1, Ordering::Relaxed);
                    self.deref_engine(id);
                }
                Err(_) => break,
            }
        }
    }

    /// Reap entries whose semaphores the GPU is done with.
    ///
    /// Past the hard cap the pass force-waits every pending fence and purges
    /// the whole list instead.
    pub fn cleanup_used_semaphores(&self) {
        self.drain_completions();

        let drained: Vec<TrackedSemaphore>;
        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if entries.len() >= MAX_TRACKED_SEMAPHORES {
                log::error!(
                    "Too many in-flight semaphores, count [{}], force purging",
                    entries.len()
                );
                let fences: Vec<vk::Fence> = entries.iter().filter_map(|e| e.fence).collect();
                if !fences.is_empty() {
                    let _ = self.device.wait_for_fences(&fences, u64::MAX);
                }
                drained = entries.drain(..).collect();
            } else {
                let mut keep = Vec::with_capacity(entries.len());
                let mut done = Vec::new();
                for entry in entries.drain(..) {
                    let released = entry.renderer_refs == 0 && entry.engine_refs == 0;
                    let signaled = entry
                        .fence
                        .map(|f| self.device.fence_status(f).unwrap_or(false))
                        .unwrap_or(false);
                    if released || signaled {
                        done.push(entry);
                    } else {
                        keep.push(entry);
                    }
                }
                *entries = keep;
                drained = done;
            }
        }
        for entry in drained {
            self.destroy_entry(entry);
        }
    }

    /// Destroy every tracked semaphore immediately. Called on device loss,
    /// where no completion will ever arrive.
    pub fn destroy_all(&self) {
        self.drain_completions();
        let drained: Vec<TrackedSemaphore> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.drain(..).collect()
        };
        if !drained.is_empty() {
            log::error!(
                "Device lost, clearing all tracked semaphores, count [{}]",
                drained.len()
            );
        }
        for entry in drained {
            self.destroy_entry(entry);
        }
    }

    fn destroy_entry(&self, entry: TrackedSemaphore) {
        if let Some(fence) = entry.fence {
            self.device.destroy_fence(fence);
        }
        if entry.owned {
            self.device.destroy_semaphore(entry.semaphore);
        }
    }

    /// Number of entries currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn maybe_log_statistics(&self) {
        let flushes = self.flush_count.load(Ordering::Relaxed);
        if flushes > 0 && flushes % STATISTICS_LOG_INTERVAL == 0 {
            log::info!(
                "semaphore stats: flush count[{}], renderer deref count[{}], \
                 engine call count[{}], engine deref count[{}], \
                 defensive engine deref count[{}], pending count[{}]",
                flushes,
                self.renderer_deref_count.load(Ordering::Relaxed),
                self.engine_call_count.load(Ordering::Relaxed),
                self.engine_deref_count.load(Ordering::Relaxed),
                self.engine_defensive_deref_count.load(Ordering::Relaxed),
                self.tracked_count(),
            );
        }
    }
}

impl Drop for SemaphoreTracker {
    fn drop(&mut self) {
        self.drain_completions();
        let drained: Vec<TrackedSemaphore> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.drain(..).collect()
        };
        for entry in drained {
            self.destroy_entry(entry);
        }
    }
}
