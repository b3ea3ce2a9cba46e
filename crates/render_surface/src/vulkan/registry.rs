//! Process-wide context registry
//!
//! Single access point for Vulkan device contexts and per-thread GPU drawing
//! contexts. The registry is constructed once by the render-engine bootstrap
//! and shared by reference; callers select a device variant with an explicit
//! [`RenderContextSelector`] instead of hidden per-thread state.
//!
//! In recyclable mode the whole context family may be torn down while
//! provably unused (every cached drawing context marked recyclable) and is
//! lazily rebuilt on the next access.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, ThreadId};

use crate::config::RenderSurfaceConfig;
use crate::drawing::{DrawingContextFactory, GpuContext};
use crate::vulkan::device::DeviceContext;
use crate::vulkan::driver::VulkanDriver;
use crate::vulkan::InterfaceKind;

/// Which device variant and protection class a caller renders with.
///
/// Owned by the caller and threaded through registry calls explicitly; two
/// callers on the same thread may use different selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContextSelector {
    /// Device context variant
    pub kind: InterfaceKind,
    /// Whether drawing contexts come from the protected class
    pub protected: bool,
}

impl RenderContextSelector {
    /// The always-on rendering device, unprotected.
    pub fn basic() -> Self {
        Self {
            kind: InterfaceKind::BasicRender,
            protected: false,
        }
    }

    /// Protected redraw variant for DRM content.
    pub fn protected_redraw() -> Self {
        Self {
            kind: InterfaceKind::ProtectedRedraw,
            protected: true,
        }
    }

    /// Unprotected redraw variant.
    pub fn unprotected_redraw() -> Self {
        Self {
            kind: InterfaceKind::UnprotectedRedraw,
            protected: false,
        }
    }
}

type ContextEntry = (Arc<dyn GpuContext>, bool);

#[derive(Default)]
struct MapsInner {
    unprotected: HashMap<ThreadId, ContextEntry>,
    protected: HashMap<ThreadId, ContextEntry>,
}

struct ContextMaps {
    inner: Mutex<MapsInner>,
}

impl ContextMaps {
    fn new() -> Self {
        Self {
            inner: Mutex::new(MapsInner::default()),
        }
    }

    fn lookup(&self, tid: ThreadId, protected: bool) -> Option<Arc<dyn GpuContext>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let map = if protected {
            &inner.protected
        } else {
            &inner.unprotected
        };
        map.get(&tid).map(|(context, _)| context.clone())
    }

    fn insert(&self, tid: ThreadId, protected: bool, context: Arc<dyn GpuContext>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let map = if protected {
            &mut inner.protected
        } else {
            &mut inner.unprotected
        };
        map.insert(tid, (context, false));
    }

    fn mark_recyclable(&self, tid: ThreadId, protected: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let map = if protected {
            &mut inner.protected
        } else {
            &mut inner.unprotected
        };
        if let Some(entry) = map.get_mut(&tid) {
            entry.1 = true;
        }
    }

    fn remove_thread(&self, tid: ThreadId) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.unprotected.remove(&tid);
        inner.protected.remove(&tid);
    }
}

/// Unregisters a thread's cached drawing contexts when the thread exits.
struct ThreadContextGuard {
    maps: Weak<ContextMaps>,
    tid: ThreadId,
}

impl Drop for ThreadContextGuard {
    fn drop(&mut self) {
        if let Some(maps) = self.maps.upgrade() {
            maps.remove_thread(self.tid);
        }
    }
}

thread_local! {
    static THREAD_GUARDS: RefCell<Vec<ThreadContextGuard>> = RefCell::new(Vec::new());
}

fn install_thread_guard(maps: &Arc<ContextMaps>, tid: ThreadId) {
    THREAD_GUARDS.with(|guards| {
        let mut guards = guards.borrow_mut();
        let installed = guards
            .iter()
            .any(|guard| Weak::ptr_eq(&guard.maps, &Arc::downgrade(maps)));
        if !installed {
            guards.push(ThreadContextGuard {
                maps: Arc::downgrade(maps),
                tid,
            });
        }
    });
}

#[derive(Default)]
struct RegistryCore {
    interfaces: [Option<Arc<DeviceContext>>; 3],
}

/// Registry of device contexts and per-thread GPU drawing contexts.
pub struct ContextRegistry {
    driver: Arc<dyn VulkanDriver>,
    factory: Arc<dyn DrawingContextFactory>,
    config: RenderSurfaceConfig,
    core: Mutex<Option<RegistryCore>>,
    maps: Arc<ContextMaps>,
    is_inited: AtomicBool,
    is_recyclable_valid: AtomicBool,
}

impl ContextRegistry {
    /// Build the registry and bring up its device contexts.
    ///
    /// In recyclable mode only the basic render device is created; otherwise
    /// the redraw variants come up eagerly alongside it.
    pub fn new(
        driver: Arc<dyn VulkanDriver>,
        factory: Arc<dyn DrawingContextFactory>,
        config: RenderSurfaceConfig,
    ) -> Arc<Self> {
        let registry = Arc::new(Self {
            driver,
            factory,
            config,
            core: Mutex::new(None),
            maps: Arc::new(ContextMaps::new()),
            is_inited: AtomicBool::new(false),
            is_recyclable_valid: AtomicBool::new(false),
        });
        registry.ensure_core();
        registry
    }

    fn slot(kind: InterfaceKind) -> usize {
        match kind {
            InterfaceKind::BasicRender => 0,
            InterfaceKind::ProtectedRedraw => 1,
            InterfaceKind::UnprotectedRedraw => 2,
        }
    }

    fn ensure_core(&self) {
        let mut core = self.core.lock().unwrap_or_else(PoisonError::into_inner);
        if core.is_some() {
            return;
        }
        let built = if self.config.recyclable_context {
            self.init_recyclable_core()
        } else {
            self.init_persistent_core()
        };
        *core = Some(built);
        self.is_inited.store(true, Ordering::SeqCst);
        self.is_recyclable_valid.store(true, Ordering::SeqCst);
    }

    fn init_recyclable_core(&self) -> RegistryCore {
        let basic = Arc::new(DeviceContext::new(
            self.driver.clone(),
            InterfaceKind::BasicRender,
        ));
        let _ = basic.init(false, false);
        if let Some(context) =
            basic.create_drawing_context(self.factory.as_ref(), self.config.cache_dir.as_deref())
        {
            self.save_context(thread::current().id(), false, context);
        }

        let mut core = RegistryCore::default();
        core.interfaces[Self::slot(InterfaceKind::BasicRender)] = Some(basic);
        core
    }

    fn init_persistent_core(&self) -> RegistryCore {
        let mut core = RegistryCore::default();

        let basic = Arc::new(DeviceContext::new(
            self.driver.clone(),
            InterfaceKind::BasicRender,
        ));
        let _ = basic.init(false, true);
        if let Some(context) =
            basic.create_drawing_context(self.factory.as_ref(), self.config.cache_dir.as_deref())
        {
            self.save_context(thread::current().id(), false, context);
        }
        core.interfaces[Self::slot(InterfaceKind::BasicRender)] = Some(basic);

        let unprotected = Arc::new(DeviceContext::new(
            self.driver.clone(),
            InterfaceKind::UnprotectedRedraw,
        ));
        let _ = unprotected.init(false, false);
        core.interfaces[Self::slot(InterfaceKind::UnprotectedRedraw)] = Some(unprotected);

        if self.config.enable_protected_redraw {
            let protected = Arc::new(DeviceContext::new(
                self.driver.clone(),
                InterfaceKind::ProtectedRedraw,
            ));
            let _ = protected.init(true, false);
            if let Some(context) = protected
                .create_drawing_context(self.factory.as_ref(), self.config.cache_dir.as_deref())
            {
                self.save_context(thread::current().id(), true, context);
            }
            core.interfaces[Self::slot(InterfaceKind::ProtectedRedraw)] = Some(protected);
        }
        core
    }

    /// Device context for a selector.
    ///
    /// A released recyclable registry is rebuilt here; a selector naming a
    /// variant that was never created falls back to basic render.
    pub fn interface(&self, selector: RenderContextSelector) -> Option<Arc<DeviceContext>> {
        self.ensure_core();
        let core = self.core.lock().unwrap_or_else(PoisonError::into_inner);
        let core = core.as_ref()?;
        match &core.interfaces[Self::slot(selector.kind)] {
            Some(context) => Some(context.clone()),
            None => {
                log::warn!(
                    "no device context for {:?}, falling back to basic render",
                    selector.kind
                );
                core.interfaces[Self::slot(InterfaceKind::BasicRender)].clone()
            }
        }
    }

    /// GPU drawing context for the calling thread, created on first use.
    ///
    /// At most one context exists per thread id per protection class; all
    /// callers on the same thread share it.
    pub fn drawing_context(&self, selector: RenderContextSelector) -> Option<Arc<dyn GpuContext>> {
        let tid = thread::current().id();
        if let Some(context) = self.maps.lookup(tid, selector.protected) {
            return Some(context);
        }
        let interface = self.interface(selector)?;
        let context =
            interface.create_drawing_context(self.factory.as_ref(), self.config.cache_dir.as_deref())?;
        self.save_context(tid, selector.protected, context.clone());
        Some(context)
    }

    /// Like [`drawing_context`](Self::drawing_context), but redraw selectors
    /// key the cache on the interface kind rather than the protection flag.
    pub fn create_drawing_context(
        &self,
        selector: RenderContextSelector,
    ) -> Option<Arc<dyn GpuContext>> {
        let protected_class = selector.kind == InterfaceKind::ProtectedRedraw;
        let tid = thread::current().id();
        if let Some(context) = self.maps.lookup(tid, protected_class) {
            return Some(context);
        }
        let interface = self.interface(selector)?;
        let context =
            interface.create_drawing_context(self.factory.as_ref(), self.config.cache_dir.as_deref())?;
        self.save_context(tid, protected_class, context.clone());
        Some(context)
    }

    /// Drawing context for callers that tolerate context loss between frames.
    ///
    /// Marks the cached entry recyclable, making it eligible for
    /// [`release_recyclable`](Self::release_recyclable).
    pub fn recyclable_drawing_context(
        &self,
        selector: RenderContextSelector,
    ) -> Option<Arc<dyn GpuContext>> {
        let context = self.drawing_context(selector)?;
        self.maps
            .mark_recyclable(thread::current().id(), selector.protected);
        Some(context)
    }

    fn save_context(&self, tid: ThreadId, protected: bool, context: Arc<dyn GpuContext>) {
        self.maps.insert(tid, protected, context);
        install_thread_guard(&self.maps, tid);
    }

    fn all_contexts_recyclable(&self) -> bool {
        let inner = self
            .maps
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        inner.unprotected.values().all(|(_, recyclable)| *recyclable)
            && inner.protected.values().all(|(_, recyclable)| *recyclable)
    }

    /// Tear the registry down if it is provably unused.
    ///
    /// Proceeds only when every cached drawing context is marked recyclable;
    /// otherwise only the recyclable subset is pruned and in-flight
    /// non-recyclable work stays valid.
    pub fn release_recyclable(&self) {
        if !self.config.recyclable_context {
            return;
        }
        if !self.all_contexts_recyclable() {
            self.release_recyclable_drawing_contexts();
            return;
        }
        self.release_drawing_context_maps();
        *self.core.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.is_recyclable_valid.store(false, Ordering::SeqCst);
    }

    /// Drop only the cached drawing contexts that are marked recyclable.
    pub fn release_recyclable_drawing_contexts(&self) {
        let mut inner = self
            .maps
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        inner.unprotected.retain(|_, (_, recyclable)| !*recyclable);
        inner.protected.retain(|_, (_, recyclable)| !*recyclable);
    }

    /// Flush and drop every cached drawing context.
    pub fn release_drawing_context_maps(&self) {
        let drained: Vec<Arc<dyn GpuContext>> = {
            let mut guard = self
                .maps
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let MapsInner {
                unprotected,
                protected,
            } = &mut *guard;
            unprotected
                .drain()
                .chain(protected.drain())
                .map(|(_, (context, _))| context)
                .collect()
        };
        for context in drained {
            context.flush_and_submit(true);
        }
    }

    /// Drop the cached drawing contexts of one thread.
    pub fn release_for_thread(&self, tid: ThreadId) {
        self.maps.remove_thread(tid);
    }

    /// Switch a caller between the protected and unprotected redraw variants.
    ///
    /// On an actual transition the outgoing context generation is purged and
    /// the incoming one reset, so protected and unprotected allocations never
    /// mix in one context generation.
    pub fn set_protected(&self, selector: &mut RenderContextSelector, protected: bool) {
        selector.kind = if protected {
            InterfaceKind::ProtectedRedraw
        } else {
            InterfaceKind::UnprotectedRedraw
        };
        if selector.protected == protected {
            return;
        }
        log::warn!("render context switch, protected: {}", protected);

        let outgoing = RenderContextSelector {
            kind: selector.kind,
            protected: selector.protected,
        };
        if let Some(context) = self.drawing_context(outgoing) {
            context.purge_unlocked_resources(true);
        }
        selector.protected = protected;
        if let Some(context) = self.drawing_context(*selector) {
            context.reset_context();
        }
    }

    /// Whether the process has created a device context at least once.
    pub fn is_inited(&self) -> bool {
        self.is_inited.load(Ordering::SeqCst)
    }

    /// Whether the recyclable core is currently alive.
    pub fn is_recyclable_valid(&self) -> bool {
        self.is_recyclable_valid.load(Ordering::SeqCst)
    }

    /// Whether the registry runs in recyclable mode.
    pub fn is_recyclable(&self) -> bool {
        self.config.recyclable_context
    }

    #[cfg(test)]
    pub(crate) fn cached_context_counts(&self) -> (usize, usize) {
        let inner = self
            .maps
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        (inner.unprotected.len(), inner.protected.len())
    }
}

impl Drop for ContextRegistry {
    fn drop(&mut self) {
        self.release_drawing_context_maps();
        self.is_recyclable_valid.store(false, Ordering::SeqCst);
    }
}
