use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

use crate::error::RenderError;
use crate::render::{ElementKind, Renderer};

const DEFAULT_INACTIVITY_WINDOW: Duration = Duration::from_secs(60);

static GLOBAL_CACHE: Lazy<RendererCache> =
    Lazy::new(|| RendererCache::new(DEFAULT_INACTIVITY_WINDOW));

/// Initializes the process-wide renderer cache. Idempotent; must be called
/// before the first render.
pub fn initialize() {
    GLOBAL_CACHE.initialize();
}

/// Clears the process-wide cache and stops its eviction timer.
pub fn uninitialize() {
    GLOBAL_CACHE.uninitialize();
}

pub(crate) fn acquire(kind: ElementKind) -> Result<RendererLease, RenderError> {
    GLOBAL_CACHE.acquire(kind)
}

struct CacheState {
    initialized: bool,
    slots: HashMap<ElementKind, Slot>,
    last_access: Instant,
    evictor_running: bool,
    shutdown: bool,
}

/// A slot holds a ready instance; `None` means the instance is leased out.
struct Slot {
    renderer: Option<Renderer>,
}

struct CacheShared {
    state: Mutex<CacheState>,
    wake: Condvar,
    window: Duration,
}

/// Keyed pool of reusable renderer instances. A leased instance is marked
/// not-ready in its slot; concurrent acquisition of the same key gets a
/// fresh instance instead of blocking. A lazily started background timer
/// evicts ready instances after an inactivity window and stops once the
/// cache empties.
pub(crate) struct RendererCache {
    shared: Arc<CacheShared>,
}

impl RendererCache {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                state: Mutex::new(CacheState {
                    initialized: false,
                    slots: HashMap::new(),
                    last_access: Instant::now(),
                    evictor_running: false,
                    shutdown: false,
                }),
                wake: Condvar::new(),
                window,
            }),
        }
    }

    pub(crate) fn initialize(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.initialized = true;
        state.shutdown = false;
    }

    pub(crate) fn uninitialize(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.initialized = false;
        state.shutdown = true;
        state.slots.clear();
        self.shared.wake.notify_all();
    }

    pub(crate) fn acquire(&self, kind: ElementKind) -> Result<RendererLease, RenderError> {
        let mut state = self.shared.state.lock().unwrap();
        if !state.initialized {
            return Err(RenderError::CacheUninitialized);
        }
        state.last_access = Instant::now();
        let renderer = match state.slots.get_mut(&kind) {
            Some(slot) => slot.renderer.take(),
            None => None,
        };
        // A missing or leased slot both mean: construct fresh. The lease
        // return fills the slot either way.
        let renderer = renderer.unwrap_or_else(|| Renderer::new(kind));
        Ok(RendererLease {
            shared: Arc::clone(&self.shared),
            kind,
            renderer: Some(renderer),
        })
    }

    fn release(shared: &Arc<CacheShared>, kind: ElementKind, renderer: Renderer) {
        let mut state = shared.state.lock().unwrap();
        if !state.initialized {
            return;
        }
        state.last_access = Instant::now();
        match state.slots.get_mut(&kind) {
            Some(slot) => {
                // Another session may have returned a fresh instance first;
                // the extra one is simply dropped.
                if slot.renderer.is_none() {
                    slot.renderer = Some(renderer);
                }
            }
            None => {
                state.slots.insert(
                    kind,
                    Slot {
                        renderer: Some(renderer),
                    },
                );
            }
        }
        if !state.evictor_running {
            state.evictor_running = true;
            let shared = Arc::clone(shared);
            std::thread::spawn(move || run_evictor(shared));
        }
    }

    #[cfg(test)]
    fn ready_count(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state
            .slots
            .values()
            .filter(|slot| slot.renderer.is_some())
            .count()
    }
}

fn run_evictor(shared: Arc<CacheShared>) {
    let mut state = shared.state.lock().unwrap();
    loop {
        if state.shutdown || state.slots.is_empty() {
            state.evictor_running = false;
            return;
        }
        let (next, _timeout) = shared.wake.wait_timeout(state, shared.window).unwrap();
        state = next;
        if state.shutdown {
            state.evictor_running = false;
            return;
        }
        if state.last_access.elapsed() >= shared.window {
            // Dispose only ready instances; leased slots stay so the lease
            // can still return.
            state.slots.retain(|_, slot| slot.renderer.is_none());
            if state.slots.is_empty() {
                state.evictor_running = false;
                return;
            }
        }
    }
}

/// Scoped checkout of a renderer instance. Dropping the lease returns the
/// instance to the cache and marks it ready, including on early exits.
pub(crate) struct RendererLease {
    shared: Arc<CacheShared>,
    kind: ElementKind,
    renderer: Option<Renderer>,
}

impl RendererLease {
    pub(crate) fn renderer_mut(&mut self) -> &mut Renderer {
        self.renderer.as_mut().expect("lease already returned")
    }
}

impl std::fmt::Debug for RendererLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererLease")
            .field("kind", &self.kind)
            .field("returned", &self.renderer.is_none())
            .finish()
    }
}

impl Drop for RendererLease {
    fn drop(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            RendererCache::release(&self.shared, self.kind, renderer);
        }
    }
}
