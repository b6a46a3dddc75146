use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use zel_api::{ApiId, ApiParams, ZeResult};

use crate::tracer::{CallbackStage, InstanceUserData, Tracer, TracerDesc};

thread_local! {
    static IN_TRACED_CALL: Cell<bool> = const { Cell::new(false) };
}

/// Tracer registry plus the global switch.
///
/// The switch is the OR of a static flag fixed at construction and a dynamic flag toggled at
/// runtime. The dynamic flag is a plain boolean: one disable undoes any number of enables.
pub struct TracingLayer {
    static_enabled: bool,
    dynamic_enabled: AtomicBool,
    next_id: AtomicU64,
    tracers: RwLock<Arc<[Arc<Tracer>]>>,
}

impl TracingLayer {
    pub fn new(static_enabled: bool) -> Self {
        Self {
            static_enabled,
            dynamic_enabled: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            tracers: RwLock::new(Arc::from(Vec::new())),
        }
    }

    pub fn is_static_enabled(&self) -> bool {
        self.static_enabled
    }

    pub fn enable_dynamic(&self) {
        self.dynamic_enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable_dynamic(&self) {
        self.dynamic_enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.static_enabled || self.dynamic_enabled.load(Ordering::SeqCst)
    }

    pub fn create_tracer(&self, desc: TracerDesc) -> Arc<Tracer> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tracer = Arc::new(Tracer::new(id, desc));
        let mut tracers = self.tracers.write();
        let mut next = tracers.to_vec();
        next.push(tracer.clone());
        *tracers = Arc::from(next);
        debug!(tracer = id, "tracer created");
        tracer
    }

    /// Disables and unregisters `tracer`. Calls that already sampled it still run its epilogues.
    pub fn destroy_tracer(&self, tracer: &Arc<Tracer>) -> ZeResult {
        tracer.set_enabled(false);
        let mut tracers = self.tracers.write();
        if !tracers.iter().any(|t| Arc::ptr_eq(t, tracer)) {
            return ZeResult::ErrorInvalidNullHandle;
        }
        let next: Vec<_> = tracers
            .iter()
            .filter(|t| !Arc::ptr_eq(t, tracer))
            .cloned()
            .collect();
        *tracers = Arc::from(next);
        debug!(tracer = tracer.id(), "tracer destroyed");
        ZeResult::Success
    }

    pub fn tracer_count(&self) -> usize {
        self.tracers.read().len()
    }

    /// Samples the enabled tracers for one call of `api`.
    ///
    /// Returns `None` when the switch is off, no tracer is enabled, or the calling thread is
    /// already inside a traced call (API calls made from callbacks are not traced).
    pub fn begin(&self, api: ApiId) -> Option<TraceCall> {
        if !self.is_enabled() || IN_TRACED_CALL.with(Cell::get) {
            return None;
        }
        let snapshot = self.tracers.read().clone();
        let active: Vec<_> = snapshot
            .iter()
            .filter(|tracer| tracer.is_enabled())
            .map(|tracer| ActiveTracer {
                tracer: tracer.clone(),
                instance: None,
            })
            .collect();
        if active.is_empty() {
            return None;
        }
        IN_TRACED_CALL.with(|flag| flag.set(true));
        Some(TraceCall {
            api,
            active,
            _not_send: PhantomData,
        })
    }
}

impl Default for TracingLayer {
    fn default() -> Self {
        Self::new(false)
    }
}

struct ActiveTracer {
    tracer: Arc<Tracer>,
    instance: InstanceUserData,
}

/// One traced call in progress on the current thread.
///
/// Holds the tracers sampled when the call began and each one's instance user data, threaded
/// from prologue to epilogue.
pub struct TraceCall {
    api: ApiId,
    active: Vec<ActiveTracer>,
    _not_send: PhantomData<*const ()>,
}

impl TraceCall {
    pub fn api(&self) -> ApiId {
        self.api
    }

    pub fn tracer_count(&self) -> usize {
        self.active.len()
    }

    pub fn prologues(&mut self, params: &mut ApiParams) {
        self.run(CallbackStage::Prologue, params, ZeResult::Success);
    }

    pub fn epilogues(&mut self, params: &mut ApiParams, result: ZeResult) {
        self.run(CallbackStage::Epilogue, params, result);
    }

    fn run(&mut self, stage: CallbackStage, params: &mut ApiParams, result: ZeResult) {
        for active in &mut self.active {
            // Looked up per call so a registration made mid-call is honoured.
            let Some(callback) = active.tracer.callback(self.api, stage) else {
                continue;
            };
            callback(params, result, active.tracer.user_data(), &mut active.instance);
        }
    }
}

impl Drop for TraceCall {
    fn drop(&mut self) {
        IN_TRACED_CALL.with(|flag| flag.set(false));
    }
}
