use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use zel_api::{ApiId, ApiParams, ZeResult};

/// Opaque value supplied at tracer creation and handed back verbatim to every callback.
pub type TracerUserData = Option<Arc<dyn Any + Send + Sync>>;

/// Per-tracer, per-call slot a prologue may fill for the matching epilogue.
pub type InstanceUserData = Option<Box<dyn Any + Send>>;

/// Prologue/epilogue callback. Prologues receive `ZeResult::Success` as the result.
pub type TracerCallback =
    Arc<dyn Fn(&mut ApiParams, ZeResult, &TracerUserData, &mut InstanceUserData) + Send + Sync>;

/// Wraps a closure as a [`TracerCallback`].
pub fn callback<F>(f: F) -> TracerCallback
where
    F: Fn(&mut ApiParams, ZeResult, &TracerUserData, &mut InstanceUserData) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackStage {
    Prologue,
    Epilogue,
}

/// One callback slot per API.
#[derive(Clone)]
pub struct CallbackTable {
    slots: Vec<Option<TracerCallback>>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; ApiId::COUNT],
        }
    }

    pub fn set(&mut self, api: ApiId, callback: Option<TracerCallback>) -> &mut Self {
        self.slots[api.index()] = callback;
        self
    }

    pub fn get(&self, api: ApiId) -> Option<&TracerCallback> {
        self.slots[api.index()].as_ref()
    }

    pub fn registered(&self) -> impl Iterator<Item = ApiId> + '_ {
        ApiId::ALL
            .iter()
            .copied()
            .filter(|api| self.slots[api.index()].is_some())
    }
}

impl Default for CallbackTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.registered().map(ApiId::symbol))
            .finish()
    }
}

#[derive(Default)]
pub struct TracerDesc {
    pub user_data: TracerUserData,
}

/// A registered tracer. Starts disabled with every slot empty.
pub struct Tracer {
    id: u64,
    user_data: TracerUserData,
    enabled: AtomicBool,
    prologues: RwLock<CallbackTable>,
    epilogues: RwLock<CallbackTable>,
}

impl Tracer {
    pub(crate) fn new(id: u64, desc: TracerDesc) -> Self {
        Self {
            id,
            user_data: desc.user_data,
            enabled: AtomicBool::new(false),
            prologues: RwLock::new(CallbackTable::new()),
            epilogues: RwLock::new(CallbackTable::new()),
        }
    }

    /// Creation sequence number, unique within one tracing layer.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user_data(&self) -> &TracerUserData {
        &self.user_data
    }

    /// Overwrites one slot. `None` clears it. Takes effect for calls that reach the slot
    /// afterwards, including calls already in flight.
    pub fn register_callback(
        &self,
        api: ApiId,
        stage: CallbackStage,
        callback: Option<TracerCallback>,
    ) {
        self.table(stage).write().set(api, callback);
    }

    pub fn set_prologues(&self, table: CallbackTable) {
        *self.prologues.write() = table;
    }

    pub fn set_epilogues(&self, table: CallbackTable) {
        *self.epilogues.write() = table;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn callback(&self, api: ApiId, stage: CallbackStage) -> Option<TracerCallback> {
        self.table(stage).read().get(api).cloned()
    }

    fn table(&self, stage: CallbackStage) -> &RwLock<CallbackTable> {
        match stage {
            CallbackStage::Prologue => &self.prologues,
            CallbackStage::Epilogue => &self.epilogues,
        }
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("id", &self.id)
            .field("enabled", &self.is_enabled())
            .field("prologues", &*self.prologues.read())
            .field("epilogues", &*self.epilogues.read())
            .finish()
    }
}
