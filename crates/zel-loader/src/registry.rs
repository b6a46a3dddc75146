//! Ordered set of drivers the loader dispatches to.

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use zel_api::{ApiId, ApiVersion, DriverType, ZeResult};
use zel_ddi::{DdiError, DdiFn, DdiTable, DdiTableCache, DriverExports, DriverTag};

use crate::ordering::{apply_order, parse_order};

/// The three ways an application can bring a driver up. Each driver's own init entry runs at
/// most once per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitKind {
    /// `zeInit`.
    Legacy,
    /// `zeInitDrivers`.
    Drivers,
    /// `zesInit`.
    Sysman,
}

impl InitKind {
    const COUNT: usize = 3;

    fn slot(self) -> usize {
        match self {
            InitKind::Legacy => 0,
            InitKind::Drivers => 1,
            InitKind::Sysman => 2,
        }
    }
}

pub struct DriverRecord {
    index: usize,
    exports: Arc<dyn DriverExports>,
    tag: Option<DriverTag>,
    passthrough: OnceLock<bool>,
    tables: DdiTableCache,
    table: OnceLock<Arc<DdiTable>>,
    /// Successful init results. Failures are not kept, so a later init of the same kind
    /// retries the driver.
    init: [OnceLock<ZeResult>; InitKind::COUNT],
    init_attempt: Mutex<()>,
}

impl DriverRecord {
    fn new(index: usize, exports: Arc<dyn DriverExports>) -> Self {
        let tag = u8::try_from(index + 1).ok().and_then(DriverTag::new);
        Self {
            index,
            exports,
            tag,
            passthrough: OnceLock::new(),
            tables: DdiTableCache::new(),
            table: OnceLock::new(),
            init: Default::default(),
            init_attempt: Mutex::new(()),
        }
    }

    /// Position in the ordered registry.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        self.exports.name()
    }

    pub fn driver_type(&self) -> DriverType {
        self.exports.driver_type()
    }

    pub fn tag(&self) -> Option<DriverTag> {
        self.tag
    }

    /// Whether the driver's native handles reach the application unwrapped.
    pub fn is_passthrough(&self) -> bool {
        self.passthrough.get().copied().unwrap_or(false)
    }

    /// Table dispatch uses, once one was loaded.
    pub fn table(&self) -> Option<&Arc<DdiTable>> {
        self.table.get()
    }

    pub fn entry(&self, api: ApiId) -> Option<DdiFn> {
        self.table.get()?.get(api).cloned()
    }

    /// Negotiates the handle extension, then builds (or fetches) the table at `version`.
    ///
    /// The first successfully loaded table becomes the dispatch table; later loads at other
    /// versions only populate the cache.
    pub fn load(&self, version: ApiVersion, intercept: bool) -> Result<Arc<DdiTable>, DdiError> {
        self.passthrough.get_or_init(|| {
            let Some(tag) = self.tag.filter(|_| !intercept) else {
                return false;
            };
            self.exports.enable_ddi_handles(tag)
        });
        let table = self.tables.get_or_build(self.exports.as_ref(), version)?;
        Ok(self.table.get_or_init(|| table.clone()).clone())
    }

    /// Runs `init` unless an init of this kind already succeeded, in which case that success is
    /// returned without calling the driver again. Attempts are serialized per driver.
    pub fn init_once(&self, kind: InitKind, init: impl FnOnce(&DriverRecord) -> ZeResult) -> ZeResult {
        let slot = &self.init[kind.slot()];
        if let Some(result) = slot.get() {
            return *result;
        }
        let _attempt = self.init_attempt.lock();
        if let Some(result) = slot.get() {
            return *result;
        }
        let result = init(self);
        if result.is_success() {
            let _ = slot.set(result);
        }
        result
    }

    pub fn init_result(&self, kind: InitKind) -> Option<ZeResult> {
        self.init[kind.slot()].get().copied()
    }

    /// Whether an init of `kind` brought this driver up.
    pub fn is_ready(&self, kind: InitKind) -> bool {
        self.init_result(kind).is_some_and(ZeResult::is_success)
    }
}

impl fmt::Debug for DriverRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRecord")
            .field("index", &self.index)
            .field("name", &self.name())
            .field("type", &self.driver_type())
            .field("tag", &self.tag)
            .field("passthrough", &self.passthrough.get())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    drivers: Vec<Arc<DriverRecord>>,
}

impl Registry {
    /// Orders `drivers` per the ordering string and assigns each its tag.
    pub fn new(drivers: Vec<Arc<dyn DriverExports>>, order: Option<&str>) -> Self {
        let types: Vec<_> = drivers.iter().map(|d| d.driver_type()).collect();
        let specs = order.map(parse_order).unwrap_or_default();
        let permutation = apply_order(&types, &specs);

        let mut slots: Vec<_> = drivers.into_iter().map(Some).collect();
        let drivers = permutation
            .into_iter()
            .filter_map(|original| slots[original].take())
            .enumerate()
            .map(|(index, exports)| Arc::new(DriverRecord::new(index, exports)))
            .collect();
        Self { drivers }
    }

    pub fn drivers(&self) -> &[Arc<DriverRecord>] {
        &self.drivers
    }

    pub fn get(&self, index: usize) -> Option<&Arc<DriverRecord>> {
        self.drivers.get(index)
    }

    /// Passthrough driver whose handles carry `tag`.
    pub fn by_tag(&self, tag: DriverTag) -> Option<&Arc<DriverRecord>> {
        let record = self.drivers.get(usize::from(tag.raw()) - 1)?;
        record.is_passthrough().then_some(record)
    }

    /// First driver brought up by `zeInit` or `zeInitDrivers`.
    pub fn default_driver(&self) -> Option<&Arc<DriverRecord>> {
        self.drivers
            .iter()
            .find(|d| d.is_ready(InitKind::Legacy) || d.is_ready(InitKind::Drivers))
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
