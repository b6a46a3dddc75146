use std::fmt;
use std::sync::Arc;

use zel_api::{ApiCall, ApiFamily, ApiId, ApiParams, ApiVersion, ZeResult};

/// One driver entry point.
pub type DdiFn = Arc<dyn Fn(&mut ApiParams) -> ZeResult + Send + Sync>;

/// Adapts a typed entry point to the untyped [`DdiFn`] shape.
///
/// Called with a parameter variant of another API, the adapter reports `ErrorInvalidArgument`
/// rather than reaching the driver.
pub fn typed_entry<P, F>(entry: F) -> DdiFn
where
    P: ApiCall,
    F: Fn(&mut P) -> ZeResult + Send + Sync + 'static,
{
    Arc::new(move |params: &mut ApiParams| match P::from_params_mut(params) {
        Some(params) => entry(params),
        None => ZeResult::ErrorInvalidArgument,
    })
}

/// Immutable per-driver, per-version entry point table.
#[derive(Clone)]
pub struct DdiTable {
    version: ApiVersion,
    entries: Vec<Option<DdiFn>>,
}

impl DdiTable {
    pub fn version(&self) -> ApiVersion {
        self.version
    }

    pub fn get(&self, api: ApiId) -> Option<&DdiFn> {
        self.entries.get(api.index()).and_then(Option::as_ref)
    }

    pub fn get_by_symbol(&self, symbol: &str) -> Option<&DdiFn> {
        self.get(ApiId::from_symbol(symbol)?)
    }

    pub fn contains(&self, api: ApiId) -> bool {
        self.get(api).is_some()
    }

    /// Exported entry points, in [`ApiId`] order.
    pub fn apis(&self) -> impl Iterator<Item = ApiId> + '_ {
        ApiId::ALL.iter().copied().filter(|api| self.contains(*api))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DdiTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DdiTable")
            .field("version", &self.version)
            .field("apis", &self.apis().map(ApiId::symbol).collect::<Vec<_>>())
            .finish()
    }
}

/// Sink a driver fills when asked for one family's table.
pub struct DdiTableBuilder {
    version: ApiVersion,
    entries: Vec<Option<DdiFn>>,
}

impl DdiTableBuilder {
    pub fn new(version: ApiVersion) -> Self {
        Self {
            version,
            entries: vec![None; ApiId::COUNT],
        }
    }

    /// Version the table is being built for.
    pub fn version(&self) -> ApiVersion {
        self.version
    }

    pub fn insert(&mut self, api: ApiId, entry: DdiFn) -> &mut Self {
        self.entries[api.index()] = Some(entry);
        self
    }

    pub fn insert_typed<P, F>(&mut self, entry: F) -> &mut Self
    where
        P: ApiCall,
        F: Fn(&mut P) -> ZeResult + Send + Sync + 'static,
    {
        self.insert(P::API, typed_entry(entry))
    }

    pub fn remove(&mut self, api: ApiId) -> Option<DdiFn> {
        self.entries[api.index()].take()
    }

    pub fn contains(&self, api: ApiId) -> bool {
        self.entries[api.index()].is_some()
    }

    /// Moves entries of `family` from `other` into `self`. Entries a driver put into a table of
    /// another family are dropped.
    pub(crate) fn absorb(&mut self, family: ApiFamily, other: DdiTableBuilder) {
        for (api, entry) in ApiId::ALL.iter().zip(other.entries) {
            if api.family() == family {
                if let Some(entry) = entry {
                    self.entries[api.index()] = Some(entry);
                }
            }
        }
    }

    pub fn build(self) -> DdiTable {
        DdiTable {
            version: self.version,
            entries: self.entries,
        }
    }
}

impl fmt::Debug for DdiTableBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DdiTableBuilder")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
