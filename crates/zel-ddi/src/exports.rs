use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;
use zel_api::{ApiFamily, ApiId, ApiVersion, DriverType, ZeResult};

use crate::table::{DdiFn, DdiTable, DdiTableBuilder};

/// Name of the symbol a driver library exports to hand out its [`DriverExports`].
pub const DRIVER_ENTRY_SYMBOL: &str = "zel_driver_entry";

/// Signature of [`DRIVER_ENTRY_SYMBOL`].
pub type DriverEntryFn = fn() -> Arc<dyn DriverExports>;

/// Bit layout of driver-native handles issued under the DDI handle extension: bits 56..63 carry
/// the loader-assigned driver tag, bit 63 stays clear.
pub const HANDLE_TAG_SHIFT: u32 = 56;
pub const HANDLE_PAYLOAD_MASK: u64 = (1 << HANDLE_TAG_SHIFT) - 1;

/// Loader-assigned 7-bit identity of a driver whose native handles reach the application
/// unwrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriverTag(u8);

impl DriverTag {
    pub const MAX: u8 = 0x7f;

    /// Tag 0 is reserved so that untagged values never resolve to a driver.
    pub fn new(raw: u8) -> Option<Self> {
        (1..=Self::MAX).contains(&raw).then_some(Self(raw))
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    /// Stamps this tag onto a native handle value.
    pub fn apply(self, native: u64) -> u64 {
        (native & HANDLE_PAYLOAD_MASK) | (u64::from(self.0) << HANDLE_TAG_SHIFT)
    }

    /// Tag carried by a handle value, if it has the passthrough layout.
    pub fn of_handle(handle: u64) -> Option<Self> {
        if handle >> 63 != 0 {
            return None;
        }
        Self::new((handle >> HANDLE_TAG_SHIFT) as u8)
    }
}

/// Fixed-shape global export of drivers predating per-family tables.
#[derive(Clone, Default)]
pub struct LegacyGlobalTable {
    pub init: Option<DdiFn>,
    pub driver_get: Option<DdiFn>,
    pub driver_get_api_version: Option<DdiFn>,
    pub driver_get_properties: Option<DdiFn>,
    pub device_get: Option<DdiFn>,
}

/// Contract a driver satisfies to be loadable.
///
/// Drivers are consulted once per family and version while building their [`DdiTable`]; after
/// that only the table's entries are called.
pub trait DriverExports: Send + Sync {
    fn name(&self) -> &str;

    /// Declared category, used by type filtering and the ordering policy.
    fn driver_type(&self) -> DriverType;

    /// Highest API version the driver builds tables for.
    fn max_api_version(&self) -> ApiVersion;

    /// Fills `table` with the driver's entry points of `family` at `version`.
    ///
    /// Returns `None` when the driver does not export this family at all, and
    /// `Some(ErrorUnsupportedVersion)` when `version` exceeds what it supports.
    fn proc_addr_table(
        &self,
        family: ApiFamily,
        version: ApiVersion,
        table: &mut DdiTableBuilder,
    ) -> Option<ZeResult>;

    /// Fallback export consulted when the global or core family is missing.
    fn legacy_global_table(&self) -> Option<LegacyGlobalTable> {
        None
    }

    /// Offers the DDI handle extension. A driver returning `true` stamps `tag` onto every handle
    /// it issues and accepts those values back unchanged.
    fn enable_ddi_handles(&self, _tag: DriverTag) -> bool {
        false
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DdiError {
    #[error("driver `{driver}` does not support API version {requested} (max {max})")]
    UnsupportedVersion {
        driver: String,
        requested: ApiVersion,
        max: ApiVersion,
    },
    #[error("driver `{driver}` refused its {family} table: {result}")]
    Refused {
        driver: String,
        family: &'static str,
        result: ZeResult,
    },
    #[error("driver `{driver}` exports no {family} table and no legacy global table")]
    MissingTable {
        driver: String,
        family: &'static str,
    },
    #[error("legacy global table of driver `{driver}` lacks `{symbol}`")]
    LegacyIncomplete {
        driver: String,
        symbol: &'static str,
    },
}

impl DdiError {
    pub fn result(&self) -> ZeResult {
        match self {
            DdiError::UnsupportedVersion { .. } => ZeResult::ErrorUnsupportedVersion,
            DdiError::Refused { result, .. } => *result,
            DdiError::MissingTable { .. } | DdiError::LegacyIncomplete { .. } => {
                ZeResult::ErrorUninitialized
            }
        }
    }
}

impl From<DdiError> for ZeResult {
    fn from(err: DdiError) -> Self {
        err.result()
    }
}

enum Family {
    Loaded,
    Missing,
}

fn load_family(
    exports: &dyn DriverExports,
    family: ApiFamily,
    version: ApiVersion,
    table: &mut DdiTableBuilder,
) -> Result<Family, DdiError> {
    let mut scratch = DdiTableBuilder::new(version);
    match exports.proc_addr_table(family, version, &mut scratch) {
        None => Ok(Family::Missing),
        Some(ZeResult::Success) => {
            table.absorb(family, scratch);
            Ok(Family::Loaded)
        }
        Some(ZeResult::ErrorUnsupportedVersion) => Err(DdiError::UnsupportedVersion {
            driver: exports.name().to_string(),
            requested: version,
            max: exports.max_api_version(),
        }),
        Some(result) => Err(DdiError::Refused {
            driver: exports.name().to_string(),
            family: family.name(),
            result,
        }),
    }
}

fn build_legacy_table(
    exports: &dyn DriverExports,
    missing: ApiFamily,
) -> Result<DdiTable, DdiError> {
    let Some(legacy) = exports.legacy_global_table() else {
        return Err(DdiError::MissingTable {
            driver: exports.name().to_string(),
            family: missing.name(),
        });
    };
    let Some(init) = legacy.init else {
        return Err(DdiError::LegacyIncomplete {
            driver: exports.name().to_string(),
            symbol: ApiId::Init.symbol(),
        });
    };

    let mut table = DdiTableBuilder::new(ApiVersion::V1_0);
    table.insert(ApiId::Init, init);
    let optional = [
        (ApiId::DriverGet, legacy.driver_get),
        (ApiId::DriverGetApiVersion, legacy.driver_get_api_version),
        (ApiId::DriverGetProperties, legacy.driver_get_properties),
        (ApiId::DeviceGet, legacy.device_get),
    ];
    for (api, entry) in optional {
        if let Some(entry) = entry {
            table.insert(api, entry);
        }
    }
    debug!(driver = exports.name(), "built legacy global DDI table at 1.0");
    Ok(table.build())
}

/// Builds the table of `exports` at `version`.
///
/// The global and core families are required: a refusal is surfaced, a missing export falls back
/// to the driver's legacy global table (always built at 1.0). Runtime and sysman families that are
/// missing or refused simply leave their entries absent.
pub fn build_ddi_table(
    exports: &dyn DriverExports,
    version: ApiVersion,
) -> Result<DdiTable, DdiError> {
    let mut table = DdiTableBuilder::new(version);

    for family in [ApiFamily::Global, ApiFamily::Core] {
        if let Family::Missing = load_family(exports, family, version, &mut table)? {
            return build_legacy_table(exports, family);
        }
    }

    if version > exports.max_api_version() {
        return Err(DdiError::UnsupportedVersion {
            driver: exports.name().to_string(),
            requested: version,
            max: exports.max_api_version(),
        });
    }

    for family in [ApiFamily::Runtime, ApiFamily::Sysman] {
        match load_family(exports, family, version, &mut table) {
            Ok(Family::Loaded) => {}
            Ok(Family::Missing) => {
                debug!(driver = exports.name(), family = family.name(), "family not exported");
            }
            Err(err) => {
                debug!(driver = exports.name(), family = family.name(), %err, "family refused");
            }
        }
    }

    let table = table.build();
    debug!(
        driver = exports.name(),
        %version,
        entries = table.len(),
        "built DDI table"
    );
    Ok(table)
}

/// Tables of one driver, built at most once per requested version.
#[derive(Default)]
pub struct DdiTableCache {
    tables: Mutex<HashMap<ApiVersion, Result<Arc<DdiTable>, DdiError>>>,
}

impl DdiTableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        exports: &dyn DriverExports,
        version: ApiVersion,
    ) -> Result<Arc<DdiTable>, DdiError> {
        if let Some(built) = self.tables.lock().get(&version) {
            return built.clone();
        }
        // Driver code runs unlocked so it may call back into the loader. Racing builds keep
        // whichever result landed first.
        let built = build_ddi_table(exports, version).map(Arc::new);
        self.tables.lock().entry(version).or_insert(built).clone()
    }

    /// Table already built for `version`, if any.
    pub fn get(&self, version: ApiVersion) -> Option<Arc<DdiTable>> {
        self.tables.lock().get(&version)?.as_ref().ok().cloned()
    }

    /// Number of versions a build was attempted for.
    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_handles() {
        let tag = DriverTag::new(3).unwrap();
        let handle = tag.apply(0xff00_0000_0000_1234);
        assert_eq!(handle, 0x0300_0000_0000_1234);
        assert_eq!(DriverTag::of_handle(handle), Some(tag));
        assert_eq!(DriverTag::of_handle(0x1234), None);
        assert_eq!(DriverTag::of_handle(0x8300_0000_0000_0001), None);
        assert_eq!(DriverTag::new(0), None);
        assert_eq!(DriverTag::new(0x80), None);
    }

    #[test]
    fn ddi_error_maps_to_result_codes() {
        let err = DdiError::UnsupportedVersion {
            driver: "null".into(),
            requested: ApiVersion::V1_14,
            max: ApiVersion::V1_5,
        };
        assert_eq!(ZeResult::from(err.clone()), ZeResult::ErrorUnsupportedVersion);
        assert_eq!(
            err.to_string(),
            "driver `null` does not support API version 1.14 (max 1.5)"
        );
    }
}
