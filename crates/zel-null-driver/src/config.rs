use zel_api::{ApiId, ApiVersion, DriverType};

const DRIVER_TYPE_ENV: &str = "ZEL_TEST_NULL_DRIVER_TYPE";
const DISABLE_DDI_EXT_ENV: &str = "ZEL_TEST_NULL_DRIVER_DISABLE_DDI_EXT";
const DISABLE_ZER_API_ENV: &str = "ZEL_TEST_NULL_DRIVER_DISABLE_ZER_API";
const MISSING_API_ENV: &str = "ZEL_TEST_MISSING_API";

/// Behaviour switches of one null driver instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullDriverConfig {
    pub name: String,
    pub driver_type: DriverType,
    /// Distinguishes instances in handle values and in per-driver test switches.
    pub driver_id: u32,
    /// Refuse the DDI handle extension so the loader wraps every handle.
    pub disable_ddi_ext: bool,
    /// Do not export the runtime (`zer*`) family.
    pub disable_zer_api: bool,
    /// Entry points left out of the exported tables.
    pub missing_apis: Vec<ApiId>,
    /// Export only the fixed-shape legacy global table.
    pub legacy_only: bool,
    pub max_version: ApiVersion,
}

impl Default for NullDriverConfig {
    fn default() -> Self {
        Self {
            name: "null".to_string(),
            driver_type: DriverType::Gpu,
            driver_id: 0,
            disable_ddi_ext: false,
            disable_zer_api: false,
            missing_apis: Vec::new(),
            legacy_only: false,
            max_version: ApiVersion::CURRENT,
        }
    }
}

impl NullDriverConfig {
    pub fn new(driver_id: u32, driver_type: DriverType) -> Self {
        Self {
            name: format!("null{driver_id}"),
            driver_type,
            driver_id,
            ..Self::default()
        }
    }

    /// Reads the `ZEL_TEST_*` switches for the driver with index `driver_id`.
    pub fn from_env(driver_id: u32) -> Self {
        let driver_type = match std::env::var(DRIVER_TYPE_ENV) {
            Ok(raw) => parse_driver_type(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "unknown {DRIVER_TYPE_ENV}; using GPU");
                DriverType::Gpu
            }),
            Err(_) => DriverType::Gpu,
        };
        let disable_zer_api = std::env::var(DISABLE_ZER_API_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            == Some(driver_id);
        let missing_apis = std::env::var(MISSING_API_ENV)
            .map(|raw| parse_missing_apis(&raw, driver_id))
            .unwrap_or_default();

        Self {
            disable_ddi_ext: env_var_truthy(DISABLE_DDI_EXT_ENV),
            disable_zer_api,
            missing_apis,
            ..Self::new(driver_id, driver_type)
        }
    }
}

fn env_var_truthy(name: &str) -> bool {
    let Ok(raw) = std::env::var(name) else {
        return false;
    };

    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

fn parse_driver_type(raw: &str) -> Option<DriverType> {
    match raw.trim() {
        "GPU" => Some(DriverType::Gpu),
        "NPU" => Some(DriverType::Npu),
        "ALL" => Some(DriverType::Mixed),
        _ => None,
    }
}

/// Parses `API[:driverId]` entries. Entries without an id apply to every driver.
pub(crate) fn parse_missing_apis(raw: &str, driver_id: u32) -> Vec<ApiId> {
    let mut apis = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (symbol, target) = match entry.split_once(':') {
            Some((symbol, id)) => match id.trim().parse::<u32>() {
                Ok(id) => (symbol.trim(), Some(id)),
                Err(_) => continue,
            },
            None => (entry, None),
        };
        if target.is_some_and(|id| id != driver_id) {
            continue;
        }
        match ApiId::from_symbol(symbol) {
            Some(api) => apis.push(api),
            None => tracing::warn!(symbol, "unknown API in {MISSING_API_ENV}"),
        }
    }
    apis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_apis_honour_driver_ids() {
        let raw = "zeDeviceGet, zeContextCreate:1,zeEventCreate:0,bogus,zeMemFree:x";
        assert_eq!(
            parse_missing_apis(raw, 0),
            vec![ApiId::DeviceGet, ApiId::EventCreate]
        );
        assert_eq!(
            parse_missing_apis(raw, 1),
            vec![ApiId::DeviceGet, ApiId::ContextCreate]
        );
        assert!(parse_missing_apis("", 0).is_empty());
    }

    #[test]
    fn driver_type_names() {
        assert_eq!(parse_driver_type(" GPU "), Some(DriverType::Gpu));
        assert_eq!(parse_driver_type("NPU"), Some(DriverType::Npu));
        assert_eq!(parse_driver_type("ALL"), Some(DriverType::Mixed));
        assert_eq!(parse_driver_type("gpu"), None);
    }
}
