use std::path::PathBuf;

use thiserror::Error;
use zel_api::{ApiVersion, ZeResult};
use zel_validation::ValidationConfig;

pub const DRIVERS_ORDER_ENV: &str = "ZEL_DRIVERS_ORDER";
pub const LIBRARY_PATH_ENV: &str = "ZEL_LIBRARY_PATH";
pub const ENABLE_NULL_DRIVER_ENV: &str = "ZE_ENABLE_NULL_DRIVER";
pub const ENABLE_LOADER_INTERCEPT_ENV: &str = "ZE_ENABLE_LOADER_INTERCEPT";
pub const ENABLE_TRACING_LAYER_ENV: &str = "ZE_ENABLE_TRACING_LAYER";
pub const ENABLE_VALIDATION_LAYER_ENV: &str = "ZE_ENABLE_VALIDATION_LAYER";
pub const ENABLE_PARAMETER_VALIDATION_ENV: &str = "ZE_ENABLE_PARAMETER_VALIDATION";
pub const ENABLE_EVENTS_CHECKER_ENV: &str = "ZEL_ENABLE_EVENTS_CHECKER";
pub const LOADER_DEBUG_TRACE_ENV: &str = "ZE_ENABLE_LOADER_DEBUG_TRACE";
pub const API_VERSION_ENV: &str = "ZEL_API_VERSION";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for env var {var}")]
    InvalidEnv { var: &'static str, value: String },
}

impl From<ConfigError> for ZeResult {
    fn from(_: ConfigError) -> Self {
        ZeResult::ErrorInvalidArgument
    }
}

/// Loader settings. Everything the loader reads from the environment lands here once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Raw ordering string; never an error, unknown tokens are skipped.
    pub drivers_order: Option<String>,
    /// Extra directories searched for driver libraries.
    pub library_paths: Vec<PathBuf>,
    pub enable_null_driver: bool,
    /// Wrap every handle even for drivers that accept the DDI handle extension.
    pub intercept: bool,
    /// Static tracing switch.
    pub tracing: bool,
    pub validation: ValidationConfig,
    /// Log discovery, ordering and init decisions at `info` instead of `debug`.
    pub debug_trace: bool,
    pub api_version: ApiVersion,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            drivers_order: None,
            library_paths: Vec::new(),
            enable_null_driver: false,
            intercept: false,
            tracing: false,
            validation: ValidationConfig::default(),
            debug_trace: false,
            api_version: ApiVersion::CURRENT,
        }
    }
}

impl LoaderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let drivers_order = std::env::var(DRIVERS_ORDER_ENV).ok();
        let library_paths = std::env::var_os(LIBRARY_PATH_ENV)
            .map(|raw| std::env::split_paths(&raw).collect())
            .unwrap_or_default();
        let api_version = match std::env::var(API_VERSION_ENV) {
            Ok(raw) => ApiVersion::parse(raw.trim()).ok_or(ConfigError::InvalidEnv {
                var: API_VERSION_ENV,
                value: raw,
            })?,
            Err(_) => ApiVersion::CURRENT,
        };
        let parameter_checks = std::env::var(ENABLE_PARAMETER_VALIDATION_ENV)
            .map(|_| env_var_truthy(ENABLE_PARAMETER_VALIDATION_ENV))
            .unwrap_or(true);

        Ok(Self {
            drivers_order,
            library_paths,
            enable_null_driver: env_var_truthy(ENABLE_NULL_DRIVER_ENV),
            intercept: env_var_truthy(ENABLE_LOADER_INTERCEPT_ENV),
            tracing: env_var_truthy(ENABLE_TRACING_LAYER_ENV),
            validation: ValidationConfig {
                enabled: env_var_truthy(ENABLE_VALIDATION_LAYER_ENV),
                parameter_checks,
                events_checker: env_var_truthy(ENABLE_EVENTS_CHECKER_ENV),
            },
            debug_trace: env_var_truthy(LOADER_DEBUG_TRACE_ENV),
            api_version,
        })
    }

    /// Like [`LoaderConfig::from_env`], logging and ignoring invalid values.
    pub fn from_env_or_default() -> Self {
        match Self::from_env() {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(%err, "ignoring loader environment");
                Self::default()
            }
        }
    }
}

pub fn env_var_truthy(name: &str) -> bool {
    let Ok(raw) = std::env::var(name) else {
        return false;
    };

    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_every_layer_off() {
        let config = LoaderConfig::default();
        assert!(!config.tracing);
        assert!(!config.validation.enabled);
        assert!(config.validation.parameter_checks);
        assert!(!config.validation.events_checker);
        assert_eq!(config.api_version, ApiVersion::CURRENT);
    }

    #[test]
    fn config_errors_name_the_variable() {
        let err = ConfigError::InvalidEnv {
            var: API_VERSION_ENV,
            value: "one.two".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value \"one.two\" for env var ZEL_API_VERSION"
        );
        assert_eq!(ZeResult::from(err), ZeResult::ErrorInvalidArgument);
    }
}
