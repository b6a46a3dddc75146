//! Validation layer.
//!
//! Stateless parameter checks reject malformed calls before they reach a driver. The optional
//! event checker follows event signal/wait dependencies across calls and reports possible
//! deadlocks; its findings go to a [`DiagnosticSink`] and never change a call's result.

#![forbid(unsafe_code)]

mod checks;
mod diagnostics;
mod events;

use std::sync::Arc;

use zel_api::{ApiParams, ZeResult};

pub use checks::check_parameters;
pub use diagnostics::{Diagnostic, DiagnosticSink, RecordingSink, TracingSink};
pub use events::EventChecker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationConfig {
    pub enabled: bool,
    /// Stateless checks; only consulted when the layer is enabled.
    pub parameter_checks: bool,
    pub events_checker: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            parameter_checks: true,
            events_checker: false,
        }
    }
}

impl ValidationConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

pub struct ValidationLayer {
    config: ValidationConfig,
    events: Option<EventChecker>,
}

impl ValidationLayer {
    pub fn new(config: ValidationConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        let events = (config.enabled && config.events_checker).then(|| EventChecker::new(sink));
        Self { config, events }
    }

    pub fn config(&self) -> ValidationConfig {
        self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Runs before the driver call. An error result stops the call.
    pub fn prologue(&self, params: &ApiParams) -> ZeResult {
        if !self.config.enabled {
            return ZeResult::Success;
        }
        if self.config.parameter_checks {
            let result = check_parameters(params);
            if result.is_error() {
                tracing::debug!(api = params.api().symbol(), %result, "parameter check failed");
                return result;
            }
        }
        if let Some(events) = &self.events {
            events.prologue(params);
        }
        ZeResult::Success
    }

    pub fn epilogue(&self, params: &ApiParams, result: ZeResult) {
        if let Some(events) = &self.events {
            events.epilogue(params, result);
        }
    }

    pub fn events(&self) -> Option<&EventChecker> {
        self.events.as_ref()
    }
}

impl Default for ValidationLayer {
    fn default() -> Self {
        Self::new(ValidationConfig::default(), Arc::new(TracingSink))
    }
}
