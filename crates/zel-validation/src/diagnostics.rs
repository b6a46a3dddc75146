use std::fmt;

use parking_lot::Mutex;
use zel_api::ApiId;

/// Non-fatal finding of a stateful checker. Never changes a call's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Recording a dependency of `api` would close a cycle between actions.
    PotentialDeadlock {
        api: ApiId,
        from: String,
        to: String,
        /// Actions along the existing path, starting at `to`.
        path: Vec<String>,
        truncated: bool,
    },
    /// The host signalled an event other actions still wait on.
    IllegalHostSignal { event: u64 },
    /// An event handle that was never created, or was already destroyed.
    UnknownEvent { api: ApiId, event: u64 },
    /// A signal event reused while still tied to an earlier action.
    SignalEventReused {
        api: ApiId,
        event: u64,
        previous: String,
    },
}

impl Diagnostic {
    pub fn api(&self) -> Option<ApiId> {
        match self {
            Diagnostic::PotentialDeadlock { api, .. }
            | Diagnostic::UnknownEvent { api, .. }
            | Diagnostic::SignalEventReused { api, .. } => Some(*api),
            Diagnostic::IllegalHostSignal { .. } => Some(ApiId::EventHostSignal),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::PotentialDeadlock {
                from,
                to,
                path,
                truncated,
                ..
            } => {
                writeln!(f, "There may be a potential event deadlock!")?;
                writeln!(
                    f,
                    "Adding the following dependency would create a cycle:\n\tFrom: {from}\n\tTo: {to}"
                )?;
                write!(f, "There is already a path:")?;
                let mut prefix = String::new();
                for (i, action) in path.iter().enumerate() {
                    if i == 0 {
                        write!(f, "\n{action}")?;
                    } else {
                        write!(f, "\n{prefix}|\n{prefix}-> {action}")?;
                        prefix.push_str("   ");
                    }
                }
                if *truncated {
                    write!(f, "\n{prefix}|\n{prefix}-> ...")?;
                }
                Ok(())
            }
            Diagnostic::IllegalHostSignal { event } => write!(
                f,
                "zeEventHostSignal on event {{{event:#x}}} while other actions still wait on it"
            ),
            Diagnostic::UnknownEvent { api, event } => write!(
                f,
                "event {{{event:#x}}} might be an invalid event in call to {}",
                api.symbol()
            ),
            Diagnostic::SignalEventReused {
                api,
                event,
                previous,
            } => write!(
                f,
                "{} is using the same event for signal {{{event:#x}}} which has been previously used by: {previous}",
                api.symbol()
            ),
        }
    }
}

/// Destination of validation diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Logs every diagnostic as a warning.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::warn!(
            api = diagnostic.api().map(ApiId::symbol).unwrap_or_default(),
            "{diagnostic}"
        );
    }
}

/// Keeps diagnostics in memory for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock())
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::debug!(%diagnostic, "recorded validation diagnostic");
        self.diagnostics.lock().push(diagnostic);
    }
}
