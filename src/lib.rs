//! Level-Zero style driver loader.
//!
//! Re-exports the workspace crates under one name. Most applications only need [`global`] (the
//! process-wide loader) and the parameter types in [`api`].

pub use zel_api as api;
pub use zel_ddi as ddi;
pub use zel_loader as loader;
pub use zel_tracing as tracing_layer;
pub use zel_validation as validation;

pub use zel_api::{ApiCall, ApiId, ApiParams, ApiVersion, ZeResult};
pub use zel_loader::{global, Loader, LoaderBuilder, LoaderConfig};
