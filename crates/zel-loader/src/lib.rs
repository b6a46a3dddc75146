//! Driver loader.
//!
//! Discovers drivers, orders them, builds their DDI tables and routes every API call to the
//! driver that owns it, with the tracing and validation layers interposed.

pub mod config;
pub mod discovery;
mod dispatch;
pub mod error_state;
pub mod global;
pub mod handles;
mod loader;
pub mod ordering;
pub mod registry;

pub use config::{ConfigError, LoaderConfig};
pub use discovery::{DiscoveryError, DriverLibrary};
pub use handles::{HandleError, HandleTable, WrappedHandle};
pub use loader::{
    ComponentVersion, LibraryVersion, Loader, LoaderBuilder, TeardownCallback, LOADER_COMPONENT,
    TRACING_COMPONENT, VALIDATION_COMPONENT,
};
pub use ordering::{apply_order, parse_order, OrderBucket, OrderSpec};
pub use registry::{DriverRecord, InitKind, Registry};
