//! Null driver: an in-process test double that accepts every call.
//!
//! Tests build it directly with a [`NullDriverConfig`]. Built as a shared library it is also
//! discoverable by the loader through [`zel_driver_entry`], configured from the `ZEL_TEST_*`
//! environment variables.

mod config;
mod driver;

use std::sync::Arc;

use zel_ddi::DriverExports;

pub use config::NullDriverConfig;
pub use driver::NullDriver;

/// Library entry point looked up by the loader's discovery.
#[no_mangle]
pub fn zel_driver_entry() -> Arc<dyn DriverExports> {
    Arc::new(NullDriver::new(NullDriverConfig::from_env(0)))
}
