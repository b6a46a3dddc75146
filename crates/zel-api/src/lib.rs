//! Shared vocabulary of the loader, its layers and drivers.
//!
//! This crate has no behaviour of its own: it defines result codes, API versions, typed handles,
//! descriptors and the per-API parameter table every other crate dispatches on.

#![forbid(unsafe_code)]

mod handle;
mod params;
mod result;
mod types;

pub use handle::*;
pub use params::*;
pub use result::{ApiVersion, ZeResult};
pub use types::*;
