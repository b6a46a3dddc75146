//! API tracing layer.
//!
//! Any number of tracers may register prologue and epilogue callbacks per API. For every traced
//! call the dispatch core samples the enabled tracers once ([`TracingLayer::begin`]), runs their
//! prologues with a mutable parameter snapshot, performs the call, then runs their epilogues
//! with the result.

mod layer;
mod tracer;

pub use layer::{TraceCall, TracingLayer};
pub use tracer::{
    callback, CallbackStage, CallbackTable, InstanceUserData, Tracer, TracerCallback, TracerDesc,
    TracerUserData,
};
