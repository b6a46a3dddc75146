//! Process-wide loader and the free-function API over it.
//!
//! The loader is built from the environment on first use and torn down when the process exits,
//! unless the application delayed teardown to do it itself.

use std::sync::{Arc, OnceLock};

use zel_api::{ApiCall, ApiParams, HandleKind, ZeResult};
use zel_tracing::{Tracer, TracerDesc};

use crate::loader::{ComponentVersion, Loader, TeardownCallback};

static LOADER: OnceLock<Loader> = OnceLock::new();

pub fn loader() -> &'static Loader {
    LOADER.get_or_init(Loader::from_env)
}

#[ctor::dtor]
fn loader_process_exit() {
    if let Some(loader) = LOADER.get() {
        loader.on_process_exit();
    }
}

/// Dispatches any API call through the process-wide loader.
pub fn call<P: ApiCall>(params: &mut P) -> ZeResult {
    loader().call(params)
}

pub fn dispatch(params: &mut ApiParams) -> ZeResult {
    loader().dispatch(params)
}

pub fn zel_loader_get_versions(
    count: &mut Option<u32>,
    versions: &mut Option<Vec<ComponentVersion>>,
) -> ZeResult {
    loader().versions(count, versions)
}

pub fn zel_get_loader_version(version: Option<&mut ComponentVersion>) -> ZeResult {
    let Some(version) = version else {
        return ZeResult::ErrorInvalidNullPointer;
    };
    *version = loader().loader_version();
    ZeResult::Success
}

pub fn zel_loader_translate_handle(kind: HandleKind, handle: u64, out: Option<&mut u64>) -> ZeResult {
    loader().translate_handle(kind, handle, out)
}

pub fn zel_enable_tracing_layer() -> ZeResult {
    loader().enable_tracing_layer();
    ZeResult::Success
}

pub fn zel_disable_tracing_layer() -> ZeResult {
    loader().disable_tracing_layer();
    ZeResult::Success
}

pub fn zel_get_tracing_layer_state(enabled: Option<&mut bool>) -> ZeResult {
    let Some(enabled) = enabled else {
        return ZeResult::ErrorInvalidNullPointer;
    };
    *enabled = loader().tracing_layer_state();
    ZeResult::Success
}

pub fn zel_tracer_create(desc: TracerDesc) -> Arc<Tracer> {
    loader().create_tracer(desc)
}

pub fn zel_tracer_destroy(tracer: &Arc<Tracer>) -> ZeResult {
    loader().destroy_tracer(tracer)
}

pub fn zel_check_is_loader_in_tear_down() -> bool {
    LOADER.get().is_some_and(Loader::is_tearing_down)
}

pub fn zel_set_delay_loader_context_teardown() {
    loader().set_delay_teardown();
}

pub fn zel_loader_context_teardown() {
    if let Some(loader) = LOADER.get() {
        loader.teardown();
    }
}

pub fn zel_set_driver_teardown() {
    loader().set_driver_teardown();
}

pub fn zel_register_teardown_callback(callback: TeardownCallback) -> u32 {
    loader().register_teardown_callback(callback)
}
