use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use zel_api::{ApiVersion, HandleKind, ZeResult};
use zel_ddi::DriverExports;
use zel_tracing::{Tracer, TracerDesc, TracingLayer};
use zel_validation::{DiagnosticSink, TracingSink, ValidationLayer};

use crate::config::LoaderConfig;
use crate::discovery::{self, DriverLibrary};
use crate::dispatch::fill;
use crate::error_state;
use crate::handles::{is_wrapped, HandleTable};
use crate::registry::Registry;

/// Logs a discovery, ordering or init decision, at `info` when loader debug trace is on.
macro_rules! decision {
    ($loader:expr, $($arg:tt)+) => {
        if $loader.config().debug_trace {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}
pub(crate) use decision;

pub const LOADER_COMPONENT: &str = "loader";
pub const VALIDATION_COMPONENT: &str = "validation layer";
pub const TRACING_COMPONENT: &str = "tracing layer";

/// `major.minor.patch` of a loader component library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct LibraryVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl LibraryVersion {
    /// Version of this crate.
    pub fn current() -> Self {
        Self {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentVersion {
    pub name: String,
    /// API version the component implements.
    pub spec_version: ApiVersion,
    pub library_version: LibraryVersion,
}

impl ComponentVersion {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spec_version: ApiVersion::CURRENT,
            library_version: LibraryVersion::current(),
        }
    }
}

pub type TeardownCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Teardown {
    started: AtomicBool,
    delayed: AtomicBool,
    driver_initiated: AtomicBool,
    next_callback: AtomicU32,
    callbacks: Mutex<Vec<(u32, TeardownCallback)>>,
}

/// Drivers found at the first init.
pub(crate) struct Drivers {
    pub(crate) registry: Registry,
    libraries: Vec<DriverLibrary>,
}

/// The loader context: registry, handle table, interposed layers and teardown state.
///
/// Most applications go through the process-wide instance in [`crate::global`]; tests and
/// embedders build their own with [`LoaderBuilder`].
pub struct Loader {
    config: LoaderConfig,
    in_process: Vec<Arc<dyn DriverExports>>,
    pub(crate) drivers: OnceLock<Drivers>,
    pub(crate) handles: HandleTable,
    pub(crate) tracing: TracingLayer,
    pub(crate) validation: ValidationLayer,
    teardown: Teardown,
}

pub struct LoaderBuilder {
    config: LoaderConfig,
    drivers: Vec<Arc<dyn DriverExports>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl LoaderBuilder {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            drivers: Vec::new(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Adds an in-process driver. In-process drivers come before discovered libraries in the
    /// unordered driver list.
    pub fn driver(mut self, driver: Arc<dyn DriverExports>) -> Self {
        self.drivers.push(driver);
        self
    }

    /// Where validation-layer diagnostics go. Defaults to the `tracing` log.
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> Loader {
        Loader {
            tracing: TracingLayer::new(self.config.tracing),
            validation: ValidationLayer::new(self.config.validation, self.sink),
            handles: HandleTable::new(),
            drivers: OnceLock::new(),
            in_process: self.drivers,
            config: self.config,
            teardown: Teardown::default(),
        }
    }
}

impl Loader {
    pub fn builder(config: LoaderConfig) -> LoaderBuilder {
        LoaderBuilder::new(config)
    }

    /// Loader configured from the environment, discovering driver libraries at first init.
    pub fn from_env() -> Self {
        LoaderBuilder::new(LoaderConfig::from_env_or_default()).build()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The registry, once an init call built it.
    pub fn registry(&self) -> Option<&Registry> {
        self.drivers.get().map(|drivers| &drivers.registry)
    }

    pub(crate) fn registry_or_build(&self) -> &Registry {
        &self
            .drivers
            .get_or_init(|| {
                let mut exports = self.in_process.clone();
                let mut libraries = Vec::new();
                for (library, driver) in discovery::discover(&self.config) {
                    libraries.push(library);
                    exports.push(driver);
                }
                let registry = Registry::new(exports, self.config.drivers_order.as_deref());
                for record in registry.drivers() {
                    decision!(
                        self,
                        index = record.index(),
                        driver = record.name(),
                        driver_type = ?record.driver_type(),
                        "registered driver"
                    );
                }
                Drivers {
                    registry,
                    libraries,
                }
            })
            .registry
    }

    /// Number of driver libraries loaded from disk.
    pub fn library_count(&self) -> usize {
        self.drivers.get().map_or(0, |d| d.libraries.len())
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn tracing_layer(&self) -> &TracingLayer {
        &self.tracing
    }

    pub fn validation_layer(&self) -> &ValidationLayer {
        &self.validation
    }

    pub fn create_tracer(&self, desc: TracerDesc) -> Arc<Tracer> {
        self.tracing.create_tracer(desc)
    }

    pub fn destroy_tracer(&self, tracer: &Arc<Tracer>) -> ZeResult {
        self.tracing.destroy_tracer(tracer)
    }

    pub fn enable_tracing_layer(&self) {
        self.tracing.enable_dynamic();
    }

    pub fn disable_tracing_layer(&self) {
        self.tracing.disable_dynamic();
    }

    /// OR of the static and dynamic tracing switches.
    pub fn tracing_layer_state(&self) -> bool {
        self.tracing.is_enabled()
    }

    pub fn loader_version(&self) -> ComponentVersion {
        ComponentVersion::new(LOADER_COMPONENT)
    }

    /// Versions of the loader and every enabled layer, with count-query semantics.
    pub fn versions(
        &self,
        count: &mut Option<u32>,
        versions: &mut Option<Vec<ComponentVersion>>,
    ) -> ZeResult {
        let mut components = vec![ComponentVersion::new(LOADER_COMPONENT)];
        if self.validation.is_enabled() {
            components.push(ComponentVersion::new(VALIDATION_COMPONENT));
        }
        if self.tracing.is_enabled() {
            components.push(ComponentVersion::new(TRACING_COMPONENT));
        }
        let result = fill(count, versions, &components);
        if result.is_error() {
            return error_state::record("zelLoaderGetVersions", result, "count is null");
        }
        result
    }

    /// Driver-native value behind an application-visible handle.
    pub fn translate_handle(&self, kind: HandleKind, handle: u64, out: Option<&mut u64>) -> ZeResult {
        const SYMBOL: &str = "zelLoaderTranslateHandle";
        let Some(out) = out else {
            return error_state::record(SYMBOL, ZeResult::ErrorInvalidNullPointer, "output is null");
        };
        if !is_wrapped(handle) {
            *out = handle;
            return ZeResult::Success;
        }
        match self.handles.translate(kind, handle) {
            Ok(native) => {
                *out = native;
                ZeResult::Success
            }
            Err(err) => error_state::record(SYMBOL, err.into(), &err.to_string()),
        }
    }

    pub fn is_tearing_down(&self) -> bool {
        self.teardown.started.load(Ordering::SeqCst)
            || self.teardown.driver_initiated.load(Ordering::SeqCst)
    }

    /// Keeps process exit from tearing the loader down; the application calls
    /// [`Loader::teardown`] itself.
    pub fn set_delay_teardown(&self) {
        self.teardown.delayed.store(true, Ordering::SeqCst);
    }

    /// Marks the loader as torn down by a driver. Irreversible.
    pub fn set_driver_teardown(&self) {
        if !self.teardown.driver_initiated.swap(true, Ordering::SeqCst) {
            tracing::debug!("driver initiated loader teardown");
        }
    }

    /// Registers a callback run once at teardown. Returns its registration index.
    pub fn register_teardown_callback(&self, callback: TeardownCallback) -> u32 {
        let index = self.teardown.next_callback.fetch_add(1, Ordering::Relaxed);
        self.teardown.callbacks.lock().push((index, callback));
        index
    }

    /// Enters teardown and runs the registered callbacks, once.
    pub fn teardown(&self) {
        if self.teardown.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.teardown.callbacks.lock());
        tracing::debug!(callbacks = callbacks.len(), "loader teardown");
        for (_, callback) in callbacks {
            callback();
        }
    }

    /// Process exit hook. Skipped when the application delayed teardown.
    pub fn on_process_exit(&self) {
        if self.teardown.delayed.load(Ordering::SeqCst) {
            return;
        }
        self.teardown();
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.teardown();
        if let Some(drivers) = self.drivers.take() {
            let Drivers {
                registry,
                libraries,
            } = drivers;
            // Driver objects hold code from the libraries.
            drop(registry);
            for library in libraries {
                tracing::debug!(path = %library.path().display(), "unloading driver library");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use zel_api::DriverType;
    use zel_null_driver::{NullDriver, NullDriverConfig};
    use zel_validation::ValidationConfig;

    fn loader(config: LoaderConfig) -> Loader {
        Loader::builder(config)
            .driver(Arc::new(NullDriver::new(NullDriverConfig::new(
                0,
                DriverType::Gpu,
            ))))
            .build()
    }

    #[test]
    fn versions_list_enabled_components() {
        let loader = loader(LoaderConfig::default());
        let mut count = Some(0);
        let mut versions = None;
        assert_eq!(loader.versions(&mut count, &mut versions), ZeResult::Success);
        assert_eq!(count, Some(1));

        loader.enable_tracing_layer();
        let mut count = Some(8);
        let mut versions = Some(Vec::new());
        assert_eq!(loader.versions(&mut count, &mut versions), ZeResult::Success);
        let names: Vec<_> = versions.unwrap().into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec![LOADER_COMPONENT, TRACING_COMPONENT]);

        let loader = loader_with_validation();
        let mut count = Some(0);
        assert_eq!(loader.versions(&mut count, &mut None), ZeResult::Success);
        assert_eq!(count, Some(2));
        assert_eq!(
            loader.versions(&mut None, &mut None),
            ZeResult::ErrorInvalidNullPointer
        );
    }

    fn loader_with_validation() -> Loader {
        loader(LoaderConfig {
            validation: ValidationConfig::enabled(),
            ..LoaderConfig::default()
        })
    }

    #[test]
    fn tracing_state_reports_the_or_of_both_switches() {
        let loader = loader(LoaderConfig::default());
        assert!(!loader.tracing_layer_state());
        loader.enable_tracing_layer();
        loader.enable_tracing_layer();
        assert!(loader.tracing_layer_state());
        loader.disable_tracing_layer();
        assert!(!loader.tracing_layer_state());

        let loader = loader_static_tracing();
        loader.disable_tracing_layer();
        assert!(loader.tracing_layer_state());
    }

    fn loader_static_tracing() -> Loader {
        loader(LoaderConfig {
            tracing: true,
            ..LoaderConfig::default()
        })
    }

    #[test]
    fn translate_handle_requires_an_output() {
        let loader = loader(LoaderConfig::default());
        assert_eq!(
            loader.translate_handle(HandleKind::Device, 0x10, None),
            ZeResult::ErrorInvalidNullPointer
        );
        let mut out = 0;
        assert_eq!(
            loader.translate_handle(HandleKind::Device, 0x10, Some(&mut out)),
            ZeResult::Success
        );
        assert_eq!(out, 0x10);

        let wrapped = loader.handles.wrap(0, HandleKind::Device, 0x99);
        assert_eq!(
            loader.translate_handle(HandleKind::Device, wrapped, Some(&mut out)),
            ZeResult::Success
        );
        assert_eq!(out, 0x99);
        assert_eq!(
            loader.translate_handle(HandleKind::Context, wrapped, Some(&mut out)),
            ZeResult::ErrorInvalidNullHandle
        );
    }

    #[test]
    fn teardown_runs_callbacks_once() {
        let loader = loader(LoaderConfig::default());
        let runs = Arc::new(AtomicUsize::new(0));
        for expected in 0..2 {
            let runs = runs.clone();
            let index = loader.register_teardown_callback(Box::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            }));
            assert_eq!(index, expected);
        }
        assert!(!loader.is_tearing_down());
        loader.teardown();
        loader.teardown();
        assert!(loader.is_tearing_down());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delayed_teardown_ignores_process_exit() {
        let loader = loader(LoaderConfig::default());
        loader.set_delay_teardown();
        loader.on_process_exit();
        assert!(!loader.is_tearing_down());
        loader.teardown();
        assert!(loader.is_tearing_down());
    }

    #[test]
    fn driver_teardown_is_irreversible() {
        let loader = loader(LoaderConfig::default());
        loader.set_driver_teardown();
        loader.set_driver_teardown();
        assert!(loader.is_tearing_down());
    }
}
