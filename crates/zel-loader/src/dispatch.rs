//! Dispatch core.
//!
//! Every call takes one of three routes:
//!
//! - global calls (`zeInit`, `zeInitDrivers`, `zeDriverGet`, `zesInit`, `zesDriverGet`) walk the
//!   registry and aggregate per driver;
//! - runtime calls (`zer*`) go to the default driver;
//! - everything else is routed by its owner handle.
//!
//! Routed and runtime calls resolve their driver entry before any layer runs, so a missing
//! entry fails with `ErrorUnsupportedFeature` without tracer or validation callbacks.

use std::sync::Arc;

use zel_api::{
    ApiCall, ApiId, ApiParams, DeviceHandle, DriverGetParams, DriverHandle, HandleKind,
    InitDriverTypeDesc, InitDriverTypeFlags, InitDriversParams, InitFlags, InitParams,
    SysmanDriverGetParams, SysmanInitFlags, SysmanInitParams, ZeResult,
};
use zel_ddi::{DdiError, DdiFn, DriverTag};

use crate::error_state;
use crate::handles::is_wrapped;
use crate::loader::{decision, Loader};
use crate::registry::{DriverRecord, InitKind, Registry};

#[derive(Debug, Clone, Copy)]
enum InitRequest {
    Legacy(InitFlags),
    Drivers(InitDriverTypeFlags),
    Sysman(SysmanInitFlags),
}

impl InitRequest {
    fn kind(self) -> InitKind {
        match self {
            InitRequest::Legacy(_) => InitKind::Legacy,
            InitRequest::Drivers(_) => InitKind::Drivers,
            InitRequest::Sysman(_) => InitKind::Sysman,
        }
    }

    fn filter(self) -> InitDriverTypeFlags {
        match self {
            InitRequest::Legacy(flags) => flags.driver_types(),
            InitRequest::Drivers(types) => types,
            InitRequest::Sysman(_) => InitDriverTypeFlags::any(),
        }
    }
}

/// Driver enumeration entry points sharing the count-query shape.
trait DriverQuery: ApiCall {
    fn query(count: u32, drivers: Option<Vec<DriverHandle>>) -> Self;

    fn drivers(self) -> Vec<DriverHandle>;

    fn count(&self) -> u32;
}

impl DriverQuery for DriverGetParams {
    fn query(count: u32, drivers: Option<Vec<DriverHandle>>) -> Self {
        Self {
            count: Some(count),
            drivers,
        }
    }

    fn drivers(self) -> Vec<DriverHandle> {
        self.drivers.unwrap_or_default()
    }

    fn count(&self) -> u32 {
        self.count.unwrap_or(0)
    }
}

impl DriverQuery for SysmanDriverGetParams {
    fn query(count: u32, drivers: Option<Vec<DriverHandle>>) -> Self {
        Self {
            count: Some(count),
            drivers,
        }
    }

    fn drivers(self) -> Vec<DriverHandle> {
        self.drivers.unwrap_or_default()
    }

    fn count(&self) -> u32 {
        self.count.unwrap_or(0)
    }
}

/// Count-query convention: a zero count or a missing array asks for the number of items;
/// otherwise up to `count` items are written and `count` is set to how many were.
pub(crate) fn fill<T: Clone>(
    count: &mut Option<u32>,
    out: &mut Option<Vec<T>>,
    items: &[T],
) -> ZeResult {
    let Some(count) = count else {
        return ZeResult::ErrorInvalidNullPointer;
    };
    let Some(out) = out.as_mut().filter(|_| *count > 0) else {
        *count = items.len() as u32;
        return ZeResult::Success;
    };
    let written = (*count as usize).min(items.len());
    *out = items[..written].to_vec();
    *count = written as u32;
    ZeResult::Success
}

/// Calls a driver entry directly, outside every layer.
fn invoke<P: ApiCall>(record: &DriverRecord, params: &mut P) -> ZeResult {
    let Some(entry) = record.entry(P::API) else {
        return ZeResult::ErrorUnsupportedFeature;
    };
    let mut tagged = std::mem::take(params).into_params();
    let result = entry(&mut tagged);
    match P::from_params(tagged) {
        Some(updated) => {
            *params = updated;
            result
        }
        None => ZeResult::ErrorInvalidArgument,
    }
}

fn run_driver_init(record: &DriverRecord, request: InitRequest) -> ZeResult {
    match request {
        InitRequest::Legacy(flags) => invoke(record, &mut InitParams { flags }),
        InitRequest::Drivers(types) => {
            if record.entry(ApiId::InitDrivers).is_none() {
                return invoke(
                    record,
                    &mut InitParams {
                        flags: InitFlags::empty(),
                    },
                );
            }
            let mut params = InitDriversParams {
                count: Some(0),
                drivers: None,
                desc: Some(InitDriverTypeDesc {
                    flags: types,
                    p_next: None,
                }),
            };
            match invoke(record, &mut params) {
                ZeResult::Success if params.count == Some(0) => ZeResult::ErrorUninitialized,
                result => result,
            }
        }
        InitRequest::Sysman(flags) => invoke(record, &mut SysmanInitParams { flags }),
    }
}

/// Sentinel outputs of runtime calls that failed.
fn runtime_failure_outputs(params: &mut ApiParams) {
    match params {
        ApiParams::RtTranslateDeviceHandleToIdentifier(p) => p.identifier = u32::MAX,
        ApiParams::RtTranslateIdentifierToDeviceHandle(p) => p.device = DeviceHandle::NULL,
        ApiParams::RtGetDefaultContext(p) => p.context = Default::default(),
        _ => {}
    }
}

impl Loader {
    /// Dispatches a typed call.
    pub fn call<P: ApiCall>(&self, params: &mut P) -> ZeResult {
        let mut tagged = std::mem::take(params).into_params();
        let result = self.dispatch(&mut tagged);
        match P::from_params(tagged) {
            Some(updated) => {
                *params = updated;
                result
            }
            None => error_state::record(
                P::API.symbol(),
                ZeResult::ErrorInvalidArgument,
                "parameters replaced with another API's",
            ),
        }
    }

    pub fn dispatch(&self, params: &mut ApiParams) -> ZeResult {
        let api = params.api();
        if self.is_tearing_down() {
            return error_state::record(
                api.symbol(),
                ZeResult::ErrorUninitialized,
                "loader is tearing down",
            );
        }
        match api {
            ApiId::Init
            | ApiId::InitDrivers
            | ApiId::DriverGet
            | ApiId::SysmanInit
            | ApiId::SysmanDriverGet => self.layered(params, |params| self.global(params)),
            ApiId::RtGetLastErrorDescription
            | ApiId::RtTranslateDeviceHandleToIdentifier
            | ApiId::RtTranslateIdentifierToDeviceHandle
            | ApiId::RtGetDefaultContext => self.runtime(params),
            _ => self.routed(params),
        }
    }

    /// Runs `call` between the tracing and validation layers.
    fn layered(
        &self,
        params: &mut ApiParams,
        call: impl FnOnce(&mut ApiParams) -> ZeResult,
    ) -> ZeResult {
        let mut trace = self.tracing.begin(params.api());
        if let Some(trace) = trace.as_mut() {
            trace.prologues(params);
        }

        let mut result = self.validation.prologue(params);
        if result.is_success() {
            result = call(params);
            self.validation.epilogue(params, result);
        }

        if let Some(trace) = trace.as_mut() {
            trace.epilogues(params, result);
        }
        result
    }

    fn routed(&self, params: &mut ApiParams) -> ZeResult {
        let api = params.api();
        let fail = |result: ZeResult, reason: &str| error_state::record(api.symbol(), result, reason);

        let Some(registry) = self.registry() else {
            return fail(ZeResult::ErrorUninitialized, "no init call was made");
        };
        let Some((kind, owner)) = params.owner() else {
            return fail(ZeResult::ErrorInvalidArgument, "call has no owner handle");
        };
        let record = match self.resolve(registry, kind, owner) {
            Ok(record) => record,
            Err(reason) => return fail(ZeResult::ErrorInvalidNullHandle, reason),
        };
        if record.table().is_none() {
            return fail(ZeResult::ErrorUninitialized, "owning driver is not initialized");
        }
        let Some(entry) = record.entry(api) else {
            return fail(
                ZeResult::ErrorUnsupportedFeature,
                "driver does not export this entry point",
            );
        };
        self.layered(params, |params| self.forward(record, &entry, params))
    }

    /// Driver owning `handle`.
    fn resolve<'r>(
        &self,
        registry: &'r Registry,
        kind: HandleKind,
        handle: u64,
    ) -> Result<&'r Arc<DriverRecord>, &'static str> {
        if handle == 0 {
            return Err("owner handle is null");
        }
        if is_wrapped(handle) {
            let entry = self.handles.get(handle).ok_or("unknown handle")?;
            if entry.kind != kind {
                return Err("handle kind mismatch");
            }
            return registry.get(entry.driver).ok_or("handle of an unknown driver");
        }
        let tag = DriverTag::of_handle(handle).ok_or("handle carries no driver tag")?;
        registry.by_tag(tag).ok_or("no driver owns the handle tag")
    }

    /// Application-visible value of a handle a driver returned.
    fn expose(&self, record: &DriverRecord, kind: HandleKind, native: u64) -> u64 {
        if record.is_passthrough() {
            native
        } else {
            self.handles.wrap(record.index(), kind, native)
        }
    }

    /// Calls `entry` on a native copy of `params` and merges the outputs back.
    fn forward(&self, record: &DriverRecord, entry: &DdiFn, params: &mut ApiParams) -> ZeResult {
        let api = params.api();
        let mut native = params.clone();
        let translated = native.visit_inputs(&mut |kind, raw| {
            if is_wrapped(*raw) {
                *raw = self.handles.translate(kind, *raw)?;
            }
            Ok(())
        });
        if let Err(result) = translated {
            return error_state::record(api.symbol(), result, "input handle does not translate");
        }

        let result = entry(&mut native);

        let merged = params.merge_outputs(native, &mut |kind, raw| {
            *raw = self.expose(record, kind, *raw);
            Ok(())
        });
        if let Err(result) = merged {
            return error_state::record(api.symbol(), result, "driver outputs do not merge");
        }

        if result.is_success() {
            if let Some((kind, handle)) = params.released() {
                if is_wrapped(handle) {
                    self.handles.release(kind, handle);
                }
            }
        }
        result
    }

    fn runtime(&self, params: &mut ApiParams) -> ZeResult {
        let api = params.api();

        if api == ApiId::RtGetLastErrorDescription {
            if let Some(description) = error_state::last() {
                return self.layered(params, |params| match params {
                    ApiParams::RtGetLastErrorDescription(p) => match p.description.as_mut() {
                        Some(out) => {
                            *out = description;
                            ZeResult::Success
                        }
                        None => ZeResult::ErrorInvalidNullPointer,
                    },
                    _ => ZeResult::ErrorInvalidArgument,
                });
            }
        }

        let target = self
            .registry()
            .and_then(Registry::default_driver)
            .ok_or((ZeResult::ErrorUninitialized, "no driver is initialized"))
            .and_then(|record| {
                let entry = record.entry(api).ok_or((
                    ZeResult::ErrorUnsupportedFeature,
                    "default driver does not export this entry point",
                ))?;
                Ok((record, entry))
            });
        let (record, entry) = match target {
            Ok(target) => target,
            Err((result, reason)) => {
                runtime_failure_outputs(params);
                return error_state::record(api.symbol(), result, reason);
            }
        };

        self.layered(params, |params| {
            let result = self.forward(record, &entry, params);
            if result.is_error() {
                runtime_failure_outputs(params);
                if api == ApiId::RtTranslateDeviceHandleToIdentifier {
                    error_state::record(api.symbol(), result, "device has no identifier");
                }
            }
            result
        })
    }

    fn global(&self, params: &mut ApiParams) -> ZeResult {
        let api = params.api();
        match params {
            ApiParams::Init(p) => self.init(api, InitRequest::Legacy(p.flags)),
            ApiParams::InitDrivers(p) => {
                let Some(desc) = p.desc.as_ref() else {
                    return error_state::record(
                        api.symbol(),
                        ZeResult::ErrorInvalidNullPointer,
                        "driver type descriptor is null",
                    );
                };
                let types = desc.flags;
                let result = self.init(api, InitRequest::Drivers(types));
                if result.is_error() {
                    if let Some(count) = p.count.as_mut() {
                        *count = 0;
                    }
                    return result;
                }
                let drivers = self.enumerate::<DriverGetParams>(InitKind::Drivers, types);
                fill(&mut p.count, &mut p.drivers, &drivers)
            }
            ApiParams::DriverGet(p) => {
                let ready = self
                    .registry()
                    .is_some_and(|r| r.drivers().iter().any(|d| d.is_ready(InitKind::Legacy)));
                if !ready {
                    return error_state::record(
                        api.symbol(),
                        ZeResult::ErrorUninitialized,
                        "zeInit has not initialized any driver",
                    );
                }
                let drivers =
                    self.enumerate::<DriverGetParams>(InitKind::Legacy, InitDriverTypeFlags::any());
                fill(&mut p.count, &mut p.drivers, &drivers)
            }
            ApiParams::SysmanInit(p) => self.init(api, InitRequest::Sysman(p.flags)),
            ApiParams::SysmanDriverGet(p) => {
                let ready = self
                    .registry()
                    .is_some_and(|r| r.drivers().iter().any(|d| d.is_ready(InitKind::Sysman)));
                if !ready {
                    return error_state::record(
                        api.symbol(),
                        ZeResult::ErrorUninitialized,
                        "zesInit has not initialized any driver",
                    );
                }
                let drivers = self
                    .enumerate::<SysmanDriverGetParams>(InitKind::Sysman, InitDriverTypeFlags::any());
                fill(&mut p.count, &mut p.drivers, &drivers)
            }
            _ => ZeResult::ErrorInvalidArgument,
        }
    }

    /// Brings up every driver matching the request's type filter.
    fn init(&self, api: ApiId, request: InitRequest) -> ZeResult {
        let registry = self.registry_or_build();
        let filter = request.filter();
        let kind = request.kind();
        let (mut matched, mut refused, mut ready) = (0usize, 0usize, 0usize);

        for record in registry.drivers() {
            if !record.driver_type().matches(filter) {
                decision!(
                    self,
                    driver = record.name(),
                    driver_type = ?record.driver_type(),
                    ?filter,
                    "driver filtered out by type"
                );
                continue;
            }
            matched += 1;

            if let Err(err) = record.load(self.config().api_version, self.config().intercept) {
                if matches!(err, DdiError::UnsupportedVersion { .. }) {
                    refused += 1;
                }
                decision!(self, driver = record.name(), %err, "driver not loaded");
                continue;
            }

            let result = record.init_once(kind, |record| run_driver_init(record, request));
            decision!(
                self,
                driver = record.name(),
                ?kind,
                passthrough = record.is_passthrough(),
                %result,
                "driver init"
            );
            if result.is_success() {
                ready += 1;
            }
        }

        if matched == 0 {
            return error_state::record(
                api.symbol(),
                ZeResult::ErrorUninitialized,
                "no driver matches the requested types",
            );
        }
        if ready == 0 && refused == matched {
            return error_state::record(
                api.symbol(),
                ZeResult::ErrorUnsupportedVersion,
                "every matching driver refused the API version",
            );
        }
        if ready == 0 {
            return error_state::record(
                api.symbol(),
                ZeResult::ErrorUninitialized,
                "no matching driver initialized",
            );
        }
        ZeResult::Success
    }

    /// Driver handles of every driver `kind` brought up, in registry order.
    fn enumerate<P: DriverQuery>(
        &self,
        kind: InitKind,
        filter: InitDriverTypeFlags,
    ) -> Vec<DriverHandle> {
        let Some(registry) = self.registry() else {
            return Vec::new();
        };
        registry
            .drivers()
            .iter()
            .filter(|record| record.is_ready(kind) && record.driver_type().matches(filter))
            .flat_map(|record| self.driver_handles::<P>(record))
            .collect()
    }

    fn driver_handles<P: DriverQuery>(&self, record: &DriverRecord) -> Vec<DriverHandle> {
        let mut query = P::query(0, None);
        if invoke(record, &mut query).is_error() || query.count() == 0 {
            return Vec::new();
        }
        let count = query.count();
        let mut query = P::query(count, Some(vec![DriverHandle::NULL; count as usize]));
        if invoke(record, &mut query).is_error() {
            return Vec::new();
        }
        query
            .drivers()
            .into_iter()
            .filter(|driver| driver.0 != 0)
            .map(|driver| DriverHandle(self.expose(record, HandleKind::Driver, driver.0)))
            .collect()
    }
}
