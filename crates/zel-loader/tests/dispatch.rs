use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use zel_api::{
    ApiFamily, ApiId, ApiVersion, ContextCreateParams, ContextDesc, ContextDestroyParams,
    ContextHandle, DeviceGetParams, DeviceGetPropertiesParams, DeviceHandle, DeviceType,
    DriverGetParams, DriverHandle, DriverType, HandleKind, InitDriverTypeDesc,
    InitDriverTypeFlags, InitDriversParams, InitFlags, InitParams, RtGetDefaultContextParams,
    RtGetLastErrorDescriptionParams, RtTranslateDeviceHandleToIdentifierParams,
    RtTranslateIdentifierToDeviceHandleParams, ZeResult,
};
use zel_ddi::{DdiTableBuilder, DriverExports};
use zel_loader::{error_state, Loader, LoaderConfig};
use zel_null_driver::{NullDriver, NullDriverConfig};
use zel_tracing::{callback, CallbackStage, TracerDesc};
use zel_validation::ValidationConfig;

fn null(id: u32, driver_type: DriverType) -> NullDriver {
    NullDriver::new(NullDriverConfig::new(id, driver_type))
}

fn loader(config: LoaderConfig, drivers: &[&NullDriver]) -> Loader {
    drivers
        .iter()
        .fold(Loader::builder(config), |builder, driver| {
            builder.driver(Arc::new((*driver).clone()))
        })
        .build()
}

fn init(loader: &Loader) -> Vec<DriverHandle> {
    assert_eq!(
        loader.call(&mut InitParams {
            flags: InitFlags::empty()
        }),
        ZeResult::Success
    );
    driver_get(loader)
}

fn driver_get(loader: &Loader) -> Vec<DriverHandle> {
    let mut params = DriverGetParams {
        count: Some(0),
        drivers: None,
    };
    assert_eq!(loader.call(&mut params), ZeResult::Success);
    let count = params.count.unwrap();
    let mut params = DriverGetParams {
        count: Some(count),
        drivers: Some(Vec::new()),
    };
    assert_eq!(loader.call(&mut params), ZeResult::Success);
    params.drivers.unwrap()
}

fn first_device(loader: &Loader, driver: DriverHandle) -> DeviceHandle {
    let mut params = DeviceGetParams {
        driver,
        count: Some(1),
        devices: Some(Vec::new()),
    };
    assert_eq!(loader.call(&mut params), ZeResult::Success);
    params.devices.unwrap()[0]
}

fn create_context(loader: &Loader, driver: DriverHandle) -> (ZeResult, ContextHandle) {
    let mut params = ContextCreateParams {
        driver,
        desc: Some(ContextDesc::default()),
        context: Some(ContextHandle::NULL),
    };
    let result = loader.call(&mut params);
    (result, params.context.unwrap_or_default())
}

#[test]
fn translate_handle_reflects_the_ddi_handle_extension() {
    let wrapping = NullDriver::new(NullDriverConfig {
        disable_ddi_ext: true,
        ..NullDriverConfig::new(0, DriverType::Gpu)
    });
    let loader_a = loader(LoaderConfig::default(), &[&wrapping]);
    let drivers = init(&loader_a);
    let device = first_device(&loader_a, drivers[0]);
    let mut native = 0;
    assert_eq!(
        loader_a.translate_handle(HandleKind::Device, device.0, Some(&mut native)),
        ZeResult::Success
    );
    assert_ne!(native, device.0);
    assert_eq!(native, wrapping.device_handle().0);

    let passthrough = null(0, DriverType::Gpu);
    let loader_b = loader(LoaderConfig::default(), &[&passthrough]);
    let drivers = init(&loader_b);
    let device = first_device(&loader_b, drivers[0]);
    assert_eq!(
        loader_b.translate_handle(HandleKind::Device, device.0, Some(&mut native)),
        ZeResult::Success
    );
    assert_eq!(native, device.0);
    assert_eq!(device, passthrough.device_handle());
    assert!(loader_b.handles().is_empty());
}

#[test]
fn intercept_forces_wrapping() {
    let driver = null(0, DriverType::Gpu);
    let loader = loader(
        LoaderConfig {
            intercept: true,
            ..LoaderConfig::default()
        },
        &[&driver],
    );
    let drivers = init(&loader);
    assert_eq!(driver.tag(), None);
    let device = first_device(&loader, drivers[0]);
    assert_ne!(device, driver.device_handle());

    let mut params = DeviceGetPropertiesParams {
        device,
        properties: Some(Default::default()),
    };
    assert_eq!(loader.call(&mut params), ZeResult::Success);
    assert_eq!(params.properties.unwrap().device_type, DeviceType::GPU);
}

#[test]
fn init_is_idempotent() {
    let driver = null(0, DriverType::Gpu);
    let loader = loader(LoaderConfig::default(), &[&driver]);
    let first = init(&loader);
    let second = init(&loader);
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(driver.call_count("zeInit"), 1);
}

#[test]
fn type_filtered_init_then_init_drivers() {
    let driver = null(0, DriverType::Gpu);
    let loader = loader(LoaderConfig::default(), &[&driver]);

    let result = loader.call(&mut InitParams {
        flags: InitFlags::VPU_ONLY,
    });
    assert_eq!(result, ZeResult::ErrorUninitialized);
    assert_eq!(driver.call_count("zeInit"), 0);

    let mut params = InitDriversParams {
        count: Some(0),
        drivers: None,
        desc: Some(InitDriverTypeDesc {
            flags: InitDriverTypeFlags::any(),
            p_next: None,
        }),
    };
    assert_eq!(loader.call(&mut params), ZeResult::Success);
    assert_eq!(params.count, Some(1));

    // zeDriverGet only sees drivers zeInit brought up.
    let mut params = DriverGetParams {
        count: Some(0),
        drivers: None,
    };
    assert_eq!(loader.call(&mut params), ZeResult::ErrorUninitialized);
}

#[test]
fn registry_order_follows_the_ordering_string() {
    let gpu = null(0, DriverType::DiscreteGpu);
    let npu = null(1, DriverType::Npu);
    let loader = loader(
        LoaderConfig {
            drivers_order: Some("NPU, DISCRETE_GPU_ONLY".to_string()),
            ..LoaderConfig::default()
        },
        &[&gpu, &npu],
    );
    let drivers = init(&loader);
    let names: Vec<_> = loader
        .registry()
        .unwrap()
        .drivers()
        .iter()
        .map(|d| d.name().to_string())
        .collect();
    assert_eq!(names, vec!["null1", "null0"]);
    assert_eq!(drivers, vec![npu.driver_handle(), gpu.driver_handle()]);
}

#[test]
fn missing_entry_point_skips_every_layer() {
    let driver = NullDriver::new(NullDriverConfig {
        missing_apis: vec![ApiId::ContextCreate],
        ..NullDriverConfig::new(0, DriverType::Gpu)
    });
    let loader = loader(
        LoaderConfig {
            tracing: true,
            ..LoaderConfig::default()
        },
        &[&driver],
    );
    let drivers = init(&loader);

    let seen = Arc::new(AtomicUsize::new(0));
    let tracer = loader.create_tracer(TracerDesc::default());
    for api in [ApiId::ContextCreate, ApiId::DeviceGet] {
        let seen = seen.clone();
        tracer.register_callback(
            api,
            CallbackStage::Prologue,
            Some(callback(move |_, _, _, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        );
    }
    tracer.set_enabled(true);

    let (result, context) = create_context(&loader, drivers[0]);
    assert_eq!(result, ZeResult::ErrorUnsupportedFeature);
    assert_eq!(context, ContextHandle::NULL);
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(driver.call_count("zeContextCreate"), 0);

    first_device(&loader, drivers[0]);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

/// Null driver whose context destroy always fails.
struct BusyContexts(NullDriver);

impl DriverExports for BusyContexts {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn driver_type(&self) -> DriverType {
        self.0.driver_type()
    }

    fn max_api_version(&self) -> ApiVersion {
        self.0.max_api_version()
    }

    fn proc_addr_table(
        &self,
        family: ApiFamily,
        version: ApiVersion,
        table: &mut DdiTableBuilder,
    ) -> Option<ZeResult> {
        let result = self.0.proc_addr_table(family, version, table);
        if family == ApiFamily::Core {
            table.insert_typed(|_: &mut ContextDestroyParams| ZeResult::ErrorHandleObjectInUse);
        }
        result
    }
}

#[test]
fn destroy_releases_the_wrapper_only_on_success() {
    let busy = Loader::builder(LoaderConfig::default())
        .driver(Arc::new(BusyContexts(null(0, DriverType::Gpu))))
        .build();
    let drivers = init(&busy);
    let (result, context) = create_context(&busy, drivers[0]);
    assert_eq!(result, ZeResult::Success);
    let wrapped = busy.handles().len();

    let result = busy.call(&mut ContextDestroyParams { context });
    assert_eq!(result, ZeResult::ErrorHandleObjectInUse);
    assert_eq!(busy.handles().len(), wrapped);
    let mut native = 0;
    assert_eq!(
        busy.translate_handle(HandleKind::Context, context.0, Some(&mut native)),
        ZeResult::Success
    );

    let driver = NullDriver::new(NullDriverConfig {
        disable_ddi_ext: true,
        ..NullDriverConfig::new(0, DriverType::Gpu)
    });
    let loader = loader(LoaderConfig::default(), &[&driver]);
    let drivers = init(&loader);
    let (_, context) = create_context(&loader, drivers[0]);
    let wrapped = loader.handles().len();
    assert_eq!(
        loader.call(&mut ContextDestroyParams { context }),
        ZeResult::Success
    );
    assert_eq!(loader.handles().len(), wrapped - 1);
    assert_eq!(
        loader.translate_handle(HandleKind::Context, context.0, Some(&mut native)),
        ZeResult::ErrorInvalidNullHandle
    );
}

/// Mixed driver that reports a driver only when NPUs are requested.
struct NpuOnlyInit {
    inner: NullDriver,
    attempts: Arc<AtomicUsize>,
}

impl DriverExports for NpuOnlyInit {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn driver_type(&self) -> DriverType {
        self.inner.driver_type()
    }

    fn max_api_version(&self) -> ApiVersion {
        self.inner.max_api_version()
    }

    fn proc_addr_table(
        &self,
        family: ApiFamily,
        version: ApiVersion,
        table: &mut DdiTableBuilder,
    ) -> Option<ZeResult> {
        let result = self.inner.proc_addr_table(family, version, table);
        if family == ApiFamily::Global {
            let attempts = self.attempts.clone();
            table.insert_typed(move |p: &mut InitDriversParams| {
                attempts.fetch_add(1, Ordering::SeqCst);
                let npu = p
                    .desc
                    .as_ref()
                    .is_some_and(|desc| desc.flags.contains(InitDriverTypeFlags::NPU));
                p.count = Some(u32::from(npu));
                ZeResult::Success
            });
        }
        result
    }
}

#[test]
fn init_drivers_retries_a_driver_that_reported_none() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let loader = Loader::builder(LoaderConfig::default())
        .driver(Arc::new(NpuOnlyInit {
            inner: null(0, DriverType::Mixed),
            attempts: attempts.clone(),
        }))
        .build();
    let init_drivers = |flags| {
        let mut params = InitDriversParams {
            count: Some(0),
            drivers: None,
            desc: Some(InitDriverTypeDesc {
                flags,
                p_next: None,
            }),
        };
        let result = loader.call(&mut params);
        (result, params.count)
    };

    assert_eq!(
        init_drivers(InitDriverTypeFlags::GPU),
        (ZeResult::ErrorUninitialized, Some(0))
    );
    assert!(loader.registry().unwrap().default_driver().is_none());
    assert_eq!(
        init_drivers(InitDriverTypeFlags::NPU),
        (ZeResult::Success, Some(1))
    );
    // A count query brings the driver up too.
    assert!(loader.registry().unwrap().default_driver().is_some());
    // Once up, the driver is not asked again and matches any filter it qualifies for.
    assert_eq!(
        init_drivers(InitDriverTypeFlags::GPU),
        (ZeResult::Success, Some(1))
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn unknown_handles_never_reach_a_driver() {
    let driver = NullDriver::new(NullDriverConfig {
        disable_ddi_ext: true,
        ..NullDriverConfig::new(0, DriverType::Gpu)
    });
    let loader = loader(LoaderConfig::default(), &[&driver]);
    init(&loader);
    driver.clear_calls();

    let (result, _) = create_context(&loader, DriverHandle(0x8000_0000_0000_7777));
    assert_eq!(result, ZeResult::ErrorInvalidNullHandle);
    let (result, _) = create_context(&loader, DriverHandle(0x0000_0000_0000_0001));
    assert_eq!(result, ZeResult::ErrorInvalidNullHandle);
    assert!(driver.calls().is_empty());
}

#[test]
fn calls_before_init_are_uninitialized() {
    let driver = null(0, DriverType::Gpu);
    let loader = loader(LoaderConfig::default(), &[&driver]);
    let mut params = DriverGetParams {
        count: Some(0),
        drivers: None,
    };
    assert_eq!(loader.call(&mut params), ZeResult::ErrorUninitialized);
    let (result, _) = create_context(&loader, driver.driver_handle());
    assert_eq!(result, ZeResult::ErrorUninitialized);
}

#[test]
fn teardown_rejects_late_calls() {
    let driver = null(0, DriverType::Gpu);
    let loader = loader(LoaderConfig::default(), &[&driver]);
    let drivers = init(&loader);
    loader.teardown();
    assert!(loader.is_tearing_down());

    driver.clear_calls();
    let (result, _) = create_context(&loader, drivers[0]);
    assert_eq!(result, ZeResult::ErrorUninitialized);
    let result = loader.call(&mut InitParams::default());
    assert_eq!(result, ZeResult::ErrorUninitialized);
    assert!(driver.calls().is_empty());
}

#[test]
fn unsupported_version_is_reported() {
    let driver = NullDriver::new(NullDriverConfig {
        max_version: ApiVersion::V1_5,
        ..NullDriverConfig::new(0, DriverType::Gpu)
    });
    let loader = loader(
        LoaderConfig {
            api_version: ApiVersion::V1_14,
            ..LoaderConfig::default()
        },
        &[&driver],
    );
    let result = loader.call(&mut InitParams::default());
    assert_eq!(result, ZeResult::ErrorUnsupportedVersion);
}

#[test]
fn legacy_drivers_dispatch_their_global_table() {
    let driver = NullDriver::new(NullDriverConfig {
        legacy_only: true,
        ..NullDriverConfig::new(0, DriverType::Gpu)
    });
    let loader = loader(LoaderConfig::default(), &[&driver]);
    let drivers = init(&loader);
    assert_eq!(drivers.len(), 1);
    first_device(&loader, drivers[0]);

    let (result, _) = create_context(&loader, drivers[0]);
    assert_eq!(result, ZeResult::ErrorUnsupportedFeature);
    let table_version = loader.registry().unwrap().drivers()[0]
        .table()
        .unwrap()
        .version();
    assert_eq!(table_version, ApiVersion::V1_0);
}

#[test]
fn runtime_calls_route_to_the_default_driver() {
    let driver = null(0, DriverType::Gpu);
    let loader = loader(LoaderConfig::default(), &[&driver]);
    let drivers = init(&loader);
    let device = first_device(&loader, drivers[0]);

    let mut params = RtTranslateDeviceHandleToIdentifierParams {
        device,
        identifier: 7,
    };
    assert_eq!(loader.call(&mut params), ZeResult::Success);
    assert_eq!(params.identifier, 0);

    let mut params = RtTranslateIdentifierToDeviceHandleParams {
        identifier: 0,
        device: DeviceHandle::NULL,
    };
    assert_eq!(loader.call(&mut params), ZeResult::Success);
    assert_eq!(params.device, device);

    let mut params = RtGetDefaultContextParams::default();
    assert_eq!(loader.call(&mut params), ZeResult::Success);
    assert_ne!(params.context, ContextHandle::NULL);
}

#[test]
fn failed_identifier_translation_is_described() {
    error_state::clear();
    let driver = null(0, DriverType::Gpu);
    let loader = loader(LoaderConfig::default(), &[&driver]);
    init(&loader);

    let mut params = RtTranslateDeviceHandleToIdentifierParams {
        device: DeviceHandle(0x0100_0000_0000_0999),
        identifier: 0,
    };
    assert_eq!(
        loader.call(&mut params),
        ZeResult::ErrorInvalidNullHandle
    );
    assert_eq!(params.identifier, u32::MAX);

    let mut params = RtGetLastErrorDescriptionParams {
        description: Some(String::new()),
    };
    assert_eq!(loader.call(&mut params), ZeResult::Success);
    let description = params.description.unwrap();
    assert!(
        description.starts_with("zerTranslateDeviceHandleToIdentifier"),
        "{description}"
    );
}

#[test]
fn runtime_family_can_be_absent() {
    let driver = NullDriver::new(NullDriverConfig {
        disable_zer_api: true,
        ..NullDriverConfig::new(0, DriverType::Gpu)
    });
    let loader = loader(LoaderConfig::default(), &[&driver]);
    init(&loader);

    let mut params = RtGetDefaultContextParams {
        context: ContextHandle(5),
    };
    assert_eq!(loader.call(&mut params), ZeResult::ErrorUnsupportedFeature);
    assert_eq!(params.context, ContextHandle::NULL);
}

#[test]
fn null_error_description_output_is_rejected_by_validation() {
    error_state::clear();
    let driver = null(0, DriverType::Gpu);
    let loader = loader(
        LoaderConfig {
            validation: ValidationConfig::enabled(),
            ..LoaderConfig::default()
        },
        &[&driver],
    );
    init(&loader);

    let mut params = RtGetLastErrorDescriptionParams { description: None };
    assert_eq!(loader.call(&mut params), ZeResult::ErrorInvalidNullPointer);
    assert_eq!(driver.call_count("zerGetLastErrorDescription"), 0);

    let mut params = RtGetLastErrorDescriptionParams {
        description: Some(String::new()),
    };
    assert_eq!(loader.call(&mut params), ZeResult::Success);
    assert_eq!(driver.call_count("zerGetLastErrorDescription"), 1);
}
