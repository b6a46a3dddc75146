use pretty_assertions::assert_eq;
use zel_api::{
    ApiCall, ApiFamily, ApiId, ApiVersion, ContextCreateParams, ContextDesc, DeviceGetParams,
    DriverType, ZeResult,
};
use zel_ddi::{build_ddi_table, DdiError, DdiTable, DriverExports};
use zel_null_driver::{NullDriver, NullDriverConfig};

fn call<P: ApiCall>(table: &DdiTable, params: P) -> (ZeResult, P) {
    let mut params = params.into_params();
    let entry = table.get(P::API).expect("entry exported");
    let result = entry(&mut params);
    (result, P::from_params(params).unwrap())
}

#[test]
fn exports_every_api_of_each_family() {
    let driver = NullDriver::new(NullDriverConfig::default());
    let table = build_ddi_table(&driver, ApiVersion::CURRENT).unwrap();
    assert_eq!(table.len(), ApiId::COUNT);
    assert_eq!(table.version(), ApiVersion::CURRENT);
}

#[test]
fn enumerations_report_one_device() {
    let driver = NullDriver::new(NullDriverConfig::default());
    let table = build_ddi_table(&driver, ApiVersion::CURRENT).unwrap();

    let (result, params) = call(
        &table,
        DeviceGetParams {
            driver: driver.driver_handle(),
            count: Some(0),
            devices: None,
        },
    );
    assert_eq!(result, ZeResult::Success);
    assert_eq!(params.count, Some(1));

    let (result, params) = call(
        &table,
        DeviceGetParams {
            driver: driver.driver_handle(),
            count: Some(1),
            devices: Some(Vec::new()),
        },
    );
    assert_eq!(result, ZeResult::Success);
    assert_eq!(params.devices, Some(vec![driver.device_handle()]));
    assert_eq!(driver.call_count("zeDeviceGet"), 2);
}

#[test]
fn creations_hand_out_fresh_handles() {
    let driver = NullDriver::new(NullDriverConfig::default());
    let table = build_ddi_table(&driver, ApiVersion::CURRENT).unwrap();
    let create = || ContextCreateParams {
        driver: driver.driver_handle(),
        desc: Some(ContextDesc::default()),
        context: Some(Default::default()),
    };

    let (_, first) = call(&table, create());
    let (_, second) = call(&table, create());
    assert_ne!(first.context, second.context);
    assert_eq!(
        driver.calls(),
        vec![ApiId::ContextCreate, ApiId::ContextCreate]
    );
}

#[test]
fn switches_shape_the_exported_tables() {
    let driver = NullDriver::new(NullDriverConfig {
        disable_zer_api: true,
        missing_apis: vec![ApiId::DeviceGet],
        ..NullDriverConfig::new(1, DriverType::Npu)
    });
    let table = build_ddi_table(&driver, ApiVersion::CURRENT).unwrap();
    assert!(!table.contains(ApiId::DeviceGet));
    assert!(table.contains(ApiId::DeviceGetProperties));
    assert!(table
        .apis()
        .all(|api| api.family() != ApiFamily::Runtime));
    assert_eq!(driver.driver_type(), DriverType::Npu);
}

#[test]
fn legacy_mode_builds_a_version_one_table() {
    let driver = NullDriver::new(NullDriverConfig {
        legacy_only: true,
        ..NullDriverConfig::default()
    });
    let table = build_ddi_table(&driver, ApiVersion::CURRENT).unwrap();
    assert_eq!(table.version(), ApiVersion::V1_0);
    assert!(table.contains(ApiId::Init));
    assert!(table.contains(ApiId::DeviceGet));
    assert!(!table.contains(ApiId::ContextCreate));
}

#[test]
fn newer_versions_are_refused() {
    let driver = NullDriver::new(NullDriverConfig {
        max_version: ApiVersion::V1_5,
        ..NullDriverConfig::default()
    });
    let err = build_ddi_table(&driver, ApiVersion::V1_10).unwrap_err();
    assert!(matches!(err, DdiError::UnsupportedVersion { .. }), "{err}");
    assert!(build_ddi_table(&driver, ApiVersion::V1_5).is_ok());
}
