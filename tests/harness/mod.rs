#![allow(dead_code)]

use std::sync::Arc;

use zel::api::{
    ContextCreateParams, ContextDesc, ContextHandle, DeviceGetParams, DeviceHandle,
    DriverGetParams, DriverHandle, DriverType, InitParams, ZeResult,
};
use zel::{Loader, LoaderConfig};
use zel_null_driver::{NullDriver, NullDriverConfig};

/// Installs a `RUST_LOG` driven subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A loader built around in-process null drivers, kept alongside them for inspection.
pub struct Rig {
    pub loader: Loader,
    pub drivers: Vec<NullDriver>,
}

impl Rig {
    pub fn new(config: LoaderConfig, drivers: Vec<NullDriverConfig>) -> Self {
        init_tracing();
        let drivers: Vec<_> = drivers.into_iter().map(NullDriver::new).collect();
        let loader = drivers
            .iter()
            .fold(Loader::builder(config), |builder, driver| {
                builder.driver(Arc::new(driver.clone()))
            })
            .build();
        Self { loader, drivers }
    }

    pub fn gpu_and_npu(config: LoaderConfig, wrap_npu: bool) -> Self {
        Self::new(
            config,
            vec![
                NullDriverConfig::new(0, DriverType::Gpu),
                NullDriverConfig {
                    disable_ddi_ext: wrap_npu,
                    ..NullDriverConfig::new(1, DriverType::Npu)
                },
            ],
        )
    }

    /// `zeInit` followed by the two-step `zeDriverGet`.
    pub fn init(&self) -> Vec<DriverHandle> {
        assert_eq!(self.loader.call(&mut InitParams::default()), ZeResult::Success);
        let mut query = DriverGetParams {
            count: Some(0),
            drivers: None,
        };
        assert_eq!(self.loader.call(&mut query), ZeResult::Success);
        let mut fetch = DriverGetParams {
            count: query.count,
            drivers: Some(Vec::new()),
        };
        assert_eq!(self.loader.call(&mut fetch), ZeResult::Success);
        fetch.drivers.unwrap_or_default()
    }

    pub fn devices(&self, driver: DriverHandle) -> Vec<DeviceHandle> {
        let mut params = DeviceGetParams {
            driver,
            count: Some(8),
            devices: Some(Vec::new()),
        };
        assert_eq!(self.loader.call(&mut params), ZeResult::Success);
        params.devices.unwrap_or_default()
    }

    pub fn context(&self, driver: DriverHandle) -> ContextHandle {
        let mut params = ContextCreateParams {
            driver,
            desc: Some(ContextDesc::default()),
            context: Some(ContextHandle::NULL),
        };
        assert_eq!(self.loader.call(&mut params), ZeResult::Success);
        params.context.unwrap_or_default()
    }
}
