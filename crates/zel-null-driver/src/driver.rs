use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};
use zel_api::{
    ApiFamily, ApiId, ApiParams, ApiVersion, CommandQueueGroupProperties, ContextHandle,
    DeviceHandle, DeviceMemoryAccessProperties, DeviceMemoryProperties, DevicePropertyFlags,
    DeviceProperties, DeviceType, DriverHandle, DriverProperties, DriverType, FabricVertexHandle,
    Handle, SysmanDeviceProperties, ZeResult,
};
use zel_ddi::{DdiFn, DdiTableBuilder, DriverExports, DriverTag, LegacyGlobalTable};

use crate::config::NullDriverConfig;

const DRIVER_PAYLOAD: u64 = 1;
const DEVICE_PAYLOAD: u64 = 2;
const DEFAULT_CONTEXT_PAYLOAD: u64 = 3;
const FABRIC_VERTEX_PAYLOAD: u64 = 4;
const FIRST_OBJECT_PAYLOAD: u64 = 0x8080_0000;

const FIRST_ADDRESS: u64 = 0x1000_0000;
const PAGE_SIZE: u64 = 0x1000;

const BUILD_LOG: &str = "null driver: build succeeded";

struct Shared {
    config: NullDriverConfig,
    tag: AtomicU8,
    version: AtomicU32,
    next_object: AtomicU64,
    next_address: AtomicU64,
    calls: Mutex<Vec<ApiId>>,
}

/// Driver that accepts every call and answers with deterministic results.
///
/// Every enumeration reports exactly one object, creations hand out fresh handles and each call
/// is recorded so tests can observe which entry points were reached.
#[derive(Clone)]
pub struct NullDriver {
    shared: Arc<Shared>,
}

impl NullDriver {
    pub fn new(config: NullDriverConfig) -> Self {
        let version = if config.legacy_only {
            ApiVersion::V1_0
        } else {
            config.max_version
        };
        Self {
            shared: Arc::new(Shared {
                config,
                tag: AtomicU8::new(0),
                version: AtomicU32::new(version.0),
                next_object: AtomicU64::new(FIRST_OBJECT_PAYLOAD),
                next_address: AtomicU64::new(FIRST_ADDRESS),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &NullDriverConfig {
        &self.shared.config
    }

    /// Tag accepted through the DDI handle extension, if any.
    pub fn tag(&self) -> Option<DriverTag> {
        DriverTag::new(self.shared.tag.load(Ordering::Acquire))
    }

    /// Native handle of the single driver object.
    pub fn driver_handle(&self) -> DriverHandle {
        self.shared.driver()
    }

    /// Native handle of the single device.
    pub fn device_handle(&self) -> DeviceHandle {
        self.shared.device()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ApiId> {
        self.shared.calls.lock().clone()
    }

    pub fn call_count(&self, symbol: &str) -> usize {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|api| api.symbol() == symbol)
            .count()
    }

    pub fn clear_calls(&self) {
        self.shared.calls.lock().clear();
    }

    fn entry(&self) -> DdiFn {
        let shared = self.shared.clone();
        Arc::new(move |params: &mut ApiParams| shared.call(params))
    }

    fn exported(&self, api: ApiId) -> Option<DdiFn> {
        (!self.shared.config.missing_apis.contains(&api)).then(|| self.entry())
    }
}

impl DriverExports for NullDriver {
    fn name(&self) -> &str {
        &self.shared.config.name
    }

    fn driver_type(&self) -> DriverType {
        self.shared.config.driver_type
    }

    fn max_api_version(&self) -> ApiVersion {
        if self.shared.config.legacy_only {
            return ApiVersion::V1_0;
        }
        self.shared.config.max_version
    }

    fn proc_addr_table(
        &self,
        family: ApiFamily,
        version: ApiVersion,
        table: &mut DdiTableBuilder,
    ) -> Option<ZeResult> {
        let config = &self.shared.config;
        match family {
            ApiFamily::Global | ApiFamily::Core if config.legacy_only => return None,
            ApiFamily::Runtime if config.disable_zer_api => return None,
            _ => {}
        }
        if version > config.max_version {
            return Some(ZeResult::ErrorUnsupportedVersion);
        }
        if family == ApiFamily::Core {
            self.shared.version.store(version.0, Ordering::Release);
        }

        for api in ApiId::ALL.iter().filter(|api| api.family() == family) {
            if let Some(entry) = self.exported(*api) {
                table.insert(*api, entry);
            }
        }
        Some(ZeResult::Success)
    }

    fn legacy_global_table(&self) -> Option<LegacyGlobalTable> {
        if !self.shared.config.legacy_only {
            return None;
        }
        Some(LegacyGlobalTable {
            init: self.exported(ApiId::Init),
            driver_get: self.exported(ApiId::DriverGet),
            driver_get_api_version: self.exported(ApiId::DriverGetApiVersion),
            driver_get_properties: self.exported(ApiId::DriverGetProperties),
            device_get: self.exported(ApiId::DeviceGet),
        })
    }

    fn enable_ddi_handles(&self, tag: DriverTag) -> bool {
        if self.shared.config.disable_ddi_ext {
            debug!(driver = %self.shared.config.name, "DDI handle extension disabled");
            return false;
        }
        self.shared.tag.store(tag.raw(), Ordering::Release);
        true
    }
}

impl Shared {
    fn handle(&self, payload: u64) -> u64 {
        let value = (u64::from(self.config.driver_id) << 32) | payload;
        match DriverTag::new(self.tag.load(Ordering::Acquire)) {
            Some(tag) => tag.apply(value),
            None => value,
        }
    }

    fn driver(&self) -> DriverHandle {
        DriverHandle(self.handle(DRIVER_PAYLOAD))
    }

    fn device(&self) -> DeviceHandle {
        DeviceHandle(self.handle(DEVICE_PAYLOAD))
    }

    fn create<H: Handle>(&self, out: &mut Option<H>) -> ZeResult {
        let payload = self.next_object.fetch_add(1, Ordering::Relaxed);
        write(out, H::from_raw(self.handle(payload)))
    }

    fn allocate(&self, size: usize, alignment: usize, out: &mut Option<u64>) -> ZeResult {
        let align = (alignment as u64).max(PAGE_SIZE);
        let span = (size as u64).max(1).div_ceil(align) * align;
        let address = self.next_address.fetch_add(span, Ordering::Relaxed);
        write(out, address.next_multiple_of(align))
    }

    fn device_properties(&self) -> DeviceProperties {
        let mut flags = DevicePropertyFlags::empty();
        if self.config.driver_type == DriverType::IntegratedGpu {
            flags |= DevicePropertyFlags::INTEGRATED;
        }
        DeviceProperties {
            device_type: match self.config.driver_type {
                DriverType::Npu => DeviceType::VPU,
                _ => DeviceType::GPU,
            },
            vendor_id: 0x8086,
            device_id: self.config.driver_id,
            flags,
            sub_device_id: 0,
            core_clock_rate: 1000,
            max_mem_alloc_size: 1 << 32,
            name: "Null Device".to_string(),
        }
    }

    fn call(&self, params: &mut ApiParams) -> ZeResult {
        let api = params.api();
        self.calls.lock().push(api);
        trace!(driver = %self.config.name, api = api.symbol(), "null driver call");

        match params {
            ApiParams::InitDrivers(p) => fill(&mut p.count, &mut p.drivers, &[self.driver()]),
            ApiParams::DriverGet(p) => fill(&mut p.count, &mut p.drivers, &[self.driver()]),
            ApiParams::DriverGetApiVersion(p) => write(
                &mut p.version,
                ApiVersion(self.version.load(Ordering::Acquire)),
            ),
            ApiParams::DriverGetProperties(p) => {
                let mut uuid = [0u8; 16];
                uuid[..4].copy_from_slice(&self.config.driver_id.to_le_bytes());
                uuid[15] = b'N';
                write(
                    &mut p.properties,
                    DriverProperties {
                        uuid,
                        driver_version: 1,
                    },
                )
            }
            ApiParams::DriverGetLastErrorDescription(p) => write(&mut p.description, String::new()),

            ApiParams::RtGetLastErrorDescription(p) => write(&mut p.description, String::new()),
            ApiParams::RtTranslateDeviceHandleToIdentifier(p) => {
                if p.device == self.device() {
                    p.identifier = 0;
                    ZeResult::Success
                } else {
                    p.identifier = u32::MAX;
                    ZeResult::ErrorInvalidNullHandle
                }
            }
            ApiParams::RtTranslateIdentifierToDeviceHandle(p) => {
                if p.identifier == 0 {
                    p.device = self.device();
                    ZeResult::Success
                } else {
                    p.device = DeviceHandle::NULL;
                    ZeResult::ErrorInvalidArgument
                }
            }
            ApiParams::RtGetDefaultContext(p) => {
                p.context = ContextHandle(self.handle(DEFAULT_CONTEXT_PAYLOAD));
                ZeResult::Success
            }

            ApiParams::DeviceGet(p) => fill(&mut p.count, &mut p.devices, &[self.device()]),
            ApiParams::DeviceGetSubDevices(p) => fill(&mut p.count, &mut p.sub_devices, &[]),
            ApiParams::DeviceGetProperties(p) => write(&mut p.properties, self.device_properties()),
            ApiParams::DeviceGetCommandQueueGroupProperties(p) => {
                let group = CommandQueueGroupProperties {
                    // compute | copy
                    flags: 0b11,
                    max_memory_fill_pattern_size: 4,
                    num_queues: 1,
                };
                fill(&mut p.count, &mut p.properties, &[group])
            }
            ApiParams::DeviceGetMemoryProperties(p) => {
                let memory = DeviceMemoryProperties {
                    total_size: 1 << 32,
                    name: "Null Memory".to_string(),
                    ..Default::default()
                };
                fill(&mut p.count, &mut p.properties, &[memory])
            }
            ApiParams::DeviceGetMemoryAccessProperties(p) => {
                write(&mut p.properties, DeviceMemoryAccessProperties::default())
            }

            ApiParams::ContextCreate(p) => self.create(&mut p.context),
            ApiParams::CommandQueueCreate(p) => self.create(&mut p.queue),
            ApiParams::CommandListCreate(p) => self.create(&mut p.list),
            ApiParams::CommandListCreateImmediate(p) => self.create(&mut p.list),
            ApiParams::FenceCreate(p) => self.create(&mut p.fence),
            ApiParams::EventPoolCreate(p) => self.create(&mut p.pool),
            ApiParams::EventCreate(p) => self.create(&mut p.event),
            ApiParams::ImageCreate(p) => self.create(&mut p.image),
            ApiParams::ModuleCreate(p) => {
                let result = self.create(&mut p.module);
                if result.is_success() && p.build_log.is_some() {
                    return self.create(&mut p.build_log);
                }
                result
            }
            ApiParams::ModuleBuildLogGetString(p) => {
                let Some(size) = p.size.as_mut() else {
                    return ZeResult::ErrorInvalidNullPointer;
                };
                if let Some(log) = p.log.as_mut() {
                    *log = BUILD_LOG.to_string();
                }
                *size = BUILD_LOG.len() + 1;
                ZeResult::Success
            }
            ApiParams::KernelCreate(p) => self.create(&mut p.kernel),
            ApiParams::SamplerCreate(p) => self.create(&mut p.sampler),
            ApiParams::PhysicalMemCreate(p) => self.create(&mut p.physical_memory),

            ApiParams::MemAllocDevice(p) => self.allocate(p.size, p.alignment, &mut p.ptr),
            ApiParams::MemAllocHost(p) => self.allocate(p.size, p.alignment, &mut p.ptr),

            ApiParams::FabricVertexGetExp(p) => fill(
                &mut p.count,
                &mut p.vertices,
                &[FabricVertexHandle(self.handle(FABRIC_VERTEX_PAYLOAD))],
            ),
            ApiParams::FabricEdgeGetExp(p) => fill(&mut p.count, &mut p.edges, &[]),

            ApiParams::SysmanDriverGet(p) => fill(&mut p.count, &mut p.drivers, &[self.driver()]),
            ApiParams::SysmanDeviceGet(p) => fill(&mut p.count, &mut p.devices, &[self.device()]),
            ApiParams::SysmanDeviceGetProperties(p) => write(
                &mut p.properties,
                SysmanDeviceProperties {
                    core: self.device_properties(),
                    serial_number: format!("NULL-{}", self.config.driver_id),
                    brand_name: "Null".to_string(),
                    model_name: "Null Device".to_string(),
                    vendor_name: "Null".to_string(),
                    driver_version: "1".to_string(),
                    ..Default::default()
                },
            ),

            // Destroys, appends, synchronization and the rest have nothing to report.
            _ => ZeResult::Success,
        }
    }
}

fn write<T>(out: &mut Option<T>, value: T) -> ZeResult {
    match out {
        Some(slot) => {
            *slot = value;
            ZeResult::Success
        }
        None => ZeResult::ErrorInvalidNullPointer,
    }
}

/// Count-query convention: a zero count or a missing array asks for the number of items;
/// otherwise up to `count` items are written and `count` is set to how many were.
fn fill<T: Clone>(count: &mut Option<u32>, out: &mut Option<Vec<T>>, items: &[T]) -> ZeResult {
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
