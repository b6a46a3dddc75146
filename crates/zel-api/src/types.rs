//! Descriptors, properties, flags and enumerations passed through the API.
//!
//! Enumerations are open `u32` newtypes rather than Rust enums: the validation layer has to be
//! able to see (and reject) out-of-range values an application passes in.

use bitflags::bitflags;

use crate::no_handle_fields;

macro_rules! open_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:expr,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            /// Highest defined enumerator.
            pub const MAX: $name = {
                let values = [$($value,)*];
                let mut max = 0;
                let mut i = 0;
                while i < values.len() {
                    if values[i] > max {
                        max = values[i];
                    }
                    i += 1;
                }
                $name(max)
            };

            pub fn is_valid(self) -> bool {
                self.0 <= Self::MAX.0
            }
        }
    };
}

/// Declared driver category, used by the ordering policy and init type filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DriverType {
    Other = 0,
    DiscreteGpu = 1,
    Gpu = 2,
    IntegratedGpu = 3,
    Mixed = 4,
    Npu = 5,
}

impl DriverType {
    /// Whether a driver of this type is visible to an init call filtering on `flags`.
    pub fn matches(self, flags: InitDriverTypeFlags) -> bool {
        match self {
            DriverType::DiscreteGpu | DriverType::IntegratedGpu | DriverType::Gpu => {
                flags.contains(InitDriverTypeFlags::GPU)
            }
            DriverType::Npu => flags.contains(InitDriverTypeFlags::NPU),
            DriverType::Mixed | DriverType::Other => !flags.is_empty(),
        }
    }
}

bitflags! {
    /// Legacy `zeInit` flags. Empty means "all driver types".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InitFlags: u32 {
        const GPU_ONLY = 1 << 0;
        const VPU_ONLY = 1 << 1;
    }
}

impl InitFlags {
    /// Driver-type filter equivalent to these legacy flags.
    pub fn driver_types(self) -> InitDriverTypeFlags {
        if self.is_empty() {
            return InitDriverTypeFlags::from_bits_retain(u32::MAX);
        }
        let mut types = InitDriverTypeFlags::empty();
        if self.contains(InitFlags::GPU_ONLY) {
            types |= InitDriverTypeFlags::GPU;
        }
        if self.contains(InitFlags::VPU_ONLY) {
            types |= InitDriverTypeFlags::NPU;
        }
        types
    }
}

bitflags! {
    /// `zeInitDrivers` type filter. `u32::MAX` selects every type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InitDriverTypeFlags: u32 {
        const GPU = 1 << 0;
        const NPU = 1 << 1;
    }
}

impl InitDriverTypeFlags {
    pub fn any() -> Self {
        Self::from_bits_retain(u32::MAX)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SysmanInitFlags: u32 {
        const PLACEHOLDER = 1 << 0;
    }
}

/// Structure-type tag of an extension struct in a `p_next` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct StructureType(pub u32);

impl StructureType {
    pub const RELAXED_ALLOCATION_LIMITS_EXP_DESC: StructureType = StructureType(0x0001_0011);
    pub const EXTERNAL_MEMORY_EXPORT_DESC: StructureType = StructureType(0x0001_0012);
    pub const RAYTRACING_MEM_ALLOC_EXT_DESC: StructureType = StructureType(0x0001_0002);
}

/// Payload of a known extension struct; anything else is carried opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionPayload {
    RelaxedAllocationLimits { flags: RelaxedAllocationLimitsFlags },
    ExternalMemoryExport { flags: ExternalMemoryTypeFlags },
    RaytracingMemAlloc { flags: u32 },
    Opaque(Vec<u8>),
}

/// One element of a descriptor's `p_next` extension chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDesc {
    pub stype: StructureType,
    pub payload: ExtensionPayload,
    pub p_next: Option<Box<ExtensionDesc>>,
}

impl ExtensionDesc {
    pub fn new(stype: StructureType, payload: ExtensionPayload) -> Self {
        Self {
            stype,
            payload,
            p_next: None,
        }
    }

    pub fn chain(mut self, next: ExtensionDesc) -> Self {
        self.p_next = Some(Box::new(next));
        self
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RelaxedAllocationLimitsFlags: u32 {
        const MAX_SIZE = 1 << 0;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExternalMemoryTypeFlags: u32 {
        const OPAQUE_FD = 1 << 0;
        const DMA_BUF = 1 << 1;
        const OPAQUE_WIN32 = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InitDriverTypeDesc {
    pub flags: InitDriverTypeFlags,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContextFlags: u32 {
        const TBD = 1 << 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextDesc {
    pub flags: ContextFlags,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandQueueFlags: u32 {
        const EXPLICIT_ONLY = 1 << 0;
        const IN_ORDER = 1 << 1;
    }
}

open_enum! {
    CommandQueueMode {
        DEFAULT = 0,
        SYNCHRONOUS = 1,
        ASYNCHRONOUS = 2,
    }
}

open_enum! {
    CommandQueuePriority {
        NORMAL = 0,
        PRIORITY_LOW = 1,
        PRIORITY_HIGH = 2,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandQueueDesc {
    pub ordinal: u32,
    pub index: u32,
    pub flags: CommandQueueFlags,
    pub mode: CommandQueueMode,
    pub priority: CommandQueuePriority,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandListFlags: u32 {
        const RELAXED_ORDERING = 1 << 0;
        const MAXIMIZE_THROUGHPUT = 1 << 1;
        const EXPLICIT_ONLY = 1 << 2;
        const IN_ORDER = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandListDesc {
    pub command_queue_group_ordinal: u32,
    pub flags: CommandListFlags,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FenceFlags: u32 {
        const SIGNALED = 1 << 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FenceDesc {
    pub flags: FenceFlags,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventPoolFlags: u32 {
        const HOST_VISIBLE = 1 << 0;
        const IPC = 1 << 1;
        const KERNEL_TIMESTAMP = 1 << 2;
        const KERNEL_MAPPED_TIMESTAMP = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventPoolDesc {
    pub flags: EventPoolFlags,
    pub count: u32,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventScopeFlags: u32 {
        const SUBDEVICE = 1 << 0;
        const DEVICE = 1 << 1;
        const HOST = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventDesc {
    pub index: u32,
    pub signal: EventScopeFlags,
    pub wait: EventScopeFlags,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageFlags: u32 {
        const KERNEL_WRITE = 1 << 0;
        const BIAS_UNCACHED = 1 << 1;
    }
}

open_enum! {
    ImageType {
        TYPE_1D = 0,
        TYPE_1DARRAY = 1,
        TYPE_2D = 2,
        TYPE_2DARRAY = 3,
        TYPE_3D = 4,
        BUFFER = 5,
    }
}

open_enum! {
    ImageFormatLayout {
        L8 = 0,
        L16 = 1,
        L32 = 2,
        L8_8 = 5,
        L8_8_8_8 = 10,
        L32_32_32_32 = 16,
        NV12 = 25,
        P416 = 44,
    }
}

open_enum! {
    ImageFormatType {
        UINT = 0,
        SINT = 1,
        UNORM = 2,
        SNORM = 3,
        FLOAT = 4,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageFormat {
    pub layout: ImageFormatLayout,
    pub ty: ImageFormatType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageDesc {
    pub flags: ImageFlags,
    pub image_type: ImageType,
    pub format: ImageFormat,
    pub width: u64,
    pub height: u32,
    pub depth: u32,
    pub array_levels: u32,
    pub mip_levels: u32,
    pub p_next: Option<Box<ExtensionDesc>>,
}

open_enum! {
    ModuleFormat {
        IL_SPIRV = 0,
        NATIVE = 1,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleDesc {
    pub format: ModuleFormat,
    pub input: Vec<u8>,
    pub build_flags: Option<String>,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KernelFlags: u32 {
        const FORCE_RESIDENCY = 1 << 0;
        const EXPLICIT_RESIDENCY = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KernelDesc {
    pub flags: KernelFlags,
    pub kernel_name: Option<String>,
    pub p_next: Option<Box<ExtensionDesc>>,
}

open_enum! {
    SamplerAddressMode {
        NONE = 0,
        REPEAT = 1,
        CLAMP = 2,
        CLAMP_TO_BORDER = 3,
        MIRROR = 4,
    }
}

open_enum! {
    SamplerFilterMode {
        NEAREST = 0,
        LINEAR = 1,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SamplerDesc {
    pub address_mode: SamplerAddressMode,
    pub filter_mode: SamplerFilterMode,
    pub normalized: bool,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceMemAllocFlags: u32 {
        const BIAS_CACHED = 1 << 0;
        const BIAS_UNCACHED = 1 << 1;
        const BIAS_INITIAL_PLACEMENT = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceMemAllocDesc {
    pub flags: DeviceMemAllocFlags,
    pub ordinal: u32,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HostMemAllocFlags: u32 {
        const BIAS_CACHED = 1 << 0;
        const BIAS_UNCACHED = 1 << 1;
        const BIAS_WRITE_COMBINED = 1 << 2;
        const BIAS_INITIAL_PLACEMENT = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostMemAllocDesc {
    pub flags: HostMemAllocFlags,
    pub p_next: Option<Box<ExtensionDesc>>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PhysicalMemFlags: u32 {
        const ALLOCATE_ON_DEVICE = 1 << 0;
        const ALLOCATE_ON_HOST = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhysicalMemDesc {
    pub flags: PhysicalMemFlags,
    pub size: usize,
    pub p_next: Option<Box<ExtensionDesc>>,
}

/// Thread-group launch dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupCount {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriverProperties {
    pub uuid: [u8; 16],
    pub driver_version: u32,
}

open_enum! {
    DeviceType {
        GPU = 1,
        CPU = 2,
        FPGA = 3,
        MCA = 4,
        VPU = 5,
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DevicePropertyFlags: u32 {
        const INTEGRATED = 1 << 0;
        const SUBDEVICE = 1 << 1;
        const ECC = 1 << 2;
        const ONDEMANDPAGING = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceProperties {
    pub device_type: DeviceType,
    pub vendor_id: u32,
    pub device_id: u32,
    pub flags: DevicePropertyFlags,
    pub sub_device_id: u32,
    pub core_clock_rate: u32,
    pub max_mem_alloc_size: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandQueueGroupProperties {
    pub flags: u32,
    pub max_memory_fill_pattern_size: usize,
    pub num_queues: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceMemoryProperties {
    pub flags: u32,
    pub max_clock_rate: u32,
    pub max_bus_width: u32,
    pub total_size: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceMemoryAccessProperties {
    pub host_alloc_capabilities: u32,
    pub device_alloc_capabilities: u32,
    pub shared_single_device_alloc_capabilities: u32,
    pub shared_cross_device_alloc_capabilities: u32,
    pub shared_system_alloc_capabilities: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SysmanDeviceProperties {
    pub core: DeviceProperties,
    pub num_subdevices: u32,
    pub serial_number: String,
    pub board_number: String,
    pub brand_name: String,
    pub model_name: String,
    pub vendor_name: String,
    pub driver_version: String,
}

no_handle_fields!(
    crate::ApiVersion,
    InitFlags,
    InitDriverTypeDesc,
    SysmanInitFlags,
    ContextDesc,
    CommandQueueDesc,
    CommandListDesc,
    FenceDesc,
    EventPoolDesc,
    EventDesc,
    ImageDesc,
    ModuleDesc,
    KernelDesc,
    SamplerDesc,
    DeviceMemAllocDesc,
    HostMemAllocDesc,
    PhysicalMemDesc,
    GroupCount,
    DriverProperties,
    DeviceProperties,
    CommandQueueGroupProperties,
    DeviceMemoryProperties,
    DeviceMemoryAccessProperties,
    SysmanDeviceProperties,
);
