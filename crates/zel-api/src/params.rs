//! Declarative table of every dispatchable entry point.
//!
//! Each row names the API, its exported symbol, its DDI family, the field that identifies the
//! owning driver (if any) and the role of every parameter:
//!
//! - `input`: passed to the driver, handles translated loader → native;
//! - `inout`: like `input`, and the driver's value is copied back (counts);
//! - `output`: written by the driver, handles wrapped native → loader on the way back;
//! - `release`: an input handle whose loader wrapper is dropped once the driver reports success.
//!
//! Pointer parameters are `Option<_>`: `None` is a null pointer. The table expands into one
//! `*Params` struct per API, the [`ApiId`] enum and the [`ApiParams`] tagged variant that the
//! dispatch core, tracers and the validation layer operate on.

use crate::handle::{
    CommandListHandle, CommandQueueHandle, ContextHandle, DeviceHandle, DriverHandle,
    EventHandle, EventPoolHandle, FabricEdgeHandle, FabricVertexHandle, FenceHandle, Handle,
    HandleFields, HandleKind, HandleVisitor, ImageHandle, KernelHandle, ModuleBuildLogHandle,
    ModuleHandle, PhysicalMemHandle, SamplerHandle,
};
use crate::types::{
    CommandListDesc, CommandQueueDesc, CommandQueueGroupProperties, ContextDesc,
    DeviceMemAllocDesc, DeviceMemoryAccessProperties, DeviceMemoryProperties, DeviceProperties,
    DriverProperties, EventDesc, EventPoolDesc, FenceDesc, GroupCount, HostMemAllocDesc,
    ImageDesc, InitDriverTypeDesc, InitFlags, KernelDesc, ModuleDesc, PhysicalMemDesc,
    SamplerDesc, SysmanDeviceProperties, SysmanInitFlags,
};
use crate::{ApiVersion, ZeResult};

/// Groups of entry points a driver exports through one "get proc addr table" call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiFamily {
    /// Initialization entry points (`zeInit`, `zeInitDrivers`).
    Global,
    Core,
    /// Runtime identification entry points (`zer*`).
    Runtime,
    /// Device management entry points (`zes*`).
    Sysman,
}

impl ApiFamily {
    pub const ALL: [ApiFamily; 4] = [
        ApiFamily::Global,
        ApiFamily::Core,
        ApiFamily::Runtime,
        ApiFamily::Sysman,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ApiFamily::Global => "global",
            ApiFamily::Core => "core",
            ApiFamily::Runtime => "runtime",
            ApiFamily::Sysman => "sysman",
        }
    }
}

/// Static shape of one API's parameter struct.
pub trait ApiCall: Clone + Default + Send + 'static {
    const API: ApiId;

    fn into_params(self) -> ApiParams;

    fn from_params(params: ApiParams) -> Option<Self>;

    fn from_params_mut(params: &mut ApiParams) -> Option<&mut Self>;

    /// Handle that identifies the owning driver, or `None` for calls routed through the registry.
    fn owner(&self) -> Option<(HandleKind, u64)>;

    /// Visits every handle the driver reads.
    fn visit_inputs(&mut self, visitor: &mut HandleVisitor<'_>) -> Result<(), ZeResult>;

    /// Copies driver-written fields from `native` into `self`, visiting their handles first.
    fn merge_outputs(
        &mut self,
        native: Self,
        visitor: &mut HandleVisitor<'_>,
    ) -> Result<(), ZeResult>;

    /// Handle whose wrapper is dropped once the call succeeds.
    fn released(&self) -> Option<(HandleKind, u64)>;
}

fn kind_raw<H: Handle>(handle: H) -> (HandleKind, u64) {
    (H::KIND, handle.raw())
}

macro_rules! visit_input {
    (input, $field:expr, $visitor:expr) => {
        HandleFields::visit_handles($field, $visitor)?;
    };
    (inout, $field:expr, $visitor:expr) => {
        HandleFields::visit_handles($field, $visitor)?;
    };
    (release, $field:expr, $visitor:expr) => {
        HandleFields::visit_handles($field, $visitor)?;
    };
    (output, $field:expr, $visitor:expr) => {};
}

macro_rules! merge_output {
    (input, $dst:expr, $src:expr, $visitor:expr) => {};
    (release, $dst:expr, $src:expr, $visitor:expr) => {};
    (inout, $dst:expr, $src:expr, $visitor:expr) => {{
        let mut value = $src;
        HandleFields::visit_handles(&mut value, $visitor)?;
        $dst = value;
    }};
    (output, $dst:expr, $src:expr, $visitor:expr) => {{
        let mut value = $src;
        HandleFields::visit_handles(&mut value, $visitor)?;
        $dst = value;
    }};
}

macro_rules! released_handle {
    (release, $field:expr) => {
        if !Handle::is_null($field) {
            return Some(kind_raw($field));
        }
    };
    ($role:ident, $field:expr) => {};
}

macro_rules! owner_handle {
    ($params:ident) => {
        None
    };
    ($params:ident, $owner:ident) => {
        Some(kind_raw($params.$owner))
    };
}

macro_rules! apis {
    ($(
        $(#[$doc:meta])*
        $variant:ident => $params:ident($symbol:literal, $family:ident $(, by $owner:ident)?) {
            $($role:ident $field:ident: $ty:ty),* $(,)?
        }
    )*) => {
        /// Identifier of a dispatchable entry point.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ApiId {
            $($variant,)*
        }

        impl ApiId {
            pub const ALL: &'static [ApiId] = &[$(ApiId::$variant,)*];
            pub const COUNT: usize = ApiId::ALL.len();

            /// Exported symbol name, e.g. `zeDeviceGet`.
            pub fn symbol(self) -> &'static str {
                match self {
                    $(ApiId::$variant => $symbol,)*
                }
            }

            pub fn family(self) -> ApiFamily {
                match self {
                    $(ApiId::$variant => ApiFamily::$family,)*
                }
            }

            /// Dense index in `0..COUNT`.
            pub fn index(self) -> usize {
                self as usize
            }

            pub fn from_symbol(symbol: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|api| api.symbol() == symbol)
            }
        }

        $(
            $(#[$doc])*
            #[derive(Debug, Clone, PartialEq, Default)]
            pub struct $params {
                $(pub $field: $ty,)*
            }

            impl ApiCall for $params {
                const API: ApiId = ApiId::$variant;

                fn into_params(self) -> ApiParams {
                    ApiParams::$variant(self)
                }

                fn from_params(params: ApiParams) -> Option<Self> {
                    match params {
                        ApiParams::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn from_params_mut(params: &mut ApiParams) -> Option<&mut Self> {
                    match params {
                        ApiParams::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                #[allow(unused_variables)]
                fn owner(&self) -> Option<(HandleKind, u64)> {
                    let params = self;
                    owner_handle!(params $(, $owner)?)
                }

                #[allow(unused_variables)]
                fn visit_inputs(
                    &mut self,
                    visitor: &mut HandleVisitor<'_>,
                ) -> Result<(), ZeResult> {
                    $(visit_input!($role, &mut self.$field, visitor);)*
                    Ok(())
                }

                #[allow(unused_variables)]
                fn merge_outputs(
                    &mut self,
                    native: Self,
                    visitor: &mut HandleVisitor<'_>,
                ) -> Result<(), ZeResult> {
                    $(merge_output!($role, self.$field, native.$field, visitor);)*
                    Ok(())
                }

                fn released(&self) -> Option<(HandleKind, u64)> {
                    $(released_handle!($role, self.$field);)*
                    None
                }
            }

            impl From<$params> for ApiParams {
                fn from(params: $params) -> Self {
                    ApiParams::$variant(params)
                }
            }
        )*

        /// Parameter snapshot of one call, tagged by API.
        ///
        /// Tracer callbacks receive it mutably, so a prologue can rewrite arguments before the
        /// driver sees them.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ApiParams {
            $($variant($params),)*
        }

        impl ApiParams {
            pub fn api(&self) -> ApiId {
                match self {
                    $(ApiParams::$variant(_) => ApiId::$variant,)*
                }
            }

            pub fn owner(&self) -> Option<(HandleKind, u64)> {
                match self {
                    $(ApiParams::$variant(params) => params.owner(),)*
                }
            }

            pub fn visit_inputs(&mut self, visitor: &mut HandleVisitor<'_>) -> Result<(), ZeResult> {
                match self {
                    $(ApiParams::$variant(params) => params.visit_inputs(visitor),)*
                }
            }

            /// Copies outputs of a driver-side copy back into the caller's snapshot.
            pub fn merge_outputs(
                &mut self,
                native: ApiParams,
                visitor: &mut HandleVisitor<'_>,
            ) -> Result<(), ZeResult> {
                match (self, native) {
                    $((ApiParams::$variant(app), ApiParams::$variant(native)) => {
                        app.merge_outputs(native, visitor)
                    })*
                    _ => Err(ZeResult::ErrorInvalidArgument),
                }
            }

            pub fn released(&self) -> Option<(HandleKind, u64)> {
                match self {
                    $(ApiParams::$variant(params) => params.released(),)*
                }
            }
        }
    };
}

apis! {
    Init => InitParams("zeInit", Global) {
        input flags: InitFlags,
    }
    InitDrivers => InitDriversParams("zeInitDrivers", Global) {
        inout count: Option<u32>,
        output drivers: Option<Vec<DriverHandle>>,
        input desc: Option<InitDriverTypeDesc>,
    }
    DriverGet => DriverGetParams("zeDriverGet", Core) {
        inout count: Option<u32>,
        output drivers: Option<Vec<DriverHandle>>,
    }
    DriverGetApiVersion => DriverGetApiVersionParams("zeDriverGetApiVersion", Core, by driver) {
        input driver: DriverHandle,
        output version: Option<ApiVersion>,
    }
    DriverGetProperties => DriverGetPropertiesParams("zeDriverGetProperties", Core, by driver) {
        input driver: DriverHandle,
        output properties: Option<DriverProperties>,
    }
    DriverGetLastErrorDescription => DriverGetLastErrorDescriptionParams("zeDriverGetLastErrorDescription", Core, by driver) {
        input driver: DriverHandle,
        output description: Option<String>,
    }

    RtGetLastErrorDescription => RtGetLastErrorDescriptionParams("zerGetLastErrorDescription", Runtime) {
        output description: Option<String>,
    }
    RtTranslateDeviceHandleToIdentifier => RtTranslateDeviceHandleToIdentifierParams("zerTranslateDeviceHandleToIdentifier", Runtime) {
        input device: DeviceHandle,
        output identifier: u32,
    }
    RtTranslateIdentifierToDeviceHandle => RtTranslateIdentifierToDeviceHandleParams("zerTranslateIdentifierToDeviceHandle", Runtime) {
        input identifier: u32,
        output device: DeviceHandle,
    }
    RtGetDefaultContext => RtGetDefaultContextParams("zerGetDefaultContext", Runtime) {
        output context: ContextHandle,
    }

    DeviceGet => DeviceGetParams("zeDeviceGet", Core, by driver) {
        input driver: DriverHandle,
        inout count: Option<u32>,
        output devices: Option<Vec<DeviceHandle>>,
    }
    DeviceGetSubDevices => DeviceGetSubDevicesParams("zeDeviceGetSubDevices", Core, by device) {
        input device: DeviceHandle,
        inout count: Option<u32>,
        output sub_devices: Option<Vec<DeviceHandle>>,
    }
    DeviceGetProperties => DeviceGetPropertiesParams("zeDeviceGetProperties", Core, by device) {
        input device: DeviceHandle,
        output properties: Option<DeviceProperties>,
    }
    DeviceGetCommandQueueGroupProperties => DeviceGetCommandQueueGroupPropertiesParams("zeDeviceGetCommandQueueGroupProperties", Core, by device) {
        input device: DeviceHandle,
        inout count: Option<u32>,
        output properties: Option<Vec<CommandQueueGroupProperties>>,
    }
    DeviceGetMemoryProperties => DeviceGetMemoryPropertiesParams("zeDeviceGetMemoryProperties", Core, by device) {
        input device: DeviceHandle,
        inout count: Option<u32>,
        output properties: Option<Vec<DeviceMemoryProperties>>,
    }
    DeviceGetMemoryAccessProperties => DeviceGetMemoryAccessPropertiesParams("zeDeviceGetMemoryAccessProperties", Core, by device) {
        input device: DeviceHandle,
        output properties: Option<DeviceMemoryAccessProperties>,
    }

    ContextCreate => ContextCreateParams("zeContextCreate", Core, by driver) {
        input driver: DriverHandle,
        input desc: Option<ContextDesc>,
        output context: Option<ContextHandle>,
    }
    ContextDestroy => ContextDestroyParams("zeContextDestroy", Core, by context) {
        release context: ContextHandle,
    }

    CommandQueueCreate => CommandQueueCreateParams("zeCommandQueueCreate", Core, by context) {
        input context: ContextHandle,
        input device: DeviceHandle,
        input desc: Option<CommandQueueDesc>,
        output queue: Option<CommandQueueHandle>,
    }
    CommandQueueDestroy => CommandQueueDestroyParams("zeCommandQueueDestroy", Core, by queue) {
        release queue: CommandQueueHandle,
    }
    CommandQueueExecuteCommandLists => CommandQueueExecuteCommandListsParams("zeCommandQueueExecuteCommandLists", Core, by queue) {
        input queue: CommandQueueHandle,
        input command_lists: Option<Vec<CommandListHandle>>,
        input fence: FenceHandle,
    }
    /// `timeout` is in nanoseconds; `u64::MAX` waits forever.
    CommandQueueSynchronize => CommandQueueSynchronizeParams("zeCommandQueueSynchronize", Core, by queue) {
        input queue: CommandQueueHandle,
        input timeout: u64,
    }

    CommandListCreate => CommandListCreateParams("zeCommandListCreate", Core, by context) {
        input context: ContextHandle,
        input device: DeviceHandle,
        input desc: Option<CommandListDesc>,
        output list: Option<CommandListHandle>,
    }
    CommandListCreateImmediate => CommandListCreateImmediateParams("zeCommandListCreateImmediate", Core, by context) {
        input context: ContextHandle,
        input device: DeviceHandle,
        input desc: Option<CommandQueueDesc>,
        output list: Option<CommandListHandle>,
    }
    CommandListDestroy => CommandListDestroyParams("zeCommandListDestroy", Core, by list) {
        release list: CommandListHandle,
    }
    CommandListClose => CommandListCloseParams("zeCommandListClose", Core, by list) {
        input list: CommandListHandle,
    }
    CommandListReset => CommandListResetParams("zeCommandListReset", Core, by list) {
        input list: CommandListHandle,
    }
    CommandListAppendBarrier => CommandListAppendBarrierParams("zeCommandListAppendBarrier", Core, by list) {
        input list: CommandListHandle,
        input signal_event: EventHandle,
        input wait_events: Vec<EventHandle>,
    }
    CommandListAppendMemoryCopy => CommandListAppendMemoryCopyParams("zeCommandListAppendMemoryCopy", Core, by list) {
        input list: CommandListHandle,
        input dst: u64,
        input src: u64,
        input size: usize,
        input signal_event: EventHandle,
        input wait_events: Vec<EventHandle>,
    }
    CommandListAppendSignalEvent => CommandListAppendSignalEventParams("zeCommandListAppendSignalEvent", Core, by list) {
        input list: CommandListHandle,
        input event: EventHandle,
    }
    CommandListAppendWaitOnEvents => CommandListAppendWaitOnEventsParams("zeCommandListAppendWaitOnEvents", Core, by list) {
        input list: CommandListHandle,
        input events: Option<Vec<EventHandle>>,
    }
    CommandListAppendEventReset => CommandListAppendEventResetParams("zeCommandListAppendEventReset", Core, by list) {
        input list: CommandListHandle,
        input event: EventHandle,
    }
    CommandListAppendLaunchKernel => CommandListAppendLaunchKernelParams("zeCommandListAppendLaunchKernel", Core, by list) {
        input list: CommandListHandle,
        input kernel: KernelHandle,
        input launch_args: Option<GroupCount>,
        input signal_event: EventHandle,
        input wait_events: Vec<EventHandle>,
    }

    FenceCreate => FenceCreateParams("zeFenceCreate", Core, by queue) {
        input queue: CommandQueueHandle,
        input desc: Option<FenceDesc>,
        output fence: Option<FenceHandle>,
    }
    FenceDestroy => FenceDestroyParams("zeFenceDestroy", Core, by fence) {
        release fence: FenceHandle,
    }
    FenceHostSynchronize => FenceHostSynchronizeParams("zeFenceHostSynchronize", Core, by fence) {
        input fence: FenceHandle,
        input timeout: u64,
    }
    FenceQueryStatus => FenceQueryStatusParams("zeFenceQueryStatus", Core, by fence) {
        input fence: FenceHandle,
    }
    FenceReset => FenceResetParams("zeFenceReset", Core, by fence) {
        input fence: FenceHandle,
    }

    EventPoolCreate => EventPoolCreateParams("zeEventPoolCreate", Core, by context) {
        input context: ContextHandle,
        input desc: Option<EventPoolDesc>,
        input devices: Vec<DeviceHandle>,
        output pool: Option<EventPoolHandle>,
    }
    EventPoolDestroy => EventPoolDestroyParams("zeEventPoolDestroy", Core, by pool) {
        release pool: EventPoolHandle,
    }
    EventCreate => EventCreateParams("zeEventCreate", Core, by pool) {
        input pool: EventPoolHandle,
        input desc: Option<EventDesc>,
        output event: Option<EventHandle>,
    }
    EventDestroy => EventDestroyParams("zeEventDestroy", Core, by event) {
        release event: EventHandle,
    }
    EventHostSignal => EventHostSignalParams("zeEventHostSignal", Core, by event) {
        input event: EventHandle,
    }
    EventHostSynchronize => EventHostSynchronizeParams("zeEventHostSynchronize", Core, by event) {
        input event: EventHandle,
        input timeout: u64,
    }
    EventQueryStatus => EventQueryStatusParams("zeEventQueryStatus", Core, by event) {
        input event: EventHandle,
    }
    EventHostReset => EventHostResetParams("zeEventHostReset", Core, by event) {
        input event: EventHandle,
    }

    ImageCreate => ImageCreateParams("zeImageCreate", Core, by context) {
        input context: ContextHandle,
        input device: DeviceHandle,
        input desc: Option<ImageDesc>,
        output image: Option<ImageHandle>,
    }
    ImageDestroy => ImageDestroyParams("zeImageDestroy", Core, by image) {
        release image: ImageHandle,
    }

    /// `build_log` is optional: `None` means the caller does not want a build log.
    ModuleCreate => ModuleCreateParams("zeModuleCreate", Core, by context) {
        input context: ContextHandle,
        input device: DeviceHandle,
        input desc: Option<ModuleDesc>,
        output module: Option<ModuleHandle>,
        output build_log: Option<ModuleBuildLogHandle>,
    }
    ModuleDestroy => ModuleDestroyParams("zeModuleDestroy", Core, by module) {
        release module: ModuleHandle,
    }
    ModuleBuildLogDestroy => ModuleBuildLogDestroyParams("zeModuleBuildLogDestroy", Core, by build_log) {
        release build_log: ModuleBuildLogHandle,
    }
    ModuleBuildLogGetString => ModuleBuildLogGetStringParams("zeModuleBuildLogGetString", Core, by build_log) {
        input build_log: ModuleBuildLogHandle,
        inout size: Option<usize>,
        output log: Option<String>,
    }

    KernelCreate => KernelCreateParams("zeKernelCreate", Core, by module) {
        input module: ModuleHandle,
        input desc: Option<KernelDesc>,
        output kernel: Option<KernelHandle>,
    }
    KernelDestroy => KernelDestroyParams("zeKernelDestroy", Core, by kernel) {
        release kernel: KernelHandle,
    }
    KernelSetArgumentValue => KernelSetArgumentValueParams("zeKernelSetArgumentValue", Core, by kernel) {
        input kernel: KernelHandle,
        input arg_index: u32,
        input arg_size: usize,
        input arg_value: Option<Vec<u8>>,
    }
    KernelSetGroupSize => KernelSetGroupSizeParams("zeKernelSetGroupSize", Core, by kernel) {
        input kernel: KernelHandle,
        input group_size_x: u32,
        input group_size_y: u32,
        input group_size_z: u32,
    }

    SamplerCreate => SamplerCreateParams("zeSamplerCreate", Core, by context) {
        input context: ContextHandle,
        input device: DeviceHandle,
        input desc: Option<SamplerDesc>,
        output sampler: Option<SamplerHandle>,
    }
    SamplerDestroy => SamplerDestroyParams("zeSamplerDestroy", Core, by sampler) {
        release sampler: SamplerHandle,
    }

    MemAllocDevice => MemAllocDeviceParams("zeMemAllocDevice", Core, by context) {
        input context: ContextHandle,
        input desc: Option<DeviceMemAllocDesc>,
        input size: usize,
        input alignment: usize,
        input device: DeviceHandle,
        output ptr: Option<u64>,
    }
    MemAllocHost => MemAllocHostParams("zeMemAllocHost", Core, by context) {
        input context: ContextHandle,
        input desc: Option<HostMemAllocDesc>,
        input size: usize,
        input alignment: usize,
        output ptr: Option<u64>,
    }
    MemFree => MemFreeParams("zeMemFree", Core, by context) {
        input context: ContextHandle,
        input ptr: u64,
    }
    PhysicalMemCreate => PhysicalMemCreateParams("zePhysicalMemCreate", Core, by context) {
        input context: ContextHandle,
        input device: DeviceHandle,
        input desc: Option<PhysicalMemDesc>,
        output physical_memory: Option<PhysicalMemHandle>,
    }
    PhysicalMemDestroy => PhysicalMemDestroyParams("zePhysicalMemDestroy", Core, by context) {
        input context: ContextHandle,
        release physical_memory: PhysicalMemHandle,
    }

    FabricVertexGetExp => FabricVertexGetExpParams("zeFabricVertexGetExp", Core, by driver) {
        input driver: DriverHandle,
        inout count: Option<u32>,
        output vertices: Option<Vec<FabricVertexHandle>>,
    }
    FabricEdgeGetExp => FabricEdgeGetExpParams("zeFabricEdgeGetExp", Core, by vertex_a) {
        input vertex_a: FabricVertexHandle,
        input vertex_b: FabricVertexHandle,
        inout count: Option<u32>,
        output edges: Option<Vec<FabricEdgeHandle>>,
    }

    SysmanInit => SysmanInitParams("zesInit", Sysman) {
        input flags: SysmanInitFlags,
    }
    SysmanDriverGet => SysmanDriverGetParams("zesDriverGet", Sysman) {
        inout count: Option<u32>,
        output drivers: Option<Vec<DriverHandle>>,
    }
    SysmanDeviceGet => SysmanDeviceGetParams("zesDeviceGet", Sysman, by driver) {
        input driver: DriverHandle,
        inout count: Option<u32>,
        output devices: Option<Vec<DeviceHandle>>,
    }
    SysmanDeviceGetProperties => SysmanDeviceGetPropertiesParams("zesDeviceGetProperties", Sysman, by device) {
        input device: DeviceHandle,
        output properties: Option<SysmanDeviceProperties>,
    }
}
