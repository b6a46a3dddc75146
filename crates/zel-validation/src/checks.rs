//! Stateless per-API parameter checks.
//!
//! Checks run in argument order: handles first, then required pointers, then enumerations,
//! flags and extension chains. The first failure wins.

use bitflags::Flags;
use zel_api::{
    ApiParams, CommandQueueDesc, ExtensionDesc, ExtensionPayload, Handle, StructureType, ZeResult,
};

type Check = Result<(), ZeResult>;

fn handle<H: Handle>(handle: H) -> Check {
    if handle.is_null() {
        return Err(ZeResult::ErrorInvalidNullHandle);
    }
    Ok(())
}

fn required<T>(pointer: &Option<T>) -> Result<&T, ZeResult> {
    pointer.as_ref().ok_or(ZeResult::ErrorInvalidNullPointer)
}

fn address(ptr: u64) -> Check {
    if ptr == 0 {
        return Err(ZeResult::ErrorInvalidNullPointer);
    }
    Ok(())
}

/// Rejects bits above the union of defined flags.
fn flags<F: Flags<Bits = u32>>(value: F) -> Check {
    if value.bits() & !F::all().bits() != 0 {
        return Err(ZeResult::ErrorInvalidEnumeration);
    }
    Ok(())
}

fn enumeration(valid: bool) -> Check {
    if !valid {
        return Err(ZeResult::ErrorInvalidEnumeration);
    }
    Ok(())
}

const KNOWN_EXTENSIONS: [StructureType; 3] = [
    StructureType::RELAXED_ALLOCATION_LIMITS_EXP_DESC,
    StructureType::EXTERNAL_MEMORY_EXPORT_DESC,
    StructureType::RAYTRACING_MEM_ALLOC_EXT_DESC,
];

/// Walks a `p_next` chain. Unknown structure types are skipped; a known type must carry its own
/// payload with valid fields.
fn extensions(mut next: Option<&ExtensionDesc>) -> Check {
    while let Some(ext) = next {
        match &ext.payload {
            ExtensionPayload::RelaxedAllocationLimits { flags: value }
                if ext.stype == StructureType::RELAXED_ALLOCATION_LIMITS_EXP_DESC =>
            {
                flags(*value)?;
                if value.is_empty() {
                    return Err(ZeResult::ErrorInvalidEnumeration);
                }
            }
            ExtensionPayload::ExternalMemoryExport { flags: value }
                if ext.stype == StructureType::EXTERNAL_MEMORY_EXPORT_DESC =>
            {
                flags(*value)?;
            }
            ExtensionPayload::RaytracingMemAlloc { flags: value }
                if ext.stype == StructureType::RAYTRACING_MEM_ALLOC_EXT_DESC =>
            {
                if *value > 0x1 {
                    return Err(ZeResult::ErrorInvalidEnumeration);
                }
            }
            ExtensionPayload::Opaque(_) if !KNOWN_EXTENSIONS.contains(&ext.stype) => {}
            _ => return Err(ZeResult::ErrorInvalidArgument),
        }
        next = ext.p_next.as_deref();
    }
    Ok(())
}

fn queue_desc(desc: &CommandQueueDesc) -> Check {
    flags(desc.flags)?;
    enumeration(desc.mode.is_valid())?;
    enumeration(desc.priority.is_valid())?;
    extensions(desc.p_next.as_deref())
}

/// Runs the parameter checks of `params`' API.
pub fn check_parameters(params: &ApiParams) -> ZeResult {
    match check(params) {
        Ok(()) => ZeResult::Success,
        Err(result) => result,
    }
}

fn check(params: &ApiParams) -> Check {
    match params {
        ApiParams::Init(p) => flags(p.flags),
        ApiParams::InitDrivers(p) => {
            required(&p.count)?;
            let desc = required(&p.desc)?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::DriverGet(p) => required(&p.count).map(drop),
        ApiParams::DriverGetApiVersion(p) => {
            handle(p.driver)?;
            required(&p.version).map(drop)
        }
        ApiParams::DriverGetProperties(p) => {
            handle(p.driver)?;
            required(&p.properties).map(drop)
        }
        ApiParams::DriverGetLastErrorDescription(p) => {
            handle(p.driver)?;
            required(&p.description).map(drop)
        }

        ApiParams::RtGetLastErrorDescription(p) => required(&p.description).map(drop),
        ApiParams::RtTranslateDeviceHandleToIdentifier(_)
        | ApiParams::RtTranslateIdentifierToDeviceHandle(_)
        | ApiParams::RtGetDefaultContext(_) => Ok(()),

        ApiParams::DeviceGet(p) => {
            handle(p.driver)?;
            required(&p.count).map(drop)
        }
        ApiParams::DeviceGetSubDevices(p) => {
            handle(p.device)?;
            required(&p.count).map(drop)
        }
        ApiParams::DeviceGetProperties(p) => {
            handle(p.device)?;
            required(&p.properties).map(drop)
        }
        ApiParams::DeviceGetCommandQueueGroupProperties(p) => {
            handle(p.device)?;
            required(&p.count).map(drop)
        }
        ApiParams::DeviceGetMemoryProperties(p) => {
            handle(p.device)?;
            required(&p.count).map(drop)
        }
        ApiParams::DeviceGetMemoryAccessProperties(p) => {
            handle(p.device)?;
            required(&p.properties).map(drop)
        }

        ApiParams::ContextCreate(p) => {
            handle(p.driver)?;
            let desc = required(&p.desc)?;
            required(&p.context)?;
            flags(desc.flags)?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::ContextDestroy(p) => handle(p.context),

        ApiParams::CommandQueueCreate(p) => {
            handle(p.context)?;
            handle(p.device)?;
            let desc = required(&p.desc)?;
            required(&p.queue)?;
            queue_desc(desc)
        }
        ApiParams::CommandQueueDestroy(p) => handle(p.queue),
        ApiParams::CommandQueueExecuteCommandLists(p) => {
            handle(p.queue)?;
            let lists = required(&p.command_lists)?;
            if lists.is_empty() {
                return Err(ZeResult::ErrorInvalidSize);
            }
            lists.iter().try_for_each(|list| handle(*list))
        }
        ApiParams::CommandQueueSynchronize(p) => handle(p.queue),

        ApiParams::CommandListCreate(p) => {
            handle(p.context)?;
            handle(p.device)?;
            let desc = required(&p.desc)?;
            required(&p.list)?;
            flags(desc.flags)?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::CommandListCreateImmediate(p) => {
            handle(p.context)?;
            handle(p.device)?;
            let desc = required(&p.desc)?;
            required(&p.list)?;
            queue_desc(desc)
        }
        ApiParams::CommandListDestroy(p) => handle(p.list),
        ApiParams::CommandListClose(p) => handle(p.list),
        ApiParams::CommandListReset(p) => handle(p.list),
        ApiParams::CommandListAppendBarrier(p) => handle(p.list),
        ApiParams::CommandListAppendMemoryCopy(p) => {
            handle(p.list)?;
            address(p.dst)?;
            address(p.src)
        }
        ApiParams::CommandListAppendSignalEvent(p) => {
            handle(p.list)?;
            handle(p.event)
        }
        ApiParams::CommandListAppendWaitOnEvents(p) => {
            handle(p.list)?;
            required(&p.events).map(drop)
        }
        ApiParams::CommandListAppendEventReset(p) => {
            handle(p.list)?;
            handle(p.event)
        }
        ApiParams::CommandListAppendLaunchKernel(p) => {
            handle(p.list)?;
            handle(p.kernel)?;
            required(&p.launch_args).map(drop)
        }

        ApiParams::FenceCreate(p) => {
            handle(p.queue)?;
            let desc = required(&p.desc)?;
            required(&p.fence)?;
            flags(desc.flags)?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::FenceDestroy(p) => handle(p.fence),
        ApiParams::FenceHostSynchronize(p) => handle(p.fence),
        ApiParams::FenceQueryStatus(p) => handle(p.fence),
        ApiParams::FenceReset(p) => handle(p.fence),

        ApiParams::EventPoolCreate(p) => {
            handle(p.context)?;
            let desc = required(&p.desc)?;
            required(&p.pool)?;
            flags(desc.flags)?;
            if desc.count == 0 {
                return Err(ZeResult::ErrorInvalidSize);
            }
            extensions(desc.p_next.as_deref())
        }
        ApiParams::EventPoolDestroy(p) => handle(p.pool),
        ApiParams::EventCreate(p) => {
            handle(p.pool)?;
            let desc = required(&p.desc)?;
            required(&p.event)?;
            flags(desc.signal)?;
            flags(desc.wait)?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::EventDestroy(p) => handle(p.event),
        ApiParams::EventHostSignal(p) => handle(p.event),
        ApiParams::EventHostSynchronize(p) => handle(p.event),
        ApiParams::EventQueryStatus(p) => handle(p.event),
        ApiParams::EventHostReset(p) => handle(p.event),

        ApiParams::ImageCreate(p) => {
            handle(p.context)?;
            handle(p.device)?;
            let desc = required(&p.desc)?;
            required(&p.image)?;
            flags(desc.flags)?;
            enumeration(desc.image_type.is_valid())?;
            enumeration(desc.format.layout.is_valid())?;
            enumeration(desc.format.ty.is_valid())?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::ImageDestroy(p) => handle(p.image),

        ApiParams::ModuleCreate(p) => {
            handle(p.context)?;
            handle(p.device)?;
            let desc = required(&p.desc)?;
            required(&p.module)?;
            enumeration(desc.format.is_valid())?;
            if desc.input.is_empty() {
                return Err(ZeResult::ErrorInvalidSize);
            }
            extensions(desc.p_next.as_deref())
        }
        ApiParams::ModuleDestroy(p) => handle(p.module),
        ApiParams::ModuleBuildLogDestroy(p) => handle(p.build_log),
        ApiParams::ModuleBuildLogGetString(p) => {
            handle(p.build_log)?;
            required(&p.size).map(drop)
        }

        ApiParams::KernelCreate(p) => {
            handle(p.module)?;
            let desc = required(&p.desc)?;
            required(&p.kernel)?;
            flags(desc.flags)?;
            required(&desc.kernel_name)?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::KernelDestroy(p) => handle(p.kernel),
        ApiParams::KernelSetArgumentValue(p) => handle(p.kernel),
        ApiParams::KernelSetGroupSize(p) => handle(p.kernel),

        ApiParams::SamplerCreate(p) => {
            handle(p.context)?;
            handle(p.device)?;
            let desc = required(&p.desc)?;
            required(&p.sampler)?;
            enumeration(desc.address_mode.is_valid())?;
            enumeration(desc.filter_mode.is_valid())?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::SamplerDestroy(p) => handle(p.sampler),

        ApiParams::MemAllocDevice(p) => {
            handle(p.context)?;
            handle(p.device)?;
            let desc = required(&p.desc)?;
            required(&p.ptr)?;
            flags(desc.flags)?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::MemAllocHost(p) => {
            handle(p.context)?;
            let desc = required(&p.desc)?;
            required(&p.ptr)?;
            flags(desc.flags)?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::MemFree(p) => {
            handle(p.context)?;
            address(p.ptr)
        }
        ApiParams::PhysicalMemCreate(p) => {
            handle(p.context)?;
            handle(p.device)?;
            let desc = required(&p.desc)?;
            required(&p.physical_memory)?;
            flags(desc.flags)?;
            extensions(desc.p_next.as_deref())
        }
        ApiParams::PhysicalMemDestroy(p) => {
            handle(p.context)?;
            handle(p.physical_memory)
        }

        ApiParams::FabricVertexGetExp(p) => {
            handle(p.driver)?;
            required(&p.count).map(drop)
        }
        ApiParams::FabricEdgeGetExp(p) => {
            handle(p.vertex_a)?;
            handle(p.vertex_b)?;
            required(&p.count).map(drop)
        }

        ApiParams::SysmanInit(p) => flags(p.flags),
        ApiParams::SysmanDriverGet(p) => required(&p.count).map(drop),
        ApiParams::SysmanDeviceGet(p) => {
            handle(p.driver)?;
            required(&p.count).map(drop)
        }
        ApiParams::SysmanDeviceGetProperties(p) => {
            handle(p.device)?;
            required(&p.properties).map(drop)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zel_api::{
        CommandQueueExecuteCommandListsParams, CommandQueueHandle, CommandListHandle,
        ContextCreateParams, ContextDesc, ContextHandle, DeviceGetParams, DriverHandle,
        EventPoolCreateParams, EventPoolDesc, ExternalMemoryTypeFlags, ImageCreateParams,
        ImageDesc, ImageFormat, ImageFormatLayout, InitFlags, InitParams, DeviceHandle,
        RelaxedAllocationLimitsFlags, RtGetLastErrorDescriptionParams,
    };

    fn context_create(desc: ContextDesc) -> ApiParams {
        ContextCreateParams {
            driver: DriverHandle(1),
            desc: Some(desc),
            context: Some(ContextHandle::NULL),
        }
        .into()
    }

    #[test]
    fn null_handles_come_before_null_pointers() {
        let params: ApiParams = DeviceGetParams::default().into();
        assert_eq!(check_parameters(&params), ZeResult::ErrorInvalidNullHandle);

        let params: ApiParams = DeviceGetParams {
            driver: DriverHandle(1),
            ..Default::default()
        }
        .into();
        assert_eq!(check_parameters(&params), ZeResult::ErrorInvalidNullPointer);
    }

    #[test]
    fn missing_error_description_pointer_is_rejected() {
        let params: ApiParams = RtGetLastErrorDescriptionParams::default().into();
        assert_eq!(check_parameters(&params), ZeResult::ErrorInvalidNullPointer);

        let params: ApiParams = RtGetLastErrorDescriptionParams {
            description: Some(String::new()),
        }
        .into();
        assert_eq!(check_parameters(&params), ZeResult::Success);
    }

    #[test]
    fn flag_bits_above_the_union_are_rejected() {
        let params: ApiParams = InitParams {
            flags: InitFlags::from_bits_retain(0x4),
        }
        .into();
        assert_eq!(check_parameters(&params), ZeResult::ErrorInvalidEnumeration);

        let params: ApiParams = InitParams {
            flags: InitFlags::GPU_ONLY | InitFlags::VPU_ONLY,
        }
        .into();
        assert_eq!(check_parameters(&params), ZeResult::Success);
    }

    #[test]
    fn enumerations_above_max_are_rejected() {
        let mut desc = ImageDesc {
            format: ImageFormat {
                layout: ImageFormatLayout::P416,
                ..Default::default()
            },
            ..Default::default()
        };
        let image = |desc: ImageDesc| -> ApiParams {
            ImageCreateParams {
                context: ContextHandle(1),
                device: DeviceHandle(2),
                desc: Some(desc),
                image: Some(Default::default()),
            }
            .into()
        };
        assert_eq!(check_parameters(&image(desc.clone())), ZeResult::Success);
        desc.format.layout = ImageFormatLayout(ImageFormatLayout::P416.0 + 1);
        assert_eq!(check_parameters(&image(desc)), ZeResult::ErrorInvalidEnumeration);
    }

    #[test]
    fn unknown_extensions_are_accepted_but_known_ones_are_checked() {
        let unknown =
            ExtensionDesc::new(StructureType(0x7fff_0001), ExtensionPayload::Opaque(vec![1]));
        let params: ApiParams = context_create(ContextDesc {
            p_next: Some(Box::new(unknown.clone())),
            ..Default::default()
        });
        assert_eq!(check_parameters(&params), ZeResult::Success);

        let bad_export = ExtensionDesc::new(
            StructureType::EXTERNAL_MEMORY_EXPORT_DESC,
            ExtensionPayload::ExternalMemoryExport {
                flags: ExternalMemoryTypeFlags::from_bits_retain(0x100),
            },
        );
        let params: ApiParams = context_create(ContextDesc {
            p_next: Some(Box::new(unknown.chain(bad_export))),
            ..Default::default()
        });
        assert_eq!(check_parameters(&params), ZeResult::ErrorInvalidEnumeration);

        let mismatched = ExtensionDesc::new(
            StructureType::RELAXED_ALLOCATION_LIMITS_EXP_DESC,
            ExtensionPayload::Opaque(Vec::new()),
        );
        let params: ApiParams = context_create(ContextDesc {
            p_next: Some(Box::new(mismatched)),
            ..Default::default()
        });
        assert_eq!(check_parameters(&params), ZeResult::ErrorInvalidArgument);

        let relaxed = ExtensionDesc::new(
            StructureType::RELAXED_ALLOCATION_LIMITS_EXP_DESC,
            ExtensionPayload::RelaxedAllocationLimits {
                flags: RelaxedAllocationLimitsFlags::MAX_SIZE,
            },
        );
        let params: ApiParams = context_create(ContextDesc {
            p_next: Some(Box::new(relaxed)),
            ..Default::default()
        });
        assert_eq!(check_parameters(&params), ZeResult::Success);
    }

    #[test]
    fn sizes_are_checked() {
        let params: ApiParams = EventPoolCreateParams {
            context: ContextHandle(1),
            desc: Some(EventPoolDesc::default()),
            pool: Some(Default::default()),
            ..Default::default()
        }
        .into();
        assert_eq!(check_parameters(&params), ZeResult::ErrorInvalidSize);

        let params: ApiParams = CommandQueueExecuteCommandListsParams {
            queue: CommandQueueHandle(1),
            command_lists: Some(Vec::new()),
            ..Default::default()
        }
        .into();
        assert_eq!(check_parameters(&params), ZeResult::ErrorInvalidSize);

        let params: ApiParams = CommandQueueExecuteCommandListsParams {
            queue: CommandQueueHandle(1),
            command_lists: Some(vec![CommandListHandle(3), CommandListHandle::NULL]),
            ..Default::default()
        }
        .into();
        assert_eq!(check_parameters(&params), ZeResult::ErrorInvalidNullHandle);
    }
}
