//! Opaque object handles.
//!
//! Every handle is a `u64` newtype tagged with its [`HandleKind`]. Zero is the null handle. The
//! values are meaningless to applications: depending on the owning driver they are either
//! loader-issued keys or driver-native values.

use crate::ZeResult;

/// Callback used to rewrite handle fields in place (loader → native translation on the way in,
/// native → loader wrapping on the way out). Null handles are never visited.
pub type HandleVisitor<'a> = dyn FnMut(HandleKind, &mut u64) -> Result<(), ZeResult> + 'a;

/// Types that may contain handles.
pub trait HandleFields {
    fn visit_handles(&mut self, visitor: &mut HandleVisitor<'_>) -> Result<(), ZeResult>;
}

/// Typed handle newtypes.
pub trait Handle: Copy {
    const KIND: HandleKind;

    fn raw(self) -> u64;

    fn from_raw(raw: u64) -> Self;

    fn is_null(self) -> bool {
        self.raw() == 0
    }
}

macro_rules! handles {
    ($($(#[$meta:meta])* $name:ident => $kind:ident,)*) => {
        /// Object kinds that can be wrapped and translated independently.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum HandleKind {
            $($kind,)*
        }

        impl HandleKind {
            pub const ALL: &'static [HandleKind] = &[$(HandleKind::$kind,)*];

            pub fn from_u8(raw: u8) -> Option<Self> {
                Self::ALL.get(raw as usize).copied()
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(HandleKind::$kind => stringify!($kind),)*
                }
            }
        }

        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
            #[repr(transparent)]
            pub struct $name(pub u64);

            impl $name {
                pub const NULL: $name = $name(0);
            }

            impl Handle for $name {
                const KIND: HandleKind = HandleKind::$kind;

                fn raw(self) -> u64 {
                    self.0
                }

                fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }
            }

            impl HandleFields for $name {
                fn visit_handles(&mut self, visitor: &mut HandleVisitor<'_>) -> Result<(), ZeResult> {
                    if self.0 == 0 {
                        return Ok(());
                    }
                    visitor(HandleKind::$kind, &mut self.0)
                }
            }
        )*
    };
}

handles! {
    DriverHandle => Driver,
    DeviceHandle => Device,
    ContextHandle => Context,
    CommandQueueHandle => CommandQueue,
    CommandListHandle => CommandList,
    FenceHandle => Fence,
    EventPoolHandle => EventPool,
    EventHandle => Event,
    ImageHandle => Image,
    ModuleHandle => Module,
    ModuleBuildLogHandle => ModuleBuildLog,
    KernelHandle => Kernel,
    SamplerHandle => Sampler,
    PhysicalMemHandle => PhysicalMem,
    /// Experimental fabric topology vertex.
    FabricVertexHandle => FabricVertex,
    /// Experimental fabric topology edge.
    FabricEdgeHandle => FabricEdge,
}

impl<T: HandleFields> HandleFields for Option<T> {
    fn visit_handles(&mut self, visitor: &mut HandleVisitor<'_>) -> Result<(), ZeResult> {
        match self {
            Some(inner) => inner.visit_handles(visitor),
            None => Ok(()),
        }
    }
}

impl<T: HandleFields> HandleFields for Vec<T> {
    fn visit_handles(&mut self, visitor: &mut HandleVisitor<'_>) -> Result<(), ZeResult> {
        for item in self.iter_mut() {
            item.visit_handles(visitor)?;
        }
        Ok(())
    }
}

/// Implements [`HandleFields`] as a no-op for types that never carry handles.
#[macro_export]
macro_rules! no_handle_fields {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::HandleFields for $ty {
                fn visit_handles(
                    &mut self,
                    _visitor: &mut $crate::HandleVisitor<'_>,
                ) -> Result<(), $crate::ZeResult> {
                    Ok(())
                }
            }
        )*
    };
}

no_handle_fields!(u8, u32, u64, usize, bool, String);
