use std::fmt;

/// Result codes shared by every entry point, driver and layer.
///
/// Values match the driver ABI so results can be forwarded from a driver unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
#[must_use]
pub enum ZeResult {
    #[default]
    Success = 0,
    NotReady = 1,
    ErrorDeviceLost = 0x7000_0001,
    ErrorOutOfHostMemory = 0x7000_0002,
    ErrorOutOfDeviceMemory = 0x7000_0003,
    ErrorModuleBuildFailure = 0x7000_0004,
    ErrorUninitialized = 0x7800_0001,
    ErrorUnsupportedVersion = 0x7800_0002,
    ErrorUnsupportedFeature = 0x7800_0003,
    ErrorInvalidArgument = 0x7800_0004,
    ErrorInvalidNullHandle = 0x7800_0005,
    ErrorHandleObjectInUse = 0x7800_0006,
    ErrorInvalidNullPointer = 0x7800_0007,
    ErrorInvalidSize = 0x7800_0008,
    ErrorUnsupportedSize = 0x7800_0009,
    ErrorUnsupportedAlignment = 0x7800_000a,
    ErrorInvalidSynchronizationObject = 0x7800_000b,
    ErrorInvalidEnumeration = 0x7800_000c,
    ErrorUnsupportedEnumeration = 0x7800_000d,
    ErrorUnknown = 0x7fff_ffff,
}

impl ZeResult {
    const ALL: [ZeResult; 20] = [
        ZeResult::Success,
        ZeResult::NotReady,
        ZeResult::ErrorDeviceLost,
        ZeResult::ErrorOutOfHostMemory,
        ZeResult::ErrorOutOfDeviceMemory,
        ZeResult::ErrorModuleBuildFailure,
        ZeResult::ErrorUninitialized,
        ZeResult::ErrorUnsupportedVersion,
        ZeResult::ErrorUnsupportedFeature,
        ZeResult::ErrorInvalidArgument,
        ZeResult::ErrorInvalidNullHandle,
        ZeResult::ErrorHandleObjectInUse,
        ZeResult::ErrorInvalidNullPointer,
        ZeResult::ErrorInvalidSize,
        ZeResult::ErrorUnsupportedSize,
        ZeResult::ErrorUnsupportedAlignment,
        ZeResult::ErrorInvalidSynchronizationObject,
        ZeResult::ErrorInvalidEnumeration,
        ZeResult::ErrorUnsupportedEnumeration,
        ZeResult::ErrorUnknown,
    ];

    pub fn from_u32(raw: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|r| *r as u32 == raw)
    }

    pub fn is_success(self) -> bool {
        self == ZeResult::Success
    }

    pub fn is_error(self) -> bool {
        (self as u32) >= 0x7000_0000
    }

    /// Converts to `Result` so loader plumbing can use `?`.
    pub fn ok(self) -> Result<(), ZeResult> {
        match self {
            ZeResult::Success => Ok(()),
            err => Err(err),
        }
    }

    /// Upper-case name as used in diagnostics and error descriptions.
    pub fn name(self) -> &'static str {
        match self {
            ZeResult::Success => "SUCCESS",
            ZeResult::NotReady => "NOT_READY",
            ZeResult::ErrorDeviceLost => "ERROR_DEVICE_LOST",
            ZeResult::ErrorOutOfHostMemory => "ERROR_OUT_OF_HOST_MEMORY",
            ZeResult::ErrorOutOfDeviceMemory => "ERROR_OUT_OF_DEVICE_MEMORY",
            ZeResult::ErrorModuleBuildFailure => "ERROR_MODULE_BUILD_FAILURE",
            ZeResult::ErrorUninitialized => "ERROR_UNINITIALIZED",
            ZeResult::ErrorUnsupportedVersion => "ERROR_UNSUPPORTED_VERSION",
            ZeResult::ErrorUnsupportedFeature => "ERROR_UNSUPPORTED_FEATURE",
            ZeResult::ErrorInvalidArgument => "ERROR_INVALID_ARGUMENT",
            ZeResult::ErrorInvalidNullHandle => "ERROR_INVALID_NULL_HANDLE",
            ZeResult::ErrorHandleObjectInUse => "ERROR_HANDLE_OBJECT_IN_USE",
            ZeResult::ErrorInvalidNullPointer => "ERROR_INVALID_NULL_POINTER",
            ZeResult::ErrorInvalidSize => "ERROR_INVALID_SIZE",
            ZeResult::ErrorUnsupportedSize => "ERROR_UNSUPPORTED_SIZE",
            ZeResult::ErrorUnsupportedAlignment => "ERROR_UNSUPPORTED_ALIGNMENT",
            ZeResult::ErrorInvalidSynchronizationObject => "ERROR_INVALID_SYNCHRONIZATION_OBJECT",
            ZeResult::ErrorInvalidEnumeration => "ERROR_INVALID_ENUMERATION",
            ZeResult::ErrorUnsupportedEnumeration => "ERROR_UNSUPPORTED_ENUMERATION",
            ZeResult::ErrorUnknown => "ERROR_UNKNOWN",
        }
    }
}

impl fmt::Display for ZeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08x})", self.name(), *self as u32)
    }
}

impl From<ZeResult> for u32 {
    fn from(value: ZeResult) -> Self {
        value as u32
    }
}

/// Packed `major.minor` API version (`major << 16 | minor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ApiVersion(pub u32);

impl ApiVersion {
    pub const V1_0: ApiVersion = ApiVersion::new(1, 0);
    pub const V1_1: ApiVersion = ApiVersion::new(1, 1);
    pub const V1_5: ApiVersion = ApiVersion::new(1, 5);
    pub const V1_10: ApiVersion = ApiVersion::new(1, 10);
    pub const V1_14: ApiVersion = ApiVersion::new(1, 14);
    pub const CURRENT: ApiVersion = ApiVersion::V1_14;

    pub const fn new(major: u16, minor: u16) -> Self {
        Self(((major as u32) << 16) | minor as u32)
    }

    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn minor(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// Parses `MAJOR.MINOR`, tolerating surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        let (major, minor) = raw.trim().split_once('.')?;
        let major = major.trim().parse::<u16>().ok()?;
        let minor = minor.trim().parse::<u16>().ok()?;
        Some(Self::new(major, minor))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}
