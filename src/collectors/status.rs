//! Module status taxonomy.
//!
//! Every acquisition module ends in exactly one [`ModuleStatus`]. The numeric
//! codes are stable: they appear in manifests and session summaries and are
//! read back by external tooling, so the enumerated cases and their codes must
//! not change.
//!
//! ## Components
//!
//! - [`ModuleStatus`]: the closed set of module outcomes
//! - [`MemoryStatus`]: failures reserved for the physical memory module
//! - [`StatusFamily`]: success / warning / error classification

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::MODULE_STATUS_CUSTOM_BASE;

/// Broad classification of a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusFamily {
    /// Idle, running or finished without a problem
    Success,
    /// Finished or skipped with a condition the operator should see
    Warning,
    /// Module could not produce its evidence
    Error,
}

/// Failures specific to physical memory acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryStatus {
    /// The memory image could not be opened or read
    OpenImageFailed,
    /// The privileged service could not be loaded
    DriverLoadFailed,
    /// The privileged service could not be unloaded after acquisition
    DriverUnloadWarning,
    /// The privileged service could not be reached
    DriverOpenFailed,
    /// The kernel is not a 64-bit kernel
    UnsupportedKernelBitness,
    /// The kernel runs on an unsupported CPU architecture
    UnsupportedKernelArchitecture,
    /// Boot arguments could not be read
    BootArgsReadFailed,
    /// The firmware memory map could not be read
    EfiMapReadFailed,
}

impl MemoryStatus {
    const ALL: [MemoryStatus; 8] = [
        MemoryStatus::OpenImageFailed,
        MemoryStatus::DriverLoadFailed,
        MemoryStatus::DriverUnloadWarning,
        MemoryStatus::DriverOpenFailed,
        MemoryStatus::UnsupportedKernelBitness,
        MemoryStatus::UnsupportedKernelArchitecture,
        MemoryStatus::BootArgsReadFailed,
        MemoryStatus::EfiMapReadFailed,
    ];

    fn offset(self) -> i32 {
        match self {
            MemoryStatus::OpenImageFailed => 1,
            MemoryStatus::DriverLoadFailed => 2,
            MemoryStatus::DriverUnloadWarning => 3,
            MemoryStatus::DriverOpenFailed => 4,
            MemoryStatus::UnsupportedKernelBitness => 5,
            MemoryStatus::UnsupportedKernelArchitecture => 6,
            MemoryStatus::BootArgsReadFailed => 7,
            MemoryStatus::EfiMapReadFailed => 8,
        }
    }

    /// Numeric code, below the module-reserved base.
    pub fn code(self) -> i32 {
        MODULE_STATUS_CUSTOM_BASE - self.offset()
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    fn name(self) -> &'static str {
        match self {
            MemoryStatus::OpenImageFailed => "OpenImageFailed",
            MemoryStatus::DriverLoadFailed => "DriverLoadFailed",
            MemoryStatus::DriverUnloadWarning => "DriverUnloadWarning",
            MemoryStatus::DriverOpenFailed => "DriverOpenFailed",
            MemoryStatus::UnsupportedKernelBitness => "UnsupportedKernelBitness",
            MemoryStatus::UnsupportedKernelArchitecture => "UnsupportedKernelArchitecture",
            MemoryStatus::BootArgsReadFailed => "BootArgsReadFailed",
            MemoryStatus::EfiMapReadFailed => "EfiMapReadFailed",
        }
    }

    fn description(self) -> &'static str {
        match self {
            MemoryStatus::OpenImageFailed => "Error opening memory image",
            MemoryStatus::DriverLoadFailed => "Error loading memory access driver",
            MemoryStatus::DriverUnloadWarning => "Warning: memory access driver could not be unloaded",
            MemoryStatus::DriverOpenFailed => "Error opening memory access driver",
            MemoryStatus::UnsupportedKernelBitness => "Disabled: kernel bitness not supported",
            MemoryStatus::UnsupportedKernelArchitecture => "Disabled: kernel architecture not supported",
            MemoryStatus::BootArgsReadFailed => "Error reading boot arguments",
            MemoryStatus::EfiMapReadFailed => "Error reading EFI memory map",
        }
    }
}

/// Outcome of a collection module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleStatus {
    Ok,
    InProgress,
    Complete,
    Skipped,
    Cancelled,
    WarningInsufficientPermissions,
    DisabledInsufficientPermissions,
    DisabledByDefault,
    Error,
    UnableToOpenManifest,
    UnableToCreateCaseDirectory,
    LowDiskSpace,
    UnsupportedOsVersion,
    /// Module-reserved range used by the physical memory module
    Memory(MemoryStatus),
}

impl ModuleStatus {
    const GENERIC: [ModuleStatus; 13] = [
        ModuleStatus::Ok,
        ModuleStatus::InProgress,
        ModuleStatus::Complete,
        ModuleStatus::Skipped,
        ModuleStatus::Cancelled,
        ModuleStatus::WarningInsufficientPermissions,
        ModuleStatus::DisabledInsufficientPermissions,
        ModuleStatus::DisabledByDefault,
        ModuleStatus::Error,
        ModuleStatus::UnableToOpenManifest,
        ModuleStatus::UnableToCreateCaseDirectory,
        ModuleStatus::LowDiskSpace,
        ModuleStatus::UnsupportedOsVersion,
    ];

    /// Stable numeric code of this status.
    ///
    /// Non-negative codes are non-error outcomes, negative codes are
    /// disabled or error outcomes.
    pub fn code(self) -> i32 {
        match self {
            ModuleStatus::Ok => 0,
            ModuleStatus::InProgress => 1,
            ModuleStatus::Complete => 2,
            ModuleStatus::Skipped => 3,
            ModuleStatus::Cancelled => 4,
            ModuleStatus::WarningInsufficientPermissions => -1,
            ModuleStatus::DisabledInsufficientPermissions => -2,
            ModuleStatus::DisabledByDefault => -3,
            ModuleStatus::Error => -4,
            ModuleStatus::UnableToOpenManifest => -5,
            ModuleStatus::UnableToCreateCaseDirectory => -6,
            ModuleStatus::LowDiskSpace => -7,
            ModuleStatus::UnsupportedOsVersion => -8,
            ModuleStatus::Memory(status) => status.code(),
        }
    }

    /// Inverse of [`ModuleStatus::code`].
    pub fn from_code(code: i32) -> Option<Self> {
        if code <= MODULE_STATUS_CUSTOM_BASE {
            return MemoryStatus::from_code(code).map(ModuleStatus::Memory);
        }
        Self::GENERIC.into_iter().find(|status| status.code() == code)
    }

    pub fn family(self) -> StatusFamily {
        match self {
            ModuleStatus::Ok
            | ModuleStatus::InProgress
            | ModuleStatus::Complete
            | ModuleStatus::Skipped
            | ModuleStatus::Cancelled => StatusFamily::Success,
            ModuleStatus::WarningInsufficientPermissions
            | ModuleStatus::DisabledByDefault
            | ModuleStatus::Memory(MemoryStatus::DriverUnloadWarning) => StatusFamily::Warning,
            _ => StatusFamily::Error,
        }
    }

    /// True for every status a finished module can hold.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ModuleStatus::Ok | ModuleStatus::InProgress)
    }

    /// Short identifier used in manifests and summaries.
    pub fn name(self) -> &'static str {
        match self {
            ModuleStatus::Ok => "Ok",
            ModuleStatus::InProgress => "InProgress",
            ModuleStatus::Complete => "Complete",
            ModuleStatus::Skipped => "Skipped",
            ModuleStatus::Cancelled => "Cancelled",
            ModuleStatus::WarningInsufficientPermissions => "WarningInsufficientPermissions",
            ModuleStatus::DisabledInsufficientPermissions => "DisabledInsufficientPermissions",
            ModuleStatus::DisabledByDefault => "DisabledByDefault",
            ModuleStatus::Error => "Error",
            ModuleStatus::UnableToOpenManifest => "UnableToOpenManifest",
            ModuleStatus::UnableToCreateCaseDirectory => "UnableToCreateCaseDirectory",
            ModuleStatus::LowDiskSpace => "LowDiskSpace",
            ModuleStatus::UnsupportedOsVersion => "UnsupportedOsVersion",
            ModuleStatus::Memory(status) => status.name(),
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ModuleStatus::Ok => "Ready",
            ModuleStatus::InProgress => "In progress",
            ModuleStatus::Complete => "Complete",
            ModuleStatus::Skipped => "Skipped",
            ModuleStatus::Cancelled => "Cancelled",
            ModuleStatus::WarningInsufficientPermissions => "Warning: insufficient permissions",
            ModuleStatus::DisabledInsufficientPermissions => "Disabled: insufficient permissions",
            ModuleStatus::DisabledByDefault => "Disabled by default",
            ModuleStatus::Error => "Error",
            ModuleStatus::UnableToOpenManifest => "Error: unable to open manifest",
            ModuleStatus::UnableToCreateCaseDirectory => "Error: unable to create case directory",
            ModuleStatus::LowDiskSpace => "Error: low disk space",
            ModuleStatus::UnsupportedOsVersion => "Disabled: unsupported OS version",
            ModuleStatus::Memory(status) => status.description(),
        };
        write!(f, "{}", text)
    }
}

#[derive(Serialize, Deserialize)]
struct StatusRecord {
    code: i32,
    name: String,
}

impl Serialize for ModuleStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StatusRecord {
            code: self.code(),
            name: self.name().to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ModuleStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = StatusRecord::deserialize(deserializer)?;
        ModuleStatus::from_code(record.code).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown module status code {}", record.code))
        })
    }
}
