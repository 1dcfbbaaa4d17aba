//! Data models for physical memory acquisition

use serde::{Serialize, Deserialize};

use crate::collectors::status::ModuleStatus;

/// Where the bytes of an image region came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    /// Read from DRAM through the memory access service
    Dram,
    /// Outside the DRAM range list, written as zeros
    ZeroFilled,
}

/// Contiguous span of the image with a single origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquiredRegion {
    pub kind: RegionKind,
    pub physical_start: u64,
    /// Exclusive
    pub physical_end: u64,
    pub file_offset_start: u64,
    /// Exclusive
    pub file_offset_end: u64,
}

/// Page that could not be mapped; acquisition stopped there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmappablePage {
    pub physical_address: u64,
    pub reason: String,
}

/// Result of the page loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionOutcome {
    pub status: ModuleStatus,
    pub bytes_written: u64,
    pub pages_mapped: u64,
    pub pages_zero_filled: u64,
    pub regions: Vec<AcquiredRegion>,
    pub unmappable: Option<UnmappablePage>,
}

impl AcquisitionOutcome {
    pub fn interrupted(&self) -> bool {
        self.status != ModuleStatus::Complete
    }
}
