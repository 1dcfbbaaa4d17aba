//! Physical memory page loop.
//!
//! Walks every page frame from 0 up to the top of DRAM and streams one page
//! at a time into the image. Frames inside the DRAM range list are mapped
//! through the memory access service; frames outside it are written as
//! zeros and never mapped, so the image is flat (file offset equals
//! physical address).
//!
//! Each mapped page is copied out before the next request because the
//! service invalidates a mapping as soon as another one is requested. A
//! mapping failure ends the acquisition: a silently skipped page would
//! corrupt the evidentiary record.

use std::io::{self, Write};

use log::{debug, warn};

use crate::collectors::memory::access::{AccessError, MemoryAccess};
use crate::collectors::memory::firmware::DramRangeList;
use crate::collectors::memory::models::{
    AcquiredRegion, AcquisitionOutcome, RegionKind, UnmappablePage,
};
use crate::collectors::module::AcquisitionContext;
use crate::collectors::status::{MemoryStatus, ModuleStatus};
use crate::constants::PAGE_SIZE;

const PAGE_BYTES: usize = PAGE_SIZE as usize;

/// Cancellation and progress hooks for the page loop.
pub trait AcquisitionControl {
    fn is_cancelled(&self) -> bool;

    fn report_progress(&mut self, percent: f64);
}

impl AcquisitionControl for AcquisitionContext {
    fn is_cancelled(&self) -> bool {
        AcquisitionContext::is_cancelled(self)
    }

    fn report_progress(&mut self, percent: f64) {
        self.update_progress(percent);
    }
}

/// Status for a failed mapping request.
pub fn status_for_access_error(error: &AccessError) -> ModuleStatus {
    match error {
        AccessError::MapFailed { .. } => ModuleStatus::Memory(MemoryStatus::OpenImageFailed),
        AccessError::SizeMismatch { .. } | AccessError::Unsupported(_) | AccessError::Io(_) => {
            ModuleStatus::Memory(MemoryStatus::DriverOpenFailed)
        }
    }
}

/// Status for a failed image write.
pub fn status_for_write_error(error: &io::Error) -> ModuleStatus {
    if error.raw_os_error() == Some(libc::ENOSPC) {
        ModuleStatus::LowDiskSpace
    } else {
        ModuleStatus::Error
    }
}

fn expect_length(actual: usize, expected: usize) -> Result<(), AccessError> {
    if actual != expected {
        return Err(AccessError::SizeMismatch {
            what: "mapped region",
            expected,
            actual,
        });
    }
    Ok(())
}

/// Copy one page frame into `page`.
///
/// Frames the service refuses to map directly are mapped from one byte in
/// and get a synthesized leading zero byte, keeping the page size intact.
pub fn read_page<A: MemoryAccess + ?Sized>(
    access: &mut A,
    frame: u64,
    page: &mut [u8; PAGE_BYTES],
) -> Result<(), AccessError> {
    let address = frame * PAGE_SIZE;
    if access.refuses_direct_mapping(address) {
        let region = access.map_memory(address + 1, PAGE_SIZE - 1)?;
        expect_length(region.len(), PAGE_BYTES - 1)?;
        page[0] = 0;
        page[1..].copy_from_slice(region.as_bytes());
    } else {
        let region = access.map_memory(address, PAGE_SIZE)?;
        expect_length(region.len(), PAGE_BYTES)?;
        page.copy_from_slice(region.as_bytes());
    }
    Ok(())
}

#[derive(Default)]
struct RegionTracker {
    current: Option<AcquiredRegion>,
    finished: Vec<AcquiredRegion>,
}

impl RegionTracker {
    fn push(&mut self, kind: RegionKind, physical_address: u64, file_offset: u64) {
        if let Some(current) = self.current.as_mut() {
            if current.kind == kind && current.physical_end == physical_address {
                current.physical_end += PAGE_SIZE;
                current.file_offset_end += PAGE_SIZE;
                return;
            }
        }
        self.finished.extend(self.current.take());
        self.current = Some(AcquiredRegion {
            kind,
            physical_start: physical_address,
            physical_end: physical_address + PAGE_SIZE,
            file_offset_start: file_offset,
            file_offset_end: file_offset + PAGE_SIZE,
        });
    }

    fn into_regions(mut self) -> Vec<AcquiredRegion> {
        self.finished.extend(self.current.take());
        self.finished
    }
}

/// Stream every frame below the top of DRAM into `writer`.
///
/// Cancellation is polled before each page and progress is reported after
/// each page as `bytes_written / top * 100`. The writer is left open; the
/// caller closes it on every outcome.
pub fn acquire_pages<A, W, C>(
    access: &mut A,
    ranges: &DramRangeList,
    writer: &mut W,
    control: &mut C,
) -> AcquisitionOutcome
where
    A: MemoryAccess + ?Sized,
    W: Write + ?Sized,
    C: AcquisitionControl + ?Sized,
{
    let top = ranges.top_physical_address();
    let zero_page = [0u8; PAGE_BYTES];
    let mut page = [0u8; PAGE_BYTES];
    let mut tracker = RegionTracker::default();
    let mut outcome = AcquisitionOutcome {
        status: ModuleStatus::Complete,
        bytes_written: 0,
        pages_mapped: 0,
        pages_zero_filled: 0,
        regions: Vec::new(),
        unmappable: None,
    };

    debug!(
        "Acquiring {} frames ({} DRAM pages in {} ranges)",
        ranges.top_frame(),
        ranges.total_pages(),
        ranges.ranges().len()
    );

    for frame in 0..ranges.top_frame() {
        if control.is_cancelled() {
            debug!("Cancelled before frame {:#x}", frame);
            outcome.status = ModuleStatus::Cancelled;
            break;
        }

        let address = frame * PAGE_SIZE;
        let (kind, data) = if ranges.contains(frame) {
            if let Err(e) = read_page(access, frame, &mut page) {
                warn!("Mapping frame {:#x} failed: {}", frame, e);
                outcome.status = status_for_access_error(&e);
                outcome.unmappable = Some(UnmappablePage {
                    physical_address: address,
                    reason: e.to_string(),
                });
                break;
            }
            (RegionKind::Dram, &page)
        } else {
            (RegionKind::ZeroFilled, &zero_page)
        };

        if let Err(e) = writer.write_all(data) {
            warn!("Writing frame {:#x} failed: {}", frame, e);
            outcome.status = status_for_write_error(&e);
            break;
        }

        tracker.push(kind, address, outcome.bytes_written);
        outcome.bytes_written += PAGE_SIZE;
        match kind {
            RegionKind::Dram => outcome.pages_mapped += 1,
            RegionKind::ZeroFilled => outcome.pages_zero_filled += 1,
        }
        control.report_progress(outcome.bytes_written as f64 / top as f64 * 100.0);
    }

    outcome.regions = tracker.into_regions();
    outcome
}
