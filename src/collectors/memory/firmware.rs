//! Firmware memory map resolution.
//!
//! The firmware hands the kernel an array of EFI memory descriptors at
//! boot. Only some descriptor types describe DRAM; the rest are device
//! windows or firmware-reserved space that must never be touched. This
//! module turns the raw descriptor array into a [`DramRangeList`] of page
//! frame ranges that bound the acquisition loop.
//!
//! Types classified as DRAM:
//!
//! - `LoaderCode`, `LoaderData`
//! - `BootServicesCode`, `BootServicesData`
//! - `RuntimeServicesCode`, `RuntimeServicesData`
//! - `ConventionalMemory`
//! - `ACPIReclaimMemory`, `ACPIMemoryNVS`
//! - `PalCode`
//!
//! Types never acquired: `Reserved`, `Unusable`, `MemoryMappedIO`,
//! `MemoryMappedIOPortSpace`, `PersistentMemory` and unknown codes.

use std::fmt;

use anyhow::{bail, Context, Result};
use bytes::Buf;
use serde::Serialize;

use crate::constants::{EFI_MEMORY_DESCRIPTOR_SIZE, MAX_DRAM_RANGES, PAGE_SIZE};

/// UEFI memory type of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EfiMemoryType {
    Reserved,
    LoaderCode,
    LoaderData,
    BootServicesCode,
    BootServicesData,
    RuntimeServicesCode,
    RuntimeServicesData,
    Conventional,
    Unusable,
    AcpiReclaim,
    AcpiNvs,
    MemoryMappedIo,
    MemoryMappedIoPortSpace,
    PalCode,
    Persistent,
    Unknown(u32),
}

impl EfiMemoryType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => EfiMemoryType::Reserved,
            1 => EfiMemoryType::LoaderCode,
            2 => EfiMemoryType::LoaderData,
            3 => EfiMemoryType::BootServicesCode,
            4 => EfiMemoryType::BootServicesData,
            5 => EfiMemoryType::RuntimeServicesCode,
            6 => EfiMemoryType::RuntimeServicesData,
            7 => EfiMemoryType::Conventional,
            8 => EfiMemoryType::Unusable,
            9 => EfiMemoryType::AcpiReclaim,
            10 => EfiMemoryType::AcpiNvs,
            11 => EfiMemoryType::MemoryMappedIo,
            12 => EfiMemoryType::MemoryMappedIoPortSpace,
            13 => EfiMemoryType::PalCode,
            14 => EfiMemoryType::Persistent,
            other => EfiMemoryType::Unknown(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            EfiMemoryType::Reserved => 0,
            EfiMemoryType::LoaderCode => 1,
            EfiMemoryType::LoaderData => 2,
            EfiMemoryType::BootServicesCode => 3,
            EfiMemoryType::BootServicesData => 4,
            EfiMemoryType::RuntimeServicesCode => 5,
            EfiMemoryType::RuntimeServicesData => 6,
            EfiMemoryType::Conventional => 7,
            EfiMemoryType::Unusable => 8,
            EfiMemoryType::AcpiReclaim => 9,
            EfiMemoryType::AcpiNvs => 10,
            EfiMemoryType::MemoryMappedIo => 11,
            EfiMemoryType::MemoryMappedIoPortSpace => 12,
            EfiMemoryType::PalCode => 13,
            EfiMemoryType::Persistent => 14,
            EfiMemoryType::Unknown(raw) => raw,
        }
    }

    /// Whether descriptors of this type are acquired.
    pub fn is_dram(self) -> bool {
        matches!(
            self,
            EfiMemoryType::LoaderCode
                | EfiMemoryType::LoaderData
                | EfiMemoryType::BootServicesCode
                | EfiMemoryType::BootServicesData
                | EfiMemoryType::RuntimeServicesCode
                | EfiMemoryType::RuntimeServicesData
                | EfiMemoryType::Conventional
                | EfiMemoryType::AcpiReclaim
                | EfiMemoryType::AcpiNvs
                | EfiMemoryType::PalCode
        )
    }
}

impl fmt::Display for EfiMemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EfiMemoryType::Reserved => "Reserved",
            EfiMemoryType::LoaderCode => "LoaderCode",
            EfiMemoryType::LoaderData => "LoaderData",
            EfiMemoryType::BootServicesCode => "BootServicesCode",
            EfiMemoryType::BootServicesData => "BootServicesData",
            EfiMemoryType::RuntimeServicesCode => "RuntimeServicesCode",
            EfiMemoryType::RuntimeServicesData => "RuntimeServicesData",
            EfiMemoryType::Conventional => "ConventionalMemory",
            EfiMemoryType::Unusable => "UnusableMemory",
            EfiMemoryType::AcpiReclaim => "ACPIReclaimMemory",
            EfiMemoryType::AcpiNvs => "ACPIMemoryNVS",
            EfiMemoryType::MemoryMappedIo => "MemoryMappedIO",
            EfiMemoryType::MemoryMappedIoPortSpace => "MemoryMappedIOPortSpace",
            EfiMemoryType::PalCode => "PalCode",
            EfiMemoryType::Persistent => "PersistentMemory",
            EfiMemoryType::Unknown(raw) => return write!(f, "Unknown({})", raw),
        };
        write!(f, "{}", name)
    }
}

/// One EFI memory descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryDescriptor {
    pub memory_type: EfiMemoryType,
    pub physical_start: u64,
    pub virtual_start: u64,
    pub number_of_pages: u64,
    pub attribute: u64,
}

impl MemoryDescriptor {
    /// First byte past the region.
    pub fn physical_end(&self) -> u64 {
        self.physical_start
            .saturating_add(self.number_of_pages.saturating_mul(PAGE_SIZE))
    }
}

/// Descriptors as reported by the firmware, in firmware order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirmwareMemoryMap {
    descriptors: Vec<MemoryDescriptor>,
}

impl FirmwareMemoryMap {
    pub fn new(descriptors: Vec<MemoryDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Parse `map_size` bytes of descriptors laid out `descriptor_size`
    /// bytes apart.
    ///
    /// Firmware may use a stride larger than the descriptor itself; the
    /// trailing bytes of each slot are ignored.
    pub fn parse(bytes: &[u8], map_size: usize, descriptor_size: usize) -> Result<Self> {
        if descriptor_size < EFI_MEMORY_DESCRIPTOR_SIZE {
            bail!(
                "EFI descriptor stride {} is smaller than a descriptor ({} bytes)",
                descriptor_size,
                EFI_MEMORY_DESCRIPTOR_SIZE
            );
        }
        if map_size > bytes.len() {
            bail!("EFI memory map claims {} bytes but only {} were read", map_size, bytes.len());
        }

        let descriptors = bytes[..map_size]
            .chunks_exact(descriptor_size)
            .map(|slot| {
                let mut buf = &slot[..EFI_MEMORY_DESCRIPTOR_SIZE];
                let memory_type = EfiMemoryType::from_raw(buf.get_u32_le());
                let _pad = buf.get_u32_le();
                MemoryDescriptor {
                    memory_type,
                    physical_start: buf.get_u64_le(),
                    virtual_start: buf.get_u64_le(),
                    number_of_pages: buf.get_u64_le(),
                    attribute: buf.get_u64_le(),
                }
            })
            .collect();

        Ok(Self { descriptors })
    }

    /// Build a map from Linux `/proc/iomem`.
    ///
    /// Top-level `System RAM` lines become conventional memory; every other
    /// top-level line becomes reserved. Nested lines are ignored.
    pub fn from_iomem(text: &str) -> Result<Self> {
        let mut descriptors = Vec::new();
        for line in text.lines() {
            if line.starts_with(' ') || line.trim().is_empty() {
                continue;
            }
            let (range, label) = line
                .split_once(" : ")
                .with_context(|| format!("Malformed iomem line: {}", line))?;
            let (start, end) = range
                .trim()
                .split_once('-')
                .with_context(|| format!("Malformed iomem range: {}", range))?;
            let start = u64::from_str_radix(start, 16)
                .with_context(|| format!("Bad iomem start address: {}", start))?;
            let end = u64::from_str_radix(end, 16)
                .with_context(|| format!("Bad iomem end address: {}", end))?;
            if end < start {
                bail!("Inverted iomem range: {}", range);
            }

            // iomem ranges are inclusive; descriptors cover whole pages.
            let first_frame = start.div_ceil(PAGE_SIZE);
            let end_frame = (end + 1) / PAGE_SIZE;
            if end_frame <= first_frame {
                continue;
            }
            let memory_type = if label.trim() == "System RAM" {
                EfiMemoryType::Conventional
            } else {
                EfiMemoryType::Reserved
            };
            descriptors.push(MemoryDescriptor {
                memory_type,
                physical_start: first_frame * PAGE_SIZE,
                virtual_start: 0,
                number_of_pages: end_frame - first_frame,
                attribute: 0,
            });
        }
        Ok(Self { descriptors })
    }

    pub fn descriptors(&self) -> &[MemoryDescriptor] {
        &self.descriptors
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Half-open range of page frames, `[start_frame, end_frame)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DramRange {
    pub start_frame: u64,
    pub end_frame: u64,
}

impl DramRange {
    pub fn pages(&self) -> u64 {
        self.end_frame - self.start_frame
    }

    pub fn contains(&self, frame: u64) -> bool {
        frame >= self.start_frame && frame < self.end_frame
    }
}

/// Sorted, non-overlapping DRAM ranges derived from a firmware map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DramRangeList {
    ranges: Vec<DramRange>,
}

impl DramRangeList {
    /// Classify, sort and merge the map's DRAM descriptors.
    ///
    /// Adjacent and overlapping ranges are merged. Resolution fails if more
    /// than [`MAX_DRAM_RANGES`] distinct ranges remain.
    pub fn resolve(map: &FirmwareMemoryMap) -> Result<Self> {
        let mut ranges: Vec<DramRange> = map
            .descriptors()
            .iter()
            .filter(|d| d.memory_type.is_dram() && d.number_of_pages > 0)
            .map(|d| {
                let start_frame = d.physical_start / PAGE_SIZE;
                DramRange {
                    start_frame,
                    end_frame: start_frame.saturating_add(d.number_of_pages),
                }
            })
            .collect();
        ranges.sort_by_key(|r| (r.start_frame, r.end_frame));

        let mut merged: Vec<DramRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start_frame <= last.end_frame => {
                    last.end_frame = last.end_frame.max(range.end_frame);
                }
                _ => merged.push(range),
            }
        }

        if merged.len() > MAX_DRAM_RANGES {
            bail!(
                "Firmware map has {} DRAM ranges, more than the supported {}",
                merged.len(),
                MAX_DRAM_RANGES
            );
        }
        Ok(Self { ranges: merged })
    }

    /// Build a list from explicit ranges, sorting and merging them.
    pub fn from_ranges(ranges: &[DramRange]) -> Result<Self> {
        let descriptors = ranges
            .iter()
            .filter(|r| r.end_frame > r.start_frame)
            .map(|r| MemoryDescriptor {
                memory_type: EfiMemoryType::Conventional,
                physical_start: r.start_frame * PAGE_SIZE,
                virtual_start: 0,
                number_of_pages: r.pages(),
                attribute: 0,
            })
            .collect();
        Self::resolve(&FirmwareMemoryMap::new(descriptors))
    }

    pub fn ranges(&self) -> &[DramRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, frame: u64) -> bool {
        let index = self.ranges.partition_point(|r| r.end_frame <= frame);
        self.ranges.get(index).map(|r| r.contains(frame)).unwrap_or(false)
    }

    /// Number of DRAM pages across all ranges.
    pub fn total_pages(&self) -> u64 {
        self.ranges.iter().map(DramRange::pages).sum()
    }

    /// One past the last DRAM frame.
    pub fn top_frame(&self) -> u64 {
        self.ranges.last().map(|r| r.end_frame).unwrap_or(0)
    }

    /// Highest DRAM address plus one; the size of a padded image.
    pub fn top_physical_address(&self) -> u64 {
        self.top_frame().saturating_mul(PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn descriptor(memory_type: u32, start: u64, pages: u64) -> MemoryDescriptor {
        MemoryDescriptor {
            memory_type: EfiMemoryType::from_raw(memory_type),
            physical_start: start,
            virtual_start: 0,
            number_of_pages: pages,
            attribute: 0xF,
        }
    }

    fn encode(descriptors: &[MemoryDescriptor], stride: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for d in descriptors {
            let mut slot = Vec::with_capacity(stride);
            slot.put_u32_le(d.memory_type.raw());
            slot.put_u32_le(0);
            slot.put_u64_le(d.physical_start);
            slot.put_u64_le(d.virtual_start);
            slot.put_u64_le(d.number_of_pages);
            slot.put_u64_le(d.attribute);
            slot.resize(stride, 0xAA);
            out.extend_from_slice(&slot);
        }
        out
    }

    #[test]
    fn test_parse_with_padded_stride() {
        let expected = vec![descriptor(7, 0, 160), descriptor(11, 0xFEC0_0000, 1)];
        let bytes = encode(&expected, 48);

        let map = FirmwareMemoryMap::parse(&bytes, bytes.len(), 48).unwrap();
        assert_eq!(map.descriptors(), &expected[..]);
    }

    #[test]
    fn test_parse_rejects_bad_sizes() {
        let bytes = encode(&[descriptor(7, 0, 1)], 40);
        assert!(FirmwareMemoryMap::parse(&bytes, 40, 32).is_err());
        assert!(FirmwareMemoryMap::parse(&bytes, 80, 40).is_err());
    }

    #[test]
    fn test_type_taxonomy() {
        for raw in [1, 2, 3, 4, 5, 6, 7, 9, 10, 13] {
            assert!(EfiMemoryType::from_raw(raw).is_dram(), "type {} should be DRAM", raw);
        }
        for raw in [0, 8, 11, 12, 14, 15, 0x7000_0000] {
            assert!(!EfiMemoryType::from_raw(raw).is_dram(), "type {} should not be DRAM", raw);
        }
        assert_eq!(EfiMemoryType::from_raw(0x8000_0001).raw(), 0x8000_0001);
    }

    #[test]
    fn test_resolve_merges_adjacent_and_skips_devices() {
        let map = FirmwareMemoryMap::new(vec![
            descriptor(3, 0x10_0000, 0x100),      // frames 0x100..0x200
            descriptor(7, 0, 0xA0),               // frames 0..0xA0
            descriptor(7, 0x20_0000, 0x200),      // frames 0x200..0x400, adjacent
            descriptor(11, 0xE000_0000, 0x1000),  // MMIO
            descriptor(0, 0xA_0000, 0x60),        // reserved hole
            descriptor(7, 0x1_0000_0000, 0),      // empty
            descriptor(10, 0x1_0000_0000, 0x10),  // ACPI NVS above 4GB
        ]);

        let list = DramRangeList::resolve(&map).unwrap();
        assert_eq!(
            list.ranges(),
            &[
                DramRange { start_frame: 0, end_frame: 0xA0 },
                DramRange { start_frame: 0x100, end_frame: 0x400 },
                DramRange { start_frame: 0x10_0000, end_frame: 0x10_0010 },
            ]
        );
        assert_eq!(list.total_pages(), 0xA0 + 0x300 + 0x10);
        assert_eq!(list.top_physical_address(), 0x1_0001_0000);
        assert!(list.contains(0));
        assert!(!list.contains(0xA0));
        assert!(list.contains(0x3FF));
        assert!(!list.contains(0x400));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let map = FirmwareMemoryMap::new(vec![
            descriptor(7, 0x40_0000, 8),
            descriptor(4, 0, 4),
            descriptor(7, 0x2000, 16),
        ]);
        let first = DramRangeList::resolve(&map).unwrap();
        let second = DramRangeList::resolve(&map).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.top_physical_address(), second.top_physical_address());
    }

    #[test]
    fn test_resolve_rejects_too_many_ranges() {
        let descriptors = (0..(MAX_DRAM_RANGES as u64 + 1))
            .map(|i| descriptor(7, i * 2 * PAGE_SIZE, 1))
            .collect();
        assert!(DramRangeList::resolve(&FirmwareMemoryMap::new(descriptors)).is_err());
    }

    #[test]
    fn test_from_iomem() {
        let iomem = "\
00000000-00000fff : Reserved
00001000-0009ffff : System RAM
000a0000-000fffff : Reserved
  000a0000-000bffff : PCI Bus 0000:00
00100000-bffdffff : System RAM
  01000000-01e0367f : Kernel code
feb00000-febfffff : PCI Bus 0000:00
100000000-13fffffff : System RAM
";
        let map = FirmwareMemoryMap::from_iomem(iomem).unwrap();
        let list = DramRangeList::resolve(&map).unwrap();
        assert_eq!(
            list.ranges(),
            &[
                DramRange { start_frame: 1, end_frame: 0xA0 },
                DramRange { start_frame: 0x100, end_frame: 0xBFFE0 },
                DramRange { start_frame: 0x10_0000, end_frame: 0x14_0000 },
            ]
        );
    }

    #[test]
    fn test_from_iomem_rejects_garbage() {
        assert!(FirmwareMemoryMap::from_iomem("not an iomem line").is_err());
        assert!(FirmwareMemoryMap::from_iomem("zz-10 : System RAM").is_err());
    }

    #[test]
    fn test_from_ranges_matches_scenario() {
        let list = DramRangeList::from_ranges(&[DramRange { start_frame: 0, end_frame: 10 }]).unwrap();
        assert_eq!(list.top_physical_address(), 10 * PAGE_SIZE);
        assert_eq!(list.total_pages(), 10);
    }
}
