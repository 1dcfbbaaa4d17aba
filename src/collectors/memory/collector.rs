//! Physical memory module
//!
//! Acquires DRAM into a single flat image inside the module's case
//! directory and documents the firmware map, the acquired regions and both
//! image digests in the manifest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::collectors::manifest::Manifest;
use crate::collectors::memory::access::{AccessError, ImageAccess, MemoryAccess};
use crate::collectors::memory::acquisition::{acquire_pages, status_for_write_error};
use crate::collectors::memory::firmware::{
    DramRangeList, EfiMemoryType, FirmwareMemoryMap, MemoryDescriptor,
};
use crate::collectors::memory::models::{AcquisitionOutcome, RegionKind};
use crate::collectors::module::{AcquisitionContext, CollectionModule, ModuleBase};
use crate::collectors::status::{MemoryStatus, ModuleStatus};
use crate::constants::{ARCHIVE_EXTENSION, PAGE_SIZE};
use crate::privileges::is_elevated;
use crate::utils::disk::available_space;
use crate::utils::evidence::EvidenceWriter;
use crate::utils::system::KernelInfo;

pub const MODULE_NAME: &str = "Physical Memory";
pub const MODULE_SHORT_NAME: &str = "PhysicalMemory";

/// Opens a fresh memory access service for one acquisition.
pub type AccessFactory = Box<dyn FnMut() -> io::Result<Box<dyn MemoryAccess>> + Send>;

/// Where the firmware memory map comes from.
#[derive(Debug, Clone)]
pub enum MapSource {
    /// Read the EFI map the boot arguments point at, through the service
    BootArgs,
    /// Parse a Linux `/proc/iomem` style listing
    Iomem(PathBuf),
    /// A map supplied up front
    Explicit(FirmwareMemoryMap),
}

/// A memory access service plus the firmware map that goes with it.
pub struct MemorySource {
    label: String,
    privileged: bool,
    open: AccessFactory,
    map: MapSource,
}

impl MemorySource {
    pub fn new(label: impl Into<String>, privileged: bool, open: AccessFactory, map: MapSource) -> Self {
        Self {
            label: label.into(),
            privileged,
            open,
            map,
        }
    }

    /// Live memory through `/dev/mem`, bounded by `/proc/iomem`.
    #[cfg(target_os = "linux")]
    pub fn dev_mem(device: &Path, iomem: &Path) -> Self {
        use crate::collectors::memory::access::DevMemAccess;

        let device = device.to_path_buf();
        let label = device.display().to_string();
        Self::new(
            label,
            true,
            Box::new(move || Ok(Box::new(DevMemAccess::open(&device)?) as Box<dyn MemoryAccess>)),
            MapSource::Iomem(iomem.to_path_buf()),
        )
    }

    /// Re-acquire an existing flat image; all of it is treated as DRAM.
    pub fn image(path: &Path) -> io::Result<Self> {
        let size = fs::metadata(path)?.len();
        let pages = size / PAGE_SIZE;
        let map = FirmwareMemoryMap::new(vec![MemoryDescriptor {
            memory_type: EfiMemoryType::Conventional,
            physical_start: 0,
            virtual_start: 0,
            number_of_pages: pages,
            attribute: 0,
        }]);
        if size % PAGE_SIZE != 0 {
            warn!("Ignoring {} trailing bytes of {}", size % PAGE_SIZE, path.display());
        }

        let image = path.to_path_buf();
        Ok(Self::new(
            image.display().to_string(),
            false,
            Box::new(move || Ok(Box::new(ImageAccess::open(&image)?) as Box<dyn MemoryAccess>)),
            MapSource::Explicit(map),
        ))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }
}

/// Acquires physical memory into `<case>/PhysicalMemory/PhysicalMemory`.
pub struct PhysicalMemoryModule {
    base: ModuleBase,
    source: MemorySource,
    kernel: Option<KernelInfo>,
    elevated: Option<bool>,
}

impl PhysicalMemoryModule {
    pub fn new(source: MemorySource) -> Self {
        Self {
            base: ModuleBase::new(MODULE_NAME, MODULE_SHORT_NAME),
            source,
            kernel: None,
            elevated: None,
        }
    }

    /// Use fixed kernel information instead of asking `uname`.
    pub fn with_kernel_info(mut self, kernel: KernelInfo) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// Use a fixed privilege level instead of checking the effective user.
    pub fn with_elevation(mut self, elevated: bool) -> Self {
        self.elevated = Some(elevated);
        self
    }

    pub fn with_base(mut self, configure: impl FnOnce(ModuleBase) -> ModuleBase) -> Self {
        self.base = configure(self.base);
        self
    }

    pub fn source(&self) -> &MemorySource {
        &self.source
    }

    fn image_path(ctx: &AcquisitionContext) -> PathBuf {
        let mut name = MODULE_SHORT_NAME.to_string();
        if ctx.compression() {
            name.push('.');
            name.push_str(ARCHIVE_EXTENSION);
        }
        ctx.case_path().join(name)
    }
}

fn boot_args_map(access: &mut dyn MemoryAccess, ctx: &AcquisitionContext) -> Result<FirmwareMemoryMap, ModuleStatus> {
    let boot_args = access.boot_args().map_err(|e| {
        crate::case_log!(ctx.case_log(), "Unable to read boot arguments: {}", e);
        ModuleStatus::Memory(MemoryStatus::BootArgsReadFailed)
    })?;
    debug!("Boot args: {:?}", boot_args);

    let map_failed = |e: &dyn std::fmt::Display| {
        crate::case_log!(ctx.case_log(), "Unable to read EFI memory map: {}", e);
        ModuleStatus::Memory(MemoryStatus::EfiMapReadFailed)
    };
    let bytes = {
        let region = access
            .map_memory(boot_args.memory_map, u64::from(boot_args.memory_map_size))
            .map_err(|e: AccessError| map_failed(&e))?;
        region.as_bytes().to_vec()
    };
    FirmwareMemoryMap::parse(
        &bytes,
        boot_args.memory_map_size as usize,
        boot_args.memory_map_descriptor_size as usize,
    )
    .map_err(|e| map_failed(&e))
}

fn record_memory_map(manifest: &mut Manifest, map: &FirmwareMemoryMap, ranges: &DramRangeList) {
    manifest.start_tag("efiMemoryRegions", 1);
    for descriptor in map.descriptors() {
        manifest.start_tag("efiMemoryRegion", 2);
        manifest.complete_tag("physicalAddressStart", 3, format!("{:#x}", descriptor.physical_start));
        manifest.complete_tag("physicalAddressEnd", 3, format!("{:#x}", descriptor.physical_end()));
        manifest.complete_tag("efiMemoryRegionType", 3, descriptor.memory_type);
        manifest.complete_tag("rangeIsDRAM", 3, descriptor.memory_type.is_dram());
        manifest.end_tag("efiMemoryRegion", 2);
    }
    manifest.end_tag("efiMemoryRegions", 1);

    manifest.start_tag("dramRanges", 1);
    for range in ranges.ranges() {
        let start = format!("{:#x}", range.start_frame * PAGE_SIZE);
        let end = format!("{:#x}", range.end_frame * PAGE_SIZE);
        manifest.complete_tag_with_attributes(
            "dramRange",
            2,
            &[("start", start.as_str()), ("end", end.as_str())],
            range.pages(),
        );
    }
    manifest.end_tag("dramRanges", 1);
}

fn record_image(manifest: &mut Manifest, image: &Path, compressed: bool, outcome: &AcquisitionOutcome) {
    manifest.start_tag("acquisitionImage", 1);
    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    manifest.complete_tag("imageFileName", 2, file_name);
    manifest.complete_tag("imageCompressed", 2, compressed);

    for region in &outcome.regions {
        manifest.start_tag("acquiredRegion", 2);
        manifest.complete_tag("physicalAddressStart", 3, format!("{:#x}", region.physical_start));
        manifest.complete_tag("physicalAddressEnd", 3, format!("{:#x}", region.physical_end));
        manifest.complete_tag("fileOffsetStart", 3, region.file_offset_start);
        manifest.complete_tag("fileOffsetEnd", 3, region.file_offset_end);
        manifest.complete_tag("zeroFilled", 3, region.kind == RegionKind::ZeroFilled);
        manifest.end_tag("acquiredRegion", 2);
    }
    if let Some(page) = &outcome.unmappable {
        let address = format!("{:#x}", page.physical_address);
        manifest.complete_tag_with_attributes(
            "unmappablePage",
            2,
            &[("physicalAddress", address.as_str())],
            &page.reason,
        );
    }
    manifest.complete_tag("pagesMapped", 2, outcome.pages_mapped);
    manifest.complete_tag("pagesZeroFilled", 2, outcome.pages_zero_filled);
    manifest.complete_tag("acquisitionInterrupted", 2, outcome.interrupted());
}

impl CollectionModule for PhysicalMemoryModule {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    fn preflight(&mut self) -> ModuleStatus {
        let kernel = match self.kernel.clone().map(Ok).unwrap_or_else(KernelInfo::current) {
            Ok(kernel) => kernel,
            Err(e) => {
                crate::case_log!(self.base.case_log(), "Unable to identify kernel: {}", e);
                return ModuleStatus::UnsupportedOsVersion;
            }
        };
        crate::case_log!(self.base.case_log(), "Kernel: {}", kernel);

        if !kernel.is_64_bit() {
            return ModuleStatus::Memory(MemoryStatus::UnsupportedKernelBitness);
        }
        if !kernel.is_supported_architecture() {
            return ModuleStatus::Memory(MemoryStatus::UnsupportedKernelArchitecture);
        }

        let elevated = self.elevated.unwrap_or_else(is_elevated);
        if self.source.privileged && !elevated {
            crate::case_log!(
                self.base.case_log(),
                "{} requires elevated privileges",
                self.source.label
            );
            return ModuleStatus::DisabledInsufficientPermissions;
        }
        ModuleStatus::Ok
    }

    fn acquire(&mut self, ctx: &mut AcquisitionContext) -> ModuleStatus {
        let mut access = match (self.source.open)() {
            Ok(access) => access,
            Err(e) => {
                crate::case_log!(ctx.case_log(), "Unable to open {}: {}", self.source.label, e);
                return ModuleStatus::Memory(MemoryStatus::DriverOpenFailed);
            }
        };
        info!("Acquiring physical memory from {}", access.describe());
        ctx.manifest().complete_tag("memorySource", 1, access.describe());

        let map = match &self.source.map {
            MapSource::BootArgs => match boot_args_map(access.as_mut(), ctx) {
                Ok(map) => map,
                Err(status) => return status,
            },
            MapSource::Iomem(path) => {
                let parsed = fs::read_to_string(path)
                    .map_err(anyhow::Error::from)
                    .and_then(|text| FirmwareMemoryMap::from_iomem(&text));
                match parsed {
                    Ok(map) => map,
                    Err(e) => {
                        crate::case_log!(ctx.case_log(), "Unable to read {}: {}", path.display(), e);
                        return ModuleStatus::Memory(MemoryStatus::EfiMapReadFailed);
                    }
                }
            }
            MapSource::Explicit(map) => map.clone(),
        };

        let ranges = match DramRangeList::resolve(&map) {
            Ok(ranges) if !ranges.is_empty() => ranges,
            Ok(_) => {
                crate::case_log!(ctx.case_log(), "Firmware map lists no DRAM");
                return ModuleStatus::Memory(MemoryStatus::EfiMapReadFailed);
            }
            Err(e) => {
                crate::case_log!(ctx.case_log(), "Unable to resolve DRAM ranges: {}", e);
                return ModuleStatus::Memory(MemoryStatus::EfiMapReadFailed);
            }
        };
        record_memory_map(ctx.manifest(), &map, &ranges);
        crate::case_log!(
            ctx.case_log(),
            "{} DRAM ranges, {} pages, image size {} bytes",
            ranges.ranges().len(),
            ranges.total_pages(),
            ranges.top_physical_address()
        );

        let image_size = ranges.top_physical_address();
        if !ctx.compression() {
            let required = image_size.saturating_add(self.base.min_free_space());
            if let Some(available) = available_space(ctx.case_path()) {
                if available < required {
                    crate::case_log!(
                        ctx.case_log(),
                        "Image needs {} bytes, {} available",
                        required,
                        available
                    );
                    return ModuleStatus::LowDiskSpace;
                }
            }
        }

        let image_path = Self::image_path(ctx);
        let mut writer = match EvidenceWriter::create(&image_path, ctx.compression()) {
            Ok(writer) => writer,
            Err(e) => {
                crate::case_log!(ctx.case_log(), "Unable to create {}: {}", image_path.display(), e);
                return ModuleStatus::Error;
            }
        };

        let outcome = acquire_pages(access.as_mut(), &ranges, &mut writer, ctx);
        drop(access);

        let mut status = outcome.status;
        let compressed = writer.is_compressed();
        record_image(ctx.manifest(), &image_path, compressed, &outcome);
        match writer.close() {
            Ok(sealed) => {
                let manifest = ctx.manifest();
                manifest.complete_tag("inputSHA256", 2, &sealed.input_sha256);
                manifest.complete_tag("outputSHA256", 2, &sealed.output_sha256);
                manifest.complete_tag("bytesIn", 2, sealed.bytes_in);
                manifest.complete_tag("bytesOut", 2, sealed.bytes_out);
                crate::case_log!(
                    ctx.case_log(),
                    "Image {} sealed: {} bytes in, SHA-256 {}",
                    sealed.path.display(),
                    sealed.bytes_in,
                    sealed.input_sha256
                );
                ctx.record_evidence(sealed);
            }
            Err(e) => {
                crate::case_log!(ctx.case_log(), "Unable to seal {}: {}", image_path.display(), e);
                status = status_after_seal_failure(status, &e);
            }
        }
        ctx.manifest().end_tag("acquisitionImage", 1);

        status
    }
}

/// A failed seal only overrides a status that was still a success.
fn status_after_seal_failure(status: ModuleStatus, error: &io::Error) -> ModuleStatus {
    if status == ModuleStatus::Complete {
        status_for_write_error(error)
    } else {
        status
    }
}
