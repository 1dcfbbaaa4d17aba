//! Integration tests for physical memory acquisition.
//!
//! A flat file stands in for physical memory so the whole module lifecycle
//! runs without privileges: map resolution, the page loop, the evidence
//! image and the manifest.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::Result;
use tempfile::TempDir;

use rust_acquire::collectors::memory::access::{ImageAccess, MemoryAccess};
use rust_acquire::collectors::memory::firmware::{EfiMemoryType, FirmwareMemoryMap, MemoryDescriptor};
use rust_acquire::collectors::memory::{MapSource, MemorySource, PhysicalMemoryModule};
use rust_acquire::collectors::module::CollectionModule;
use rust_acquire::collectors::status::{MemoryStatus, ModuleStatus};
use rust_acquire::constants::PAGE_SIZE;
use rust_acquire::utils::evidence::verify_evidence;
use rust_acquire::utils::hash::hash_bytes;
use rust_acquire::utils::system::KernelInfo;

fn test_kernel() -> KernelInfo {
    KernelInfo {
        sysname: "Linux".to_string(),
        release: "6.1.0".to_string(),
        machine: "x86_64".to_string(),
        pointer_width: 64,
    }
}

fn memory_contents(pages: u64) -> Vec<u8> {
    (0..pages * PAGE_SIZE).map(|i| (i % 241) as u8 ^ 0x5A).collect()
}

fn descriptor(memory_type: EfiMemoryType, start_page: u64, pages: u64) -> MemoryDescriptor {
    MemoryDescriptor {
        memory_type,
        physical_start: start_page * PAGE_SIZE,
        virtual_start: 0,
        number_of_pages: pages,
        attribute: 0,
    }
}

fn module_for(data: Vec<u8>, map: FirmwareMemoryMap) -> PhysicalMemoryModule {
    let source = MemorySource::new(
        "test memory",
        false,
        Box::new(move || {
            let access = ImageAccess::new(Cursor::new(data.clone()), "test memory")?;
            Ok(Box::new(access) as Box<dyn MemoryAccess>)
        }),
        MapSource::Explicit(map),
    );
    PhysicalMemoryModule::new(source)
        .with_kernel_info(test_kernel())
        .with_elevation(false)
        .with_base(|base| base.with_min_free_space_mb(0))
}

fn read_manifest(output: &Path) -> Result<String> {
    Ok(fs::read_to_string(output.join("PhysicalMemory.xml"))?)
}

#[test]
fn test_flat_image_with_mmio_gap() -> Result<()> {
    let output = TempDir::new()?;
    let data = memory_contents(8);
    let map = FirmwareMemoryMap::new(vec![
        descriptor(EfiMemoryType::Conventional, 0, 4),
        descriptor(EfiMemoryType::MemoryMappedIo, 4, 2),
        descriptor(EfiMemoryType::LoaderData, 6, 2),
    ]);
    let mut module = module_for(data.clone(), map);

    let status = module.start(output.path(), false);

    assert_eq!(status, ModuleStatus::Complete);
    assert_eq!(module.progress(), 100.0);

    let image = fs::read(output.path().join("PhysicalMemory/PhysicalMemory"))?;
    assert_eq!(image.len() as u64, 8 * PAGE_SIZE);
    let gap = (4 * PAGE_SIZE) as usize..(6 * PAGE_SIZE) as usize;
    assert_eq!(&image[..gap.start], &data[..gap.start]);
    assert!(image[gap.clone()].iter().all(|&b| b == 0));
    assert_eq!(&image[gap.end..], &data[gap.end..]);

    let manifest = read_manifest(output.path())?;
    assert!(manifest.contains("<pagesMapped>6</pagesMapped>"));
    assert!(manifest.contains("<pagesZeroFilled>2</pagesZeroFilled>"));
    assert!(manifest.contains("<acquisitionInterrupted>false</acquisitionInterrupted>"));
    assert!(manifest.contains(&format!("<inputSHA256>{}</inputSHA256>", hash_bytes(&image))));
    assert!(manifest.contains("<moduleStatus>Complete</moduleStatus>"));

    let report = module.base().report();
    assert_eq!(report.evidence.len(), 1);
    assert_eq!(report.evidence[0].bytes_in, 8 * PAGE_SIZE);
    Ok(())
}

#[test]
fn test_compressed_image_keeps_memory_digest() -> Result<()> {
    let output = TempDir::new()?;
    let data = memory_contents(6);
    let map = FirmwareMemoryMap::new(vec![descriptor(EfiMemoryType::Conventional, 0, 6)]);
    let mut module = module_for(data.clone(), map);

    assert_eq!(module.start(output.path(), true), ModuleStatus::Complete);

    let image_path = output.path().join("PhysicalMemory/PhysicalMemory.zip");
    let sealed = &module.base().evidence()[0];
    assert_eq!(sealed.path, image_path);
    assert!(sealed.compressed);
    assert_eq!(sealed.input_sha256, hash_bytes(&data));
    assert_eq!(verify_evidence(&image_path, true)?, (hash_bytes(&data), data.len() as u64));
    assert_eq!(verify_evidence(&image_path, false)?.0, sealed.output_sha256);
    Ok(())
}

#[test]
fn test_map_without_dram_fails() -> Result<()> {
    let output = TempDir::new()?;
    let map = FirmwareMemoryMap::new(vec![
        descriptor(EfiMemoryType::Reserved, 0, 2),
        descriptor(EfiMemoryType::MemoryMappedIo, 2, 2),
    ]);
    let mut module = module_for(memory_contents(4), map);

    let status = module.start(output.path(), false);

    assert_eq!(status, ModuleStatus::Memory(MemoryStatus::EfiMapReadFailed));
    assert_eq!(status.code(), -1008);
    assert!(!output.path().join("PhysicalMemory/PhysicalMemory").exists());
    Ok(())
}

#[test]
fn test_map_beyond_source_reports_open_image_failure() -> Result<()> {
    let output = TempDir::new()?;
    // The map claims eight pages but only four are readable.
    let map = FirmwareMemoryMap::new(vec![descriptor(EfiMemoryType::Conventional, 0, 8)]);
    let mut module = module_for(memory_contents(4), map);

    let status = module.start(output.path(), false);

    assert_eq!(status, ModuleStatus::Memory(MemoryStatus::OpenImageFailed));
    let manifest = read_manifest(output.path())?;
    assert!(manifest.contains("<acquisitionInterrupted>true</acquisitionInterrupted>"));
    assert!(manifest.contains("<pagesMapped>4</pagesMapped>"));
    Ok(())
}

#[test]
fn test_cancel_before_start_writes_no_pages() -> Result<()> {
    let output = TempDir::new()?;
    let map = FirmwareMemoryMap::new(vec![descriptor(EfiMemoryType::Conventional, 0, 4)]);
    let mut module = module_for(memory_contents(4), map);

    module.cancel();
    let status = module.start(output.path(), false);

    assert_eq!(status, ModuleStatus::Cancelled);
    assert!(status.is_terminal());
    let manifest = read_manifest(output.path())?;
    assert!(manifest.contains("<pagesMapped>0</pagesMapped>"));
    assert!(manifest.contains("<moduleStatus>Cancelled</moduleStatus>"));
    Ok(())
}

#[test]
fn test_finished_module_cannot_restart_until_reset() -> Result<()> {
    let first = TempDir::new()?;
    let second = TempDir::new()?;
    let map = FirmwareMemoryMap::new(vec![descriptor(EfiMemoryType::Conventional, 0, 2)]);
    let mut module = module_for(memory_contents(2), map);

    assert_eq!(module.start(first.path(), false), ModuleStatus::Complete);
    // A finished module returns its last status without touching disk.
    assert_eq!(module.start(second.path(), false), ModuleStatus::Complete);
    assert!(!second.path().join("PhysicalMemory").exists());

    assert!(module.reset());
    assert_eq!(module.progress(), 0.0);
    assert_eq!(module.start(second.path(), false), ModuleStatus::Complete);
    assert!(second.path().join("PhysicalMemory/PhysicalMemory").exists());
    Ok(())
}

#[test]
fn test_reacquire_image_file() -> Result<()> {
    let source_dir = TempDir::new()?;
    let output = TempDir::new()?;
    let data = memory_contents(3);
    let image = source_dir.path().join("memory.raw");
    fs::write(&image, &data)?;

    let source = MemorySource::image(&image)?;
    assert!(!source.is_privileged());
    let mut module = PhysicalMemoryModule::new(source)
        .with_kernel_info(test_kernel())
        .with_base(|base| base.with_min_free_space_mb(0));

    assert_eq!(module.start(output.path(), false), ModuleStatus::Complete);
    assert_eq!(fs::read(output.path().join("PhysicalMemory/PhysicalMemory"))?, data);
    Ok(())
}

#[test]
fn test_unsupported_kernel_stops_before_output() -> Result<()> {
    let output = TempDir::new()?;
    let map = FirmwareMemoryMap::new(vec![descriptor(EfiMemoryType::Conventional, 0, 1)]);
    let mut module = module_for(memory_contents(1), map).with_kernel_info(KernelInfo {
        pointer_width: 32,
        ..test_kernel()
    });

    let status = module.start(output.path(), false);

    assert_eq!(status, ModuleStatus::Memory(MemoryStatus::UnsupportedKernelBitness));
    assert!(!output.path().join("PhysicalMemory.xml").exists());
    Ok(())
}
