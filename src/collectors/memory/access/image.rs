use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::collectors::memory::access::{
    is_platform_restricted, AccessError, BootArgs, MappedRegion, MemoryAccess,
};

/// Serves physical memory out of a flat raw image, where file offset
/// equals physical address.
///
/// Useful for re-acquiring an existing image into a fresh case with new
/// digests, and as a deterministic stand-in for the driver. Can emulate
/// the platform restriction that refuses mappings starting at address 0
/// or exactly at 4 GiB.
pub struct ImageAccess<R> {
    reader: R,
    size: u64,
    buffer: Vec<u8>,
    boot_args: Option<BootArgs>,
    restricted: bool,
    label: String,
}

impl ImageAccess<BufReader<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file), path.display().to_string())
    }
}

impl<R: Read + Seek + Send> ImageAccess<R> {
    pub fn new(mut reader: R, label: impl Into<String>) -> io::Result<Self> {
        let size = reader.seek(SeekFrom::End(0))?;
        Ok(Self {
            reader,
            size,
            buffer: Vec::new(),
            boot_args: None,
            restricted: false,
            label: label.into(),
        })
    }

    /// Boot arguments to hand out, typically pointing at a firmware map
    /// stored inside the image.
    pub fn with_boot_args(mut self, boot_args: BootArgs) -> Self {
        self.boot_args = Some(boot_args);
        self
    }

    /// Refuse mappings that start at 0 or at 4 GiB, like the driver does.
    pub fn with_platform_restrictions(mut self, restricted: bool) -> Self {
        self.restricted = restricted;
        self
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl<R: Read + Seek + Send> MemoryAccess for ImageAccess<R> {
    fn map_memory(&mut self, physical_address: u64, length: u64) -> Result<MappedRegion<'_>, AccessError> {
        let failed = AccessError::MapFailed { address: physical_address, length };
        if self.refuses_direct_mapping(physical_address) {
            return Err(failed);
        }
        let end = physical_address.checked_add(length).ok_or(AccessError::MapFailed {
            address: physical_address,
            length,
        })?;
        if end > self.size {
            return Err(failed);
        }
        let byte_count = usize::try_from(length).map_err(|_| failed)?;

        self.reader.seek(SeekFrom::Start(physical_address))?;
        self.buffer.resize(byte_count, 0);
        self.reader.read_exact(&mut self.buffer)?;

        let virtual_address = self.buffer.as_ptr() as u64;
        Ok(MappedRegion::new(physical_address, virtual_address, &self.buffer))
    }

    fn boot_args(&mut self) -> Result<BootArgs, AccessError> {
        self.boot_args.ok_or(AccessError::Unsupported("boot args"))
    }

    fn requires_privileges(&self) -> bool {
        false
    }

    fn refuses_direct_mapping(&self, physical_address: u64) -> bool {
        self.restricted && is_platform_restricted(physical_address)
    }

    fn describe(&self) -> String {
        format!("raw image {}", self.label)
    }
}
