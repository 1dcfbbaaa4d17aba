use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use log::debug;

use crate::collectors::memory::access::{AccessError, BootArgs, MappedRegion, MemoryAccess};

struct Mapping {
    base: usize,
    len: usize,
}

/// Physical memory through the Linux `/dev/mem` device.
///
/// Each request `mmap`s the covering pages read-only and `munmap`s the
/// previous mapping first, so exactly one mapping is live. Kernels built
/// with `STRICT_DEVMEM` refuse most of RAM; such refusals surface as
/// mapping failures.
pub struct DevMemAccess {
    file: File,
    path: PathBuf,
    page_size: u64,
    current: Option<Mapping>,
}

impl DevMemAccess {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        // SAFETY: sysconf has no preconditions.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page_size = if page_size > 0 { page_size as u64 } else { 4096 };
        Ok(Self {
            file,
            path: path.to_path_buf(),
            page_size,
            current: None,
        })
    }

    fn release(&mut self) {
        if let Some(mapping) = self.current.take() {
            // SAFETY: `base`/`len` come from a successful mmap that has not
            // been unmapped yet, and no slice into it outlives this call
            // because slices borrow `self` mutably.
            let rc = unsafe { libc::munmap(mapping.base as *mut libc::c_void, mapping.len) };
            if rc != 0 {
                debug!("munmap failed: {}", io::Error::last_os_error());
            }
        }
    }
}

impl MemoryAccess for DevMemAccess {
    fn map_memory(&mut self, physical_address: u64, length: u64) -> Result<MappedRegion<'_>, AccessError> {
        self.release();

        let failed = AccessError::MapFailed { address: physical_address, length };
        let aligned = physical_address - physical_address % self.page_size;
        let delta = (physical_address - aligned) as usize;
        let byte_count = usize::try_from(length).map_err(|_| failed)?;
        let map_len = delta + byte_count;
        let offset = libc::off_t::try_from(aligned).map_err(|_| AccessError::MapFailed {
            address: physical_address,
            length,
        })?;

        // SAFETY: a fresh read-only shared mapping of the device; the
        // kernel validates the offset and length.
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                offset,
            )
        };
        if base == libc::MAP_FAILED {
            debug!(
                "mmap of {} at {:#x} failed: {}",
                self.path.display(),
                aligned,
                io::Error::last_os_error()
            );
            return Err(AccessError::MapFailed { address: physical_address, length });
        }
        self.current = Some(Mapping { base: base as usize, len: map_len });

        // SAFETY: the mapping covers `delta + byte_count` readable bytes and
        // stays mapped until the next request or drop, both of which need
        // `&mut self` and therefore end this borrow first.
        let bytes = unsafe { std::slice::from_raw_parts((base as *const u8).add(delta), byte_count) };
        Ok(MappedRegion::new(physical_address, base as u64 + delta as u64, bytes))
    }

    fn boot_args(&mut self) -> Result<BootArgs, AccessError> {
        Err(AccessError::Unsupported("boot args"))
    }

    fn describe(&self) -> String {
        format!("device {}", self.path.display())
    }
}

impl Drop for DevMemAccess {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device() {
        assert!(DevMemAccess::open(Path::new("/nonexistent/mem")).is_err());
    }

    #[test]
    fn test_maps_regular_file_unaligned() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("fake_mem");
        let data: Vec<u8> = (0..3 * 4096u32).map(|i| (i % 199) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let mut access = DevMemAccess::open(&path).unwrap();
        let region = access.map_memory(1, 4095).unwrap();
        assert_eq!(region.as_bytes(), &data[1..4096]);
        let region = access.map_memory(4096, 4096).unwrap();
        assert_eq!(region.as_bytes(), &data[4096..8192]);
        assert!(matches!(access.boot_args(), Err(AccessError::Unsupported(_))));
    }
}
