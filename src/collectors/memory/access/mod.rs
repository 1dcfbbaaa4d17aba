//! Privileged physical memory access.
//!
//! A [`MemoryAccess`] service maps a physical address range into this
//! process, one mapping at a time. A new request silently invalidates the
//! previous mapping. [`MappedRegion`] borrows the service mutably, so the
//! compiler rejects any attempt to keep reading a mapping after asking for
//! the next one.
//!
//! ## Implementations
//!
//! - [`DriverClient`]: fixed-size request/response protocol over a
//!   [`DriverTransport`] to a kernel-resident driver
//! - [`DevMemAccess`]: Linux `/dev/mem` (unix only)
//! - [`ImageAccess`]: serves frames out of an existing raw image

mod driver;
mod image;

#[cfg(target_os = "linux")]
mod devmem;

pub use driver::{BootArgs, DriverClient, DriverTransport, MapMemoryRequest, MapMemoryResponse};
pub use image::ImageAccess;

#[cfg(target_os = "linux")]
pub use devmem::DevMemAccess;

#[cfg(test)]
pub use driver::MockDriverTransport;

use std::io;

use thiserror::Error;

use crate::constants::FOUR_GIB;

/// Addresses a kernel-mediated mapping service refuses to map directly.
pub fn is_platform_restricted(physical_address: u64) -> bool {
    physical_address == 0 || physical_address == FOUR_GIB
}

/// Failure at the privileged service boundary.
#[derive(Debug, Error)]
pub enum AccessError {
    /// A request or response did not have its fixed wire size.
    #[error("{what} is {actual} bytes, expected exactly {expected}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The service refused or failed to map the range.
    #[error("unable to map {length} bytes at physical address {address:#x}")]
    MapFailed { address: u64, length: u64 },

    /// The service does not offer this operation on this host.
    #[error("{0} is not supported by this memory source")]
    Unsupported(&'static str),

    #[error("memory service I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The single live mapping of a [`MemoryAccess`] service.
#[derive(Debug)]
pub struct MappedRegion<'a> {
    physical_address: u64,
    virtual_address: u64,
    bytes: &'a [u8],
}

impl<'a> MappedRegion<'a> {
    pub fn new(physical_address: u64, virtual_address: u64, bytes: &'a [u8]) -> Self {
        Self {
            physical_address,
            virtual_address,
            bytes,
        }
    }

    pub fn physical_address(&self) -> u64 {
        self.physical_address
    }

    pub fn virtual_address(&self) -> u64 {
        self.virtual_address
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}

/// Single-caller physical memory mapping service.
pub trait MemoryAccess: Send {
    /// Map `length` bytes at `physical_address`, releasing any previous
    /// mapping.
    fn map_memory(&mut self, physical_address: u64, length: u64) -> Result<MappedRegion<'_>, AccessError>;

    /// Boot arguments describing where the firmware memory map lives.
    fn boot_args(&mut self) -> Result<BootArgs, AccessError>;

    /// Whether the service needs elevated privileges.
    fn requires_privileges(&self) -> bool {
        true
    }

    /// Whether a mapping may not start at `physical_address`.
    ///
    /// Frames at such addresses are read from one byte in and get a
    /// synthesized leading zero.
    fn refuses_direct_mapping(&self, physical_address: u64) -> bool {
        is_platform_restricted(physical_address)
    }

    /// Short description for manifests and logs.
    fn describe(&self) -> String;
}

impl<T: MemoryAccess + ?Sized> MemoryAccess for Box<T> {
    fn map_memory(&mut self, physical_address: u64, length: u64) -> Result<MappedRegion<'_>, AccessError> {
        (**self).map_memory(physical_address, length)
    }

    fn boot_args(&mut self) -> Result<BootArgs, AccessError> {
        (**self).boot_args()
    }

    fn requires_privileges(&self) -> bool {
        (**self).requires_privileges()
    }

    fn refuses_direct_mapping(&self, physical_address: u64) -> bool {
        (**self).refuses_direct_mapping(physical_address)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
