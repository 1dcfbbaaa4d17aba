use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::debug;

use crate::collectors::memory::access::{AccessError, MappedRegion, MemoryAccess};
use crate::constants::{
    BOOT_ARGS_SELECTOR, BOOT_ARGS_SIZE, MAP_MEMORY_REQUEST_SIZE, MAP_MEMORY_RESPONSE_SIZE,
    MAP_MEMORY_SELECTOR,
};

fn check_size(what: &'static str, raw: &[u8], expected: usize) -> Result<(), AccessError> {
    if raw.len() != expected {
        return Err(AccessError::SizeMismatch {
            what,
            expected,
            actual: raw.len(),
        });
    }
    Ok(())
}

/// Map-memory request: physical address and length, 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapMemoryRequest {
    pub physical_address: u64,
    pub length: u64,
}

impl MapMemoryRequest {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MAP_MEMORY_REQUEST_SIZE);
        buf.put_u64_le(self.physical_address);
        buf.put_u64_le(self.length);
        buf.freeze()
    }

    pub fn decode(raw: &[u8]) -> Result<Self, AccessError> {
        check_size("map memory request", raw, MAP_MEMORY_REQUEST_SIZE)?;
        let mut buf = raw;
        Ok(Self {
            physical_address: buf.get_u64_le(),
            length: buf.get_u64_le(),
        })
    }
}

/// Map-memory response: mapped virtual address plus the echoed request,
/// 24 bytes. A zero virtual address means the mapping failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapMemoryResponse {
    pub virtual_address: u64,
    pub physical_address: u64,
    pub length: u64,
}

impl MapMemoryResponse {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MAP_MEMORY_RESPONSE_SIZE);
        buf.put_u64_le(self.virtual_address);
        buf.put_u64_le(self.physical_address);
        buf.put_u64_le(self.length);
        buf.freeze()
    }

    pub fn decode(raw: &[u8]) -> Result<Self, AccessError> {
        check_size("map memory response", raw, MAP_MEMORY_RESPONSE_SIZE)?;
        let mut buf = raw;
        Ok(Self {
            virtual_address: buf.get_u64_le(),
            physical_address: buf.get_u64_le(),
            length: buf.get_u64_le(),
        })
    }
}

/// Boot arguments handed over by the boot loader, 64 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootArgs {
    pub revision: u16,
    pub version: u16,
    /// 32 or 64, the bitness of the EFI firmware
    pub efi_mode: u8,
    pub debug_mode: u8,
    pub flags: u16,
    /// Physical address of the EFI memory map
    pub memory_map: u64,
    pub memory_map_size: u32,
    pub memory_map_descriptor_size: u32,
    pub memory_map_descriptor_version: u32,
    pub physical_memory_size: u64,
    pub kernel_address: u64,
    pub kernel_size: u64,
    pub kernel_slide: u64,
}

impl BootArgs {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(BOOT_ARGS_SIZE);
        buf.put_u16_le(self.revision);
        buf.put_u16_le(self.version);
        buf.put_u8(self.efi_mode);
        buf.put_u8(self.debug_mode);
        buf.put_u16_le(self.flags);
        buf.put_u64_le(self.memory_map);
        buf.put_u32_le(self.memory_map_size);
        buf.put_u32_le(self.memory_map_descriptor_size);
        buf.put_u32_le(self.memory_map_descriptor_version);
        buf.put_u32_le(0);
        buf.put_u64_le(self.physical_memory_size);
        buf.put_u64_le(self.kernel_address);
        buf.put_u64_le(self.kernel_size);
        buf.put_u64_le(self.kernel_slide);
        buf.freeze()
    }

    pub fn decode(raw: &[u8]) -> Result<Self, AccessError> {
        check_size("boot args", raw, BOOT_ARGS_SIZE)?;
        let mut buf = raw;
        let revision = buf.get_u16_le();
        let version = buf.get_u16_le();
        let efi_mode = buf.get_u8();
        let debug_mode = buf.get_u8();
        let flags = buf.get_u16_le();
        let memory_map = buf.get_u64_le();
        let memory_map_size = buf.get_u32_le();
        let memory_map_descriptor_size = buf.get_u32_le();
        let memory_map_descriptor_version = buf.get_u32_le();
        let _reserved = buf.get_u32_le();
        Ok(Self {
            revision,
            version,
            efi_mode,
            debug_mode,
            flags,
            memory_map,
            memory_map_size,
            memory_map_descriptor_size,
            memory_map_descriptor_version,
            physical_memory_size: buf.get_u64_le(),
            kernel_address: buf.get_u64_le(),
            kernel_size: buf.get_u64_le(),
            kernel_slide: buf.get_u64_le(),
        })
    }
}

/// Raw channel to the memory access driver.
#[cfg_attr(test, mockall::automock)]
pub trait DriverTransport: Send {
    /// Issue `selector` with `input`; the driver answers with a buffer
    /// that should be exactly `output_len` bytes.
    fn call(&mut self, selector: u32, input: &[u8], output_len: usize) -> Result<Vec<u8>, AccessError>;
}

/// [`MemoryAccess`] over a driver speaking the fixed-size protocol.
pub struct DriverClient<T: DriverTransport> {
    transport: T,
    requests: u64,
}

impl<T: DriverTransport> DriverClient<T> {
    /// Wrap a transport to the driver.
    ///
    /// # Safety
    ///
    /// A successful map response from `transport` is read in place. For
    /// every such response the transport must guarantee that
    /// `virtual_address` points to `length` initialized bytes, readable by
    /// this process, that stay mapped and unmodified through this process
    /// until the next call on the transport.
    pub unsafe fn new(transport: T) -> Self {
        Self { transport, requests: 0 }
    }

    /// Number of map requests issued so far.
    pub fn requests(&self) -> u64 {
        self.requests
    }
}

impl<T: DriverTransport> MemoryAccess for DriverClient<T> {
    fn map_memory(&mut self, physical_address: u64, length: u64) -> Result<MappedRegion<'_>, AccessError> {
        let request = MapMemoryRequest { physical_address, length };
        self.requests += 1;

        let raw = self
            .transport
            .call(MAP_MEMORY_SELECTOR, &request.encode(), MAP_MEMORY_RESPONSE_SIZE)?;
        let response = MapMemoryResponse::decode(&raw)?;

        let failed = AccessError::MapFailed { address: physical_address, length };
        if response.virtual_address == 0
            || response.physical_address != physical_address
            || response.length != length
        {
            debug!("Driver rejected mapping: {:?}", response);
            return Err(failed);
        }
        let byte_count = usize::try_from(length).map_err(|_| failed)?;

        // SAFETY: `DriverClient::new` requires the transport to answer a
        // successful map with `length` readable bytes at `virtual_address`
        // that stay mapped until its next call. The slice borrows `self`
        // mutably, so no further call can happen while it is alive.
        let bytes = unsafe {
            std::slice::from_raw_parts(response.virtual_address as usize as *const u8, byte_count)
        };
        Ok(MappedRegion::new(physical_address, response.virtual_address, bytes))
    }

    fn boot_args(&mut self) -> Result<BootArgs, AccessError> {
        let raw = self.transport.call(BOOT_ARGS_SELECTOR, &[], BOOT_ARGS_SIZE)?;
        BootArgs::decode(&raw)
    }

    fn describe(&self) -> String {
        "memory access driver".to_string()
    }
}
