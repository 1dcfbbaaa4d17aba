//! Kernel identification for preflight checks.

use std::fmt;
use std::io;

use serde::Serialize;

/// What the running kernel reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelInfo {
    pub sysname: String,
    pub release: String,
    pub machine: String,
    /// Kernel bitness derived from `machine`, in bits
    pub pointer_width: u32,
}

impl KernelInfo {
    /// Query the running kernel via `uname`.
    #[cfg(unix)]
    pub fn current() -> io::Result<Self> {
        // SAFETY: utsname is plain old data; uname fills it on success.
        let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
        if unsafe { libc::uname(&mut uts) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let machine = field(&uts.machine);
        Ok(Self {
            sysname: field(&uts.sysname),
            release: field(&uts.release),
            pointer_width: machine_bitness(&machine),
            machine,
        })
    }

    #[cfg(not(unix))]
    pub fn current() -> io::Result<Self> {
        Ok(Self {
            sysname: std::env::consts::OS.to_string(),
            release: String::new(),
            machine: std::env::consts::ARCH.to_string(),
            pointer_width: machine_bitness(std::env::consts::ARCH),
        })
    }

    pub fn is_64_bit(&self) -> bool {
        self.pointer_width == 64
    }

    /// Architectures the memory sources know how to read.
    pub fn is_supported_architecture(&self) -> bool {
        matches!(self.machine.as_str(), "x86_64" | "aarch64" | "arm64")
    }
}

impl fmt::Display for KernelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} ({}-bit)", self.sysname, self.release, self.machine, self.pointer_width)
    }
}

/// Bitness of a `uname -m` machine name. Unknown names count as 32-bit.
pub fn machine_bitness(machine: &str) -> u32 {
    let machine = machine.to_ascii_lowercase();
    let is_64 = matches!(
        machine.as_str(),
        "x86_64" | "amd64" | "aarch64" | "arm64" | "aarch64_be" | "ia64" | "s390x"
            | "sparc64" | "alpha" | "loongarch64"
    ) || machine.starts_with("ppc64")
        || machine.starts_with("mips64")
        || machine.starts_with("riscv64");
    if is_64 {
        64
    } else {
        32
    }
}

#[cfg(unix)]
fn field(raw: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().take_while(|c| **c != 0).map(|c| *c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
