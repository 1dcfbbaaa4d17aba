//! Global constants for the rust_acquire application.
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make configuration changes easier.

// Memory addressing constants
/// Size of one physical page frame (4KB)
pub const PAGE_SIZE: u64 = 4096;

/// First physical address above the 32-bit boundary (4GB)
pub const FOUR_GIB: u64 = 0x1_0000_0000;

/// Default maximum number of DRAM ranges accepted from a firmware map
pub const MAX_DRAM_RANGES: usize = 64;

/// Size of one EFI memory descriptor as laid out by firmware
pub const EFI_MEMORY_DESCRIPTOR_SIZE: usize = 40;

// Buffer size constants
/// Default buffer size for file operations (1MB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Buffer size for the output side of evidence files (256KB)
pub const EVIDENCE_WRITE_BUFFER_SIZE: usize = 256 * 1024;

// Privileged service protocol constants
/// Selector of the map-memory request
pub const MAP_MEMORY_SELECTOR: u32 = 2;

/// Selector of the boot-args request
pub const BOOT_ARGS_SELECTOR: u32 = 3;

/// Wire size of a map-memory request
pub const MAP_MEMORY_REQUEST_SIZE: usize = 16;

/// Wire size of a map-memory response
pub const MAP_MEMORY_RESPONSE_SIZE: usize = 24;

/// Wire size of the boot arguments record
pub const BOOT_ARGS_SIZE: usize = 64;

// Module status constants
/// First status code reserved for module-specific failures
pub const MODULE_STATUS_CUSTOM_BASE: i32 = -1000;

/// Default minimum free space required before a module runs (100MB)
pub const DEFAULT_MIN_FREE_SPACE_MB: u64 = 100;

/// Default minimum progress delta (percentage points) between notifications
pub const DEFAULT_PROGRESS_STEP: f64 = 0.1;

// Case layout constants
/// Extension of module manifests
pub const MANIFEST_EXTENSION: &str = "xml";

/// File name of the case log inside the case directory
pub const CASE_LOG_FILE_NAME: &str = "caseLog.xml";

/// File name of the session summary inside the case directory
pub const SESSION_SUMMARY_FILE_NAME: &str = "session_summary.json";

/// Extension added to compressed evidence files
pub const ARCHIVE_EXTENSION: &str = "zip";
