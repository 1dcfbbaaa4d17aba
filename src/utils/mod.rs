//! Utility functions for evidence handling.
//!
//! ## Components
//!
//! - **Evidence**: dual-digest evidence writer, reader and zip entry codec
//! - **Hashing**: SHA-256 helpers for files, readers and byte slices
//! - **Disk**: free space lookup for the output volume
//! - **System**: kernel identification
//! - **Summary**: session summary JSON
//!
//! ## Common Use Cases
//!
//! ### Writing an Evidence File
//!
//! ```no_run
//! use rust_acquire::utils::evidence::EvidenceWriter;
//! use std::io::Write;
//!
//! # fn example() -> std::io::Result<()> {
//! let mut writer = EvidenceWriter::create("/cases/2024-017/notes.txt.zip", true)?;
//! writer.write_all(b"examiner notes")?;
//! let sealed = writer.close()?;
//! println!("input {} output {}", sealed.input_sha256, sealed.output_sha256);
//! # Ok(())
//! # }
//! ```
//!
//! ### Verifying an Evidence File
//!
//! ```no_run
//! use rust_acquire::utils::evidence::verify_evidence;
//!
//! # fn example() -> std::io::Result<()> {
//! let (digest, length) = verify_evidence("/cases/2024-017/notes.txt.zip", true)?;
//! println!("{} bytes, SHA-256 {}", length, digest);
//! # Ok(())
//! # }
//! ```

/// Free space lookup
pub mod disk;

/// Evidentiary file I/O
pub mod evidence;

/// Cryptographic hash calculation utilities
pub mod hash;

/// Session summary generation
pub mod summary;

/// Kernel identification
pub mod system;
