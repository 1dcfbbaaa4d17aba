//! # rust-acquire
//!
//! A forensic evidence acquisition engine written in Rust.
//!
//! ## Overview
//!
//! rust-acquire runs acquisition modules through a shared lifecycle that
//! produces verifiable evidence: every file it writes carries two SHA-256
//! digests (the data as acquired and the bytes on disk), every module
//! leaves an XML manifest, and the whole session is recorded in a case log
//! and a JSON summary.
//!
//! ## Features
//!
//! - **Physical memory acquisition**: firmware memory map resolution and a
//!   page-by-page copy of DRAM into a flat image
//! - **Dual-digest evidence files**: optional single-entry zip compression
//!   without losing the digest of the original data
//! - **Module lifecycle**: re-entry protection, disk space checks,
//!   cancellation and rate-limited progress reporting
//! - **File artifacts**: configured files and directory trees copied as
//!   evidence
//!
//! ## Usage
//!
//! ```no_run
//! use rust_acquire::collectors::memory::{MemorySource, PhysicalMemoryModule};
//! use rust_acquire::collectors::module::CollectionModule;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let source = MemorySource::image(Path::new("/evidence/memory.raw"))?;
//! let mut module = PhysicalMemoryModule::new(source);
//!
//! let status = module.start(Path::new("/cases/2024-017"), true);
//! println!("{} ({})", status, status.code());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`models`]: Evidence records and reports
//! - [`collectors`]: Module lifecycle, modules and the session runner
//! - [`config`]: YAML configuration
//! - [`utils`]: Evidence file I/O, hashing and reporting
//! - [`privileges`]: Privilege checks
//! - [`constants`]: Application-wide constants
//!
//! ## Safety
//!
//! This crate uses `unsafe` code in specific scenarios:
//! - Reading memory the access service mapped into this process
//! - `mmap`/`munmap` of `/dev/mem` on Linux
//! - `uname` and `geteuid` system calls
//!
//! All unsafe code is documented with safety invariants and is contained
//! within the memory access and platform helper modules.

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Core data models and structures used throughout the application
pub mod models;

/// Case log shared by a session and its modules
pub mod case_log;

/// Acquisition modules and the session runner
pub mod collectors;

/// Utility functions for evidence files, hashing and reporting
pub mod utils;

/// Configuration management
pub mod config;

/// Privilege checks
pub mod privileges;

/// Application constants and configuration values
pub mod constants;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
