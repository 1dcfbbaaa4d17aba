//! Physical memory acquisition
//!
//! This module turns the firmware memory map into DRAM page ranges and
//! streams those pages, one privileged mapping at a time, into a flat
//! evidentiary image.
//!
//! ## Layers
//!
//! - [`firmware`]: EFI descriptor parsing and DRAM range resolution
//! - [`access`]: the single-mapping memory access service and its sources
//! - [`acquisition`]: the page loop
//! - [`collector`]: the lifecycle module tying them together

pub mod access;
pub mod acquisition;
pub mod collector;
pub mod firmware;
pub mod models;

pub use collector::{MapSource, MemorySource, PhysicalMemoryModule};
