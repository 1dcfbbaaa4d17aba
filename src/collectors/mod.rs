//! Acquisition modules and the machinery that runs them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Session / Controller             │
//! ├─────────────────────────────────────────┤
//! │         Module Lifecycle                │
//! │  ┌──────────┬───────────┬──────────┐    │
//! │  │  Status  │ Manifest  │ Progress │    │
//! │  └──────────┴───────────┴──────────┘    │
//! ├─────────────────────────────────────────┤
//! │             Modules                     │
//! │  ┌─────────────────┬────────────────┐   │
//! │  │ Physical Memory │ File Artifacts │   │
//! │  └─────────────────┴────────────────┘   │
//! ├─────────────────────────────────────────┤
//! │        Evidence Files (utils)           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```no_run
//! use rust_acquire::collectors::session::{build_modules, AcquisitionSession};
//! use rust_acquire::config::AcquisitionConfig;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = AcquisitionConfig::default();
//! let mut session = AcquisitionSession::new("/cases/2024-017", config.case.clone())
//!     .with_compression(config.compression);
//! for module in build_modules(&config)? {
//!     session.add_module(module);
//! }
//!
//! let outcome = session.run(|event| println!("{:?}", event))?;
//! println!("Ran {} modules", outcome.reports.len());
//! # Ok(())
//! # }
//! ```

/// Module status taxonomy
pub mod status;

/// XML manifest writer
pub mod manifest;

/// Progress and status notification sinks
pub mod progress;

/// Shared module lifecycle
pub mod module;

/// Physical memory acquisition
pub mod memory;

/// File and directory collection
pub mod file_artifacts;

/// Sequential module runner
pub mod session;
