//! Evidentiary file I/O.
//!
//! Every artifact is written through an [`EvidenceWriter`], which hashes the
//! stream twice: once as fed in and once as it lands on disk. Compressed
//! artifacts are single-entry zip archives. [`EvidenceReader`] reads either
//! form back and yields the digest after a complete pass.

mod copy;
mod reader;
mod writer;

pub use copy::{copy_directory, copy_file, PartialCopy};
pub use reader::{verify_evidence, EvidenceReader};
pub use writer::{entry_name, EvidenceWriter};
