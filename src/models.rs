use std::path::PathBuf;

use serde::{Serialize, Deserialize};

use crate::collectors::status::ModuleStatus;

/// Digests and sizes of a closed evidentiary file.
///
/// `input_sha256` covers the byte stream fed to the writer, `output_sha256`
/// covers the bytes on disk. They are equal unless `compressed` is set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SealedEvidence {
    pub path: PathBuf,
    pub compressed: bool,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub input_sha256: String,
    pub output_sha256: String,
}

/// Case metadata entered by the examiner.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseMetadata {
    #[serde(default)]
    pub case_identifier: String,
    #[serde(default)]
    pub examiner: String,
    #[serde(default)]
    pub notes: String,
}

/// Result of one module run, as recorded in the session summary.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModuleReport {
    pub name: String,
    pub short_name: String,
    pub status: ModuleStatus,
    pub progress: f64,
    pub started: Option<String>,
    pub finished: Option<String>,
    #[serde(default)]
    pub evidence: Vec<SealedEvidence>,
}
