use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, Context};
use serde_json::json;

use crate::collectors::status::StatusFamily;
use crate::constants::SESSION_SUMMARY_FILE_NAME;
use crate::models::{CaseMetadata, ModuleReport, SealedEvidence};

/// Everything the session summary records.
pub struct SessionRecord<'a> {
    pub session_id: &'a str,
    pub hostname: &'a str,
    pub started: &'a str,
    pub finished: &'a str,
    pub case: &'a CaseMetadata,
    pub reports: &'a [ModuleReport],
    pub case_log: Option<&'a SealedEvidence>,
}

/// Create a JSON summary of an acquisition session.
///
/// Lists every module with its status code and name, final progress and
/// the digests of each evidentiary file it produced. This summary is part
/// of the chain of custody and is written next to the module manifests.
///
/// # Example Output
///
/// ```json
/// {
///   "session_id": "550e8400-e29b-41d4-a716-446655440000",
///   "hostname": "workstation-01",
///   "tool_version": "0.1.0",
///   "case": { "case_identifier": "2024-017", "examiner": "J. Doe", "notes": "" },
///   "modules": [
///     { "short_name": "PhysicalMemory", "status": { "code": 2, "name": "Complete" }, ... }
///   ],
///   "errors": 0
/// }
/// ```
pub fn create_session_summary(record: &SessionRecord<'_>) -> Result<String> {
    let modules: Vec<_> = record
        .reports
        .iter()
        .map(|report| {
            json!({
                "name": report.name,
                "short_name": report.short_name,
                "status": report.status,
                "family": report.status.family(),
                "progress": report.progress,
                "started": report.started,
                "finished": report.finished,
                "evidence": report.evidence,
            })
        })
        .collect();

    let errors = record
        .reports
        .iter()
        .filter(|report| report.status.family() == StatusFamily::Error)
        .count();

    let summary = json!({
        "session_id": record.session_id,
        "hostname": record.hostname,
        "os": std::env::consts::OS,
        "tool_version": env!("CARGO_PKG_VERSION"),
        "started": record.started,
        "finished": record.finished,
        "case": record.case,
        "modules": modules,
        "case_log": record.case_log,
        "errors": errors,
    });

    serde_json::to_string_pretty(&summary).context("Failed to serialize session summary to JSON")
}

/// Write the summary into `output_dir` and return its path.
pub fn write_session_summary(output_dir: &Path, summary: &str) -> Result<PathBuf> {
    let path = output_dir.join(SESSION_SUMMARY_FILE_NAME);
    fs::write(&path, summary)
        .with_context(|| format!("Failed to write session summary to {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::status::{MemoryStatus, ModuleStatus};
    use tempfile::TempDir;

    fn report(short_name: &str, status: ModuleStatus) -> ModuleReport {
        ModuleReport {
            name: short_name.to_string(),
            short_name: short_name.to_string(),
            status,
            progress: 100.0,
            started: Some("2024-01-15T14:30:52+00:00".to_string()),
            finished: Some("2024-01-15T14:35:10+00:00".to_string()),
            evidence: vec![SealedEvidence {
                path: PathBuf::from("/case/PhysicalMemory/PhysicalMemory"),
                compressed: false,
                bytes_in: 4096,
                bytes_out: 4096,
                input_sha256: "ab".repeat(32),
                output_sha256: "ab".repeat(32),
            }],
        }
    }

    #[test]
    fn test_basic_summary_creation() {
        let case = CaseMetadata {
            case_identifier: "2024-017".to_string(),
            examiner: "J. Doe".to_string(),
            notes: String::new(),
        };
        let reports = vec![
            report("PhysicalMemory", ModuleStatus::Complete),
            report("FileArtifacts", ModuleStatus::Memory(MemoryStatus::EfiMapReadFailed)),
        ];
        let record = SessionRecord {
            session_id: "session-1",
            hostname: "test-host",
            started: "start",
            finished: "end",
            case: &case,
            reports: &reports,
            case_log: None,
        };

        let summary = create_session_summary(&record).unwrap();
        let json: serde_json::Value = serde_json::from_str(&summary).unwrap();

        assert_eq!(json["hostname"], "test-host");
        assert_eq!(json["case"]["examiner"], "J. Doe");
        assert_eq!(json["modules"][0]["status"]["code"], 2);
        assert_eq!(json["modules"][0]["status"]["name"], "Complete");
        assert_eq!(json["modules"][1]["status"]["code"], -1008);
        assert_eq!(json["modules"][0]["evidence"][0]["bytes_in"], 4096);
        assert_eq!(json["errors"], 1);
        assert!(json["case_log"].is_null());
    }

    #[test]
    fn test_write_session_summary() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_session_summary(temp_dir.path(), "{}").unwrap();
        assert_eq!(path, temp_dir.path().join(SESSION_SUMMARY_FILE_NAME));
        assert_eq!(fs::read_to_string(path).unwrap(), "{}");
    }
}
