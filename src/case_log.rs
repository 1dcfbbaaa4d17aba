//! Case log.
//!
//! An append-only, timestamped record of what happened during an
//! acquisition session, written as XML into the case directory. The log is
//! an explicit handle: the session opens it, clones are handed to modules,
//! and the session seals it. Every entry is mirrored to the `log` facade.

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::info;

use crate::collectors::manifest::Manifest;
use crate::constants::CASE_LOG_FILE_NAME;
use crate::models::SealedEvidence;

const ROOT_TAG: &str = "caseLog";

/// Record a formatted message in a [`CaseLog`], tagged with the calling module.
#[macro_export]
macro_rules! case_log {
    ($log:expr, $($arg:tt)+) => {
        $log.record(module_path!(), format_args!($($arg)+))
    };
}

#[derive(Clone)]
pub struct CaseLog {
    document: Arc<Mutex<Option<Manifest>>>,
    path: Option<PathBuf>,
}

impl CaseLog {
    /// Create `caseLog.xml` inside `case_dir`.
    pub fn open(case_dir: &Path) -> io::Result<Self> {
        let path = case_dir.join(CASE_LOG_FILE_NAME);
        let mut manifest = Manifest::create(&path)?;
        manifest.start_tag(ROOT_TAG, 0);
        Ok(Self {
            document: Arc::new(Mutex::new(Some(manifest))),
            path: Some(path),
        })
    }

    /// A log that only forwards to the `log` facade.
    pub fn detached() -> Self {
        Self {
            document: Arc::new(Mutex::new(None)),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, source: &str, message: impl Display) {
        let message = message.to_string();
        info!(target: source, "{}", message);

        let mut document = self.document.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(manifest) = document.as_mut() {
            manifest.start_tag("entry", 1);
            manifest.complete_tag("time", 2, chrono::Utc::now().to_rfc3339());
            manifest.complete_tag("source", 2, source);
            manifest.complete_tag("message", 2, &message);
            manifest.end_tag("entry", 1);
        }
    }

    /// Seal the log. Later records only reach the `log` facade.
    ///
    /// Returns `None` for a detached or already closed log.
    pub fn close(&self) -> io::Result<Option<SealedEvidence>> {
        let manifest = self.document.lock().unwrap_or_else(|e| e.into_inner()).take();
        manifest.map(Manifest::close).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entries_are_written_and_sealed() {
        let temp_dir = TempDir::new().unwrap();
        let log = CaseLog::open(temp_dir.path()).unwrap();
        let clone = log.clone();

        case_log!(log, "starting {}", "PhysicalMemory");
        case_log!(clone, "finished with <{}>", 2);

        let sealed = log.close().unwrap().unwrap();
        assert_eq!(sealed.path, temp_dir.path().join(CASE_LOG_FILE_NAME));

        let text = std::fs::read_to_string(&sealed.path).unwrap();
        assert!(text.contains("<message>starting PhysicalMemory</message>"));
        assert!(text.contains("<message>finished with &lt;2&gt;</message>"));
        assert!(text.contains("<source>rust_acquire::case_log::tests</source>"));
        assert!(text.trim_end().ends_with("</caseLog>"));
        assert_eq!(text.matches("<entry>").count(), 2);
    }

    #[test]
    fn test_close_twice_and_detached() {
        let temp_dir = TempDir::new().unwrap();
        let log = CaseLog::open(temp_dir.path()).unwrap();
        assert!(log.close().unwrap().is_some());
        assert!(log.close().unwrap().is_none());
        log.record("after", "still fine");

        let detached = CaseLog::detached();
        detached.record("detached", "no file");
        assert!(detached.path().is_none());
        assert!(detached.close().unwrap().is_none());
    }
}
