//! File artifact module
//!
//! Copies configured files and directory trees into the module's case
//! directory. Every copy is an evidentiary file with its own digests, and
//! every source (found or not) is documented in the manifest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::collectors::manifest::Manifest;
use crate::collectors::memory::acquisition::status_for_write_error;
use crate::collectors::module::{filesystem_safe, AcquisitionContext, CollectionModule, ModuleBase};
use crate::collectors::status::ModuleStatus;
use crate::config::expand_path;
use crate::models::SealedEvidence;
use crate::utils::evidence::{copy_directory, copy_file};

pub const MODULE_NAME: &str = "File Artifacts";
pub const MODULE_SHORT_NAME: &str = "FileArtifacts";

/// A file or directory to collect.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    pub name: String,
    /// May contain `$VAR`, `${VAR}` or `%VAR%` references
    pub source_path: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl FileArtifact {
    pub fn new(name: &str, source_path: &str) -> Self {
        Self {
            name: name.to_string(),
            source_path: source_path.to_string(),
            description: None,
        }
    }

    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(expand_path(&self.source_path))
    }
}

/// Collects a list of [`FileArtifact`]s.
pub struct FileArtifactModule {
    base: ModuleBase,
    artifacts: Vec<FileArtifact>,
}

impl FileArtifactModule {
    pub fn new(artifacts: Vec<FileArtifact>) -> Self {
        Self {
            base: ModuleBase::new(MODULE_NAME, MODULE_SHORT_NAME),
            artifacts,
        }
    }

    pub fn with_base(mut self, configure: impl FnOnce(ModuleBase) -> ModuleBase) -> Self {
        self.base = configure(self.base);
        self
    }

    pub fn artifacts(&self) -> &[FileArtifact] {
        &self.artifacts
    }
}

/// Copy one artifact; on failure also hands back what was sealed first.
fn collect(
    source: &Path,
    destination: &Path,
    compress: bool,
    is_cancelled: &dyn Fn() -> bool,
) -> (Vec<SealedEvidence>, Option<anyhow::Error>) {
    if let Err(e) = fs::create_dir_all(destination) {
        let error = anyhow::Error::from(e).context(format!("Failed to create {}", destination.display()));
        return (Vec::new(), Some(error));
    }
    if source.is_dir() {
        match copy_directory(source, destination, compress, is_cancelled) {
            Ok(sealed) => (sealed, None),
            Err(partial) => (partial.copied, Some(partial.error)),
        }
    } else {
        match copy_file(source, destination, compress) {
            Ok(sealed) => (vec![sealed], None),
            Err(e) => (Vec::new(), Some(e)),
        }
    }
}

/// LowDiskSpace when the volume filled up, Error for any other failure.
fn status_for_copy_error(error: &anyhow::Error) -> ModuleStatus {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<io::Error>())
        .map(status_for_write_error)
        .unwrap_or(ModuleStatus::Error)
}

fn record_file(manifest: &mut Manifest, case_path: &Path, sealed: &SealedEvidence) {
    let relative = sealed.path.strip_prefix(case_path).unwrap_or(&sealed.path);
    manifest.start_tag("evidenceFile", 3);
    manifest.complete_tag("path", 4, relative.display());
    manifest.complete_tag("compressed", 4, sealed.compressed);
    manifest.complete_tag("bytesIn", 4, sealed.bytes_in);
    manifest.complete_tag("bytesOut", 4, sealed.bytes_out);
    manifest.complete_tag("inputSHA256", 4, &sealed.input_sha256);
    manifest.complete_tag("outputSHA256", 4, &sealed.output_sha256);
    manifest.end_tag("evidenceFile", 3);
}

impl CollectionModule for FileArtifactModule {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    fn preflight(&mut self) -> ModuleStatus {
        if self.artifacts.is_empty() {
            crate::case_log!(self.base.case_log(), "No file artifacts configured");
            return ModuleStatus::DisabledByDefault;
        }
        ModuleStatus::Ok
    }

    fn acquire(&mut self, ctx: &mut AcquisitionContext) -> ModuleStatus {
        let total = self.artifacts.len();
        let mut collected = 0usize;
        ctx.manifest().start_tag("fileArtifacts", 1);

        for (index, artifact) in self.artifacts.iter().enumerate() {
            if ctx.is_cancelled() {
                crate::case_log!(ctx.case_log(), "Cancelled after {} of {} artifacts", index, total);
                return ModuleStatus::Cancelled;
            }

            let source = artifact.resolved_path();
            let name = artifact.name.as_str();
            ctx.manifest().start_tag_with_attributes("fileArtifact", 2, &[("name", name)]);
            ctx.manifest().complete_tag("sourcePath", 3, source.display());
            if let Some(description) = &artifact.description {
                ctx.manifest().complete_tag("description", 3, description);
            }

            if !source.exists() {
                debug!("{} not found at {}", artifact.name, source.display());
                crate::case_log!(ctx.case_log(), "{}: {} not found, skipped", artifact.name, source.display());
                ctx.manifest().complete_tag("missing", 3, true);
                ctx.manifest().end_tag("fileArtifact", 2);
                ctx.update_progress((index + 1) as f64 / total as f64 * 100.0);
                continue;
            }

            let destination = ctx.case_path().join(filesystem_safe(&artifact.name));
            let cancelled = ctx.cancellation_check();
            let (sealed, failure) = collect(&source, &destination, ctx.compression(), &cancelled);

            let case_path = ctx.case_path().to_path_buf();
            for record in &sealed {
                record_file(ctx.manifest(), &case_path, record);
            }
            crate::case_log!(ctx.case_log(), "{}: {} files collected", artifact.name, sealed.len());
            for record in sealed {
                ctx.record_evidence(record);
            }

            if let Some(e) = failure {
                warn!("Failed to collect {}: {:#}", artifact.name, e);
                crate::case_log!(ctx.case_log(), "{}: collection failed: {:#}", artifact.name, e);
                let manifest = ctx.manifest();
                manifest.complete_tag("error", 3, format!("{:#}", e));
                manifest.end_tag("fileArtifact", 2);
                manifest.end_tag("fileArtifacts", 1);
                manifest.complete_tag("artifactsCollected", 1, collected);
                manifest.complete_tag("artifactsFailed", 1, 1);
                return status_for_copy_error(&e);
            }

            collected += 1;
            ctx.manifest().end_tag("fileArtifact", 2);
            ctx.update_progress((index + 1) as f64 / total as f64 * 100.0);
        }

        ctx.manifest().end_tag("fileArtifacts", 1);
        ctx.manifest().complete_tag("artifactsCollected", 1, collected);
        ctx.manifest().complete_tag("artifactsFailed", 1, 0);

        if ctx.is_cancelled() {
            return ModuleStatus::Cancelled;
        }
        ModuleStatus::Complete
    }
}
