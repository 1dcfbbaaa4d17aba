//! Collection module lifecycle.
//!
//! Every acquisition kind implements [`CollectionModule`] and only supplies
//! its body ([`CollectionModule::acquire`]) and optional preflight checks.
//! The shared lifecycle in [`CollectionModule::start`] does the rest: it
//! rejects re-entry, serializes modules process-wide, checks disk space,
//! creates the case directory, opens and always closes the manifest, and
//! publishes the terminal status and final progress.
//!
//! ## Threading
//!
//! A module runs on one worker thread. The controller only holds a
//! [`ModuleHandle`]: it may set the cancellation flag and read status and
//! progress. All shared fields are atomics written by exactly one side.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::case_log::CaseLog;
use crate::collectors::manifest::Manifest;
use crate::collectors::progress::{LogProgressSink, ProgressSink};
use crate::collectors::status::ModuleStatus;
use crate::constants::{DEFAULT_MIN_FREE_SPACE_MB, DEFAULT_PROGRESS_STEP, MANIFEST_EXTENSION};
use crate::models::{ModuleReport, SealedEvidence};
use crate::utils::disk::available_space;

/// Only one module may acquire at a time: the privileged memory service
/// supports a single caller.
static ACQUISITION_LOCK: Mutex<()> = Mutex::new(());

/// Lifecycle phase of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Finished,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Idle,
            1 => Phase::Running,
            _ => Phase::Finished,
        }
    }
}

/// State shared between a running module and its controller.
#[derive(Debug)]
pub struct ModuleState {
    phase: AtomicU8,
    status: AtomicI32,
    progress: AtomicU64,
    cancel: AtomicBool,
}

impl Default for ModuleState {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Idle as u8),
            status: AtomicI32::new(ModuleStatus::Ok.code()),
            progress: AtomicU64::new(0f64.to_bits()),
            cancel: AtomicBool::new(false),
        }
    }
}

impl ModuleState {
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn status(&self) -> ModuleStatus {
        let code = self.status.load(Ordering::Acquire);
        ModuleStatus::from_code(code).unwrap_or(ModuleStatus::Error)
    }

    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Acquire))
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    fn set_status(&self, status: ModuleStatus) {
        self.status.store(status.code(), Ordering::Release);
    }

    fn set_progress(&self, percent: f64) {
        self.progress.store(percent.to_bits(), Ordering::Release);
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn try_begin(&self) -> Result<(), Phase> {
        self.phase
            .compare_exchange(
                Phase::Idle as u8,
                Phase::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(Phase::from_u8)
    }
}

/// Controller-side view of a module.
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    name: String,
    state: Arc<ModuleState>,
}

impl ModuleHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_cancel(&self) {
        self.state.request_cancel();
    }

    pub fn current_status(&self) -> ModuleStatus {
        self.state.status()
    }

    pub fn current_progress(&self) -> f64 {
        self.state.progress()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }
}

/// Keep letters, digits, `-` and `_`; everything else becomes `_`.
pub(crate) fn filesystem_safe(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if safe.is_empty() {
        "module".to_string()
    } else {
        safe
    }
}

/// Attributes every module carries.
pub struct ModuleBase {
    name: String,
    short_name: String,
    enabled: bool,
    state: Arc<ModuleState>,
    sink: Arc<dyn ProgressSink>,
    case_log: CaseLog,
    min_free_space: u64,
    progress_step: f64,
    started: Option<String>,
    finished: Option<String>,
    evidence: Vec<SealedEvidence>,
}

impl ModuleBase {
    /// `short_name` names the case subdirectory and manifest and is made
    /// filesystem-safe.
    pub fn new(name: &str, short_name: &str) -> Self {
        Self {
            name: name.to_string(),
            short_name: filesystem_safe(short_name),
            enabled: true,
            state: Arc::new(ModuleState::default()),
            sink: Arc::new(LogProgressSink),
            case_log: CaseLog::detached(),
            min_free_space: DEFAULT_MIN_FREE_SPACE_MB * 1024 * 1024,
            progress_step: DEFAULT_PROGRESS_STEP,
            started: None,
            finished: None,
            evidence: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_case_log(mut self, case_log: CaseLog) -> Self {
        self.case_log = case_log;
        self
    }

    pub fn with_min_free_space_mb(mut self, megabytes: u64) -> Self {
        self.min_free_space = megabytes * 1024 * 1024;
        self
    }

    /// Minimum change in percent between forwarded progress notifications.
    pub fn with_progress_step(mut self, step: f64) -> Self {
        self.progress_step = step.max(0.0);
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sink = sink;
    }

    pub fn set_case_log(&mut self, case_log: CaseLog) {
        self.case_log = case_log;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn case_log(&self) -> &CaseLog {
        &self.case_log
    }

    pub fn min_free_space(&self) -> u64 {
        self.min_free_space
    }

    pub fn evidence(&self) -> &[SealedEvidence] {
        &self.evidence
    }

    pub fn handle(&self) -> ModuleHandle {
        ModuleHandle {
            name: self.short_name.clone(),
            state: Arc::clone(&self.state),
        }
    }

    pub fn report(&self) -> ModuleReport {
        ModuleReport {
            name: self.name.clone(),
            short_name: self.short_name.clone(),
            status: self.state.status(),
            progress: self.state.progress(),
            started: self.started.clone(),
            finished: self.finished.clone(),
            evidence: self.evidence.clone(),
        }
    }
}

/// Everything a module body needs while it runs.
pub struct AcquisitionContext {
    module: String,
    output_path: PathBuf,
    case_path: PathBuf,
    compression: bool,
    manifest: Manifest,
    case_log: CaseLog,
    state: Arc<ModuleState>,
    sink: Arc<dyn ProgressSink>,
    progress_step: f64,
    last_forwarded: Option<f64>,
    evidence: Vec<SealedEvidence>,
}

impl AcquisitionContext {
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Directory the session writes into.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// The module's own case directory, `<output>/<short name>/`.
    pub fn case_path(&self) -> &Path {
        &self.case_path
    }

    pub fn compression(&self) -> bool {
        self.compression
    }

    pub fn manifest(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    pub fn case_log(&self) -> &CaseLog {
        &self.case_log
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancel_requested()
    }

    /// Cancellation check that does not borrow the context.
    pub fn cancellation_check(&self) -> impl Fn() -> bool + Send + Sync {
        let state = Arc::clone(&self.state);
        move || state.is_cancel_requested()
    }

    /// Record progress in percent.
    ///
    /// Values are clamped to `[0, 100]` and never go backwards. The sink is
    /// notified when the value advanced by at least the configured step or
    /// first reaches 100; the value itself is forwarded unchanged.
    pub fn update_progress(&mut self, percent: f64) {
        if percent.is_nan() {
            return;
        }
        let percent = percent.clamp(0.0, 100.0);
        if percent < self.state.progress() {
            return;
        }
        self.state.set_progress(percent);

        let due = match self.last_forwarded {
            None => true,
            Some(last) => {
                percent - last >= self.progress_step || (percent >= 100.0 && last < 100.0)
            }
        };
        if due && self.last_forwarded != Some(percent) {
            self.last_forwarded = Some(percent);
            self.sink.progress(&self.module, percent);
        }
    }

    /// Attach a sealed evidence file to the module's report.
    pub fn record_evidence(&mut self, sealed: SealedEvidence) {
        self.evidence.push(sealed);
    }
}

/// An acquisition task driven by the shared lifecycle.
pub trait CollectionModule: Send {
    fn base(&self) -> &ModuleBase;

    fn base_mut(&mut self) -> &mut ModuleBase;

    /// Checks that run before anything is written.
    ///
    /// `Ok` proceeds, `WarningInsufficientPermissions` proceeds with a
    /// logged warning, anything else ends the run with that status.
    fn preflight(&mut self) -> ModuleStatus {
        ModuleStatus::Ok
    }

    /// Module-specific work. Must poll [`AcquisitionContext::is_cancelled`]
    /// once per unit of work and return `Cancelled` when it is set.
    fn acquire(&mut self, ctx: &mut AcquisitionContext) -> ModuleStatus;

    /// Run the module into `output_path`.
    fn start(&mut self, output_path: &Path, compression: bool) -> ModuleStatus {
        run_lifecycle(self, output_path, compression)
    }

    fn status(&self) -> ModuleStatus {
        self.base().state.status()
    }

    fn progress(&self) -> f64 {
        self.base().state.progress()
    }

    fn cancel(&self) {
        self.base().state.request_cancel();
    }

    fn handle(&self) -> ModuleHandle {
        self.base().handle()
    }

    /// Return a finished module to idle for a fresh acquisition.
    ///
    /// Has no effect on a running module; returns whether it reset.
    fn reset(&mut self) -> bool {
        let base = self.base_mut();
        if base.state.phase() != Phase::Finished {
            return false;
        }
        base.state.set_status(ModuleStatus::Ok);
        base.state.set_progress(0.0);
        base.state.cancel.store(false, Ordering::Release);
        base.started = None;
        base.finished = None;
        base.evidence.clear();
        base.state.set_phase(Phase::Idle);
        true
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Publish the terminal status and the final progress value.
fn finish(base: &mut ModuleBase, status: ModuleStatus, last_forwarded: Option<f64>) -> ModuleStatus {
    let state = Arc::clone(&base.state);
    let final_progress = if status == ModuleStatus::Complete { 100.0 } else { state.progress() };

    state.set_progress(final_progress);
    if last_forwarded != Some(final_progress) {
        base.sink.progress(&base.short_name, final_progress);
    }
    state.set_status(status);
    base.finished = Some(timestamp());
    state.set_phase(Phase::Finished);
    base.sink.status_changed(&base.short_name, status, final_progress);

    crate::case_log!(base.case_log, "{} finished: {} ({})", base.name, status, status.code());
    status
}

fn run_lifecycle<M: CollectionModule + ?Sized>(
    module: &mut M,
    output_path: &Path,
    compression: bool,
) -> ModuleStatus {
    let state = Arc::clone(&module.base().state);
    if let Err(phase) = state.try_begin() {
        warn!("{} cannot start while {:?}", module.base().name, phase);
        return match phase {
            Phase::Finished => state.status(),
            _ => ModuleStatus::InProgress,
        };
    }

    let _guard = ACQUISITION_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    {
        let base = module.base_mut();
        base.started = Some(timestamp());
        state.set_status(ModuleStatus::InProgress);
        base.sink.status_changed(&base.short_name, ModuleStatus::InProgress, state.progress());
        info!("Starting {} into {}", base.name, output_path.display());

        if !base.enabled {
            return finish(base, ModuleStatus::Skipped, None);
        }
    }

    match module.preflight() {
        ModuleStatus::Ok => {}
        ModuleStatus::WarningInsufficientPermissions => {
            let base = module.base();
            crate::case_log!(base.case_log, "{}: running without sufficient permissions", base.name);
        }
        status => return finish(module.base_mut(), status, None),
    }

    let base = module.base_mut();
    if let Some(available) = available_space(output_path) {
        if available < base.min_free_space {
            crate::case_log!(
                base.case_log,
                "{}: {} bytes free, {} required",
                base.name,
                available,
                base.min_free_space
            );
            return finish(base, ModuleStatus::LowDiskSpace, None);
        }
    } else {
        debug!("Free space unknown for {}", output_path.display());
    }

    let case_path = output_path.join(&base.short_name);
    if let Err(e) = fs::create_dir_all(&case_path) {
        crate::case_log!(base.case_log, "Cannot create {}: {}", case_path.display(), e);
        return finish(base, ModuleStatus::UnableToCreateCaseDirectory, None);
    }

    let manifest_path = output_path.join(format!("{}.{}", base.short_name, MANIFEST_EXTENSION));
    let mut manifest = match Manifest::create(&manifest_path) {
        Ok(manifest) => manifest,
        Err(e) => {
            crate::case_log!(base.case_log, "Cannot open manifest {}: {}", manifest_path.display(), e);
            return finish(base, ModuleStatus::UnableToOpenManifest, None);
        }
    };
    manifest.start_tag(&base.short_name, 0);
    manifest.complete_tag("moduleName", 1, &base.name);
    manifest.complete_tag("acquisitionStarted", 1, base.started.as_deref().unwrap_or_default());
    manifest.complete_tag("compressionEnabled", 1, compression);

    let mut ctx = AcquisitionContext {
        module: base.short_name.clone(),
        output_path: output_path.to_path_buf(),
        case_path,
        compression,
        manifest,
        case_log: base.case_log.clone(),
        state: Arc::clone(&state),
        sink: Arc::clone(&base.sink),
        progress_step: base.progress_step,
        last_forwarded: None,
        evidence: Vec::new(),
    };

    let mut status = module.acquire(&mut ctx);

    let AcquisitionContext {
        mut manifest,
        evidence,
        last_forwarded,
        ..
    } = ctx;
    let base = module.base_mut();
    base.evidence.extend(evidence);

    manifest.unwind_to(1);
    manifest.complete_tag("acquisitionFinished", 1, timestamp());
    manifest.complete_tag("moduleStatus", 1, status.name());
    manifest.complete_tag("moduleStatusCode", 1, status.code());
    match manifest.close() {
        Ok(sealed) => {
            crate::case_log!(
                base.case_log,
                "Manifest {} sealed, SHA-256 {}",
                sealed.path.display(),
                sealed.output_sha256
            );
        }
        Err(e) => {
            crate::case_log!(base.case_log, "Manifest {} incomplete: {}", manifest_path.display(), e);
            if status == ModuleStatus::Complete {
                status = ModuleStatus::Error;
            }
        }
    }

    finish(base, status, last_forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::progress::MockProgressSink;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use tempfile::TempDir;

    /// Body that reports a fixed list of progress values.
    struct ScriptedModule {
        base: ModuleBase,
        steps: Vec<f64>,
        result: ModuleStatus,
        preflight: ModuleStatus,
        cancel_at: Option<usize>,
    }

    impl ScriptedModule {
        fn new(steps: Vec<f64>, result: ModuleStatus) -> Self {
            Self {
                base: ModuleBase::new("Scripted Module", "Scripted").with_min_free_space_mb(0),
                steps,
                result,
                preflight: ModuleStatus::Ok,
                cancel_at: None,
            }
        }
    }

    impl CollectionModule for ScriptedModule {
        fn base(&self) -> &ModuleBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ModuleBase {
            &mut self.base
        }

        fn preflight(&mut self) -> ModuleStatus {
            self.preflight
        }

        fn acquire(&mut self, ctx: &mut AcquisitionContext) -> ModuleStatus {
            ctx.manifest().start_tag("steps", 1);
            for (index, step) in self.steps.clone().into_iter().enumerate() {
                if Some(index) == self.cancel_at {
                    self.base.state.request_cancel();
                }
                if ctx.is_cancelled() {
                    return ModuleStatus::Cancelled;
                }
                ctx.manifest().complete_tag("step", 2, step);
                ctx.update_progress(step);
            }
            ctx.manifest().end_tag("steps", 1);
            self.result
        }
    }

    #[test]
    fn test_complete_run_writes_layout() {
        let temp_dir = TempDir::new().unwrap();
        let mut module = ScriptedModule::new(vec![50.0, 100.0], ModuleStatus::Complete);

        assert_eq!(module.start(temp_dir.path(), false), ModuleStatus::Complete);
        assert_eq!(module.status(), ModuleStatus::Complete);
        assert_eq!(module.progress(), 100.0);
        assert_eq!(module.handle().phase(), Phase::Finished);
        assert!(temp_dir.path().join("Scripted").is_dir());

        let manifest = std::fs::read_to_string(temp_dir.path().join("Scripted.xml")).unwrap();
        assert!(manifest.contains("<moduleName>Scripted Module</moduleName>"));
        assert!(manifest.contains("<moduleStatus>Complete</moduleStatus>"));
        assert!(manifest.contains("<moduleStatusCode>2</moduleStatusCode>"));
        assert!(manifest.trim_end().ends_with("</Scripted>"));
    }

    #[test]
    fn test_finished_module_rejects_restart() {
        let temp_dir = TempDir::new().unwrap();
        let mut module = ScriptedModule::new(vec![100.0], ModuleStatus::Complete);
        module.start(temp_dir.path(), false);

        let other = TempDir::new().unwrap();
        assert_eq!(module.start(other.path(), false), ModuleStatus::Complete);
        assert!(!other.path().join("Scripted.xml").exists());
    }

    #[test]
    fn test_reset_allows_fresh_acquisition() {
        let temp_dir = TempDir::new().unwrap();
        let mut module = ScriptedModule::new(vec![100.0], ModuleStatus::Complete);
        module.start(&temp_dir.path().join("first"), false);

        assert!(module.reset());
        assert_eq!(module.status(), ModuleStatus::Ok);
        assert_eq!(module.progress(), 0.0);
        assert_eq!(module.start(&temp_dir.path().join("second"), false), ModuleStatus::Complete);
        assert!(temp_dir.path().join("second/Scripted.xml").exists());
    }

    #[test]
    fn test_running_module_answers_in_progress() {
        let mut module = ScriptedModule::new(vec![], ModuleStatus::Complete);
        module.base.state.set_phase(Phase::Running);
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(module.start(temp_dir.path(), false), ModuleStatus::InProgress);
        assert!(!module.reset());
    }

    #[test]
    fn test_cancel_keeps_manifest_well_formed() {
        let temp_dir = TempDir::new().unwrap();
        let mut module = ScriptedModule::new(vec![10.0, 20.0, 30.0, 40.0], ModuleStatus::Complete);
        module.cancel_at = Some(2);

        assert_eq!(module.start(temp_dir.path(), false), ModuleStatus::Cancelled);
        assert_eq!(module.progress(), 20.0);

        let manifest = std::fs::read_to_string(temp_dir.path().join("Scripted.xml")).unwrap();
        assert!(manifest.contains("\t</steps>\n\t<acquisitionFinished>"));
        assert!(manifest.contains("<moduleStatus>Cancelled</moduleStatus>"));
        assert_eq!(manifest.matches("<step>").count(), 2);
    }

    #[test]
    fn test_preflight_failure_skips_directories() {
        let temp_dir = TempDir::new().unwrap();
        let mut module = ScriptedModule::new(vec![100.0], ModuleStatus::Complete);
        module.preflight = ModuleStatus::UnsupportedOsVersion;

        assert_eq!(module.start(temp_dir.path(), false), ModuleStatus::UnsupportedOsVersion);
        assert!(!temp_dir.path().join("Scripted").exists());
        assert!(!temp_dir.path().join("Scripted.xml").exists());
    }

    #[test]
    fn test_disabled_module_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let mut module = ScriptedModule::new(vec![100.0], ModuleStatus::Complete);
        module.base.set_enabled(false);

        assert_eq!(module.start(temp_dir.path(), false), ModuleStatus::Skipped);
        assert!(!temp_dir.path().join("Scripted.xml").exists());
    }

    #[test]
    fn test_unwritable_case_directory() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut module = ScriptedModule::new(vec![100.0], ModuleStatus::Complete);
        assert_eq!(module.start(&blocker, false), ModuleStatus::UnableToCreateCaseDirectory);
    }

    #[test]
    fn test_existing_manifest_cannot_be_opened() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("Scripted.xml"), b"previous run").unwrap();

        let mut module = ScriptedModule::new(vec![100.0], ModuleStatus::Complete);
        assert_eq!(module.start(temp_dir.path(), false), ModuleStatus::UnableToOpenManifest);
    }

    #[test]
    fn test_low_disk_space() {
        let temp_dir = TempDir::new().unwrap();
        let mut module = ScriptedModule::new(vec![100.0], ModuleStatus::Complete);
        module.base = ModuleBase::new("Scripted Module", "Scripted").with_min_free_space_mb(u64::MAX / (2 * 1024 * 1024));

        let status = module.start(temp_dir.path(), false);
        // Hosts where sysinfo cannot see the volume skip the check.
        if available_space(temp_dir.path()).is_some() {
            assert_eq!(status, ModuleStatus::LowDiskSpace);
        }
    }

    #[test]
    fn test_progress_forwarded_once_per_value() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = MockProgressSink::new();
        let mut seq = Sequence::new();

        sink.expect_status_changed()
            .with(eq("Scripted"), eq(ModuleStatus::InProgress), eq(0.0))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        for value in [25.0, 50.0, 100.0] {
            sink.expect_progress()
                .with(eq("Scripted"), eq(value))
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
        }
        sink.expect_status_changed()
            .with(eq("Scripted"), eq(ModuleStatus::Complete), eq(100.0))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let mut module = ScriptedModule::new(vec![25.0, 25.0, 10.0, 50.0, 100.0], ModuleStatus::Complete);
        module.base.set_sink(Arc::new(sink));
        assert_eq!(module.start(temp_dir.path(), false), ModuleStatus::Complete);
    }

    #[test]
    fn test_progress_step_throttles_but_keeps_final_value() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = MockProgressSink::new();
        sink.expect_status_changed().return_const(());
        sink.expect_progress().with(eq("Scripted"), eq(0.5)).times(1).return_const(());
        sink.expect_progress().with(eq("Scripted"), eq(20.25)).times(1).return_const(());
        sink.expect_progress().with(eq("Scripted"), eq(100.0)).times(1).return_const(());

        let mut module = ScriptedModule::new(vec![0.5, 0.75, 20.25, 21.0, 100.0], ModuleStatus::Complete);
        module.base = ModuleBase::new("Scripted Module", "Scripted")
            .with_min_free_space_mb(0)
            .with_progress_step(5.0)
            .with_sink(Arc::new(sink));
        assert_eq!(module.start(temp_dir.path(), false), ModuleStatus::Complete);
    }

    #[test]
    fn test_filesystem_safe_short_name() {
        assert_eq!(filesystem_safe("Physical Memory/1"), "Physical_Memory_1");
        assert_eq!(filesystem_safe(""), "module");
    }
}
