//! Acquisition session.
//!
//! Runs a queue of modules one after another on a dedicated worker thread
//! while the controller thread receives their progress over a channel. The
//! session owns the case log for the whole output directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam::channel::{unbounded, Receiver};
use log::{error, info};
use uuid::Uuid;

use crate::case_log::CaseLog;
use crate::collectors::file_artifacts::FileArtifactModule;
use crate::collectors::memory::{MemorySource, PhysicalMemoryModule};
use crate::collectors::module::{CollectionModule, ModuleBase, ModuleHandle};
use crate::collectors::progress::{ChannelProgressSink, ModuleEvent};
use crate::collectors::status::ModuleStatus;
use crate::config::{AcquisitionConfig, MemorySourceConfig};
use crate::models::{CaseMetadata, ModuleReport, SealedEvidence};

const WORKER_THREAD_NAME: &str = "acquisition-worker";

/// Stops the running module and the rest of the queue.
#[derive(Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    current: Arc<Mutex<Option<ModuleHandle>>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = current.as_ref() {
            info!("Cancelling {}", handle.name());
            handle.request_cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn set_current(&self, handle: Option<ModuleHandle>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = handle;
    }
}

/// What a finished session hands back.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub started: String,
    pub finished: String,
    pub reports: Vec<ModuleReport>,
    pub case_log: Option<SealedEvidence>,
    pub cancelled: bool,
}

/// Controller side of a running session.
pub struct SessionController {
    events: Receiver<ModuleEvent>,
    cancel: CancelHandle,
    worker: JoinHandle<SessionOutcome>,
}

impl SessionController {
    /// Events from the running modules; the channel closes when the
    /// worker is done.
    pub fn events(&self) -> &Receiver<ModuleEvent> {
        &self.events
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn wait(self) -> Result<SessionOutcome> {
        self.worker
            .join()
            .map_err(|_| anyhow!("Acquisition worker panicked"))
    }
}

pub struct AcquisitionSession {
    id: Uuid,
    output_path: PathBuf,
    compression: bool,
    case: CaseMetadata,
    modules: Vec<Box<dyn CollectionModule>>,
    cancel: CancelHandle,
}

impl AcquisitionSession {
    pub fn new(output_path: impl AsRef<Path>, case: CaseMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            output_path: output_path.as_ref().to_path_buf(),
            compression: false,
            case,
            modules: Vec::new(),
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    /// Use an existing cancel handle, e.g. one already wired to a signal.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn add_module(&mut self, module: Box<dyn CollectionModule>) {
        self.modules.push(module);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Open the case log and start the worker thread.
    pub fn start(self) -> Result<SessionController> {
        fs::create_dir_all(&self.output_path)
            .with_context(|| format!("Failed to create output directory {}", self.output_path.display()))?;
        let case_log = CaseLog::open(&self.output_path)
            .with_context(|| format!("Failed to open case log in {}", self.output_path.display()))?;

        crate::case_log!(case_log, "Session {} started", self.id);
        crate::case_log!(
            case_log,
            "Case '{}', examiner '{}', output {}",
            self.case.case_identifier,
            self.case.examiner,
            self.output_path.display()
        );

        let (sender, receiver) = unbounded();
        let mut modules = self.modules;
        for module in modules.iter_mut() {
            let base = module.base_mut();
            base.set_sink(Arc::new(ChannelProgressSink::new(sender.clone())));
            base.set_case_log(case_log.clone());
        }
        drop(sender);

        let cancel = self.cancel.clone();
        let output_path = self.output_path;
        let compression = self.compression;
        let session_id = self.id.to_string();
        let worker_cancel = cancel.clone();

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                run_queue(session_id, modules, &output_path, compression, &case_log, &worker_cancel)
            })
            .context("Failed to spawn acquisition worker")?;

        Ok(SessionController {
            events: receiver,
            cancel,
            worker,
        })
    }

    /// Start, feed every event to `on_event`, and wait for the outcome.
    pub fn run(self, mut on_event: impl FnMut(&ModuleEvent)) -> Result<SessionOutcome> {
        let controller = self.start()?;
        for event in controller.events().iter() {
            on_event(&event);
        }
        controller.wait()
    }
}

fn run_queue(
    session_id: String,
    modules: Vec<Box<dyn CollectionModule>>,
    output_path: &Path,
    compression: bool,
    case_log: &CaseLog,
    cancel: &CancelHandle,
) -> SessionOutcome {
    let started = chrono::Utc::now().to_rfc3339();
    let mut reports = Vec::with_capacity(modules.len());
    let mut stopped = false;

    for mut module in modules {
        if stopped || cancel.is_cancelled() {
            stopped = true;
            let mut report = module.base().report();
            report.status = ModuleStatus::Cancelled;
            crate::case_log!(case_log, "{} not run: session cancelled", report.name);
            reports.push(report);
            continue;
        }

        cancel.set_current(Some(module.handle()));
        if cancel.is_cancelled() {
            module.cancel();
        }
        let status = module.start(output_path, compression);
        cancel.set_current(None);

        reports.push(module.base().report());
        if status == ModuleStatus::Cancelled {
            stopped = true;
        }
    }

    crate::case_log!(case_log, "Session {} finished", session_id);
    let sealed_log = match case_log.close() {
        Ok(sealed) => sealed,
        Err(e) => {
            error!("Failed to seal case log: {}", e);
            None
        }
    };

    SessionOutcome {
        session_id,
        started,
        finished: chrono::Utc::now().to_rfc3339(),
        reports,
        case_log: sealed_log,
        cancelled: stopped,
    }
}

/// Names of the modules this build can run, as `(short name, display name)`.
pub fn available_modules() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            crate::collectors::memory::collector::MODULE_SHORT_NAME,
            crate::collectors::memory::collector::MODULE_NAME,
        ),
        (
            crate::collectors::file_artifacts::MODULE_SHORT_NAME,
            crate::collectors::file_artifacts::MODULE_NAME,
        ),
    ]
}

fn memory_source(config: &MemorySourceConfig) -> Result<MemorySource> {
    match config {
        MemorySourceConfig::Image { path } => MemorySource::image(path)
            .with_context(|| format!("Failed to open memory image {}", path.display())),
        #[cfg(target_os = "linux")]
        MemorySourceConfig::DevMem { device, iomem } => Ok(MemorySource::dev_mem(device, iomem)),
        #[cfg(not(target_os = "linux"))]
        MemorySourceConfig::DevMem { device, .. } => {
            bail!("Memory device {} is only supported on Linux", device.display())
        }
    }
}

/// Build the module queue the configuration enables, in run order.
pub fn build_modules(config: &AcquisitionConfig) -> Result<Vec<Box<dyn CollectionModule>>> {
    let configure = |base: ModuleBase| {
        base.with_min_free_space_mb(config.min_free_space_mb)
            .with_progress_step(config.progress_step)
    };

    let mut modules: Vec<Box<dyn CollectionModule>> = Vec::new();
    if config.modules.physical_memory {
        let source = memory_source(&config.memory)?;
        modules.push(Box::new(PhysicalMemoryModule::new(source).with_base(configure)));
    }
    if config.modules.file_artifacts {
        modules.push(Box::new(
            FileArtifactModule::new(config.file_artifacts.clone()).with_base(configure),
        ));
    }
    if modules.is_empty() {
        bail!("No modules enabled");
    }
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::file_artifacts::FileArtifact;
    use crate::collectors::module::AcquisitionContext;
    use tempfile::TempDir;

    struct Counter {
        base: ModuleBase,
        steps: usize,
    }

    impl Counter {
        fn new(short_name: &str, steps: usize) -> Self {
            Self {
                base: ModuleBase::new(short_name, short_name).with_min_free_space_mb(0),
                steps,
            }
        }
    }

    impl CollectionModule for Counter {
        fn base(&self) -> &ModuleBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ModuleBase {
            &mut self.base
        }

        fn acquire(&mut self, ctx: &mut AcquisitionContext) -> ModuleStatus {
            for step in 0..self.steps {
                if ctx.is_cancelled() {
                    return ModuleStatus::Cancelled;
                }
                ctx.update_progress((step + 1) as f64 / self.steps as f64 * 100.0);
            }
            ModuleStatus::Complete
        }
    }

    #[test]
    fn test_runs_modules_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = AcquisitionSession::new(temp_dir.path(), CaseMetadata::default());
        session.add_module(Box::new(Counter::new("First", 4)));
        session.add_module(Box::new(Counter::new("Second", 2)));

        let mut events = Vec::new();
        let outcome = session.run(|event| events.push(event.clone())).unwrap();

        assert_eq!(outcome.reports.len(), 2);
        assert!(outcome.reports.iter().all(|r| r.status == ModuleStatus::Complete));
        assert!(!outcome.cancelled);
        assert!(outcome.case_log.is_some());
        assert!(temp_dir.path().join("First.xml").exists());

        let first_done = events
            .iter()
            .position(|e| matches!(e, ModuleEvent::StatusChanged { module, status: ModuleStatus::Complete, .. } if module == "First"))
            .unwrap();
        let second_started = events
            .iter()
            .position(|e| matches!(e, ModuleEvent::StatusChanged { module, status: ModuleStatus::InProgress, .. } if module == "Second"))
            .unwrap();
        assert!(first_done < second_started);
    }

    #[test]
    fn test_cancel_before_start_stops_queue() {
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancelHandle::default();
        let mut session = AcquisitionSession::new(temp_dir.path(), CaseMetadata::default())
            .with_cancel_handle(cancel.clone());
        session.add_module(Box::new(Counter::new("First", 4)));
        session.add_module(Box::new(Counter::new("Second", 2)));

        cancel.cancel();
        let outcome = session.run(|_| {}).unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.reports.iter().all(|r| r.status == ModuleStatus::Cancelled));
        assert!(!temp_dir.path().join("First.xml").exists());
    }

    #[test]
    fn test_build_modules_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("memory.raw");
        fs::write(&image, vec![0u8; 8192]).unwrap();

        let mut config = AcquisitionConfig::default();
        config.memory = MemorySourceConfig::Image { path: image };
        config.file_artifacts = vec![FileArtifact::new("hosts", "/etc/hosts")];

        let modules = build_modules(&config).unwrap();
        let names: Vec<_> = modules.iter().map(|m| m.base().short_name().to_string()).collect();
        assert_eq!(names, vec!["PhysicalMemory", "FileArtifacts"]);

        config.modules.physical_memory = false;
        config.modules.file_artifacts = false;
        assert!(build_modules(&config).is_err());
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let mut config = AcquisitionConfig::default();
        config.memory = MemorySourceConfig::Image { path: PathBuf::from("/nonexistent/mem.raw") };
        assert!(build_modules(&config).is_err());
    }
}
