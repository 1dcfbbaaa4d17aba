use std::env;
use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use rust_acquire::cli::{Args, Commands, MemorySourceKind};
use rust_acquire::collectors::progress::ModuleEvent;
use rust_acquire::collectors::session::{available_modules, build_modules, AcquisitionSession, CancelHandle};
use rust_acquire::collectors::status::StatusFamily;
use rust_acquire::config::{load_or_create_config, AcquisitionConfig, MemorySourceConfig};
use rust_acquire::privileges;
use rust_acquire::utils::evidence::verify_evidence;
use rust_acquire::utils::summary::{create_session_summary, write_session_summary, SessionRecord};

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.verbose)?;

    if let Some(cmd) = &args.command {
        return handle_subcommand(cmd);
    }

    info!("Starting acquisition");

    let config = load_and_apply_overrides(&args)?;
    check_privileges(&args, &config)?;

    let hostname = get_hostname();
    let output_dir = resolve_output_dir(&args, &hostname);

    let mut modules = build_modules(&config)?;
    if let Some(filter) = args.module_filter() {
        modules.retain(|module| {
            filter
                .iter()
                .any(|name| name.eq_ignore_ascii_case(module.base().short_name()))
        });
        if modules.is_empty() {
            bail!("None of the requested modules are enabled: {}", filter.join(", "));
        }
    }

    let cancel = CancelHandle::default();
    let mut session = AcquisitionSession::new(&output_dir, config.case.clone())
        .with_compression(config.compression)
        .with_cancel_handle(cancel.clone());
    for module in modules {
        session.add_module(module);
    }
    info!("Session {} writing to {}", session.id(), output_dir.display());

    let watcher = InterruptWatcher::spawn(cancel)?;
    let outcome = session.run(log_event);
    watcher.stop();
    let outcome = outcome?;

    let summary = create_session_summary(&SessionRecord {
        session_id: &outcome.session_id,
        hostname: &hostname,
        started: &outcome.started,
        finished: &outcome.finished,
        case: &config.case,
        reports: &outcome.reports,
        case_log: outcome.case_log.as_ref(),
    })?;
    let summary_path = write_session_summary(&output_dir, &summary)?;
    info!("Session summary: {}", summary_path.display());

    let mut failures = 0;
    for report in &outcome.reports {
        match report.status.family() {
            StatusFamily::Error => {
                failures += 1;
                error!("{}: {} ({})", report.name, report.status, report.status.code());
            }
            StatusFamily::Warning => warn!("{}: {}", report.name, report.status),
            StatusFamily::Success => info!("{}: {}", report.name, report.status),
        }
        for evidence in &report.evidence {
            info!("  {} SHA-256 {}", evidence.path.display(), evidence.input_sha256);
        }
    }

    if outcome.cancelled {
        bail!("Acquisition cancelled");
    }
    if failures > 0 {
        bail!("{} module(s) failed, see {}", failures, summary_path.display());
    }
    info!("Acquisition completed successfully");
    Ok(())
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ).context("Failed to initialize logger")?;
    Ok(())
}

/// Handle subcommands (init-config, verify and list-modules)
fn handle_subcommand(cmd: &Commands) -> Result<()> {
    match cmd {
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            AcquisitionConfig::create_default_config_file(path)?;
            info!("Configuration created successfully");
            Ok(())
        }
        Commands::Verify { path, archived, expected } => {
            let (digest, length) = verify_evidence(path, *archived)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            println!("{}  {} ({} bytes)", digest, path.display(), length);
            if let Some(expected) = expected {
                if !expected.eq_ignore_ascii_case(&digest) {
                    bail!("Digest mismatch: expected {}, got {}", expected, digest);
                }
                info!("Digest matches");
            }
            Ok(())
        }
        Commands::ListModules => {
            for (short_name, name) in available_modules() {
                println!("{:<16} {}", short_name, name);
            }
            Ok(())
        }
    }
}

/// Load configuration and apply command-line overrides
fn load_and_apply_overrides(args: &Args) -> Result<AcquisitionConfig> {
    let mut config = load_or_create_config(args.config.as_deref())?;

    if args.compress {
        config.compression = true;
    }
    if let Some(examiner) = &args.examiner {
        config.case.examiner = examiner.clone();
    }
    if let Some(case_id) = &args.case_id {
        config.case.case_identifier = case_id.clone();
    }

    match (&args.memory_source, &args.memory_image) {
        (Some(MemorySourceKind::DevMem), Some(_)) => {
            bail!("--memory-image cannot be combined with --memory-source dev-mem")
        }
        (_, Some(path)) => config.memory = MemorySourceConfig::Image { path: path.clone() },
        (Some(MemorySourceKind::Image), None) => {
            if !matches!(config.memory, MemorySourceConfig::Image { .. }) {
                bail!("--memory-source image requires --memory-image");
            }
        }
        (Some(MemorySourceKind::DevMem), None) => config.memory = MemorySourceConfig::default(),
        (None, None) => {}
    }

    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Refuse to run unprivileged unless forced or no privileged source is used
fn check_privileges(args: &Args, config: &AcquisitionConfig) -> Result<()> {
    privileges::report_privileges();
    if privileges::is_elevated() {
        return Ok(());
    }

    let needs_privileges = config.modules.physical_memory
        && matches!(config.memory, MemorySourceConfig::DevMem { .. });
    if needs_privileges && !args.force {
        return Err(anyhow!(
            "Elevated privileges required. {} or use --force to continue anyway",
            privileges::get_elevation_instructions()
        ));
    }
    Ok(())
}

fn get_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string())
}

fn resolve_output_dir(args: &Args, hostname: &str) -> PathBuf {
    args.output.clone().unwrap_or_else(|| {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        env::temp_dir().join(format!("rust-acquire-{}-{}", timestamp, hostname))
    })
}

fn log_event(event: &ModuleEvent) {
    match event {
        ModuleEvent::Progress { module, percent } => debug!("{}: {:.1}%", module, percent),
        ModuleEvent::StatusChanged { module, status, percent } => {
            info!("{}: {} at {:.1}%", module, status, percent)
        }
    }
}

/// Cancels the session on SIGINT until the returned guard is dropped.
#[cfg(unix)]
struct InterruptWatcher {
    handle: signal_hook::iterator::Handle,
    thread: thread::JoinHandle<()>,
}

#[cfg(unix)]
impl InterruptWatcher {
    fn spawn(cancel: CancelHandle) -> Result<Self> {
        use signal_hook::consts::SIGINT;
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT]).context("Failed to setup signal handling")?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("interrupt-watcher".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    warn!("Interrupt received, cancelling acquisition");
                    cancel.cancel();
                }
            })
            .context("Failed to spawn interrupt watcher")?;
        Ok(Self { handle, thread })
    }

    fn stop(self) {
        self.handle.close();
        if self.thread.join().is_err() {
            warn!("Interrupt watcher panicked");
        }
    }
}

#[cfg(not(unix))]
struct InterruptWatcher;

#[cfg(not(unix))]
impl InterruptWatcher {
    fn spawn(_cancel: CancelHandle) -> Result<Self> {
        debug!("Interrupt handling is not available on this platform");
        Ok(Self)
    }

    fn stop(self) {}
}
