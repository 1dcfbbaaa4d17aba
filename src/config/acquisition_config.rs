use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Serialize, Deserialize};

use crate::collectors::file_artifacts::FileArtifact;
use crate::constants::{DEFAULT_MIN_FREE_SPACE_MB, DEFAULT_PROGRESS_STEP};
use crate::models::CaseMetadata;

fn default_min_free_space_mb() -> u64 {
    DEFAULT_MIN_FREE_SPACE_MB
}

fn default_progress_step() -> f64 {
    DEFAULT_PROGRESS_STEP
}

fn default_true() -> bool {
    true
}

/// Where physical memory is read from.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemorySourceConfig {
    /// Live memory via a memory device, bounded by an iomem listing
    DevMem { device: PathBuf, iomem: PathBuf },
    /// An existing flat image
    Image { path: PathBuf },
}

impl Default for MemorySourceConfig {
    fn default() -> Self {
        MemorySourceConfig::DevMem {
            device: PathBuf::from("/dev/mem"),
            iomem: PathBuf::from("/proc/iomem"),
        }
    }
}

/// Which modules run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ModuleToggles {
    #[serde(default = "default_true")]
    pub physical_memory: bool,
    #[serde(default = "default_true")]
    pub file_artifacts: bool,
}

impl Default for ModuleToggles {
    fn default() -> Self {
        Self {
            physical_memory: true,
            file_artifacts: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AcquisitionConfig {
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub case: CaseMetadata,
    #[serde(default)]
    pub compression: bool,
    #[serde(default = "default_min_free_space_mb")]
    pub min_free_space_mb: u64,
    #[serde(default = "default_progress_step")]
    pub progress_step: f64,
    #[serde(default)]
    pub modules: ModuleToggles,
    #[serde(default)]
    pub memory: MemorySourceConfig,
    #[serde(default)]
    pub file_artifacts: Vec<FileArtifact>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            description: format!("Default acquisition configuration for {}", std::env::consts::OS),
            case: CaseMetadata::default(),
            compression: false,
            min_free_space_mb: DEFAULT_MIN_FREE_SPACE_MB,
            progress_step: DEFAULT_PROGRESS_STEP,
            modules: ModuleToggles::default(),
            memory: MemorySourceConfig::default(),
            file_artifacts: default_file_artifacts(),
        }
    }
}

fn artifact(name: &str, source_path: &str, description: &str) -> FileArtifact {
    FileArtifact {
        name: name.to_string(),
        source_path: source_path.to_string(),
        description: Some(description.to_string()),
    }
}

/// Small set of host files worth preserving next to a memory image.
fn default_file_artifacts() -> Vec<FileArtifact> {
    match std::env::consts::OS {
        "linux" => vec![
            artifact("iomem", "/proc/iomem", "Physical address map"),
            artifact("cpuinfo", "/proc/cpuinfo", "Processor information"),
            artifact("modules", "/proc/modules", "Loaded kernel modules"),
            artifact("auth.log", "/var/log/auth.log", "Authentication log"),
        ],
        "macos" => vec![
            artifact("system.log", "/var/log/system.log", "System log"),
            artifact("hosts", "/etc/hosts", "Static host table"),
        ],
        "windows" => vec![artifact(
            "hosts",
            "%SystemRoot%\\System32\\drivers\\etc\\hosts",
            "Static host table",
        )],
        _ => Vec::new(),
    }
}

impl AcquisitionConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: AcquisitionConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML config")?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Create a default configuration YAML file
    pub fn create_default_config_file(path: &Path) -> Result<()> {
        AcquisitionConfig::default().save_to_yaml_file(path)
    }
}

/// Load a configuration file or create a default one.
///
/// A path that exists is loaded. A path that does not exist receives the
/// default configuration, which is also returned. Without a path the
/// default configuration is used as is.
pub fn load_or_create_config(config_path: Option<&Path>) -> Result<AcquisitionConfig> {
    match config_path {
        Some(path) if path.exists() => AcquisitionConfig::from_yaml_file(path),
        Some(path) => {
            info!("Creating default config at {}", path.display());
            let config = AcquisitionConfig::default();
            config.save_to_yaml_file(path)?;
            Ok(config)
        }
        None => {
            info!("No config path provided, using default configuration for {}", std::env::consts::OS);
            Ok(AcquisitionConfig::default())
        }
    }
}
