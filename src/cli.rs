use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for the rust-acquire tool.
///
/// Flags given here override the matching values from the configuration
/// file. Without a subcommand the tool runs an acquisition session.
#[derive(Parser, Debug)]
#[clap(name = "rust-acquire", about = "Forensic evidence acquisition tool", version)]
pub struct Args {
    /// Output directory for the case (default: <temp>/rust-acquire-<timestamp>-<hostname>)
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Path to configuration YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Write every evidence file as a single-entry zip archive
    #[clap(long)]
    pub compress: bool,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,

    /// Continue even without elevated privileges
    #[clap(long)]
    pub force: bool,

    /// Modules to run (comma-separated short names, e.g. PhysicalMemory,FileArtifacts)
    #[clap(short, long)]
    pub modules: Option<String>,

    /// Where physical memory is read from
    #[clap(long)]
    pub memory_source: Option<MemorySourceKind>,

    /// Raw memory image to re-acquire (implies --memory-source image)
    #[clap(long)]
    pub memory_image: Option<PathBuf>,

    /// Examiner name recorded in the case log and summary
    #[clap(long)]
    pub examiner: Option<String>,

    /// Case identifier recorded in the case log and summary
    #[clap(long)]
    pub case_id: Option<String>,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

impl Args {
    /// Requested module short names, if any were given.
    pub fn module_filter(&self) -> Option<Vec<String>> {
        self.modules.as_ref().map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

/// Physical memory source selectable from the command line.
#[derive(Clone, Debug, ValueEnum, PartialEq, Eq)]
pub enum MemorySourceKind {
    /// Live memory through /dev/mem, bounded by /proc/iomem
    DevMem,
    /// An existing flat memory image
    Image,
}

impl std::fmt::Display for MemorySourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemorySourceKind::DevMem => write!(f, "dev-mem"),
            MemorySourceKind::Image => write!(f, "image"),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = "config.yaml")]
        path: PathBuf,
    },

    /// Recompute the SHA-256 digest of an evidence file
    Verify {
        /// Evidence file to read
        path: PathBuf,

        /// Digest the payload of a single-entry zip archive instead of the raw file
        #[clap(long)]
        archived: bool,

        /// Expected digest; exit with an error on mismatch
        #[clap(long)]
        expected: Option<String>,
    },

    /// List the modules this build can run
    ListModules,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_basic_args_parsing() {
        let args = Args::parse_from(&[
            "rust-acquire",
            "--output", "/cases/2024-017",
            "--compress",
            "--verbose",
        ]);

        assert_eq!(args.output, Some(PathBuf::from("/cases/2024-017")));
        assert!(args.compress);
        assert!(args.verbose);
        assert!(!args.force);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_default_values() {
        let args = Args::parse_from(&["rust-acquire"]);

        assert!(args.output.is_none());
        assert!(args.config.is_none());
        assert!(!args.compress);
        assert!(!args.verbose);
        assert!(args.module_filter().is_none());
        assert!(args.memory_source.is_none());
    }

    #[test]
    fn test_memory_args() {
        let args = Args::parse_from(&[
            "rust-acquire",
            "--memory-source", "image",
            "--memory-image", "/evidence/mem.raw",
        ]);

        assert_eq!(args.memory_source, Some(MemorySourceKind::Image));
        assert_eq!(args.memory_image, Some(PathBuf::from("/evidence/mem.raw")));
        assert_eq!(format!("{}", MemorySourceKind::DevMem), "dev-mem");
    }

    #[test]
    fn test_case_metadata_and_modules() {
        let args = Args::parse_from(&[
            "rust-acquire",
            "--examiner", "J. Doe",
            "--case-id", "2024-017",
            "--modules", "PhysicalMemory, FileArtifacts,",
        ]);

        assert_eq!(args.examiner, Some("J. Doe".to_string()));
        assert_eq!(args.case_id, Some("2024-017".to_string()));
        assert_eq!(
            args.module_filter(),
            Some(vec!["PhysicalMemory".to_string(), "FileArtifacts".to_string()])
        );
    }

    #[test]
    fn test_init_config_subcommand() {
        let args = Args::parse_from(&["rust-acquire", "init-config", "custom-config.yaml"]);

        match args.command {
            Some(Commands::InitConfig { path }) => {
                assert_eq!(path, PathBuf::from("custom-config.yaml"));
            }
            _ => panic!("Expected InitConfig command"),
        }
    }

    #[test]
    fn test_verify_subcommand() {
        let args = Args::parse_from(&[
            "rust-acquire",
            "verify",
            "PhysicalMemory.zip",
            "--archived",
            "--expected", "abc123",
        ]);

        match args.command {
            Some(Commands::Verify { path, archived, expected }) => {
                assert_eq!(path, PathBuf::from("PhysicalMemory.zip"));
                assert!(archived);
                assert_eq!(expected, Some("abc123".to_string()));
            }
            _ => panic!("Expected Verify command"),
        }
    }

    #[test]
    fn test_list_modules_subcommand() {
        let args = Args::parse_from(&["rust-acquire", "list-modules"]);
        assert!(matches!(args.command, Some(Commands::ListModules)));
    }
}
