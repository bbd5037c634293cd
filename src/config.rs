// ⚙️ Configuration - command line flags with environment fallbacks
//
// No config files: every setting is a flag, and every flag can also be
// supplied through a GLEIF_* environment variable.

use crate::reference::DirectoryLocator;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Name fragment of GLEIF LEI-CDF golden copy files
pub const LEI_FILE_MARKER: &str = "lei2-golden-copy";
/// Name fragment of GLEIF RR-CDF golden copy files
pub const RR_FILE_MARKER: &str = "rr-golden-copy";
pub const XML_SUFFIX: &str = ".xml";

#[derive(Debug, Parser)]
#[command(name = "gleif-graph", version, about = "Map GLEIF LEI and RR files into an entity graph")]
pub struct Cli {
    /// Directory holding extracted GLEIF downloads
    #[arg(long, env = "GLEIF_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// SQLite store for emitted entities
    #[arg(long, env = "GLEIF_DATABASE", default_value = "data/gleif.db")]
    pub database: PathBuf,

    /// Write JSON lines to this file instead of the SQLite store
    #[arg(long, env = "GLEIF_JSONL")]
    pub jsonl: Option<PathBuf>,

    /// Clear the store before loading
    #[arg(long)]
    pub reset: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Map a LEI-CDF file into Company, Security and Succession entities
    Lei {
        /// Defaults to the newest LEI golden copy in the data directory
        file: Option<PathBuf>,
    },
    /// Map an RR-CDF file into relationship edges
    Rr {
        /// Defaults to the newest RR golden copy in the data directory
        file: Option<PathBuf>,
    },
    /// Map the newest LEI file, then the newest RR file
    All,
}

impl Command {
    /// Reference tables are only consulted for LEI records
    pub fn needs_reference_tables(&self) -> bool {
        !matches!(self, Command::Rr { .. })
    }
}

impl Cli {
    pub fn locator(&self) -> DirectoryLocator {
        DirectoryLocator::new(&self.data_dir)
    }

    /// The LEI file to read: explicit argument or newest in the data dir
    pub fn lei_file(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        resolve(&self.locator(), explicit, LEI_FILE_MARKER)
    }

    /// The RR file to read: explicit argument or newest in the data dir
    pub fn rr_file(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        resolve(&self.locator(), explicit, RR_FILE_MARKER)
    }
}

fn resolve(locator: &DirectoryLocator, explicit: Option<&Path>, marker: &str) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    locator.newest(marker, XML_SUFFIX).ok_or_else(|| {
        anyhow!(
            "No *{}*{} file found in {}",
            marker,
            XML_SUFFIX,
            locator.dir().display()
        )
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["gleif-graph", "rr"]).unwrap();
        assert_eq!(cli.command, Command::Rr { file: None });
        assert!(!cli.reset);
        assert!(cli.jsonl.is_none());
        assert!(!cli.command.needs_reference_tables());
    }

    #[test]
    fn test_explicit_file_and_flags() {
        let cli = Cli::try_parse_from([
            "gleif-graph",
            "--data-dir",
            "/tmp/gleif",
            "--jsonl",
            "out.jsonl",
            "--reset",
            "lei",
            "lei.xml",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, PathBuf::from("/tmp/gleif"));
        assert_eq!(cli.jsonl, Some(PathBuf::from("out.jsonl")));
        assert!(cli.reset);
        assert!(cli.command.needs_reference_tables());
        assert_eq!(
            cli.lei_file(Some(Path::new("lei.xml"))).unwrap(),
            PathBuf::from("lei.xml")
        );
    }

    #[test]
    fn test_newest_file_is_located() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "20240101-0000-gleif-goldencopy-lei2-golden-copy.xml",
            "20240301-0000-gleif-goldencopy-lei2-golden-copy.xml",
            "20240301-0000-gleif-goldencopy-rr-golden-copy.xml",
            "20240401-0000-gleif-goldencopy-lei2-golden-copy.xml.zip",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let data_dir = dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["gleif-graph", "--data-dir", data_dir, "all"]).unwrap();

        let lei = cli.lei_file(None).unwrap();
        assert!(lei.ends_with("20240301-0000-gleif-goldencopy-lei2-golden-copy.xml"));
        let rr = cli.rr_file(None).unwrap();
        assert!(rr.ends_with("20240301-0000-gleif-goldencopy-rr-golden-copy.xml"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["gleif-graph", "--data-dir", data_dir, "rr"]).unwrap();
        assert!(cli.rr_file(None).is_err());
    }
}
