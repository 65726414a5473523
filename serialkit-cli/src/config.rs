//! Configuration file support for serialkit.
//!
//! Sources, strongest first: command-line flags, `SERIALKIT_*` environment
//! variables (both handled by clap), `./serialkit.toml`, then
//! `config.toml` in the platform config directory. A `--config` path
//! replaces both files.

use {
    directories::ProjectDirs,
    log::{debug, warn},
    serde::{Deserialize, Serialize},
    serialkit::{DataBits, Parity, StopBits},
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Name of the local configuration file.
const LOCAL_CONFIG: &str = "serialkit.toml";

/// `[port]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSection {
    /// Port to open when `--port` is not given, e.g. "/dev/ttyUSB0" or "COM3".
    pub name: Option<String>,
    /// Baud rate used when `--baud` is not given.
    pub baud: Option<u32>,
}

impl PortSection {
    fn overlay(&mut self, other: Self) {
        self.name = other
            .name
            .or(self.name.take());
        self.baud = other
            .baud
            .or(self.baud);
    }
}

/// `[line]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSection {
    /// Data bits per character.
    pub data_bits: Option<DataBits>,
    /// Parity mode.
    pub parity: Option<Parity>,
    /// Stop bits.
    pub stop_bits: Option<StopBits>,
}

impl LineSection {
    fn overlay(&mut self, other: Self) {
        self.data_bits = other
            .data_bits
            .or(self.data_bits);
        self.parity = other
            .parity
            .or(self.parity);
        self.stop_bits = other
            .stop_bits
            .or(self.stop_bits);
    }
}

/// Settings read from TOML files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Port selection.
    #[serde(default)]
    pub port: PortSection,
    /// Line framing.
    #[serde(default)]
    pub line: LineSection,
}

impl Config {
    /// Global file, then the local file on top of it.
    pub fn load() -> Self {
        let sources = Self::global_config_path()
            .into_iter()
            .chain([PathBuf::from(LOCAL_CONFIG)]);

        let mut config = Self::default();
        for path in sources {
            if let Some(found) = Self::read_file(&path) {
                debug!("Using settings from {}", path.display());
                config.overlay(found);
            }
        }
        config
    }

    /// Only the file given with `--config`.
    pub fn load_from_path(path: &Path) -> Self {
        Self::read_file(path).unwrap_or_else(|| {
            warn!("No usable config at {}, using defaults", path.display());
            Self::default()
        })
    }

    /// `None` when the file is absent or unusable; problems are logged.
    fn read_file(path: &Path) -> Option<Self> {
        if !path.is_file() {
            return None;
        }
        let text = fs::read_to_string(path)
            .map_err(|e| warn!("Cannot read config file {}: {e}", path.display()))
            .ok()?;
        toml::from_str(&text)
            .map_err(|e| warn!("Failed to parse config file {}: {e}", path.display()))
            .ok()
    }

    /// Platform config directory for serialkit.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "serialkit").map(|dirs| {
            dirs.config_dir()
                .to_path_buf()
        })
    }

    /// `config.toml` inside [`Config::global_config_dir`].
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Values present in `other` replace ours.
    fn overlay(&mut self, other: Self) {
        self.port
            .overlay(other.port);
        self.line
            .overlay(other.line);
    }
}
