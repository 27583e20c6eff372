//! Layered configuration for the librarian service.
//!
//! Values are merged, lowest priority first, from:
//!
//! 1. built-in [defaults](Config::default),
//! 2. a TOML, YAML or JSON file (explicit, or `config.toml` in the user's
//!    configuration directory when present),
//! 3. `LIBRARIAN_`-prefixed environment variables, with `__` separating nested
//!    keys (`LIBRARIAN_STABILITY__DELAY=10`).
//!
//! Command-line overrides are applied on top by the binary.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "LIBRARIAN_";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "librarian")
}

/// `config.toml` inside the platform configuration directory, if one can be
/// determined for the current user.
pub fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory watched for incoming media (recursively).
    pub inbox: PathBuf,
    /// Root of the date-partitioned archive.
    pub archive: PathBuf,
    /// SQLite ledger file.
    pub database: PathBuf,
    pub log_level: LogLevel,
    /// How many `name_N` siblings are tried when an archive name is taken by
    /// different content.
    pub max_rename_attempts: u32,
    pub stability: StabilityConfig,
    pub heartbeat: HeartbeatConfig,
    pub filter: FilterConfig,
}
impl Default for Config {
    fn default() -> Self {
        let data_dir =
            project_dirs().map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_else(|| PathBuf::from("librarian"));
        Self {
            inbox: data_dir.join("Photos_Inbox"),
            archive: data_dir.join("Storage").join("Originals"),
            database: data_dir.join("librarian.sqlite"),
            log_level: LogLevel::default(),
            max_rename_attempts: 10_000,
            stability: StabilityConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

/// Thresholds for deciding a file has finished being written. All values are
/// in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Time without modification before a file is considered stable.
    pub delay: f64,
    /// Minimum age of the file's modification time.
    pub min_file_age: f64,
    /// How often pending files are checked.
    pub check_interval: f64,
    /// How often the whole inbox is rescanned, in case events were missed.
    pub periodic_scan_interval: f64,
}
impl Default for StabilityConfig {
    fn default() -> Self {
        Self { delay: 5.0, min_file_age: 2.0, check_interval: 1.0, periodic_scan_interval: 60.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub service_name: String,
    /// Seconds between heartbeats.
    pub interval: f64,
    /// Days of heartbeat history to keep. `0` keeps everything.
    pub history_retention_days: u32,
}
impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { service_name: "librarian".to_string(), interval: 60.0, history_retention_days: 60 }
    }
}

/// Files that are never ingested. Prefixes and names are matched against
/// every path component below the inbox; patterns against the file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub prefixes: Vec<String>,
    pub names: Vec<String>,
    pub patterns: Vec<String>,
}
impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            prefixes: [".", ".trashed-"].map(String::from).to_vec(),
            names: ["Thumbs.db", "desktop.ini", ".DS_Store", ".thumbnails"].map(String::from).to_vec(),
            patterns: [r"^syncthing-folder-.*\.txt$", r"^~\$.*"].map(String::from).to_vec(),
        }
    }
}
impl FilterConfig {
    pub fn compiled_patterns(&self) -> Result<Vec<Regex>> {
        self.patterns
            .iter()
            .map(|pattern| Regex::new(pattern).or_raise(|| ErrorKind::Invalid(format!("filter pattern {pattern:?}"))))
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}
impl LogLevel {
    /// The equivalent `tracing` filter directive.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}
impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        })
    }
}
impl FromStr for LogLevel {
    type Err = ErrorKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            _ => Err(ErrorKind::Invalid(format!("unknown log level {s:?}"))),
        }
    }
}
impl TryFrom<String> for LogLevel {
    type Error = ErrorKind;

    fn try_from(value: String) -> std::result::Result<Self, ErrorKind> {
        value.parse()
    }
}
impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.to_string()
    }
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// An explicit `file` must exist. Without one, the default configuration
    /// file is merged only if it exists.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let figment = Self::figment(file)?.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Defaults plus the configuration file, without the environment.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let file = match file {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => default_config_file().filter(|path| path.is_file()),
        };
        let Some(file) = file else {
            return Ok(figment);
        };
        tracing::debug!(path = %file.display(), "Loading configuration file");
        Ok(match file.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("toml") => figment.merge(Toml::file_exact(&file)),
            Some("yaml" | "yml") => figment.merge(Yaml::file_exact(&file)),
            Some("json") => figment.merge(Json::file_exact(&file)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(file)),
        })
    }

    /// Deserialize an already-assembled [`Figment`] and validate the result.
    pub fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but can't be used.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("stability.delay", self.stability.delay, true),
            ("stability.min_file_age", self.stability.min_file_age, true),
            ("stability.check_interval", self.stability.check_interval, false),
            ("stability.periodic_scan_interval", self.stability.periodic_scan_interval, false),
            ("heartbeat.interval", self.heartbeat.interval, false),
        ];
        for (name, seconds, zero_allowed) in durations {
            let valid = seconds.is_finite() && (seconds > 0.0 || (zero_allowed && seconds == 0.0));
            if !valid {
                exn::bail!(ErrorKind::Invalid(format!("{name} must be a positive number of seconds, got {seconds}")));
            }
        }
        for (name, path) in [("inbox", &self.inbox), ("archive", &self.archive), ("database", &self.database)] {
            if path.as_os_str().is_empty() {
                exn::bail!(ErrorKind::Invalid(format!("{name} must not be empty")));
            }
        }
        if self.inbox == self.archive {
            exn::bail!(ErrorKind::Invalid("inbox and archive must be different directories".to_string()));
        }
        if self.max_rename_attempts == 0 {
            exn::bail!(ErrorKind::Invalid("max_rename_attempts must be at least 1".to_string()));
        }
        if self.heartbeat.service_name.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("heartbeat.service_name must not be empty".to_string()));
        }
        self.filter.compiled_patterns()?;
        Ok(())
    }

    /// Make every configured path absolute, relative to the current working
    /// directory.
    pub fn resolve_paths(mut self) -> Result<Self> {
        for path in [&mut self.inbox, &mut self.archive, &mut self.database] {
            *path = std::path::absolute(&*path)
                .or_raise(|| ErrorKind::Invalid(format!("unable to resolve {}", path.display())))?;
        }
        Ok(self)
    }
}

impl StabilityConfig {
    pub fn delay(&self) -> Duration {
        seconds(self.delay)
    }

    pub fn min_file_age(&self) -> Duration {
        seconds(self.min_file_age)
    }

    pub fn check_interval(&self) -> Duration {
        seconds(self.check_interval)
    }

    pub fn periodic_scan_interval(&self) -> Duration {
        seconds(self.periodic_scan_interval)
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        seconds(self.interval)
    }

    /// `None` when history is kept forever.
    pub fn history_retention(&self) -> Option<Duration> {
        const DAY: u64 = 24 * 60 * 60;
        (self.history_retention_days > 0).then(|| Duration::from_secs(u64::from(self.history_retention_days) * DAY))
    }
}

/// Validated configurations never hold negative or non-finite values.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}
