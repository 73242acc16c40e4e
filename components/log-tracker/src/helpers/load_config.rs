// Local crates
use crate::archiver::archiver::DEFAULT_COMPRESSION_LEVEL;
use crate::tracker::{models::TrackerConfig, reader::LineMode};

// External crates
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// Prefix of environment variables overriding file values, e.g.
/// `LOG_TRACKER__TRACKER__POLL_INTERVAL_MS=250`. The file list takes a
/// comma separated value: `LOG_TRACKER__TRACKER__FILES=/a.log,/b.log`.
pub const ENV_PREFIX: &str = "LOG_TRACKER";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub tracker: TrackerSection,
    #[serde(default)]
    pub archiver: ArchiverConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load the TOML file at `path`, apply environment overrides and validate
    /// the result.
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as `load`, but environment overrides are read from `env` instead
    /// of the process environment when it is given.
    pub fn load_with_env<P: AsRef<Path>>(
        path: P,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading log tracker configuration file"
        );

        let config: Config = config::Config::builder()
            .add_source(config::File::from(path_ref).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("tracker.files")
                    .source(env),
            )
            .build()
            .and_then(|raw| raw.try_deserialize())
            .with_context(|| format!("Failed to load configuration from {:?}", path_ref))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {:?}", path_ref))?;

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Log tracker configuration file loaded successfully"
        );
        Ok(config)
    }

    /// Parse a TOML document directly, without environment overrides.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// The effective configuration rendered back as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.tracker.files.is_empty(),
            "[tracker] files must list at least one file to watch"
        );
        ensure!(
            self.tracker.poll_interval_ms > 0,
            "[tracker] poll_interval_ms must be greater than zero"
        );
        ensure!(
            self.archiver.compression_level <= 9,
            "[archiver] compression_level must be between 0 and 9, got {}",
            self.archiver.compression_level
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackerSection {
    pub files: Vec<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Defaults to the system temporary directory.
    pub staging_dir: Option<PathBuf>,
    #[serde(default)]
    pub preserve_line_breaks: bool,
}

impl From<&TrackerSection> for TrackerConfig {
    fn from(section: &TrackerSection) -> Self {
        Self {
            files: section.files.clone(),
            poll_interval: Duration::from_millis(section.poll_interval_ms),
            staging_dir: section
                .staging_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            line_mode: LineMode::from_preserve_flag(section.preserve_line_breaks),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArchiverConfig {
    #[serde(default = "default_archive_path")]
    pub output_path: PathBuf,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            output_path: default_archive_path(),
            compression_level: default_compression_level(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Write to a daily rolling file in this directory instead of stdout.
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub tokio_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            directory: None,
            tokio_console: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("logs_archive.tar.gz")
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}
