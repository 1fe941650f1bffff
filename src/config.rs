//! Execution options, loadable from TOML and overridable from the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding the spill item-count threshold.
pub const ENV_SPILL_THRESHOLD: &str = "SPARQL_ITER_SPILL_THRESHOLD";
/// Environment variable overriding the spill directory.
pub const ENV_SPILL_DIR: &str = "SPARQL_ITER_SPILL_DIR";
/// Environment variable selecting the RDF-star matching strategy.
pub const ENV_RDF_STAR: &str = "SPARQL_ITER_RDF_STAR";

/// When a buffering operator moves its working set to disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ThresholdPolicy {
    /// Always stay in memory.
    #[default]
    Never,
    /// Spill once this many items are buffered.
    Count(usize),
    /// Spill once the estimated size of buffered items reaches this many
    /// bytes.
    Bytes(usize),
}

impl ThresholdPolicy {
    /// `true` when a buffer holding `items` items of `bytes` estimated bytes
    /// has to spill.
    pub fn is_exceeded(&self, items: usize, bytes: usize) -> bool {
        match *self {
            ThresholdPolicy::Never => false,
            ThresholdPolicy::Count(limit) => items >= limit,
            ThresholdPolicy::Bytes(limit) => bytes >= limit,
        }
    }
}

/// Strategy used to match triple patterns with nested triple terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RdfStarMode {
    /// Resolve nested patterns first through synthetic variables.
    #[default]
    Staged,
    /// Unify nested patterns inline against each candidate triple.
    Inline,
}

impl FromStr for RdfStarMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "staged" | "rx" => Ok(RdfStarMode::Staged),
            "inline" | "rx_sa" => Ok(RdfStarMode::Inline),
            _ => Err(ConfigError::InvalidValue {
                key: "rdf_star.mode",
                value: value.to_owned(),
            }),
        }
    }
}

/// Options shared by every operator of one query execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecConfig {
    /// Item-count spill threshold for DISTINCT and ORDER BY buffers.
    pub spill_threshold: Option<usize>,
    /// Byte-estimate spill threshold, used when no count threshold is set.
    pub spill_threshold_bytes: Option<usize>,
    /// Directory for spill files; the system temp directory when `None`.
    pub spill_dir: Option<PathBuf>,
    /// RDF-star matching strategy.
    pub rdf_star: RdfStarMode,
    /// Number of recent rows REDUCED compares against.
    pub reduced_window: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            spill_threshold: None,
            spill_threshold_bytes: None,
            spill_dir: None,
            rdf_star: RdfStarMode::default(),
            reduced_window: 1,
        }
    }
}

impl ExecConfig {
    /// Sets the item-count spill threshold.
    pub fn with_spill_threshold(mut self, threshold: usize) -> Self {
        self.spill_threshold = Some(threshold);
        self
    }

    /// Sets the byte-estimate spill threshold.
    pub fn with_spill_threshold_bytes(mut self, bytes: usize) -> Self {
        self.spill_threshold_bytes = Some(bytes);
        self
    }

    /// Sets the directory spill files are created in.
    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    /// Selects the RDF-star matching strategy.
    pub fn with_rdf_star(mut self, mode: RdfStarMode) -> Self {
        self.rdf_star = mode;
        self
    }

    /// Sets the REDUCED comparison window (at least one row).
    pub fn with_reduced_window(mut self, window: usize) -> Self {
        self.reduced_window = window.max(1);
        self
    }

    /// Spill policy derived from the thresholds. A zero threshold means
    /// "never spill".
    pub fn threshold_policy(&self) -> ThresholdPolicy {
        match (self.spill_threshold, self.spill_threshold_bytes) {
            (Some(count), _) if count > 0 => ThresholdPolicy::Count(count),
            (_, Some(bytes)) if bytes > 0 => ThresholdPolicy::Bytes(bytes),
            _ => ThresholdPolicy::Never,
        }
    }

    /// Reads `explicit`, or the default config file when `None`. A missing
    /// file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let raw = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        debug!(path = ?path, "config.loaded");
        raw.into_config()
    }

    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        raw.into_config()
    }

    /// Applies the `SPARQL_ITER_*` environment overrides.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_SPILL_THRESHOLD) {
            let threshold = value
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_SPILL_THRESHOLD,
                    value: value.clone(),
                })?;
            self.spill_threshold = Some(threshold);
        }
        if let Some(value) = lookup(ENV_SPILL_DIR) {
            self.spill_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_RDF_STAR) {
            self.rdf_star = value.parse()?;
        }
        Ok(self)
    }
}

/// Default location of the configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("sparql-iter").join("exec.toml"))
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    spill: SpillSection,
    #[serde(default)]
    rdf_star: RdfStarSection,
    #[serde(default)]
    reduced: ReducedSection,
}

#[derive(Debug, Default, Deserialize)]
struct SpillSection {
    threshold: Option<usize>,
    threshold_bytes: Option<usize>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RdfStarSection {
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReducedSection {
    window: Option<usize>,
}

impl RawConfig {
    fn into_config(self) -> Result<ExecConfig, ConfigError> {
        let mut config = ExecConfig {
            spill_threshold: self.spill.threshold,
            spill_threshold_bytes: self.spill.threshold_bytes,
            spill_dir: self.spill.directory,
            ..ExecConfig::default()
        };
        if let Some(mode) = self.rdf_star.mode.as_deref() {
            config.rdf_star = mode.parse()?;
        }
        if let Some(window) = self.reduced.window {
            if window == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "reduced.window",
                    value: window.to_string(),
                });
            }
            config.reduced_window = window;
        }
        Ok(config)
    }
}

/// Failure to load execution options.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// A key holds a value outside its domain.
    #[error("invalid value '{value}' for {key}")]
    InvalidValue {
        /// Offending key or environment variable.
        key: &'static str,
        /// Value as written.
        value: String,
    },
}
