//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::oracle::OracleBackend;
use crate::core::errors::{Result, WcffError};
use crate::core::paths;

/// Temp-file pattern WannaCry uses for the plaintext copies it stages.
pub const DEFAULT_PATTERN: &str = "*.WNCRYT";

/// Full configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub classifier: ClassifierConfig,
    pub recovery: RecoveryConfig,
    pub paths: PathsConfig,
}

/// Where to look and what to look for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Search roots. Empty means [`paths::default_search_roots`].
    pub root_paths: Vec<PathBuf>,
    /// File-name glob marking leftover artifacts.
    pub pattern: String,
    pub case_insensitive: bool,
    pub follow_symlinks: bool,
    pub max_depth: usize,
    /// Consumer back-off while the queue is empty and traversals are running.
    pub poll_interval_ms: u64,
}

/// Content-type identification knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub oracle: OracleBackend,
    /// Lowercase MIME type -> extension, consulted before the built-in table.
    pub mime_overrides: BTreeMap<String, String>,
    /// Extra signatures registered after the built-in table.
    pub custom_signatures: Vec<CustomSignatureConfig>,
}

/// A user-supplied signature. `pattern` and `marker` are regexes over the
/// uppercase hex encoding of the file header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomSignatureConfig {
    pub extension: String,
    pub pattern: String,
    #[serde(default)]
    pub marker: Option<String>,
}

/// Copy behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecoveryConfig {
    pub destination: PathBuf,
    pub overwrite: bool,
    pub parallelism: usize,
    pub create_destination: bool,
}

/// Filesystem paths used by wcff itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            root_paths: Vec::new(),
            pattern: DEFAULT_PATTERN.to_string(),
            case_insensitive: true,
            follow_symlinks: false,
            max_depth: 64,
            poll_interval_ms: 500,
        }
    }
}

impl DiscoveryConfig {
    /// Configured roots, or the platform defaults when none are configured.
    #[must_use]
    pub fn effective_roots(&self) -> Vec<PathBuf> {
        if self.root_paths.is_empty() {
            paths::default_search_roots()
        } else {
            self.root_paths.clone()
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            oracle: OracleBackend::Auto,
            mime_overrides: BTreeMap::new(),
            custom_signatures: Vec::new(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("recovered"),
            overwrite: false,
            parallelism: std::thread::available_parallelism().map_or(1, |n| n.get()),
            create_destination: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = paths::home_dir();
        Self {
            config_file: home_dir.join(".config").join("wcff").join("config.toml"),
            jsonl_log: home_dir
                .join(".local")
                .join("share")
                .join("wcff")
                .join("activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw =
                fs::read_to_string(&path_buf).map_err(|source| WcffError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(WcffError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(|name| env::var(name).ok())?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        if let Some(raw) = get("WCFF_DISCOVERY_ROOTS") {
            self.discovery.root_paths = env::split_paths(&raw).collect();
        }
        if let Some(raw) = get("WCFF_DISCOVERY_PATTERN") {
            self.discovery.pattern = raw;
        }
        if let Some(raw) = get("WCFF_DISCOVERY_POLL_INTERVAL_MS") {
            self.discovery.poll_interval_ms = parse_env("WCFF_DISCOVERY_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = get("WCFF_DISCOVERY_MAX_DEPTH") {
            self.discovery.max_depth = parse_env("WCFF_DISCOVERY_MAX_DEPTH", &raw)?;
        }
        if let Some(raw) = get("WCFF_DISCOVERY_FOLLOW_SYMLINKS") {
            self.discovery.follow_symlinks = parse_env("WCFF_DISCOVERY_FOLLOW_SYMLINKS", &raw)?;
        }
        if let Some(raw) = get("WCFF_CLASSIFIER_ORACLE") {
            self.classifier.oracle =
                raw.parse::<OracleBackend>()
                    .map_err(|details| WcffError::ConfigParse {
                        context: "env",
                        details: format!("WCFF_CLASSIFIER_ORACLE={raw:?}: {details}"),
                    })?;
        }
        if let Some(raw) = get("WCFF_RECOVERY_DESTINATION") {
            self.recovery.destination = PathBuf::from(raw);
        }
        if let Some(raw) = get("WCFF_RECOVERY_OVERWRITE") {
            self.recovery.overwrite = parse_env("WCFF_RECOVERY_OVERWRITE", &raw)?;
        }
        if let Some(raw) = get("WCFF_RECOVERY_PARALLELISM") {
            self.recovery.parallelism = parse_env("WCFF_RECOVERY_PARALLELISM", &raw)?;
        }
        if let Some(raw) = get("WCFF_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        Ok(())
    }

    /// Lowercase MIME override keys so lookups stay exact-match.
    fn normalize_paths(&mut self) {
        self.classifier.mime_overrides = std::mem::take(&mut self.classifier.mime_overrides)
            .into_iter()
            .map(|(mime, ext)| (mime.trim().to_ascii_lowercase(), ext))
            .collect();

        for path in &mut self.discovery.root_paths {
            let s = path.to_string_lossy();
            if s.len() > 1
                && let Some(stripped) = s.strip_suffix('/')
            {
                *path = PathBuf::from(stripped);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.discovery.pattern.trim().is_empty() {
            return Err(WcffError::InvalidConfig {
                details: "discovery.pattern must not be empty".to_string(),
            });
        }
        crate::scanner::pattern::FilePattern::new(
            &self.discovery.pattern,
            self.discovery.case_insensitive,
        )?;

        if self.discovery.poll_interval_ms == 0 {
            return Err(WcffError::InvalidConfig {
                details: "discovery.poll_interval_ms must be >= 1".to_string(),
            });
        }
        if self.discovery.max_depth == 0 {
            return Err(WcffError::InvalidConfig {
                details: "discovery.max_depth must be >= 1".to_string(),
            });
        }
        if self.recovery.parallelism == 0 {
            return Err(WcffError::InvalidConfig {
                details: "recovery.parallelism must be >= 1".to_string(),
            });
        }

        for (mime, ext) in &self.classifier.mime_overrides {
            validate_extension(ext).map_err(|details| WcffError::InvalidConfig {
                details: format!("classifier.mime_overrides[{mime:?}]: {details}"),
            })?;
        }

        for custom in &self.classifier.custom_signatures {
            crate::classify::registry::FileSignature::custom(
                &custom.extension,
                &custom.pattern,
                custom.marker.as_deref(),
            )?;
        }

        Ok(())
    }
}

/// Extensions are non-empty and carry their leading dot.
pub fn validate_extension(ext: &str) -> std::result::Result<(), String> {
    if ext.len() < 2 || !ext.starts_with('.') {
        return Err(format!("extension {ext:?} must start with '.' and be non-empty"));
    }
    if ext.contains(['/', '\\']) {
        return Err(format!("extension {ext:?} must not contain path separators"));
    }
    Ok(())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| WcffError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
