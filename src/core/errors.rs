//! WCFF-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, WcffError>;

/// Top-level error type for the file finder.
#[derive(Debug, Error)]
pub enum WcffError {
    #[error("[WCFF-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[WCFF-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[WCFF-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[WCFF-1101] invalid file signature {extension:?}: {details}")]
    InvalidSignature { extension: String, details: String },

    #[error("[WCFF-2001] container parse failure: {details}")]
    ArchiveParse { details: String },

    #[error("[WCFF-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[WCFF-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[WCFF-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[WCFF-3003] destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    #[error("[WCFF-3004] source path has no file name: {path}")]
    InvalidSourceName { path: PathBuf },

    #[error("[WCFF-3005] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[WCFF-3006] destination is the source file itself: {path}")]
    DestinationIsSource { path: PathBuf },

    #[error("[WCFF-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl WcffError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "WCFF-1001",
            Self::MissingConfig { .. } => "WCFF-1002",
            Self::ConfigParse { .. } => "WCFF-1003",
            Self::InvalidSignature { .. } => "WCFF-1101",
            Self::ArchiveParse { .. } => "WCFF-2001",
            Self::Serialization { .. } => "WCFF-2101",
            Self::PermissionDenied { .. } => "WCFF-3001",
            Self::Io { .. } => "WCFF-3002",
            Self::DestinationExists { .. } => "WCFF-3003",
            Self::InvalidSourceName { .. } => "WCFF-3004",
            Self::ChannelClosed { .. } => "WCFF-3005",
            Self::DestinationIsSource { .. } => "WCFF-3006",
            Self::Runtime { .. } => "WCFF-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    ///
    /// Permission failures get their own variant so callers can tell an
    /// inaccessible path from a broken one.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied {
                path: path.as_ref().to_path_buf(),
            };
        }
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for WcffError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for WcffError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for WcffError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for WcffError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::ArchiveParse {
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<WcffError> {
        vec![
            WcffError::InvalidConfig {
                details: String::new(),
            },
            WcffError::MissingConfig {
                path: PathBuf::new(),
            },
            WcffError::ConfigParse {
                context: "",
                details: String::new(),
            },
            WcffError::InvalidSignature {
                extension: String::new(),
                details: String::new(),
            },
            WcffError::ArchiveParse {
                details: String::new(),
            },
            WcffError::Serialization {
                context: "",
                details: String::new(),
            },
            WcffError::PermissionDenied {
                path: PathBuf::new(),
            },
            WcffError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            WcffError::DestinationExists {
                path: PathBuf::new(),
            },
            WcffError::InvalidSourceName {
                path: PathBuf::new(),
            },
            WcffError::ChannelClosed { component: "" },
            WcffError::DestinationIsSource {
                path: PathBuf::new(),
            },
            WcffError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let codes: Vec<&str> = all_variants().iter().map(WcffError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_includes_code() {
        for err in all_variants() {
            let msg = err.to_string();
            assert!(
                msg.contains(err.code()),
                "display should contain error code: {msg}"
            );
        }
    }

    #[test]
    fn retryable_errors_are_correct() {
        assert!(WcffError::ChannelClosed { component: "test" }.is_retryable());
        assert!(
            WcffError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            }
            .is_retryable()
        );
        assert!(
            !WcffError::DestinationExists {
                path: PathBuf::new()
            }
            .is_retryable()
        );
        assert!(
            !WcffError::ArchiveParse {
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn io_constructor_splits_permission_denied() {
        let err = WcffError::io(
            "/root/secret",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.code(), "WCFF-3001");

        let err = WcffError::io(
            "/tmp/test.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "WCFF-3002");
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: WcffError = toml_err.into();
        assert_eq!(err.code(), "WCFF-1003");
    }

    #[test]
    fn from_zip_error() {
        let err: WcffError = zip::result::ZipError::InvalidArchive("truncated".into()).into();
        assert_eq!(err.code(), "WCFF-2001");
    }
}
