//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use wannacry_file_finder::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, WcffError};

// Classification
pub use crate::classify::classifier::{ClassificationResult, ClassificationSource, TypeClassifier};
pub use crate::classify::container::ContainerInspector;
pub use crate::classify::oracle::{
    ContentTypeOracle, ExtensionLookup, FileCommandOracle, MimeTable, OracleBackend,
    SniffingOracle,
};
pub use crate::classify::registry::{FileSignature, SignatureRegistry};

// Discovery
pub use crate::scanner::pattern::FilePattern;
pub use crate::scanner::walker::{Discovery, DiscoveryOptions, FileDiscoverer, discover};

// Recovery
pub use crate::recovery::copier::{OverwritePolicy, RecoveryCopier, RecoveryReport};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
