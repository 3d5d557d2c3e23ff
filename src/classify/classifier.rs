//! Extension decision for one file: oracle first, then registry or container
//! inspection depending on what the oracle said.

#![allow(missing_docs)]

use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classify::container::ContainerInspector;
use crate::classify::oracle::{
    ContentTypeOracle, ExtensionLookup, MimeTable, SniffingOracle, StaticMimeTable,
    is_generic_binary, is_zip_family,
};
use crate::classify::registry::{OFFICE_DOCUMENT_EXTENSION, SignatureRegistry};
use crate::core::config::ClassifierConfig;
use crate::core::errors::{Result, WcffError};

/// Bytes handed to the oracle and the signature registry.
pub const HEADER_LEN: usize = 256;

/// Extension used when nothing better is known.
pub const UNKNOWN_EXTENSION: &str = ".txt";

/// Extension for zero-byte files.
pub const EMPTY_EXTENSION: &str = ".empty";

/// Which stage produced the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    KnownHeader,
    ContainerInspection,
    SystemOracle,
    Fallback,
}

impl ClassificationSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KnownHeader => "known_header",
            Self::ContainerInspection => "container_inspection",
            Self::SystemOracle => "system_oracle",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub extension: String,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    fn new(extension: impl Into<String>, source: ClassificationSource) -> Self {
        Self {
            extension: extension.into(),
            source,
        }
    }

    /// The unknown-type fallback.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_EXTENSION, ClassificationSource::Fallback)
    }

    /// The zero-byte sentinel.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(EMPTY_EXTENSION, ClassificationSource::Fallback)
    }
}

/// Content-based extension classifier.
///
/// Holds only shared read-only tables, so one instance can be cloned into
/// every worker thread.
#[derive(Clone)]
pub struct TypeClassifier {
    registry: Arc<SignatureRegistry>,
    oracle: Arc<dyn ContentTypeOracle>,
    lookup: Arc<dyn ExtensionLookup>,
    inspector: ContainerInspector,
}

impl fmt::Debug for TypeClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeClassifier")
            .field("signatures", &self.registry.len())
            .field("oracle", &self.oracle.name())
            .finish_non_exhaustive()
    }
}

impl Default for TypeClassifier {
    fn default() -> Self {
        Self::new(
            Arc::new(SignatureRegistry::builtin()),
            Arc::new(SniffingOracle),
            Arc::new(StaticMimeTable),
        )
    }
}

impl TypeClassifier {
    #[must_use]
    pub fn new(
        registry: Arc<SignatureRegistry>,
        oracle: Arc<dyn ContentTypeOracle>,
        lookup: Arc<dyn ExtensionLookup>,
    ) -> Self {
        Self {
            registry,
            oracle,
            lookup,
            inspector: ContainerInspector,
        }
    }

    /// Build registry, oracle and MIME table from configuration.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let registry = SignatureRegistry::builtin().with_custom(&config.custom_signatures)?;
        Ok(Self::new(
            Arc::new(registry),
            config.oracle.build(),
            Arc::new(MimeTable::with_overrides(&config.mime_overrides)),
        ))
    }

    /// Swap the oracle, keeping the tables.
    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn ContentTypeOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    #[must_use]
    pub fn oracle_name(&self) -> &'static str {
        self.oracle.name()
    }

    #[must_use]
    pub fn registry(&self) -> &SignatureRegistry {
        &self.registry
    }

    /// Classify a file. Never fails: any error yields the `.txt` fallback.
    pub fn classify(&self, path: &Path) -> ClassificationResult {
        self.try_classify(path)
            .unwrap_or_else(|_| ClassificationResult::unknown())
    }

    /// Same pipeline, surfacing open/read failures.
    pub fn try_classify(&self, path: &Path) -> Result<ClassificationResult> {
        let file = File::open(path).map_err(|source| WcffError::io(path, source))?;
        self.classify_reader(file)
            .map_err(|source| WcffError::io(path, source))
    }

    /// Classify in-memory content.
    pub fn classify_bytes(&self, content: &[u8]) -> ClassificationResult {
        self.classify_reader(Cursor::new(content))
            .unwrap_or_else(|_| ClassificationResult::unknown())
    }

    fn classify_reader<R: Read + Seek>(&self, mut reader: R) -> std::io::Result<ClassificationResult> {
        let mut header = Vec::with_capacity(HEADER_LEN);
        reader
            .by_ref()
            .take(HEADER_LEN as u64)
            .read_to_end(&mut header)?;
        if header.is_empty() {
            return Ok(ClassificationResult::empty());
        }

        let mime = self.oracle.content_type(&header);

        if is_zip_family(&mime) {
            let ext = self.inspector.resolve_archive(&mut reader);
            return Ok(ClassificationResult::new(
                ext,
                ClassificationSource::ContainerInspection,
            ));
        }

        if is_generic_binary(&mime) {
            return Ok(match self.registry.match_header(&header) {
                Some(OFFICE_DOCUMENT_EXTENSION) => {
                    // The stream is positioned just past the header.
                    let ext = self.inspector.resolve_compound_document(&mut reader);
                    ClassificationResult::new(ext, ClassificationSource::ContainerInspection)
                }
                Some(ext) => ClassificationResult::new(ext, ClassificationSource::KnownHeader),
                None => ClassificationResult::unknown(),
            });
        }

        Ok(self.lookup.extension_for(&mime).map_or_else(
            ClassificationResult::unknown,
            |ext| ClassificationResult::new(ext, ClassificationSource::SystemOracle),
        ))
    }
}
