//! Magic-number signature table keyed on the hex-encoded file header.
//!
//! Lookup is first-registered-wins. Several built-in prefixes overlap (the
//! EPUB prefix is a longer form of the ZIP prefix, `BM` is short enough to
//! collide with almost anything), so the order of [`BUILTIN_SIGNATURES`] is
//! part of the classification contract and must not be re-sorted.

use std::borrow::Cow;

use regex::Regex;

use crate::core::config::{CustomSignatureConfig, validate_extension};
use crate::core::errors::{Result, WcffError};

/// Extension reported when the header carries an OLE compound-document
/// signature whose sub-type has not been resolved yet.
pub const OFFICE_DOCUMENT_EXTENSION: &str = ".officeDocument";

/// Built-in `(extension, uppercase hex prefix)` pairs in registration order.
pub const BUILTIN_SIGNATURES: &[(&str, &str)] = &[
    (".7z", "377ABCAF271C"),
    (OFFICE_DOCUMENT_EXTENSION, "D0CF11E0A1B11AE1"),
    (".dpx", "53445058"),
    (".jpg", "4A464946"),
    (".pdf", "25504446"),
    (".png", "89504E470D0A1A0A"),
    (".ps", "25215053"),
    (".psd", "38425053"),
    (".rar", "526172211A0700"),
    (".tif", "49492A00"),
    (".vsdx", "504B0708"),
    (".wav", "52494646"),
    (".wma", "A6D900AA0062CE6C"),
    (".epub", "504B03040A000200"),
    (".zip", "504B0304"),
    (".rtf", "7B5C72746631"),
    (".bmp", "424D"),
];

/// How a signature is tested against the hex-encoded header.
#[derive(Debug, Clone)]
pub enum SignaturePattern {
    /// Uppercase hex that must open the header.
    Prefix(Cow<'static, str>),
    /// Arbitrary regex over the uppercase hex header; anchoring is up to the author.
    Regex(Regex),
}

impl SignaturePattern {
    fn is_match(&self, hex_header: &str) -> bool {
        match self {
            Self::Prefix(prefix) => hex_header.starts_with(prefix.as_ref()),
            Self::Regex(re) => re.is_match(hex_header),
        }
    }
}

/// One entry of the registry.
#[derive(Debug, Clone)]
pub struct FileSignature {
    extension: Cow<'static, str>,
    pattern: SignaturePattern,
    /// Optional secondary regex that must also match somewhere in the header.
    marker: Option<Regex>,
}

impl FileSignature {
    /// A built-in prefix signature. Both arguments are compile-time constants.
    #[must_use]
    pub const fn prefix(extension: &'static str, hex_prefix: &'static str) -> Self {
        Self {
            extension: Cow::Borrowed(extension),
            pattern: SignaturePattern::Prefix(Cow::Borrowed(hex_prefix)),
            marker: None,
        }
    }

    /// A user-supplied signature with regex pattern and optional deep marker.
    pub fn custom(extension: &str, pattern: &str, marker: Option<&str>) -> Result<Self> {
        let invalid = |details: String| WcffError::InvalidSignature {
            extension: extension.to_string(),
            details,
        };

        validate_extension(extension).map_err(invalid)?;
        let pattern = Regex::new(pattern)
            .map_err(|err| invalid(format!("bad pattern {pattern:?}: {err}")))?;
        let marker = marker
            .map(|m| Regex::new(m).map_err(|err| invalid(format!("bad marker {m:?}: {err}"))))
            .transpose()?;

        Ok(Self {
            extension: Cow::Owned(extension.to_string()),
            pattern: SignaturePattern::Regex(pattern),
            marker,
        })
    }

    /// Candidate extension, always with its leading dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Test against an uppercase hex-encoded header.
    #[must_use]
    pub fn matches_hex(&self, hex_header: &str) -> bool {
        self.pattern.is_match(hex_header)
            && self
                .marker
                .as_ref()
                .is_none_or(|marker| marker.is_match(hex_header))
    }
}

impl TryFrom<&CustomSignatureConfig> for FileSignature {
    type Error = WcffError;

    fn try_from(value: &CustomSignatureConfig) -> Result<Self> {
        Self::custom(&value.extension, &value.pattern, value.marker.as_deref())
    }
}

/// Ordered, read-only signature table.
///
/// Build once at startup and share by reference (or `Arc`) between
/// classifiers; matching takes `&self` only.
#[derive(Debug, Clone)]
pub struct SignatureRegistry {
    signatures: Vec<FileSignature>,
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SignatureRegistry {
    /// The built-in table, in its load-bearing order.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            signatures: BUILTIN_SIGNATURES
                .iter()
                .map(|&(ext, prefix)| FileSignature::prefix(ext, prefix))
                .collect(),
        }
    }

    /// Append user signatures after the built-ins, so built-ins keep priority.
    pub fn with_custom(mut self, custom: &[CustomSignatureConfig]) -> Result<Self> {
        for entry in custom {
            self.signatures.push(FileSignature::try_from(entry)?);
        }
        Ok(self)
    }

    /// Append one signature at the lowest priority.
    pub fn register(&mut self, signature: FileSignature) {
        self.signatures.push(signature);
    }

    /// First extension whose signature matches the header, if any.
    ///
    /// `header` is the first (up to) 256 bytes of the file.
    #[must_use]
    pub fn match_header(&self, header: &[u8]) -> Option<&str> {
        self.match_hex(&hex::encode_upper(header))
    }

    /// Same as [`match_header`](Self::match_header) for an already-encoded header.
    #[must_use]
    pub fn match_hex(&self, hex_header: &str) -> Option<&str> {
        self.signatures
            .iter()
            .find(|sig| sig.matches_hex(hex_header))
            .map(FileSignature::extension)
    }

    /// Registered signatures in lookup order.
    pub fn signatures(&self) -> impl Iterator<Item = &FileSignature> {
        self.signatures.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}
