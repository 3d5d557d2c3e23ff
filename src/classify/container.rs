//! Refines generic container matches into concrete document types.
//!
//! Two containers are ambiguous from their header alone: ZIP (OOXML, EPUB
//! and JAR are all ZIP) and OLE2 compound files (legacy Word, Excel and
//! PowerPoint share one header). Both resolvers degrade to the unrefined
//! extension when the container cannot be parsed.

use std::io::{Read, Seek};

use memchr::memmem;

use crate::classify::registry::OFFICE_DOCUMENT_EXTENSION;
use crate::core::errors::{Result, WcffError};

/// Extension for a ZIP container with no more specific signal.
pub const ZIP_EXTENSION: &str = ".zip";

/// Entry-name rule: the first rule with any matching entry decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryRule {
    Prefix(&'static str),
    Suffix(&'static str),
}

impl EntryRule {
    fn matches(self, name: &str) -> bool {
        // ZIP entry names are compared ASCII case-insensitively.
        match self {
            Self::Prefix(prefix) => name
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
            Self::Suffix(suffix) => name
                .len()
                .checked_sub(suffix.len())
                .and_then(|start| name.get(start..))
                .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix)),
        }
    }
}

/// Archive rules in priority order.
const ARCHIVE_RULES: &[(EntryRule, &str)] = &[
    (EntryRule::Prefix("word/"), ".docx"),
    (EntryRule::Prefix("xl/"), ".xlsx"),
    (EntryRule::Prefix("ppt/"), ".pptx"),
    (EntryRule::Suffix("content.opf"), ".epub"),
    (EntryRule::Prefix("META-INF/"), ".jar"),
];

/// Compound-document markers (uppercase hex of the ASCII text) in priority order.
pub const COMPOUND_MARKERS: &[(&str, &str)] = &[
    // "Word.Document."
    ("576F72642E446F63756D656E742E", ".doc"),
    // "Microsoft Excel\0"
    ("4D6963726F736F667420457863656C00", ".xls"),
    // "MS PowerPoint"
    ("4D5320506F776572506F696E74", ".ppt"),
];

/// Stateless resolvers for ZIP and OLE2 containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerInspector;

impl ContainerInspector {
    /// Resolve a ZIP container to `.docx`/`.xlsx`/`.pptx`/`.epub`/`.jar`/`.zip`.
    ///
    /// The reader is repositioned freely; ZIP is parsed from its central
    /// directory at the end of the stream. Unparseable input yields `.zip`.
    pub fn resolve_archive<R: Read + Seek>(&self, reader: R) -> &'static str {
        self.try_resolve_archive(reader).unwrap_or(ZIP_EXTENSION)
    }

    /// Fallible form of [`resolve_archive`](Self::resolve_archive).
    pub fn try_resolve_archive<R: Read + Seek>(&self, reader: R) -> Result<&'static str> {
        let archive = zip::ZipArchive::new(reader)?;
        let names: Vec<&str> = archive.file_names().collect();
        Ok(resolve_entry_names(&names))
    }

    /// Resolve an OLE2 compound document to `.doc`/`.xls`/`.ppt`, or the
    /// generic office-document extension.
    ///
    /// Reads the rest of the stream from its current position. A read failure
    /// midway yields the generic extension.
    pub fn resolve_compound_document<R: Read>(&self, reader: R) -> &'static str {
        self.try_resolve_compound_document(reader)
            .unwrap_or(OFFICE_DOCUMENT_EXTENSION)
    }

    /// Fallible form of [`resolve_compound_document`](Self::resolve_compound_document).
    pub fn try_resolve_compound_document<R: Read>(&self, mut reader: R) -> Result<&'static str> {
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .map_err(|source| WcffError::io("<compound document stream>", source))?;
        Ok(resolve_compound_hex(&hex::encode_upper(&content)))
    }
}

/// Apply the archive rules to a list of entry names.
#[must_use]
pub fn resolve_entry_names<S: AsRef<str>>(names: &[S]) -> &'static str {
    ARCHIVE_RULES
        .iter()
        .find(|(rule, _)| names.iter().any(|name| rule.matches(name.as_ref())))
        .map_or(ZIP_EXTENSION, |&(_, ext)| ext)
}

/// Apply the compound-document markers to hex-encoded content.
///
/// Matching is on the hex text, so a marker may also hit at an odd nibble
/// offset.
#[must_use]
pub fn resolve_compound_hex(hex_content: &str) -> &'static str {
    COMPOUND_MARKERS
        .iter()
        .find(|(marker, _)| memmem::find(hex_content.as_bytes(), marker.as_bytes()).is_some())
        .map_or(OFFICE_DOCUMENT_EXTENSION, |&(_, ext)| ext)
}
