//! Content-type oracles and the MIME-to-extension lookup.
//!
//! The oracle gives a first, advisory answer from the header bytes alone. Its
//! answer decides which branch of the classifier runs: ZIP family goes to
//! archive inspection, generic binary goes to the signature registry, anything
//! else is translated through an [`ExtensionLookup`].

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Sentinel MIME value for "the oracle could not answer".
pub const UNKNOWN_MIME: &str = "unknown/unknown";

/// MIME values that mean "some ZIP container".
pub const ZIP_FAMILY_MIMES: &[&str] = &[
    "application/x-zip-compressed",
    "application/zip",
    "application/x-zip",
];

/// MIME values that carry no format information beyond "binary".
pub const GENERIC_BINARY_MIMES: &[&str] = &[
    "application/octet-stream",
    "application/x-ole-storage",
    "application/cdfv2",
];

#[must_use]
pub fn is_zip_family(mime: &str) -> bool {
    ZIP_FAMILY_MIMES.contains(&mime)
}

#[must_use]
pub fn is_generic_binary(mime: &str) -> bool {
    GENERIC_BINARY_MIMES.contains(&mime)
}

/// Best-effort content-type identification from raw header bytes.
///
/// Implementations never fail: internal errors are reported as
/// [`UNKNOWN_MIME`]. The returned value is lowercase.
pub trait ContentTypeOracle: Send + Sync {
    fn content_type(&self, header: &[u8]) -> String;

    /// Short name for logs and `wcff classify` output.
    fn name(&self) -> &'static str;
}

impl<T: ContentTypeOracle + ?Sized> ContentTypeOracle for Arc<T> {
    fn content_type(&self, header: &[u8]) -> String {
        (**self).content_type(header)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// ──────────────────── built-in sniffer ────────────────────

/// Self-contained sniffer modelled on what a desktop MIME sniffer reports.
///
/// It recognizes a fixed set of well-known formats and some text. It never
/// reports OLE or archive sub-types: those come back as
/// `application/octet-stream` or `application/x-zip-compressed` so the
/// registry and the container inspector get to refine them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SniffingOracle;

impl SniffingOracle {
    #[must_use]
    pub fn sniff(header: &[u8]) -> &'static str {
        if header.is_empty() {
            return UNKNOWN_MIME;
        }

        if header.starts_with(b"PK\x03\x04") {
            return "application/x-zip-compressed";
        }
        if header.starts_with(b"%PDF") {
            return "application/pdf";
        }
        if header.starts_with(b"\xFF\xD8\xFF") {
            return "image/pjpeg";
        }
        if header.starts_with(b"\x89PNG\r\n\x1A\n") {
            return "image/x-png";
        }
        if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
            return "image/gif";
        }
        if is_bitmap(header) {
            return "image/bmp";
        }
        if header.starts_with(b"II*\x00") || header.starts_with(b"MM\x00*") {
            return "image/tiff";
        }
        if header.starts_with(b"{\\rtf") {
            return "text/richtext";
        }
        if header.starts_with(b"RIFF") {
            match header.get(8..12) {
                Some(b"WAVE") => return "audio/wav",
                Some(b"AVI ") => return "video/avi",
                _ => {}
            }
        }
        if header.starts_with(b"%!") {
            return "application/postscript";
        }
        if header.starts_with(b"\x1F\x8B") {
            return "application/x-gzip";
        }
        if header.starts_with(b"\xCA\xFE\xBA\xBE") {
            return "application/java";
        }
        if header.starts_with(b"MZ") {
            return "application/x-msdownload";
        }

        sniff_text(header).unwrap_or("application/octet-stream")
    }
}

impl ContentTypeOracle for SniffingOracle {
    fn content_type(&self, header: &[u8]) -> String {
        Self::sniff(header).to_string()
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}

/// `BM`, then two reserved 16-bit fields that must be zero.
fn is_bitmap(header: &[u8]) -> bool {
    header.starts_with(b"BM") && header.get(6..10).is_some_and(|r| r.iter().all(|&b| b == 0))
}

fn sniff_text(header: &[u8]) -> Option<&'static str> {
    if !looks_textual(header) {
        return None;
    }

    let trimmed = header.trim_ascii_start();
    let starts_with_ci = |prefix: &[u8]| {
        trimmed
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    };

    if starts_with_ci(b"<?xml") {
        return Some("text/xml");
    }
    let markup: [&[u8]; 4] = [b"<!doctype html", b"<html", b"<head", b"<body"];
    if markup.iter().any(|prefix| starts_with_ci(prefix)) {
        return Some("text/html");
    }
    Some("text/plain")
}

/// UTF-8 (a character cut off by the header boundary is fine) with no
/// control bytes other than common whitespace.
fn looks_textual(header: &[u8]) -> bool {
    let valid_utf8 = match std::str::from_utf8(header) {
        Ok(_) => true,
        Err(err) => err.error_len().is_none(),
    };
    valid_utf8
        && header
            .iter()
            .all(|&b| b >= 0x20 || matches!(b, b'\t' | b'\n' | b'\r' | 0x0C))
}

// ──────────────────── `file` utility ────────────────────

/// Platform-backed oracle: pipes the header into `file --brief --mime-type -`.
#[derive(Debug, Clone)]
pub struct FileCommandOracle {
    program: PathBuf,
}

impl Default for FileCommandOracle {
    fn default() -> Self {
        Self {
            program: PathBuf::from("file"),
        }
    }
}

impl FileCommandOracle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `file` binary.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether the program runs and exits successfully.
    #[must_use]
    pub fn probe(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }

    fn try_content_type(&self, header: &[u8]) -> std::io::Result<String> {
        let mut child = Command::new(&self.program)
            .args(["--brief", "--mime-type", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // `file` may stop reading early; a broken pipe here is not an error.
            let _ = stdin.write_all(header);
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            )));
        }

        let mime = String::from_utf8_lossy(&output.stdout)
            .trim()
            .to_ascii_lowercase();
        if mime.is_empty() || !mime.contains('/') {
            return Err(std::io::Error::other(format!(
                "unexpected output from {}: {mime:?}",
                self.program.display()
            )));
        }
        Ok(mime)
    }
}

impl ContentTypeOracle for FileCommandOracle {
    fn content_type(&self, header: &[u8]) -> String {
        self.try_content_type(header)
            .unwrap_or_else(|_| UNKNOWN_MIME.to_string())
    }

    fn name(&self) -> &'static str {
        "file-command"
    }
}

// ──────────────────── backend selection ────────────────────

/// Which oracle the classifier uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OracleBackend {
    /// `file-command` when the `file` utility answers a probe, else `builtin`.
    #[default]
    Auto,
    Builtin,
    FileCommand,
}

impl OracleBackend {
    /// Instantiate the oracle. `Auto` probes the system once, here.
    #[must_use]
    pub fn build(self) -> Arc<dyn ContentTypeOracle> {
        match self {
            Self::Builtin => Arc::new(SniffingOracle),
            Self::FileCommand => Arc::new(FileCommandOracle::new()),
            Self::Auto => {
                let command = FileCommandOracle::new();
                if command.probe() {
                    Arc::new(command)
                } else {
                    Arc::new(SniffingOracle)
                }
            }
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Builtin => "builtin",
            Self::FileCommand => "file-command",
        }
    }
}

impl fmt::Display for OracleBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OracleBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "builtin" => Ok(Self::Builtin),
            "file-command" | "file" => Ok(Self::FileCommand),
            other => Err(format!(
                "unknown oracle {other:?} (expected auto, builtin or file-command)"
            )),
        }
    }
}

// ──────────────────── MIME -> extension ────────────────────

/// Exact-match lookup keyed by lowercase MIME type.
pub trait ExtensionLookup: Send + Sync {
    fn extension_for(&self, mime: &str) -> Option<&str>;
}

/// Common MIME types and the extension each one implies.
const STATIC_MIME_TABLE: &[(&str, &str)] = &[
    ("text/plain", ".txt"),
    ("text/html", ".html"),
    ("text/xml", ".xml"),
    ("application/xml", ".xml"),
    ("text/csv", ".csv"),
    ("text/richtext", ".rtf"),
    ("text/rtf", ".rtf"),
    ("application/rtf", ".rtf"),
    ("application/json", ".json"),
    ("application/pdf", ".pdf"),
    ("application/postscript", ".ps"),
    ("image/jpeg", ".jpg"),
    ("image/pjpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/x-png", ".png"),
    ("image/gif", ".gif"),
    ("image/bmp", ".bmp"),
    ("image/x-ms-bmp", ".bmp"),
    ("image/tiff", ".tif"),
    ("image/x-icon", ".ico"),
    ("image/vnd.microsoft.icon", ".ico"),
    ("image/svg+xml", ".svg"),
    ("image/webp", ".webp"),
    ("image/vnd.adobe.photoshop", ".psd"),
    ("audio/wav", ".wav"),
    ("audio/x-wav", ".wav"),
    ("audio/mpeg", ".mp3"),
    ("audio/x-ms-wma", ".wma"),
    ("video/avi", ".avi"),
    ("video/x-msvideo", ".avi"),
    ("video/mp4", ".mp4"),
    ("application/x-gzip", ".gz"),
    ("application/gzip", ".gz"),
    ("application/x-tar", ".tar"),
    ("application/x-7z-compressed", ".7z"),
    ("application/x-rar-compressed", ".rar"),
    ("application/x-rar", ".rar"),
    ("application/vnd.rar", ".rar"),
    ("application/java", ".class"),
    ("application/x-java-applet", ".class"),
    ("application/java-archive", ".jar"),
    ("application/x-msdownload", ".exe"),
    ("application/x-dosexec", ".exe"),
    ("application/msword", ".doc"),
    ("application/vnd.ms-excel", ".xls"),
    ("application/vnd.ms-powerpoint", ".ppt"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xlsx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".pptx",
    ),
    ("application/epub+zip", ".epub"),
];

/// The built-in table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticMimeTable;

impl ExtensionLookup for StaticMimeTable {
    fn extension_for(&self, mime: &str) -> Option<&str> {
        STATIC_MIME_TABLE
            .iter()
            .find(|(key, _)| *key == mime)
            .map(|&(_, ext)| ext)
    }
}

/// Configured overrides layered over [`StaticMimeTable`].
#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    overrides: BTreeMap<String, String>,
}

impl MimeTable {
    /// Keys are lowercased; later duplicates win.
    #[must_use]
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        Self {
            overrides: overrides
                .iter()
                .map(|(mime, ext)| (mime.trim().to_ascii_lowercase(), ext.clone()))
                .collect(),
        }
    }
}

impl ExtensionLookup for MimeTable {
    fn extension_for(&self, mime: &str) -> Option<&str> {
        self.overrides
            .get(mime)
            .map(String::as_str)
            .or_else(|| StaticMimeTable.extension_for(mime))
    }
}
