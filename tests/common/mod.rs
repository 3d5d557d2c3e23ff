#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use wannacry_file_finder::classify::classifier::TypeClassifier;
use wannacry_file_finder::classify::oracle::{ContentTypeOracle, SniffingOracle, StaticMimeTable};
use wannacry_file_finder::classify::registry::SignatureRegistry;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_wcff") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "wcff.exe" } else { "wcff" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve wcff binary path for integration test"),
    }
}

/// Run the `wcff` binary; stdout/stderr are kept in a per-case log file.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("wcff-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("WCFF_OUTPUT_FORMAT", "json")
        .env_remove("WCFF_DISCOVERY_ROOTS")
        .env_remove("WCFF_JSONL_LOG")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute wcff command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Parse every stdout line as JSON.
pub fn json_lines(stdout: &str) -> Vec<serde_json::Value> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line is JSON"))
        .collect()
}

/// Oracle that always answers with one fixed MIME type.
#[derive(Debug, Clone)]
pub struct FixedOracle(pub &'static str);

impl ContentTypeOracle for FixedOracle {
    fn content_type(&self, _header: &[u8]) -> String {
        self.0.to_string()
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Classifier backed by a fixed oracle, independent of the host.
pub fn classifier_with(mime: &'static str) -> TypeClassifier {
    TypeClassifier::new(
        Arc::new(SignatureRegistry::builtin()),
        Arc::new(FixedOracle(mime)),
        Arc::new(StaticMimeTable),
    )
}

/// Classifier using the in-process sniffer.
pub fn sniffing_classifier() -> TypeClassifier {
    TypeClassifier::new(
        Arc::new(SignatureRegistry::builtin()),
        Arc::new(SniffingOracle),
        Arc::new(StaticMimeTable),
    )
}

pub fn zip_bytes(entries: &[&str]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for name in entries {
            writer.start_file(*name, options).expect("start zip entry");
            writer.write_all(b"payload").expect("write zip entry");
        }
        writer.finish().expect("finish zip");
    }
    buf.into_inner()
}

pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n%%EOF\n";

/// OLE2 header followed by a stream carrying the given application marker.
pub fn compound_bytes(marker: &str) -> Vec<u8> {
    let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    bytes.extend(std::iter::repeat_n(0u8, 504));
    bytes.extend_from_slice(marker.as_bytes());
    bytes.extend(std::iter::repeat_n(0u8, 64));
    bytes
}

pub fn write_file(path: &Path, content: &[u8]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write fixture");
    path.to_path_buf()
}
