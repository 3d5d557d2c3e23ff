//! Integration tests: discovery, classification and recovery end to end,
//! plus CLI smoke tests against the built binary.

mod common;

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use serde_json::Value;
use wannacry_file_finder::classify::classifier::ClassificationSource;
use wannacry_file_finder::core::config::DiscoveryConfig;
use wannacry_file_finder::logger::activity::{ActivityLoggerConfig, spawn_logger};
use wannacry_file_finder::recovery::copier::RecoveryCopier;
use wannacry_file_finder::scanner::pattern::FilePattern;
use wannacry_file_finder::scanner::walker::{FileDiscoverer, discover};

use common::{
    PDF_BYTES, classifier_with, compound_bytes, json_lines, run_cli_case, sniffing_classifier,
    write_file, zip_bytes,
};

fn wncryt() -> FilePattern {
    FilePattern::new("*.WNCRYT", true).unwrap()
}

// ──────────────────── discovery ────────────────────

#[test]
fn discovery_across_roots_yields_each_match_once_and_terminates() {
    let tmp = tempfile::tempdir().unwrap();
    let first = tmp.path().join("first");
    let second = tmp.path().join("second");
    write_file(&first.join("1.WNCRYT"), b"a");
    write_file(&first.join("nested/deeper/2.wncryt"), b"b");
    write_file(&second.join("3.WNCRYT"), b"c");
    write_file(&second.join("notes.txt"), b"not a leftover");
    let missing = tmp.path().join("does-not-exist");

    let roots = vec![first.clone(), missing, second.clone()];
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let found: Vec<PathBuf> = discover(&roots, &wncryt()).collect();
        tx.send(found).unwrap();
    });

    let found = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("discovery did not terminate");
    let unique: HashSet<PathBuf> = found.iter().cloned().collect();
    assert_eq!(found.len(), 3, "{found:?}");
    assert_eq!(unique.len(), 3);
    assert!(unique.contains(&first.join("1.WNCRYT")));
    assert!(unique.contains(&first.join("nested/deeper/2.wncryt")));
    assert!(unique.contains(&second.join("3.WNCRYT")));
}

/// Lock `dir` with mode 000. Returns `false` (and restores the mode) when the
/// process can read it anyway, e.g. when running with root privileges.
#[cfg(unix)]
fn lock_dir(dir: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(dir, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(dir).is_ok() {
        unlock_dir(dir);
        eprintln!("skipping: permission bits are not enforced for this user");
        return false;
    }
    true
}

#[cfg(unix)]
fn unlock_dir(dir: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
#[cfg(unix)]
fn unreadable_directory_is_skipped_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("root");
    write_file(&root.join("ok.WNCRYT"), b"x");
    let locked = root.join("locked");
    write_file(&locked.join("hidden.WNCRYT"), b"y");
    if !lock_dir(&locked) {
        return;
    }

    let mut discovery = discover(&[root.clone()], &wncryt());
    let stats = discovery.stats();
    let found: Vec<PathBuf> = discovery.by_ref().collect();

    unlock_dir(&locked);
    assert_eq!(found, vec![root.join("ok.WNCRYT")]);
    assert_eq!(stats.snapshot().directories_skipped, 1);
}

#[test]
#[cfg(unix)]
fn unreadable_root_is_skipped_and_discovery_terminates() {
    let tmp = tempfile::tempdir().unwrap();
    let open = tmp.path().join("open");
    write_file(&open.join("1.WNCRYT"), b"a");
    write_file(&open.join("a/2.WNCRYT"), b"b");
    write_file(&open.join("a/b/3.WNCRYT"), b"c");
    let locked = tmp.path().join("locked");
    write_file(&locked.join("4.WNCRYT"), b"d");
    if !lock_dir(&locked) {
        return;
    }

    let roots = vec![locked.clone(), open.clone()];
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let found: Vec<PathBuf> = discover(&roots, &wncryt()).collect();
        tx.send(found).unwrap();
    });
    let found = rx.recv_timeout(Duration::from_secs(10));
    unlock_dir(&locked);

    let found: HashSet<PathBuf> = found
        .expect("discovery did not terminate")
        .into_iter()
        .collect();
    let expected: HashSet<PathBuf> = ["1.WNCRYT", "a/2.WNCRYT", "a/b/3.WNCRYT"]
        .iter()
        .map(|name| open.join(name))
        .collect();
    assert_eq!(found, expected);
}

#[test]
fn discoverer_from_config_honors_pattern_and_reports_stats() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(&tmp.path().join("a.WNCRYT"), b"a");
    write_file(&tmp.path().join("b.tmp"), b"b");
    write_file(&tmp.path().join("sub/c.tmp"), b"c");

    let config = DiscoveryConfig {
        root_paths: vec![tmp.path().to_path_buf()],
        pattern: "*.tmp".to_string(),
        ..DiscoveryConfig::default()
    };
    let discoverer = FileDiscoverer::from_config(&config).unwrap();
    let mut discovery = discoverer.discover();
    let stats = discovery.stats();
    let found: HashSet<PathBuf> = discovery.by_ref().collect();

    assert_eq!(found.len(), 2);
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.files_matched, 2);
    assert!(snapshot.directories_visited >= 2);
    assert_eq!(discovery.active_tasks(), 0);
}

// ──────────────────── classification ────────────────────

#[test]
fn empty_file_classifies_as_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(&tmp.path().join("0.WNCRYT"), b"");
    let result = sniffing_classifier().classify(&path);
    assert_eq!(result.extension, ".empty");
}

#[test]
fn pdf_with_generic_oracle_uses_header_table() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(&tmp.path().join("1.WNCRYT"), PDF_BYTES);
    let result = classifier_with("application/octet-stream").classify(&path);
    assert_eq!(result.extension, ".pdf");
    assert_eq!(result.source, ClassificationSource::KnownHeader);
}

#[test]
fn pdf_with_sniffing_oracle_uses_mime_table() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(&tmp.path().join("1.WNCRYT"), PDF_BYTES);
    let result = sniffing_classifier().classify(&path);
    assert_eq!(result.extension, ".pdf");
    assert_eq!(result.source, ClassificationSource::SystemOracle);
}

#[test]
fn zip_containers_are_refined_by_entry_names() {
    let tmp = tempfile::tempdir().unwrap();
    let cases: [(&[&str], &str); 5] = [
        (&["[Content_Types].xml", "word/document.xml"], ".docx"),
        (&["[Content_Types].xml", "xl/workbook.xml"], ".xlsx"),
        (&["[Content_Types].xml", "ppt/presentation.xml"], ".pptx"),
        (&["META-INF/MANIFEST.MF", "com/example/Main.class"], ".jar"),
        (&["readme.txt", "data/values.csv"], ".zip"),
    ];

    for classifier in [sniffing_classifier(), classifier_with("application/zip")] {
        for (i, (entries, expected)) in cases.iter().enumerate() {
            let path = write_file(&tmp.path().join(format!("{i}.WNCRYT")), &zip_bytes(entries));
            let result = classifier.classify(&path);
            assert_eq!(result.extension, *expected, "{entries:?}");
            assert_eq!(result.source, ClassificationSource::ContainerInspection);
        }
    }
}

#[test]
fn corrupt_zip_falls_back_to_zip() {
    let tmp = tempfile::tempdir().unwrap();
    let mut bytes = b"PK\x03\x04".to_vec();
    bytes.extend(std::iter::repeat_n(0xEEu8, 300));
    let path = write_file(&tmp.path().join("z.WNCRYT"), &bytes);
    assert_eq!(sniffing_classifier().classify(&path).extension, ".zip");
}

#[test]
fn compound_documents_resolve_by_marker() {
    let tmp = tempfile::tempdir().unwrap();
    let cases = [
        ("Word.Document.8", ".doc"),
        ("Microsoft Excel\0", ".xls"),
        ("MS PowerPoint", ".ppt"),
        ("SummaryInformation", ".officeDocument"),
    ];
    let classifier = sniffing_classifier();
    for (i, (marker, expected)) in cases.iter().enumerate() {
        let path = write_file(
            &tmp.path().join(format!("{i}.WNCRYT")),
            &compound_bytes(marker),
        );
        assert_eq!(classifier.classify(&path).extension, *expected, "{marker:?}");
    }
}

#[test]
fn unknown_binary_falls_back_to_txt() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(&tmp.path().join("x.WNCRYT"), &[0x00, 0x13, 0x37, 0xFE, 0x01]);
    let result = sniffing_classifier().classify(&path);
    assert_eq!(result.extension, ".txt");
    assert_eq!(result.source, ClassificationSource::Fallback);
}

#[test]
fn missing_file_classifies_as_fallback() {
    let tmp = tempfile::tempdir().unwrap();
    let result = sniffing_classifier().classify(&tmp.path().join("gone.WNCRYT"));
    assert_eq!(result.extension, ".txt");
}

#[test]
fn concurrent_classification_matches_sequential() {
    let tmp = tempfile::tempdir().unwrap();
    let fixtures: Vec<Vec<u8>> = vec![
        PDF_BYTES.to_vec(),
        zip_bytes(&["word/document.xml"]),
        zip_bytes(&["META-INF/MANIFEST.MF"]),
        compound_bytes("Word.Document.8"),
        b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec(),
        b"plain words only".to_vec(),
        Vec::new(),
    ];
    let paths: Vec<PathBuf> = (0..28)
        .map(|i| {
            write_file(
                &tmp.path().join(format!("{i}.WNCRYT")),
                &fixtures[i % fixtures.len()],
            )
        })
        .collect();

    let classifier = sniffing_classifier();
    let sequential: Vec<String> = paths
        .iter()
        .map(|p| classifier.classify(p).extension)
        .collect();

    let concurrent: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|p| {
                let classifier = classifier.clone();
                scope.spawn(move || classifier.classify(p).extension)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(sequential, concurrent);
}

// ──────────────────── recovery ────────────────────

#[test]
fn recovery_pipeline_copies_with_classified_extensions() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("victim");
    write_file(&root.join("1.WNCRYT"), PDF_BYTES);
    write_file(&root.join("docs/2.WNCRYT"), &zip_bytes(&["word/document.xml"]));
    write_file(&root.join("docs/3.WNCRYT"), b"");
    let dest = tmp.path().join("out");

    let copier = RecoveryCopier::new(sniffing_classifier()).with_parallelism(3);
    let report = copier.recover_stream(&dest, false, discover(&[root], &wncryt()));

    assert_eq!(report.copied, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(fs::read(dest.join("1.pdf")).unwrap(), PDF_BYTES);
    assert!(dest.join("2.docx").is_file());
    assert!(dest.join("3.empty").is_file());
}

#[test]
fn overwrite_false_keeps_existing_destination() {
    let tmp = tempfile::tempdir().unwrap();
    let source = write_file(&tmp.path().join("in/1.WNCRYT"), PDF_BYTES);
    let dest = tmp.path().join("out");
    write_file(&dest.join("1.pdf"), b"already here");

    let copier = RecoveryCopier::new(sniffing_classifier());
    let report = copier.recover(&dest, false, &[source]);

    assert_eq!(report.copied, 0);
    assert_eq!(report.skipped_existing, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(fs::read(dest.join("1.pdf")).unwrap(), b"already here");
}

#[test]
fn overwrite_true_replaces_existing_destination() {
    let tmp = tempfile::tempdir().unwrap();
    let source = write_file(&tmp.path().join("in/1.WNCRYT"), PDF_BYTES);
    let dest = tmp.path().join("out");
    write_file(&dest.join("1.pdf"), b"an older, longer file that must be truncated away");

    let copier = RecoveryCopier::new(sniffing_classifier());
    let report = copier.recover(&dest, true, &[source]);

    assert_eq!(report.copied, 1);
    assert_eq!(fs::read(dest.join("1.pdf")).unwrap(), PDF_BYTES);
}

#[test]
fn in_place_recovery_with_overwrite_never_destroys_sources() {
    let tmp = tempfile::tempdir().unwrap();
    let notes = write_file(&tmp.path().join("notes.txt"), b"irreplaceable plain text");
    let pattern = FilePattern::new("*.txt", true).unwrap();

    let copier = RecoveryCopier::new(sniffing_classifier());
    let sources = discover(&[tmp.path().to_path_buf()], &pattern);
    let report = copier.recover_stream(tmp.path(), true, sources);

    assert_eq!(report.copied, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors[0].error_code, "WCFF-3006");
    assert_eq!(fs::read(&notes).unwrap(), b"irreplaceable plain text");
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
}

#[test]
fn vanished_source_is_counted_and_batch_continues() {
    let tmp = tempfile::tempdir().unwrap();
    let present = write_file(&tmp.path().join("in/1.WNCRYT"), PDF_BYTES);
    let vanished = tmp.path().join("in/2.WNCRYT");
    let dest = tmp.path().join("out");

    let copier = RecoveryCopier::new(sniffing_classifier()).with_parallelism(2);
    let report = copier.recover(&dest, false, &[vanished.clone(), present]);

    assert_eq!(report.copied, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors[0].path, vanished);
    assert!(!dest.join("2.txt").exists());
}

#[test]
fn recovery_events_reach_the_activity_log() {
    let tmp = tempfile::tempdir().unwrap();
    let source = write_file(&tmp.path().join("in/1.WNCRYT"), PDF_BYTES);
    let log_path = tmp.path().join("activity.jsonl");
    let (logger, join) = spawn_logger(ActivityLoggerConfig::new(Some(log_path.clone()))).unwrap();

    let copier = RecoveryCopier::new(sniffing_classifier()).with_logger(logger.clone());
    let report = copier.recover(&tmp.path().join("out"), false, &[source]);
    logger.shutdown().unwrap();
    join.join().unwrap();

    assert_eq!(report.copied, 1);
    let events: Vec<Value> = fs::read_to_string(&log_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let kinds: Vec<&str> = events.iter().filter_map(|e| e["event"].as_str()).collect();
    assert!(kinds.contains(&"file_recovered"), "{kinds:?}");
    assert!(kinds.contains(&"recovery_complete"), "{kinds:?}");
    assert_eq!(kinds.last(), Some(&"shutdown"));
}

// ──────────────────── CLI ────────────────────

fn write_config(dir: &std::path::Path) -> PathBuf {
    let log = dir.join("cli-activity.jsonl");
    let config = format!(
        "[classifier]\noracle = \"builtin\"\n\n[paths]\njsonl_log = {:?}\n",
        log.to_string_lossy()
    );
    write_file(&dir.join("wcff.toml"), config.as_bytes())
}

#[test]
fn help_command_prints_usage() {
    let result = run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: wcff [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn find_command_lists_matches_as_json() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    let root = tmp.path().join("victim");
    write_file(&root.join("a.WNCRYT"), b"a");
    write_file(&root.join("sub/b.WNCRYT"), b"b");

    let result = run_cli_case(
        "find_command_lists_matches_as_json",
        &[
            "--config",
            &config.to_string_lossy(),
            "find",
            "--root",
            &root.to_string_lossy(),
        ],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let lines = json_lines(&result.stdout);
    let summary = lines.last().unwrap();
    assert_eq!(summary["command"], "find");
    assert_eq!(summary["files_found"], 2);
    assert_eq!(lines.iter().filter(|l| l.get("path").is_some()).count(), 2);
}

#[test]
fn recover_command_copies_and_summarizes() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    let root = tmp.path().join("victim");
    write_file(&root.join("1.WNCRYT"), PDF_BYTES);
    let dest = tmp.path().join("out");

    let result = run_cli_case(
        "recover_command_copies_and_summarizes",
        &[
            "--config",
            &config.to_string_lossy(),
            "recover",
            "--root",
            &root.to_string_lossy(),
            "--dest",
            &dest.to_string_lossy(),
            "--jobs",
            "2",
        ],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let summary = json_lines(&result.stdout).pop().unwrap();
    assert_eq!(summary["command"], "recover");
    assert_eq!(summary["copied"], 1);
    assert_eq!(summary["failed"], 0);
    assert!(dest.join("1.pdf").is_file());
    assert!(tmp.path().join("cli-activity.jsonl").is_file());
}

#[test]
fn missing_explicit_config_is_a_user_error() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("nope.toml");
    let result = run_cli_case(
        "missing_explicit_config_is_a_user_error",
        &["--config", &missing.to_string_lossy(), "config", "show"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
}

#[test]
fn invalid_pattern_is_a_user_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = write_config(tmp.path());
    let result = run_cli_case(
        "invalid_pattern_is_a_user_error",
        &[
            "--config",
            &config.to_string_lossy(),
            "find",
            "--root",
            &tmp.path().to_string_lossy(),
            "--pattern",
            "dir/*.WNCRYT",
        ],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
}
