/// End-to-end tests of the shell state and commands against real on-disk
/// archives.
use arcmount_cli::{run, Cli, ShellState};
use arcmount_core::config::EngineConfig;
use arcmount_core::mount::MountStatus;
use arcmount_core::ArcError;
use clap::Parser;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// ```text
/// root/
///   alpha/
///     a.txt   (100 bytes)
///     b.rs    (200 bytes)
///   c.bin     (300 bytes)
/// ```
fn build_archive_dir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("alpha")).unwrap();
    write_bytes(&tmp.path().join("alpha/a.txt"), 100);
    write_bytes(&tmp.path().join("alpha/b.rs"), 200);
    write_bytes(&tmp.path().join("c.bin"), 300);
    tmp
}

fn write_bytes(path: &Path, n: usize) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; n]).unwrap();
}

fn quiet_config() -> EngineConfig {
    EngineConfig {
        include_drives: false,
        include_home: false,
        ..EngineConfig::default()
    }
}

// ── Shell state ──────────────────────────────────────────────────────────────

#[test]
fn shell_scan_lifecycle() {
    let dir = build_archive_dir();
    let mut state = ShellState::with_default_opener(quiet_config());

    let id = state.mount(dir.path()).unwrap();
    let mounts = state.list_mounts();
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].status, MountStatus::Mounted);
    assert_eq!(mounts[0].format.as_deref(), Some("dir"));

    assert!(matches!(state.get_scan_stats(id), Err(ArcError::NotRunning(_))));
    state.start_scan(id, Some(2)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(30);
    while !state.scan_finished(id) {
        assert!(Instant::now() < deadline, "scan did not finish within 30 seconds");
        std::thread::sleep(Duration::from_millis(10));
    }
    let snap = state.get_scan_stats(id).unwrap();
    assert_eq!(snap.files_done, 3);
    assert_eq!(snap.bytes_processed, 600);

    // Stopping a finished job is a no-op.
    state.stop_scan(id).unwrap();
    assert!(state.registry_events_seen >= 3);

    let report = state.unmount_all();
    assert_eq!(report.removed, vec![id]);
    assert!(state.list_mounts().is_empty());
}

#[test]
fn shell_mount_errors_surface() {
    let dir = build_archive_dir();
    let mut state = ShellState::with_default_opener(quiet_config());

    state.mount(dir.path()).unwrap();
    assert!(matches!(
        state.mount(dir.path()),
        Err(ArcError::DuplicateMount { .. })
    ));
    assert!(matches!(
        state.mount(&dir.path().join("c.bin")),
        Err(ArcError::OpenError { .. })
    ));
}

// ── Commands ─────────────────────────────────────────────────────────────────

#[test]
fn scan_command_writes_csv_history() {
    let dir = build_archive_dir();
    let out_dir = TempDir::new().unwrap();
    let csv_path = out_dir.path().join("history.csv");

    let args: Vec<OsString> = vec![
        "arcmount".into(),
        "scan".into(),
        dir.path().into(),
        "--interval-ms".into(),
        "10".into(),
        "--threads".into(),
        "2".into(),
        "--csv".into(),
        csv_path.as_path().into(),
    ];
    let cli = Cli::try_parse_from(args).unwrap();

    let mut out = Vec::new();
    run(&cli, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("3 files"));
    assert!(text.contains("[finished]"));

    let csv = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert!(lines.len() >= 2);
    assert!(lines[0].starts_with("taken_at,archive,generation"));
    assert!(lines.last().unwrap().contains(",3,0,600,"));
}

#[test]
fn tree_command_prints_archive_entries() {
    let dir = build_archive_dir();
    let args: Vec<OsString> = vec!["arcmount".into(), "tree".into(), dir.path().into()];
    let cli = Cli::try_parse_from(args).unwrap();

    let mut out = Vec::new();
    run(&cli, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Mounted archives/"));
    assert!(text.contains("[Mounted]"));
    assert!(text.contains("alpha/"));
    assert!(text.contains("a.txt (100 B)"));
    assert!(text.contains("c.bin (300 B)"));
}
