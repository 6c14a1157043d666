/// End-to-end scan engine tests.
///
/// These run real worker threads against scripted in-memory archives and
/// real on-disk sources, going through the same session wiring a frontend
/// uses.
use arcmount_core::archive::memory::MemoryOpener;
use arcmount_core::archive::{DefaultOpener, MemoryArchive};
use arcmount_core::config::EngineConfig;
use arcmount_core::mount::{MountId, MountStatus};
use arcmount_core::scanner::{ScanProgress, ScanSnapshot};
use arcmount_core::session::Session;
use arcmount_core::ArcError;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Poll `cond` until it holds, failing after 30 seconds.
fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while !cond() {
        assert!(Instant::now() < deadline, "{what} did not happen within 30 seconds");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_finished(session: &Session, id: MountId) -> ScanSnapshot {
    wait_until("scan completion", || !session.engine.is_running(id));
    session.engine.snapshot(id).unwrap()
}

/// An archive of `n` readable 1 KiB files that each take `delay` to read.
fn slow_archive(n: usize, delay: Duration) -> MemoryArchive {
    (0..n)
        .fold(MemoryArchive::new(), |a, i| {
            a.with_file(format!("f{i:04}.bin"), vec![0u8; 1_024])
        })
        .with_read_delay(delay)
}

fn memory_session(path: &str, archive: MemoryArchive) -> (Session, Arc<MemoryArchive>, MountId) {
    let opener = MemoryOpener::new();
    let handle = opener.insert(path, archive);
    let session = Session::new(EngineConfig::default(), Arc::new(opener));
    let id = session.controller.mount_blocking(Path::new(path)).unwrap();
    (session, handle, id)
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn hundred_entries_with_ten_failures_four_threads() {
    let mut archive = MemoryArchive::new().with_dir("data");
    let mut expected_bytes = 0u64;
    for i in 0..100u64 {
        let path = format!("data/entry-{i:03}");
        if i % 10 == 9 {
            archive = archive.with_unreadable(path, 1_000 + i);
        } else {
            expected_bytes += i + 1;
            archive = archive.with_file(path, vec![7u8; (i + 1) as usize]);
        }
    }
    let (session, _handle, id) = memory_session("/virtual/a.zip", archive);

    let progress = session.engine.subscribe();
    session.engine.start(id, 4).unwrap();

    let deadline = Instant::now() + Duration::from_secs(30);
    let completed = loop {
        assert!(Instant::now() < deadline, "scan did not complete within 30 seconds");
        match progress.recv_timeout(Duration::from_millis(100)) {
            Ok(msg @ ScanProgress::Completed { .. }) => break msg,
            Ok(ScanProgress::Stopped { .. }) => panic!("scan was unexpectedly stopped"),
            Ok(_) | Err(_) => continue,
        }
    };
    assert!(matches!(
        completed,
        ScanProgress::Completed {
            files_done: 90,
            files_failed: 10,
            ..
        }
    ));

    let snap = wait_finished(&session, id);
    assert_eq!(snap.files_processed, 100);
    assert_eq!(snap.files_done, 90);
    assert_eq!(snap.files_failed, 10);
    assert_eq!(snap.bytes_processed, expected_bytes);
    assert_eq!(snap.thread_count, 4);
    assert!(!snap.running);
}

#[test]
fn restart_resets_counters_and_bumps_generation() {
    let (session, _handle, id) =
        memory_session("/virtual/slow.zip", slow_archive(40, Duration::from_millis(200)));

    assert_eq!(session.engine.start(id, 2).unwrap(), 1);
    wait_until("first entries", || {
        session.engine.snapshot(id).unwrap().files_processed >= 2
    });
    session.engine.stop(id).unwrap();
    let stopped = session.engine.snapshot(id).unwrap();
    assert!(stopped.files_processed >= 2);
    assert!(!stopped.running);

    assert_eq!(session.engine.start(id, 2).unwrap(), 2);
    let fresh = session.engine.snapshot(id).unwrap();
    assert_eq!(fresh.generation, 2);
    assert_eq!(fresh.files_processed, 0);
    assert_eq!(fresh.files_done + fresh.files_failed, 0);
    assert_eq!(fresh.bytes_processed, 0);
    session.engine.stop(id).unwrap();
}

#[test]
fn stop_is_idempotent() {
    let (session, _handle, id) =
        memory_session("/virtual/slow.zip", slow_archive(50, Duration::from_millis(10)));

    // Never started.
    session.engine.stop(id).unwrap();

    session.engine.start(id, 3).unwrap();
    session.engine.stop(id).unwrap();
    let a = session.engine.snapshot(id).unwrap();
    session.engine.stop(id).unwrap();
    let b = session.engine.snapshot(id).unwrap();
    assert_eq!(a.files_processed, b.files_processed);
    assert!(!session.engine.is_running(id));
}

#[test]
fn second_start_while_running_is_rejected() {
    let (session, _handle, id) =
        memory_session("/virtual/slow.zip", slow_archive(100, Duration::from_millis(20)));

    session.engine.start(id, 2).unwrap();
    assert!(matches!(
        session.engine.start(id, 2),
        Err(ArcError::AlreadyRunning(_))
    ));
    assert_eq!(session.engine.active_jobs(), vec![id]);
    session.engine.stop(id).unwrap();
    assert!(session.engine.active_jobs().is_empty());
}

#[test]
fn snapshots_are_monotonic_while_running() {
    let (session, _handle, id) =
        memory_session("/virtual/slow.zip", slow_archive(300, Duration::from_millis(1)));

    session.engine.start(id, 4).unwrap();
    let mut last = session.engine.snapshot(id).unwrap();
    while session.engine.is_running(id) {
        let snap = session.engine.snapshot(id).unwrap();
        assert_eq!(snap.generation, last.generation);
        assert!(snap.files_processed >= last.files_processed);
        assert!(snap.bytes_processed >= last.bytes_processed);
        last = snap;
    }
    let done = session.engine.snapshot(id).unwrap();
    assert_eq!(done.files_processed, 300);
    assert_eq!(done.bytes_processed, 300 * 1_024);
}

#[test]
fn voiding_mid_scan_freezes_snapshot_and_blocks_restart() {
    let (session, handle, id) =
        memory_session("/virtual/slow.zip", slow_archive(100, Duration::from_millis(20)));

    session.engine.start(id, 4).unwrap();
    wait_until("first entries", || {
        session.engine.snapshot(id).unwrap().files_processed >= 4
    });
    session.controller.void(id).unwrap();
    assert_eq!(session.registry.status(id), Some(MountStatus::Voided));

    let frozen = wait_finished(&session, id);
    assert!(frozen.files_processed < 100);
    // Every read that started was finished and counted.
    assert_eq!(handle.read_count(), frozen.files_processed);

    std::thread::sleep(Duration::from_millis(50));
    let later = session.engine.snapshot(id).unwrap();
    assert_eq!(later.files_processed, frozen.files_processed);
    assert_eq!(later.bytes_processed, frozen.bytes_processed);
    assert_eq!(later.elapsed_ms, frozen.elapsed_ms);

    assert!(matches!(
        session.engine.start(id, 1),
        Err(ArcError::VoidedMount(v)) if v == id
    ));
}

#[test]
fn start_requires_mounted_archive() {
    let opener = MemoryOpener::new();
    let session = Session::new(EngineConfig::default(), Arc::new(opener));
    let broken = session
        .controller
        .mount(Path::new("/virtual/missing.zip"))
        .unwrap();
    let id = broken.id;
    assert!(broken.wait().is_err());

    assert!(matches!(
        session.engine.start(id, 2),
        Err(ArcError::NotMounted {
            status: MountStatus::Broken,
            ..
        })
    ));
    assert!(matches!(
        session.engine.snapshot(id),
        Err(ArcError::NotRunning(_))
    ));
}

// ── Real sources ─────────────────────────────────────────────────────────────

fn write_bytes(path: &Path, n: usize) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; n]).unwrap();
}

#[test]
fn scans_a_directory_archive() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("alpha")).unwrap();
    write_bytes(&tmp.path().join("alpha/a.txt"), 100);
    write_bytes(&tmp.path().join("alpha/b.rs"), 200);
    write_bytes(&tmp.path().join("c.bin"), 300);

    let session = Session::new(EngineConfig::default(), Arc::new(DefaultOpener));
    let id = session.controller.mount_blocking(tmp.path()).unwrap();
    // A directory is only walked by the scan itself.
    assert_eq!(session.controller.get(id).unwrap().entry_count, None);

    session.engine.start(id, 2).unwrap();
    let snap = wait_finished(&session, id);
    assert_eq!(snap.files_done, 3);
    assert_eq!(snap.files_failed, 0);
    assert_eq!(snap.bytes_processed, 600);
}

#[test]
fn scans_a_zip_archive() {
    use zip::write::FileOptions;

    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("set.zip");
    {
        let file = fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer.add_directory("music/", FileOptions::default()).unwrap();
        writer.start_file("music/a.ogg", FileOptions::default()).unwrap();
        writer.write_all(&[1u8; 500]).unwrap();
        writer.start_file("readme.txt", FileOptions::default()).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();
    }

    let session = Session::new(EngineConfig::default(), Arc::new(DefaultOpener));
    let id = session.controller.mount_blocking(&path).unwrap();
    assert_eq!(
        session.controller.get(id).unwrap().summary().format.as_deref(),
        Some("zip")
    );

    session.engine.start(id, 4).unwrap();
    let snap = wait_finished(&session, id);
    assert_eq!(snap.files_processed, 2);
    assert_eq!(snap.bytes_processed, 505);

    session.controller.unmount(id).unwrap();
}
