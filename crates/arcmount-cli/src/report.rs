/// Scan report output: one-line progress summaries and CSV export of the
/// snapshot history.
use anyhow::Context;
use arcmount_core::scanner::ScanSnapshot;
use arcmount_core::units::{format_count, format_rate, format_size};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// One snapshot, stamped with the wall-clock time it was taken.
#[derive(Debug, Clone)]
pub struct TimedSnapshot {
    pub taken_at: DateTime<Local>,
    pub snapshot: ScanSnapshot,
}

impl TimedSnapshot {
    pub fn now(snapshot: ScanSnapshot) -> Self {
        Self {
            taken_at: Local::now(),
            snapshot,
        }
    }
}

/// Flat CSV row.
#[derive(Debug, Serialize)]
struct CsvRow {
    taken_at: String,
    archive: u64,
    generation: u64,
    threads: usize,
    running: bool,
    elapsed_ms: u64,
    files_processed: u64,
    files_done: u64,
    files_failed: u64,
    bytes_processed: u64,
    files_per_second: f64,
    bytes_per_second: f64,
    recent_files_per_second: f64,
    recent_bytes_per_second: f64,
}

impl From<&TimedSnapshot> for CsvRow {
    fn from(timed: &TimedSnapshot) -> Self {
        let s = &timed.snapshot;
        Self {
            taken_at: timed.taken_at.to_rfc3339(),
            archive: s.archive.0,
            generation: s.generation,
            threads: s.thread_count,
            running: s.running,
            elapsed_ms: s.elapsed_ms,
            files_processed: s.files_processed,
            files_done: s.files_done,
            files_failed: s.files_failed,
            bytes_processed: s.bytes_processed,
            files_per_second: s.files_per_second,
            bytes_per_second: s.bytes_per_second,
            recent_files_per_second: s.recent_files_per_second,
            recent_bytes_per_second: s.recent_bytes_per_second,
        }
    }
}

/// Write `history` as CSV with a header row.
pub fn write_csv<W: Write>(writer: W, history: &[TimedSnapshot]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for timed in history {
        csv.serialize(CsvRow::from(timed))
            .context("failed to write CSV row")?;
    }
    csv.flush().context("failed to flush CSV output")?;
    Ok(())
}

pub fn write_csv_file(path: &Path, history: &[TimedSnapshot]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(file, history)
}

/// Human-readable one-line summary of a snapshot.
pub fn summary_line(snap: &ScanSnapshot) -> String {
    format!(
        "{} gen {} [{}] {} files ({} ok, {} failed), {} in {:.1}s, {} files/s, {} (recent {})",
        snap.archive,
        snap.generation,
        if snap.running { "running" } else { "finished" },
        format_count(snap.files_processed),
        format_count(snap.files_done),
        format_count(snap.files_failed),
        format_size(snap.bytes_processed),
        snap.elapsed_ms as f64 / 1_000.0,
        format_count(snap.files_per_second.round() as u64),
        format_rate(snap.bytes_per_second),
        format_rate(snap.recent_bytes_per_second),
    )
}
