/// Command-line definitions and their execution.
use crate::report::{self, TimedSnapshot};
use crate::state::ShellState;
use anyhow::Context;
use arcmount_core::config::EngineConfig;
use arcmount_core::units::format_count;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Mount archives into a virtual tree and measure read throughput.
#[derive(Parser, Debug)]
#[command(name = "arcmount", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON engine configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Worker threads per scan (overrides the config file).
    #[arg(short = 'j', long, global = true)]
    pub threads: Option<usize>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mount archives and print the virtual tree with their entries.
    Tree {
        /// Archives (directories or .zip files) to mount.
        #[arg(required = true)]
        archives: Vec<PathBuf>,

        /// Also list local drives and the home directory.
        #[arg(long)]
        roots: bool,
    },

    /// Mount one archive and read every entry, printing live statistics.
    Scan {
        /// Archive (directory or .zip file) to scan.
        archive: PathBuf,

        /// Interval between statistics lines.
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,

        /// Write the snapshot history to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Discover drives and the home directory and list all mount points.
    Mounts,
}

impl Cli {
    /// Load the config file (if any) and apply command-line overrides.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(threads) = self.threads {
            config.default_threads = threads;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Execute `cli`, writing user-facing output to `out`.
pub fn run(cli: &Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = cli.engine_config()?;
    match &cli.command {
        Command::Tree { archives, roots } => run_tree(config, archives, *roots, out),
        Command::Scan {
            archive,
            interval_ms,
            csv,
        } => run_scan(
            config,
            archive,
            Duration::from_millis(*interval_ms),
            csv.as_ref(),
            out,
        ),
        Command::Mounts => run_mounts(config, out),
    }
}

fn run_tree(
    mut config: EngineConfig,
    archives: &[PathBuf],
    roots: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    config.include_drives = roots && config.include_drives;
    config.include_home = roots && config.include_home;
    let mut state = ShellState::with_default_opener(config);
    state.discover_roots();

    for path in archives {
        state
            .mount(path)
            .with_context(|| format!("failed to mount {}", path.display()))?;
    }
    let created = state.expand_archives();
    info!("Materialized {created} tree nodes");

    out.write_all(state.render_tree().as_bytes())?;
    finish(&mut state, out)
}

fn run_scan(
    config: EngineConfig,
    archive: &std::path::Path,
    interval: Duration,
    csv: Option<&PathBuf>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let mut state = ShellState::with_default_opener(config);
    let id = state
        .mount(archive)
        .with_context(|| format!("failed to mount {}", archive.display()))?;
    match state.session.controller.get(id).and_then(|m| m.entry_count) {
        Some(files) => writeln!(
            out,
            "Mounted {} as {id}: {} files",
            archive.display(),
            format_count(files)
        )?,
        None => writeln!(out, "Mounted {} as {id}", archive.display())?,
    }

    state.start_scan(id, None)?;
    let mut history = Vec::new();
    loop {
        std::thread::sleep(interval);
        let finished = state.scan_finished(id);
        let snap = state.get_scan_stats(id)?;
        writeln!(out, "{}", report::summary_line(&snap))?;
        history.push(TimedSnapshot::now(snap));
        if finished {
            break;
        }
    }

    if let Some(path) = csv {
        report::write_csv_file(path, &history)?;
        writeln!(out, "Wrote {} snapshots to {}", history.len(), path.display())?;
    }
    finish(&mut state, out)
}

fn run_mounts(config: EngineConfig, out: &mut dyn Write) -> anyhow::Result<()> {
    let mut state = ShellState::with_default_opener(config);
    state.discover_roots();
    for mount in state.list_mounts() {
        writeln!(
            out,
            "{:<5} {:<8} {:<10} {:<24} {}",
            mount.id.to_string(),
            mount.kind.label(),
            mount.status.label(),
            mount.label,
            mount.location.display()
        )?;
    }
    Ok(())
}

/// Unmount every archive and report failures.
fn finish(state: &mut ShellState, out: &mut dyn Write) -> anyhow::Result<()> {
    let report = state.unmount_all();
    for (id, err) in &report.failed {
        writeln!(out, "warning: could not unmount {id}: {err}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scan_with_global_threads() {
        let cli = Cli::try_parse_from([
            "arcmount",
            "scan",
            "data.zip",
            "--threads",
            "3",
            "--interval-ms",
            "50",
        ])
        .unwrap();
        assert_eq!(cli.threads, Some(3));
        match &cli.command {
            Command::Scan {
                archive,
                interval_ms,
                csv,
            } => {
                assert_eq!(archive, &PathBuf::from("data.zip"));
                assert_eq!(*interval_ms, 50);
                assert!(csv.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.engine_config().unwrap().default_threads, 3);
    }

    #[test]
    fn test_zero_threads_is_rejected() {
        let cli = Cli::try_parse_from(["arcmount", "-j", "0", "mounts"]).unwrap();
        assert!(cli.engine_config().is_err());
    }

    #[test]
    fn test_tree_requires_an_archive() {
        assert!(Cli::try_parse_from(["arcmount", "tree"]).is_err());
    }
}
