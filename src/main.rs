//! Table Sense
//!
//! Command line front end: replays captured frames through the OCR cycle and
//! the session, or scores a single line of OCR text.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use table_sense::config::load_config;
use table_sense::detection::{score, DetectionInput};
use table_sense::money::{LedgerWallet, MemoryStore};
use table_sense::notify::LogNotifier;
use table_sense::ocr::normalize::{keyword_hits, normalize, to_ascii_lower};
use table_sense::ocr::setup::{probe_tesseract, resolve_tesseract_executable};
use table_sense::ocr::build_snapshot;
use table_sense::persist::JsonSettingsFile;
use table_sense::runner::{ConfigWatcher, DirectoryFrames, Monitor};
use table_sense::{logging, paths, HostIo};

#[derive(Parser)]
#[command(name = "table-sense", version, about = "Poker table phase and money source detection")]
struct Cli {
    /// Config file (default: config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a directory of PNG frames through OCR and the session
    Run {
        /// Directory of captured frames, read in file name order
        #[arg(long)]
        frames: PathBuf,
        /// JSON dump of the integer store (`{"values": {...}, "faults": [...]}`)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Append one JSON tick report per line to this file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Tick period
        #[arg(long, default_value_t = 100)]
        tick_ms: u64,
        /// Keep ticking this long after the last frame so pending work settles
        #[arg(long, default_value_t = 3000)]
        linger_ms: u64,
    },
    /// Score one OCR text sample and print the snapshot
    Inspect {
        text: String,
        #[arg(long, default_value_t = 0.5)]
        opacity: f32,
    },
}

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        log::error!("PANIC at {}: {}", location, msg);
    }));

    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let config_path = paths::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Command::Run {
            frames,
            store,
            report,
            tick_ms,
            linger_ms,
        } => {
            if let Err(e) = paths::ensure_directories() {
                eprintln!("Failed to create output directories: {}", e);
            }
            let logs_dir = paths::get_logs_dir();
            logging::init(Some(&logs_dir), level)?;
            log::info!("Table Sense starting...");
            run(&config_path, &frames, store.as_deref(), report.as_deref(), tick_ms, linger_ms)
        }
        Command::Inspect { text, opacity } => {
            // Stdout carries the JSON; only warnings unless verbose.
            let level = if cli.verbose { level } else { LevelFilter::Warn };
            logging::init(None, level)?;
            inspect(&config_path, &text, opacity)
        }
    }
}

fn run(
    config_path: &Path,
    frames_dir: &Path,
    store_path: Option<&Path>,
    report_path: Option<&Path>,
    tick_ms: u64,
    linger_ms: u64,
) -> Result<()> {
    let config = load_config(config_path);

    let executable = resolve_tesseract_executable(&config.ocr.tesseract_path);
    match probe_tesseract(&executable) {
        Ok(version) => log::info!("[OCR] Tesseract {} at {}", version, executable.display()),
        Err(e) => log::warn!("[OCR] {:#}", e),
    }

    let frames = DirectoryFrames::open(frames_dir)?;
    if frames.is_empty() {
        log::warn!("No PNG frames in {}", frames_dir.display());
    }
    let mut store = match store_path {
        Some(path) => MemoryStore::load(path)?,
        None => MemoryStore::new(),
    };
    let mut persist = JsonSettingsFile::new(config_path);
    let mut notify = LogNotifier;
    let mut wallet = LedgerWallet::default();

    let mut report_out = report_path
        .map(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(BufWriter::new)
                .with_context(|| format!("Failed to open report file {}", path.display()))
        })
        .transpose()?;

    let started = Instant::now();
    let mut monitor = Monitor::new(config, frames, Some(ConfigWatcher::new(config_path)), 0);
    let mut drained_at: Option<u64> = None;

    loop {
        let now_ms = started.elapsed().as_millis() as u64;
        let mut io = HostIo {
            store: &mut store,
            persist: &mut persist,
            notify: &mut notify,
            wallet: &mut wallet,
        };
        let report = monitor.tick(now_ms, &mut io);
        if let Some(out) = report_out.as_mut() {
            let line = serde_json::to_string(report).context("Failed to serialize tick report")?;
            writeln!(out, "{}", line).context("Failed to write tick report")?;
        }

        if monitor.frames().is_exhausted() && !monitor.is_ocr_running() {
            let since = *drained_at.get_or_insert(now_ms);
            if now_ms.saturating_sub(since) >= linger_ms {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(tick_ms));
    }

    if let Some(mut out) = report_out {
        out.flush().context("Failed to flush report file")?;
    }

    let session = monitor.session();
    let locks = session.locks();
    log::info!(
        "Replay finished: phase={} candidates={} potIdx={:?} playerIdx={:?} credited={}(${:.2}) over {} payout(s) reads={}",
        session.phase().as_str(),
        session.scanner().len(),
        locks.pot(),
        locks.player(),
        wallet.credited_cents,
        wallet.credited_cents as f64 / 100.0,
        wallet.credits,
        store.reads()
    );
    Ok(())
}

fn inspect(config_path: &Path, text: &str, opacity: f32) -> Result<()> {
    let config = load_config(config_path);
    let lowered = to_ascii_lower(text);
    let normalized = normalize(&lowered);
    let scored = score(&DetectionInput {
        raw_text: &lowered,
        normalized: &normalized,
        keyword_hits: keyword_hits(&lowered, &config.ocr.keyword_list()),
        opacity_hint: opacity,
        opacity_enabled: config.opacity.enabled,
    });
    let snapshot = build_snapshot(&lowered, 1, 0, None, &config);

    let out = json!({
        "score": scored,
        "snapshot": snapshot,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
