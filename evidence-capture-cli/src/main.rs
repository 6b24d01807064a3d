use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn, Level};

use evidence_capture_core::models::ledger::format_duration;
use evidence_capture_core::storage::{sidecar, verify};
use evidence_capture_core::{
    CaptureSession, EncodeFormat, EncodeTarget, LedgerStatus, SessionConfig, SessionDelegate,
    SessionEvent, SessionLedger, SessionState, SyntheticDevice, TargetStatus,
};

#[derive(Parser)]
#[command(name = "evidence-capture")]
#[command(about = "Record and verify integrity-sealed voice capture sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the synthetic source and seal a session ledger
    Record {
        /// Duration to record in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Output directory for the recordings and the ledger sidecar
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Compressed format (mp3, ogg, flac, m4a) encoded alongside the WAV
        #[arg(short, long)]
        secondary: Option<String>,

        /// Frequency of the synthetic sine source in Hz
        #[arg(long, default_value = "440")]
        frequency: f64,
    },
    /// Re-hash the recordings of a sealed ledger and report per-target verdicts
    Verify {
        /// Path to a recording or to its .ledger.json sidecar
        path: PathBuf,
    },
}

/// Forwards session notifications into the log stream.
struct CliDelegate;

impl SessionDelegate for CliDelegate {
    fn on_state_changed(&self, state: SessionState) {
        debug!("session state: {state}");
    }

    fn on_event(&self, event: &SessionEvent) {
        warn!("session event: {event:?}");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Record {
            duration,
            output_dir,
            secondary,
            frequency,
        } => record(duration, &output_dir, secondary.as_deref(), frequency),
        Command::Verify { path } => verify_session(&path),
    }
}

fn record(
    duration: u64,
    output_dir: &PathBuf,
    secondary: Option<&str>,
    frequency: f64,
) -> Result<()> {
    let now = Utc::now();
    let mut targets = vec![EncodeTarget::timestamped(EncodeFormat::Wav, output_dir, now)];
    if let Some(name) = secondary {
        targets.push(EncodeTarget::timestamped_secondary(
            parse_secondary(name)?,
            output_dir,
            now,
        ));
    }
    for target in &targets {
        info!("target: {}", target.path.display());
    }

    let session = CaptureSession::start(
        Box::new(SyntheticDevice::sine(frequency)),
        targets,
        SessionConfig::default(),
        Arc::new(CliDelegate),
    )?;
    info!(
        "session {} recording for {duration} s on {}",
        session.id(),
        session.device().name
    );
    thread::sleep(Duration::from_secs(duration));

    let ledger = session.stop()?;
    print_summary(&ledger);
    if !ledger.is_completed() {
        bail!("session did not complete cleanly");
    }
    Ok(())
}

fn verify_session(path: &PathBuf) -> Result<()> {
    let sidecar_path = if path.extension().is_some_and(|ext| ext == "json") {
        path.clone()
    } else {
        sidecar::sidecar_path(path)
    };
    let ledger = sidecar::read_ledger(&sidecar_path)?;
    info!(
        "verifying session {} ({} targets)",
        ledger.session_id,
        ledger.targets.len()
    );

    let report = verify::verify_ledger(&ledger);
    for target in &report.verdicts {
        info!(
            "{} [{}]: {}",
            target.path.display(),
            target.format,
            target.verdict
        );
    }
    if !report.all_verified() {
        bail!("verification failed for session {}", report.session_id);
    }
    info!("all targets verified");
    Ok(())
}

fn parse_secondary(name: &str) -> Result<EncodeFormat> {
    let format = match name.to_ascii_lowercase().as_str() {
        "mp3" => EncodeFormat::Mp3 { bitrate_kbps: 128 },
        "ogg" => EncodeFormat::Ogg,
        "flac" => EncodeFormat::Flac,
        "m4a" => EncodeFormat::M4a { bitrate_kbps: 192 },
        other => bail!("unsupported secondary format: {other} (try mp3, ogg, flac or m4a)"),
    };
    Ok(format)
}

fn print_summary(ledger: &SessionLedger) {
    let status = match &ledger.status {
        LedgerStatus::Completed => "completed".to_string(),
        LedgerStatus::Failed => "failed".to_string(),
        LedgerStatus::Aborted { reason } => format!("aborted: {reason}"),
    };
    info!("session {} sealed: {status}", ledger.session_id);
    info!(
        "captured {} ({} frames at {} Hz, {} ch)",
        format_duration(ledger.duration()),
        ledger.frames_captured,
        ledger.sample_rate,
        ledger.channels
    );
    for target in &ledger.targets {
        let digest = target.sha256.as_deref().unwrap_or("-");
        match &target.status {
            TargetStatus::Clean => info!(
                "  {} {}: {} bytes, sha256 {digest}",
                target.format, target.path, target.bytes_written
            ),
            TargetStatus::Failed { reason } => {
                warn!("  {} {}: failed: {reason}", target.format, target.path)
            }
        }
    }
    for warning in &ledger.warnings {
        warn!("  data-quality warning: {warning:?}");
    }
}
