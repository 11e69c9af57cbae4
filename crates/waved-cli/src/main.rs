//! waved: headless shell around the waved editor engine

mod config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use waved_core::{BufferInfo, EditAction, Selection};
use waved_services::{CpalBackend, Session, TransportEvent, codec};

use config::AppConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "waved", version, about = "Inspect, play and edit audio files")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Audio host index (see `waved devices`)
    #[arg(long, global = true)]
    host: Option<usize>,

    /// Output device index within the host
    #[arg(long, global = true)]
    device: Option<usize>,

    /// Frames per output callback
    #[arg(long, global = true)]
    block_size: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// List audio hosts and their output devices
    Devices,
    /// Print a file's format as JSON
    Info { file: PathBuf },
    /// Play a file, or the span between --start and --end
    Play {
        file: PathBuf,
        /// Start time in seconds
        #[arg(long)]
        start: Option<f64>,
        /// End time in seconds
        #[arg(long)]
        end: Option<f64>,
        /// Repeat the span until interrupted
        #[arg(long = "loop")]
        looping: bool,
    },
    /// Apply one edit to a file and write the result
    Edit {
        input: PathBuf,
        output: PathBuf,
        #[arg(value_enum)]
        op: EditOp,
        /// Region start in seconds
        #[arg(long)]
        start: Option<f64>,
        /// Region end in seconds
        #[arg(long)]
        end: Option<f64>,
        /// Gain for `amplify`
        #[arg(long, default_value_t = 1.0)]
        gain: f32,
        /// Paste position in seconds for `cut-paste`, measured after the cut
        #[arg(long)]
        at: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum EditOp {
    Delete,
    Trim,
    Normalize,
    Amplify,
    CutPaste,
}

#[derive(Serialize)]
struct FileReport {
    path: PathBuf,
    #[serde(flatten)]
    info: BufferInfo,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("waved=info")))
        .init();

    let cli = Cli::parse();
    let mut config = config::load_config();
    if cli.host.is_some() {
        config.audio.host = cli.host;
    }
    if cli.device.is_some() {
        config.audio.device = cli.device;
    }
    if let Some(block_size) = cli.block_size {
        config.audio.block_size = block_size;
    }

    match cli.command {
        Command::Devices => list_devices(),
        Command::Info { file } => print_info(&file),
        Command::Play {
            file,
            start,
            end,
            looping,
        } => play(&mut config, &file, start, end, looping),
        Command::Edit {
            input,
            output,
            op,
            start,
            end,
            gain,
            at,
        } => edit(&mut config, &input, &output, op, start, end, gain, at),
    }
}

fn open_session(config: &AppConfig, file: &Path) -> anyhow::Result<Session> {
    let backend = CpalBackend::new(config.audio.host, config.audio.device);
    let mut session = Session::new(Box::new(backend), config.session_config())
        .context("Failed to create editing session")?;
    if let Some(dir) = &config.paths.last_dir {
        session.set_last_dir(dir);
    }
    session
        .open(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    Ok(session)
}

/// Persist the session's last directory if it moved
fn remember_last_dir(config: &mut AppConfig, session: &Session) {
    let last_dir = session.last_dir().map(Path::to_path_buf);
    if last_dir.is_none() || last_dir == config.paths.last_dir {
        return;
    }
    config.paths.last_dir = last_dir;
    if let Err(e) = config::save_config(config) {
        warn!(error = %e, "Failed to save config");
    }
}

fn list_devices() -> anyhow::Result<()> {
    let hosts = waved_services::list_hosts();
    if hosts.is_empty() {
        bail!("No audio hosts available");
    }
    for host in hosts {
        println!("[{}] {}", host.index, host.name);
        match waved_services::list_output_devices(Some(host.index)) {
            Ok(devices) => {
                for device in devices {
                    let marker = if device.is_default { " (default)" } else { "" };
                    println!("    [{}] {}{}", device.index, device.name, marker);
                }
            }
            Err(e) => println!("    {e}"),
        }
    }
    Ok(())
}

fn print_info(file: &Path) -> anyhow::Result<()> {
    let decoded =
        codec::decode(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let buffer = decoded.into_buffer()?;
    let report = FileReport {
        path: file.to_path_buf(),
        info: buffer.info(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Selection for optional `--start`/`--end`; `None` when neither is given
fn time_selection(session: &Session, start: Option<f64>, end: Option<f64>) -> Option<Selection> {
    if start.is_none() && end.is_none() {
        return None;
    }
    let buffer = session.engine().buffer();
    let start = start.unwrap_or(0.0);
    let end = end.unwrap_or_else(|| buffer.duration());
    Some(Selection::from_times(start, end, buffer.sample_rate()))
}

fn play(
    config: &mut AppConfig,
    file: &Path,
    start: Option<f64>,
    end: Option<f64>,
    looping: bool,
) -> anyhow::Result<()> {
    let mut session = open_session(config, file)?;
    remember_last_dir(config, &session);

    if let Some(selection) = time_selection(&session, start, end) {
        session.select(selection);
    }
    session.transport().set_loop(looping);

    let events = session.transport().events();
    if !session.play_selection().context("Failed to start playback")? {
        bail!("Nothing to play in the requested span");
    }
    println!("Playing {}", session.title());

    loop {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(TransportEvent::Finished { position }) | Ok(TransportEvent::Stopped { position }) => {
                debug!(position, "Transport went idle");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                debug!(position = session.transport().position(), "Playing");
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    session.poll_events();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn edit(
    config: &mut AppConfig,
    input: &Path,
    output: &Path,
    op: EditOp,
    start: Option<f64>,
    end: Option<f64>,
    gain: f32,
    at: Option<f64>,
) -> anyhow::Result<()> {
    let mut session = open_session(config, input)?;

    let selection = time_selection(&session, start, end);
    match (op, selection) {
        (EditOp::Normalize | EditOp::Amplify, None) => {}
        (_, Some(selection)) => session.select(selection),
        (_, None) => bail!("{op:?} needs --start and/or --end"),
    }

    let applied = match op {
        EditOp::Delete => session.perform(EditAction::Delete).applied,
        EditOp::Trim => session.perform(EditAction::Trim).applied,
        EditOp::Normalize => session.perform(EditAction::Normalize).applied,
        EditOp::Amplify => session.perform(EditAction::Amplify(gain)).applied,
        EditOp::CutPaste => {
            let Some(at) = at else {
                bail!("cut-paste needs --at");
            };
            let cut = session.perform(EditAction::Cut).applied;
            let marker = session.engine().buffer().frame_at(at);
            session.select(Selection::Marker(marker));
            cut && session.perform(EditAction::Paste).applied
        }
    };
    if !applied {
        bail!("{op:?} left the file unchanged; check the region bounds");
    }

    session
        .save_as(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    remember_last_dir(config, &session);

    let info = session.engine().buffer().info();
    info!(frames = info.frame_count, output = %output.display(), "Edit written");
    println!(
        "{} -> {} ({} frames, {:.3} s)",
        input.display(),
        output.display(),
        info.frame_count,
        info.duration_secs
    );
    Ok(())
}
