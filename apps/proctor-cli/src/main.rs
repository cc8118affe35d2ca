mod ui;

use std::{env, path::PathBuf, sync::mpsc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use proctor_capture::ImageSequenceCamera;
use proctor_environment::WatcherHandle;
use proctor_network::{LocalFeed, ViolationFeed};
use proctor_ops::{ensure_report_dir, init_tracing, write_session_report, EventJournal};
use proctor_session::{ProctoringSession, StartOptions};
use proctor_types::{
    config::ProctorConfig, environment::HostEvent, vision::Frame, violation::ViolationLog,
};
use proctor_vision::{HeuristicPresenceAnalyzer, PresenceAnalyzer};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ui::UiMessage;

#[derive(Parser)]
#[command(name = "proctor", about = "Interview proctoring monitor")]
struct Cli {
    /// TOML config; falls back to `PROCTOR_CONFIG`, then built-in defaults.
    #[arg(long, short)]
    config: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the presence heuristic over still images, in order.
    Analyze { images: Vec<PathBuf> },
    /// Proctor a session fed from a directory of PNG frames.
    Simulate {
        #[arg(long)]
        frames: PathBuf,
        /// Stop after this many seconds.
        #[arg(long)]
        seconds: Option<u64>,
        #[arg(long = "loop")]
        looping: bool,
        #[arg(long)]
        no_fullscreen: bool,
        /// Live dashboard; keys inject host events.
        #[arg(long)]
        tui: bool,
    },
}

#[derive(Serialize)]
struct AnalyzedImage {
    path: PathBuf,
    #[serde(flatten)]
    reading: proctor_types::presence::PresenceReading,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config);

    match cli.command {
        Command::Analyze { images } => analyze(&config, &images),
        Command::Simulate {
            frames,
            seconds,
            looping,
            no_fullscreen,
            tui,
        } => {
            if !tui {
                init_tracing(&config.ops)?;
            }
            let options = StartOptions {
                require_fullscreen: config.session.require_fullscreen && !no_fullscreen,
            };
            let log = simulate(&config, frames, seconds, looping, options, tui).await?;
            println!("{}", serde_json::to_string_pretty(&log)?);
            Ok(())
        }
    }
}

fn analyze(config: &ProctorConfig, images: &[PathBuf]) -> Result<()> {
    let analyzer = HeuristicPresenceAnalyzer::new(config.analysis.clone());
    let mut previous: Option<Frame> = None;
    for path in images {
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        let frame = Frame::from_rgba(width, height, decoded.into_raw());
        let reading = analyzer.analyze(&frame, previous.as_ref())?;
        let line = AnalyzedImage {
            path: path.clone(),
            reading,
        };
        println!("{}", serde_json::to_string(&line)?);
        previous = Some(frame);
    }
    Ok(())
}

async fn simulate(
    config: &ProctorConfig,
    frames: PathBuf,
    seconds: Option<u64>,
    looping: bool,
    options: StartOptions,
    tui: bool,
) -> Result<ViolationLog> {
    let camera = ImageSequenceCamera::new(frames).looping(looping);
    let analyzer = HeuristicPresenceAnalyzer::new(config.analysis.clone());
    let feed = LocalFeed::new(config.session.feed_capacity);
    let mut session = ProctoringSession::new(
        config,
        camera,
        analyzer,
        feed.clone(),
        EventJournal::new(),
    );
    session.on_violation(|violation| {
        info!(
            "[{:?}] {:?}: {}",
            violation.severity, violation.kind, violation.description
        );
    });

    let (ui_tx, ui_rx) = mpsc::channel();
    let forwarder = tokio::spawn({
        let mut events = feed.subscribe();
        async move {
            while let Some(event) = events.next().await {
                if ui_tx.send(UiMessage::Event(event)).is_err() {
                    break;
                }
            }
        }
    });

    session.start(options).await?;
    let host = session
        .host_handle()
        .context("environment watcher not attached after start")?;
    if options.require_fullscreen && !tui {
        // Headless runs have no window to enter fullscreen with.
        host.dispatch(HostEvent::FullscreenChanged { active: true });
    }

    let cancel = CancellationToken::new();
    if let Some(seconds) = seconds {
        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            deadline.cancel();
        });
    }

    let dashboard = if tui {
        Some(spawn_dashboard(ui_rx, host, cancel.clone(), summary(config)))
    } else {
        drop(ui_rx);
        None
    };

    let outcome = session.run(cancel).await;
    forwarder.abort();
    if let Some(dashboard) = dashboard {
        dashboard.await??;
    }
    let log = outcome?;

    let dir = ensure_report_dir(&config.ops.report_dir)?;
    let path = write_session_report(&dir, &session.report())?;
    info!("Session report written to {}", path.display());
    Ok(log)
}

fn spawn_dashboard(
    receiver: mpsc::Receiver<UiMessage>,
    host: WatcherHandle,
    cancel: CancellationToken,
    summary: String,
) -> tokio::task::JoinHandle<Result<()>> {
    tokio::task::spawn_blocking(move || {
        let res = ui::run(receiver, host, summary);
        cancel.cancel();
        res
    })
}

fn summary(config: &ProctorConfig) -> String {
    format!(
        "{}ms sampling, fullscreen {}",
        config.capture.sample_interval_ms,
        if config.session.require_fullscreen {
            "required"
        } else {
            "optional"
        }
    )
}

fn load_config(from_args: Option<String>) -> ProctorConfig {
    let from_env = env::var("PROCTOR_CONFIG").ok();
    let Some(path) = from_args.or(from_env) else {
        return ProctorConfig::default();
    };
    match ProctorConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path
                );
                ProctorConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path
            );
            ProctorConfig::default()
        }
    }
}
