use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use meld_voice::audio::list_input_devices;
use meld_voice::config::DEFAULT_CONFIG_PATH;
use meld_voice::{create_router, AppState, Config, SessionConfig, SessionController, SessionState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meld-voice", version, about = "Realtime voice conversations with a speech model")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Talk from the terminal until Ctrl-C
    Talk {
        /// Stream this WAV file instead of the microphone
        #[arg(long)]
        wav: Option<PathBuf>,
    },
    /// Serve the HTTP control API
    Serve,
    /// List audio input devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("meld_voice=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Meld Voice v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Talk { wav } => talk(&cfg, wav).await,
        Command::Serve => serve(&cfg).await,
        Command::Devices => devices(),
    }
}

async fn talk(cfg: &Config, wav: Option<PathBuf>) -> Result<()> {
    let mut session_config = SessionConfig::from(cfg);
    session_config.input_file = wav;
    if session_config.live.api_key.is_none() {
        bail!("No API key configured; set GEMINI_API_KEY or live.api_key");
    }

    let controller = SessionController::with_system_devices(session_config);
    let mut updates = controller.subscribe();
    controller.start().await.context("Failed to start voice session")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed = 0;
    let mut last_status = String::new();
    loop {
        let view = updates.borrow_and_update().clone();
        if view.status != last_status {
            println!("[{}]", view.status);
            last_status = view.status.clone();
        }
        if view.transcript_len > printed {
            for entry in controller.transcript().await.iter().skip(printed) {
                println!("{:?}: {}", entry.speaker, entry.text);
            }
            printed = view.transcript_len;
        }
        if matches!(view.state, SessionState::Closed | SessionState::Errored) {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("Ctrl-C received");
                break;
            }
        }
    }

    let stats = controller.stop().await?;
    println!("[{}]", controller.status());
    info!(
        "Session finished: {:.1}s, {} frames sent, {} chunks played, {} dropped",
        stats.duration_secs, stats.frames_sent, stats.audio_chunks_played, stats.audio_chunks_dropped
    );
    Ok(())
}

async fn serve(cfg: &Config) -> Result<()> {
    let controller = SessionController::with_system_devices(SessionConfig::from(cfg));
    let app = create_router(AppState::new(controller));

    let addr = cfg.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down HTTP API");
        })
        .await
        .context("HTTP server failed")?;
    Ok(())
}

fn devices() -> Result<()> {
    let names = list_input_devices().context("Failed to list input devices")?;
    if names.is_empty() {
        println!("No input devices found");
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}
