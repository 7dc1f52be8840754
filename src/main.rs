use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lex_live::audio::{AudioBackendFactory, AudioSource};
use lex_live::{
    create_router, AppState, Config, ConversationState, GeminiConnector, SessionConfig,
    VoiceSession,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lex-live")]
#[command(about = "Live voice tutor over a streaming speech model")]
struct Cli {
    /// Config file, without extension
    #[arg(short, long, default_value = "config/lex-live")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control surface
    Serve,

    /// Hold one voice conversation in the terminal
    Talk {
        /// Use a WAV file as the microphone
        #[arg(short, long)]
        input: Option<String>,

        /// Write the model's speech to a WAV file (file input only)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    info!("Lex Live v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Talk { input, output } => {
            let source = match input {
                Some(input) => AudioSource::File {
                    input: expand_path(&input),
                    output: output.as_deref().map(expand_path),
                },
                None => {
                    if output.is_some() {
                        warn!("--output is ignored without --input");
                    }
                    AudioSource::Microphone
                }
            };
            talk(cfg, source).await
        }
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

fn build_session(cfg: &Config, source: AudioSource) -> Result<Arc<VoiceSession>> {
    let devices = AudioBackendFactory::create(source).context("Failed to open audio devices")?;
    let connector = Arc::new(GeminiConnector::new(cfg.live.endpoint.clone()));

    Ok(Arc::new(VoiceSession::new(
        SessionConfig::from_config(cfg),
        connector,
        devices,
    )))
}

async fn serve(cfg: Config) -> Result<()> {
    let voice = build_session(&cfg, AudioSource::Microphone)?;
    let app = create_router(AppState::new(Arc::clone(&voice)));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    voice.stop().await;
    info!("Shutdown complete");
    Ok(())
}

async fn talk(cfg: Config, source: AudioSource) -> Result<()> {
    let voice = build_session(&cfg, source)?;
    let mut states = voice.subscribe_state();
    let mut reports = voice.subscribe_report();

    let session_id = voice.start().await.context("Failed to start voice session")?;
    info!("Session {} is live. Press Ctrl+C to stop", session_id);

    let mut printed = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                println!("[{}]", state.label());
                if state == ConversationState::Disconnected {
                    break;
                }
            }
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                for turn in report.turns.iter().skip(printed) {
                    println!("model: {}", turn.text);
                }
                printed = printed.max(report.turns.len());
            }
        }
    }

    let stats = voice.stop().await;
    info!(
        "Session ended after {:.1}s: {} chunks sent, {} buffers played, {} turns",
        stats.duration_secs, stats.chunks_sent, stats.buffers_scheduled, stats.turns_count
    );
    if let Some(reason) = stats.end_reason {
        info!("End reason: {:?}", reason);
    }

    Ok(())
}
