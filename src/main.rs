use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emotion_vox::history::FileStore;
use emotion_vox::voice::{CommandSynthesizer, LogSynthesizer};
use emotion_vox::{
    create_router, AppState, Config, FileCapture, NatsTransport, SessionChannel, SessionHandle,
    SessionHistoryStore, SessionRunner, SessionState, SpeechSynthesizer, VoiceFeedbackEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emotion-vox", version, about = "Speak, and hear back how you sound")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/emotion-vox")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the session loop behind the HTTP control surface
    Serve {
        /// WAV file standing in for the microphone
        #[arg(long)]
        input: PathBuf,
    },
    /// Record one round from a WAV file and print the emotion reading
    Record {
        /// WAV file standing in for the microphone
        #[arg(long)]
        file: PathBuf,

        /// How long to record before stopping
        #[arg(long, default_value_t = 3)]
        seconds: u64,

        /// How long to wait for the inference reply
        #[arg(long, default_value_t = 60)]
        wait_secs: u64,
    },
    /// Print the persisted recording history
    History,
    /// Delete the persisted recording history
    ClearHistory,
}

/// Long-lived collaborators shared by every command
struct SessionContext {
    channel: Arc<SessionChannel>,
    history: Arc<SessionHistoryStore>,
    voice: Arc<VoiceFeedbackEngine>,
}

fn build_history(cfg: &Config) -> Result<Arc<SessionHistoryStore>> {
    let dir = cfg.history.resolved_path()?;
    info!("History store: {}", dir.display());
    Ok(Arc::new(SessionHistoryStore::with_key(
        Arc::new(FileStore::new(dir)),
        cfg.history.key.clone(),
    )))
}

fn build_voice(cfg: &Config) -> Arc<VoiceFeedbackEngine> {
    let synth: Arc<dyn SpeechSynthesizer> = match &cfg.voice.command {
        Some(program) => Arc::new(CommandSynthesizer::new(
            program.clone(),
            cfg.voice.command_args.clone(),
        )),
        None => Arc::new(LogSynthesizer),
    };
    info!("Speech output: {}", synth.name());
    Arc::new(VoiceFeedbackEngine::new(synth, cfg.voice.clone()))
}

async fn open_context(cfg: &Config) -> Result<SessionContext> {
    let transport = Arc::new(NatsTransport::new(
        cfg.channel.subject_prefix.clone(),
        cfg.channel.client_id.clone(),
    ));
    let channel = Arc::new(SessionChannel::new(transport));

    // An unreachable service is not fatal: sends are dropped until it returns
    if let Err(e) = channel.connect(&cfg.channel.url).await {
        error!("Inference channel unavailable: {:#}", e);
    }

    Ok(SessionContext {
        channel,
        history: build_history(cfg)?,
        voice: build_voice(cfg),
    })
}

fn spawn_session(
    cfg: &Config,
    ctx: &SessionContext,
    input: PathBuf,
) -> (SessionHandle, tokio::task::JoinHandle<Result<()>>) {
    let backend = Box::new(FileCapture::new(input, &cfg.capture));
    let (runner, handle) = SessionRunner::new(
        backend,
        Arc::clone(&ctx.channel),
        Arc::clone(&ctx.history),
        Arc::clone(&ctx.voice),
        &cfg.history.timestamp_format,
    );
    (handle, tokio::spawn(runner.run()))
}

async fn serve(cfg: Config, input: PathBuf) -> Result<()> {
    let ctx = open_context(&cfg).await?;
    ctx.history.load().await;

    let (handle, runner) = spawn_session(&cfg, &ctx, input);
    let app = create_router(AppState::new(handle.clone(), Arc::clone(&ctx.history)));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    handle.shutdown().await?;
    runner.await.context("Session loop panicked")?
}

async fn record(cfg: Config, file: PathBuf, seconds: u64, wait_secs: u64) -> Result<()> {
    let ctx = open_context(&cfg).await?;
    let (handle, runner) = spawn_session(&cfg, &ctx, file);

    handle.start().await?;
    let started = handle
        .wait_until(|s| s.state == SessionState::Recording || s.failed())
        .await?;
    if started.failed() {
        handle.shutdown().await?;
        runner.await.context("Session loop panicked")??;
        anyhow::bail!(
            "Could not start recording: {}",
            started
                .last_error
                .map(|e| e.to_string())
                .unwrap_or_default()
        );
    }

    println!("Recording for {}s...", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    handle.stop().await?;

    let waited = tokio::time::timeout(
        Duration::from_secs(wait_secs),
        handle.wait_until(|s| s.stats.replies_received > 0 || s.failed()),
    )
    .await;

    let outcome = match waited {
        Ok(snapshot) => snapshot?,
        Err(_) => {
            warn!("No reply after {}s", wait_secs);
            handle.snapshot()
        }
    };

    // Let the spoken reply get going before the process exits
    tokio::time::sleep(Duration::from_millis(250)).await;
    handle.shutdown().await?;
    runner.await.context("Session loop panicked")??;

    match (&outcome.latest, outcome.stats.replies_received) {
        (_, 0) => {
            let reason = outcome
                .last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no reply from inference service".to_string());
            anyhow::bail!("Round did not complete: {}", reason);
        }
        (Some(latest), _) => {
            println!("AI Response: {}", outcome.last_reply.unwrap_or_default());
            for sample in latest {
                println!("  {:<10} {:>6.1}", sample.name, sample.value);
            }
        }
        (None, _) => {
            println!("AI Response: {}", outcome.last_reply.unwrap_or_default());
            println!("  (no emotion data in reply)");
        }
    }

    Ok(())
}

async fn print_history(cfg: Config) -> Result<()> {
    let history = build_history(&cfg)?;
    let log = history.load().await;

    if log.is_empty() {
        println!("No recordings yet");
        return Ok(());
    }

    for entry in &log {
        match entry.primary() {
            Some(primary) => println!(
                "Recording at {}  Primary: {} ({}%)",
                entry.timestamp, primary.name, primary.value
            ),
            None => println!("Recording at {}", entry.timestamp),
        }
        for sample in &entry.emotions {
            println!("  {:<10} {:>6.1}", sample.name, sample.value);
        }
    }
    Ok(())
}

async fn clear_history(cfg: Config) -> Result<()> {
    let history = build_history(&cfg)?;
    if let Some(e) = history.clear().await {
        anyhow::bail!(e);
    }
    println!("Recording history deleted");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve { input } => serve(cfg, input).await,
        Command::Record {
            file,
            seconds,
            wait_secs,
        } => record(cfg, file, seconds, wait_secs).await,
        Command::History => print_history(cfg).await,
        Command::ClearHistory => clear_history(cfg).await,
    }
}
