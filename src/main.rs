use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use epg_acquire::serial::{list_ports, open_device};
use epg_acquire::session::{
    AcquisitionSession, FixedPrompt, PauseDecision, SessionRunner, SystemClock,
};
use epg_acquire::{
    create_router, reconcile_file, AcquisitionError, AppState, Config, EventBus, TrailingSample,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "epg-acquire", version, about = "EPG serial acquisition")]
struct Cli {
    /// Config file; the extension may be omitted
    #[arg(short, long, default_value = "config/epg-acquire")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the HTTP control API
    Serve,
    /// Record without the API. Reads `pause`, `resume`, `param <PARAM,...>`
    /// and `stop` from stdin; Ctrl-C stops too
    Record {
        /// Splice every paused portion out instead of keeping it
        #[arg(long)]
        discard_pauses: bool,
        /// Event log file name under the output directory
        #[arg(long)]
        file_name: Option<String>,
    },
    /// List serial ports
    Ports,
    /// Reconcile an existing event log into `<log>_processed.csv`
    Reconcile {
        log: PathBuf,
        #[arg(long)]
        drop_final_sample: bool,
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
    let cfg = Config::load(&cli.config)?;

    info!("EPG Acquire v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Commands::Serve => serve(cfg).await,
        Commands::Record {
            discard_pauses,
            file_name,
        } => record(cfg, discard_pauses, file_name.as_deref()).await,
        Commands::Ports => ports(),
        Commands::Reconcile {
            log,
            drop_final_sample,
        } => reconcile(&cfg, log, drop_final_sample),
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let addr = cfg.http_addr();
    let app = create_router(AppState::new(cfg));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn record(cfg: Config, discard_pauses: bool, file_name: Option<&str>) -> Result<()> {
    let session_config = cfg.session_config(file_name)?;
    let (port, link) = open_device(&cfg.device.manufacturers, cfg.device.baud_rate)?;
    info!("Recording from {}", port.name);

    let session = AcquisitionSession::new(session_config, EventBus::default());
    let prompt = FixedPrompt {
        decision: PauseDecision::from_keep(!discard_pauses),
        review: cfg.recording.review_processed,
    };
    let (runner, handle) =
        SessionRunner::connect(session, link, prompt, Arc::new(SystemClock)).await?;
    let task = tokio::spawn(runner.run());

    handle.start_reading().await?;
    info!("Type pause, resume, param <PARAM,...> or stop");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
        };

        let result = match line.trim() {
            "" => continue,
            "stop" => break,
            "pause" => handle.pause().await,
            "resume" => handle.resume().await,
            other => match other.strip_prefix("param ") {
                Some(param) => handle.send_param(param.trim()).await,
                None => {
                    warn!("Unknown command {:?}", other);
                    continue;
                }
            },
        };

        match result {
            Ok(()) => {}
            Err(AcquisitionError::SessionEnded) => break,
            Err(e) => error!("{}", e),
        }
    }

    match handle.stop().await {
        Ok(()) | Err(AcquisitionError::SessionEnded) => {}
        Err(e) => return Err(e.into()),
    }

    match task.await?? {
        Some(report) => info!(
            "Saved {} rows to {}",
            report.rows,
            report.output_path.display()
        ),
        None => info!("Nothing was recorded"),
    }
    Ok(())
}

fn ports() -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        info!("No serial ports found");
    }
    for port in ports {
        println!(
            "{}\t{}\t{}",
            port.name,
            port.manufacturer.as_deref().unwrap_or("-"),
            port.description.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn reconcile(cfg: &Config, log: PathBuf, drop_final_sample: bool) -> Result<()> {
    let trailing = if drop_final_sample {
        TrailingSample::Drop
    } else {
        cfg.recording.trailing_sample()
    };

    let report = reconcile_file(&log, trailing, |progress| {
        info!("Reconciled {}/{} pauses", progress.done, progress.total)
    })?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
