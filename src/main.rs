//! bridgewatch - Seaway bridge status tracker
//!
//! Single-process service: bridge scraping, AIS ingest, statistics, and the
//! HTTP/WebSocket gateway, supervised as cooperative tasks over one
//! cancellation token.
//!
//! # Usage
//!
//! ```bash
//! # Run with built-in defaults (full roster, data/ in the working dir)
//! cargo run --release
//!
//! # Run with a config file
//! cargo run --release -- --config bridgewatch.toml
//! ```
//!
//! # Environment Variables
//!
//! - `BRIDGEWATCH_CONFIG`: path to the TOML config file
//! - `RUST_LOG`: logging level (default: info)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bridgewatch::ais::{self, AisHubClient};
use bridgewatch::api::{create_app, ApiState};
use bridgewatch::app::AppContext;
use bridgewatch::clock::SystemClock;
use bridgewatch::config::Config;
use bridgewatch::fanout;
use bridgewatch::sched;
use bridgewatch::scraper::Scraper;

/// Grace period for in-flight work after cancellation.
const SHUTDOWN_DEADLINE_SECS: u64 = 10;

#[derive(Parser, Debug)]
#[command(name = "bridgewatch")]
#[command(about = "Seaway bridge status tracker with AIS vessel fusion")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the server bind address (default from config, 0.0.0.0:8080)
    #[arg(short, long)]
    addr: Option<String>,
}

/// Task identification for supervisor logging.
#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    ScrapeLoop,
    StatsJob,
    VesselCleanup,
    BoatProbe,
    AisUdp,
    AisPoller,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::ScrapeLoop => write!(f, "ScrapeLoop"),
            TaskName::StatsJob => write!(f, "StatsJob"),
            TaskName::VesselCleanup => write!(f, "VesselCleanup"),
            TaskName::BoatProbe => write!(f, "BoatProbe"),
            TaskName::AisUdp => write!(f, "AisUdp"),
            TaskName::AisPoller => write!(f, "AisPoller"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // Config errors fail fast with an explicit message.
    let mut config = Config::load(args.config.as_deref()).context("configuration error")?;
    if let Some(addr) = args.addr {
        config.bind_addr = addr;
    }

    info!("bridgewatch starting");
    info!("  roster: {} bridges", config.bridges.len());
    info!("  timezone: {}", config.timezone);
    info!("  snapshot: {}", config.snapshot_path.display());

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let ctx = AppContext::initialize(config, Arc::new(SystemClock)).await;
    run_service(ctx, cancel_token).await?;

    info!("bridgewatch shutdown complete");
    Ok(())
}

async fn run_service(ctx: AppContext, cancel_token: CancellationToken) -> Result<()> {
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task: HTTP + WebSocket server.
    let api_state = ApiState::new(ctx.clone(), cancel_token.clone());
    let app = create_app(api_state);
    let listener = tokio::net::TcpListener::bind(&ctx.config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", ctx.config.bind_addr))?;
    info!("listening on http://{}", ctx.config.bind_addr);

    let http_cancel = cancel_token.clone();
    task_set.spawn(async move {
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            http_cancel.cancelled().await;
        })
        .await;

        match result {
            Ok(()) => Ok(TaskName::HttpServer),
            Err(e) => Err(anyhow::anyhow!("HTTP server error: {e}")),
        }
    });

    // Task: bridge scrape loop.
    let scraper = Arc::new(Scraper::new(ctx.clone()).context("failed to build scraper")?);
    {
        let ctx = ctx.clone();
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            sched::run_scrape_loop(scraper, ctx, cancel).await?;
            Ok(TaskName::ScrapeLoop)
        });
    }

    // Task: daily statistics recompute.
    {
        let ctx = ctx.clone();
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            sched::run_statistics_job(ctx, cancel).await?;
            Ok(TaskName::StatsJob)
        });
    }

    // Task: vessel cleanup sweep.
    {
        let ctx = ctx.clone();
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            sched::run_cleanup_job(ctx, cancel).await?;
            Ok(TaskName::VesselCleanup)
        });
    }

    // Task: boat-change broadcast probe.
    {
        let ctx = ctx.clone();
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            fanout::run_boat_probe(ctx, cancel).await?;
            Ok(TaskName::BoatProbe)
        });
    }

    // Task: AIS UDP listener, when enabled.
    if ctx.config.ais.udp_enabled {
        let config = ctx.config.ais.clone();
        let registry = Arc::clone(&ctx.registry);
        let clock = Arc::clone(&ctx.clock);
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            ais::udp::run(config, registry, clock, cancel).await?;
            Ok(TaskName::AisUdp)
        });
    } else {
        info!("AIS UDP listener disabled by config");
    }

    // Task: AISHub poller, when a key is configured.
    match &ctx.config.ais.aishub_api_key {
        Some(key) if !key.is_empty() => {
            let client = AisHubClient::new(&ctx.config.ais.aishub_url, key)
                .context("failed to build AISHub client")?;
            let registry = Arc::clone(&ctx.registry);
            let clock = Arc::clone(&ctx.clock);
            let cancel = cancel_token.clone();
            task_set.spawn(async move {
                ais::poller::run(client, registry, clock, cancel).await?;
                Ok(TaskName::AisPoller)
            });
        }
        _ => info!("AISHub poller disabled (no API key)"),
    }

    // Supervisor loop: any task error cancels the rest.
    let mut failure: Option<anyhow::Error> = None;
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            joined = task_set.join_next() => {
                match joined {
                    Some(Ok(Ok(name))) => info!("task {} completed", name),
                    Some(Ok(Err(e))) => {
                        error!("task failed: {e:#}");
                        failure = Some(e);
                        cancel_token.cancel();
                        break;
                    }
                    Some(Err(e)) => {
                        error!("task panicked: {e}");
                        failure = Some(anyhow::anyhow!("task panicked: {e}"));
                        cancel_token.cancel();
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Drain remaining tasks up to the soft deadline, then abandon them.
    let deadline = Duration::from_secs(SHUTDOWN_DEADLINE_SECS);
    if tokio::time::timeout(deadline, async {
        while task_set.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("shutdown deadline reached, abandoning in-flight work");
        task_set.abort_all();
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
