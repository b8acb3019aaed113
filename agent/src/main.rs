//! fsmon agent: watches configured directory trees and periodically
//! reports per-path file metrics.
//!
//! Each configured target runs its own watch engine on its own task
//! and reports once when its baseline walk completes; a reporter task
//! then renders every store on the configured cadence.
//! Ctrl-C cancels all engines and emits a final snapshot on the way
//! out.

mod config;
mod reporter;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fsmon_engine::{EngineState, MetricStore, NotifyBackend, WatchEngine};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::AgentConfig;

/// Watch directory trees and report per-path file metrics.
#[derive(Debug, Parser)]
#[command(name = "fsmon-agent", version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = AgentConfig::load(&args.config)?;

    run(config).await
}

async fn run(config: AgentConfig) -> Result<()> {
    let mut engines = JoinSet::new();
    let mut stores: Vec<(String, Arc<MetricStore>)> = Vec::new();
    let mut tokens = Vec::new();

    for target in &config.targets {
        let backend = NotifyBackend::new()
            .with_context(|| format!("creating watch backend for {}", target.name))?;
        let mut engine = WatchEngine::new(target.to_watch_target(), backend)
            .with_context(|| format!("starting target {}", target.name))?;

        stores.push((target.name.clone(), engine.store()));
        tokens.push(engine.cancellation_token());

        let name = target.name.clone();
        let store = engine.store();
        let json = config.json;
        engines.spawn(async move {
            engine.baseline().await;
            // the baseline snapshot goes out before any event is
            // reconciled
            report_one(&name, &store, json).await;
            (name, engine.watch().await)
        });
    }

    info!("watching {} target(s)", stores.len());

    let reporter_cancel = CancellationToken::new();
    let reporter = {
        let stores = stores.clone();
        let json = config.json;
        let interval = config.report_interval();
        let cancel = reporter_cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume the immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => report(&stores, json).await,
                }
            }
        })
    };

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            joined = engines.join_next() => match joined {
                None => {
                    info!("all targets finished");
                    break;
                }
                Some(Ok((name, Ok(EngineState::Drained)))) => {
                    warn!("target {name} drained: its watched tree is gone");
                }
                Some(Ok((name, Ok(state)))) => {
                    info!("target {name} stopped in state {state:?}");
                }
                Some(Ok((name, Err(err)))) => {
                    error!("target {name} failed: {err}");
                }
                Some(Err(err)) => {
                    error!("engine task panicked: {err}");
                }
            }
        }
    }

    for token in &tokens {
        token.cancel();
    }
    while engines.join_next().await.is_some() {}
    reporter_cancel.cancel();
    let _ = reporter.await;

    // final snapshot on the way out
    report(&stores, config.json).await;

    Ok(())
}

async fn report(stores: &[(String, Arc<MetricStore>)], json: bool) {
    for (name, store) in stores {
        report_one(name, store, json).await;
    }
}

async fn report_one(name: &str, store: &MetricStore, json: bool) {
    let snapshot = store.snapshot().await;
    info!("reporting {} path(s) for {name}", snapshot.len());

    if json {
        match reporter::render_json(name, &snapshot) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => error!("cannot render snapshot for {name}: {err}"),
        }
    } else {
        print!("{}", reporter::render(name, &snapshot));
    }
}
