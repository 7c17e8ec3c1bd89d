//! Long-running relay commands: stream, consume, or both.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use market_relay_broker::{BrokerError, ConsumerStats};
use market_relay_cli::{join_consumers, RelayServices};
use market_relay_core::AppConfig;
use market_relay_stream::{StreamExit, StreamSupervisor, StreamTarget, WsFrameSource};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Arguments shared by the long-running commands.
#[derive(Args, Debug, Clone)]
pub struct RelayArgs {
    /// Raw topic to stream, may be repeated. Defaults to `streams.enabled`.
    #[arg(long = "topic")]
    pub topics: Vec<String>,

    /// Seconds to wait for consumer groups to finish their current message on shutdown
    #[arg(long, default_value_t = 10)]
    pub grace_secs: u64,
}

impl RelayArgs {
    fn enabled_topics(&self, config: &AppConfig) -> Vec<String> {
        if self.topics.is_empty() {
            config.streams.enabled.clone()
        } else {
            self.topics.clone()
        }
    }
}

/// Streams exchange feeds onto the broker until every stream ends or the
/// process is interrupted.
///
/// # Errors
/// Returns an error if a backing service is unreachable or exchanges cannot be listed.
pub async fn run_stream(config: AppConfig, args: RelayArgs) -> Result<()> {
    let services = RelayServices::connect(&config).await?;
    let supervisor = services.supervisor(&config, Arc::new(WsFrameSource));

    let spawned = supervisor.start_configured(&args.enabled_topics(&config)).await?;
    if spawned == 0 {
        warn!("No streams started; are exchanges and symbols seeded?");
        return Ok(());
    }

    tokio::select! {
        () = wait_idle(&supervisor) => {
            log_exits(supervisor.join_all().await);
        }
        result = shutdown_signal() => {
            result?;
            supervisor.abort_all();
        }
    }
    Ok(())
}

/// Runs every consumer group until interrupted.
///
/// # Errors
/// Returns an error if a backing service is unreachable.
pub async fn run_consume(config: AppConfig, args: RelayArgs) -> Result<()> {
    let services = RelayServices::connect(&config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = services.spawn_consumers(&config, &shutdown_rx);
    info!(groups = handles.len(), "consumer groups running");

    shutdown_signal().await?;
    let _ = shutdown_tx.send(true);
    drain(handles, args.grace_secs).await;
    Ok(())
}

/// Streams and consumes in one process until interrupted.
///
/// # Errors
/// Returns an error if a backing service is unreachable or exchanges cannot be listed.
pub async fn run_all(config: AppConfig, args: RelayArgs) -> Result<()> {
    let services = RelayServices::connect(&config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = services.spawn_consumers(&config, &shutdown_rx);
    let supervisor = services.supervisor(&config, Arc::new(WsFrameSource));
    let spawned = supervisor.start_configured(&args.enabled_topics(&config)).await?;
    info!(groups = handles.len(), streams = spawned, "relay running, press Ctrl+C to stop");

    shutdown_signal().await?;
    supervisor.abort_all();
    let _ = shutdown_tx.send(true);
    drain(handles, args.grace_secs).await;
    Ok(())
}

async fn drain(handles: Vec<JoinHandle<Result<ConsumerStats, BrokerError>>>, grace_secs: u64) {
    match tokio::time::timeout(Duration::from_secs(grace_secs), join_consumers(handles)).await {
        Ok(stats) => info!(
            received = stats.received,
            handled = stats.handled,
            failed = stats.failed,
            "consumer groups stopped"
        ),
        // Groups blocked on an empty topic only notice shutdown on their next message.
        Err(_) => warn!(grace_secs, "consumer groups still waiting, exiting"),
    }
}

async fn wait_idle(supervisor: &StreamSupervisor) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tick.tick().await;
        if supervisor.running_count() == 0 {
            return;
        }
    }
}

fn log_exits(exits: Vec<(StreamTarget, StreamExit)>) {
    for (target, exit) in exits {
        match exit {
            StreamExit::Closed { frames } => {
                info!(stream = %target.label(), frames, "stream closed by server");
            }
            StreamExit::ReadFailed { frames, error } => {
                warn!(stream = %target.label(), frames, %error, "stream read failed");
            }
            StreamExit::GaveUp { attempts, error } => {
                warn!(stream = %target.label(), attempts, %error, "stream never connected");
            }
        }
    }
}

async fn shutdown_signal() -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
    }
    Ok(())
}
