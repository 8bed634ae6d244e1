//! `coldreach-monitor` -- command-line tail of the realtime channels.
//!
//! `events` connects the session event bus and prints every event as a
//! JSON line, together with usage and alert changes. `progress` follows
//! a single operation through its push stream or poll fallback.
//!
//! # Environment variables
//!
//! | Variable          | Required | Description                               |
//! |-------------------|----------|-------------------------------------------|
//! | `COLDREACH_TOKEN` | yes      | Session credential for every endpoint     |
//!
//! Endpoint and timing settings are read by `ClientConfig::from_env`.

mod cli;

use std::sync::Arc;

use anyhow::{bail, Context};
use coldreach_billing::UsageMonitor;
use coldreach_core::config::ClientConfig;
use coldreach_core::types::OperationId;
use coldreach_events::{BusEvent, CampaignTracker, EventBusClient, EventKind, WsConnector};
use coldreach_progress::{HttpProgressSource, ProgressOutcome, ProgressStreamClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Command;

/// Every kind printed by `events`. Batches arrive through their inner events.
const PRINTED_KINDS: [EventKind; 9] = [
    EventKind::CampaignProgress,
    EventKind::CampaignProgressDetailed,
    EventKind::CampaignStatus,
    EventKind::CampaignStatusDetailed,
    EventKind::SystemNotification,
    EventKind::ErrorNotification,
    EventKind::ServerMetrics,
    EventKind::UsageUpdate,
    EventKind::BillingAlert,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coldreach=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = match cli::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{message}\n{}", cli::USAGE);
            std::process::exit(2);
        }
    };

    let config = ClientConfig::from_env().context("Invalid client configuration")?;
    let token = std::env::var("COLDREACH_TOKEN")
        .context("COLDREACH_TOKEN environment variable is required")?;

    match command {
        Command::Events { campaigns } => tail_events(&config, &token, &campaigns).await,
        Command::Progress { operation_id } => follow_progress(&config, &token, operation_id).await,
    }
}

async fn tail_events(config: &ClientConfig, token: &str, campaigns: &[String]) -> anyhow::Result<()> {
    let bus = EventBusClient::new(Arc::new(WsConnector), config.ws_url.clone(), config.bus.clone());

    for kind in PRINTED_KINDS {
        bus.on(kind, print_event);
    }

    let usage = UsageMonitor::new(config.alert_window);
    usage.attach(&bus);
    let tracker = CampaignTracker::new();
    tracker.attach(&bus);

    for campaign_id in campaigns {
        bus.subscribe_to_campaign(campaign_id);
    }

    tracing::info!(
        ws_url = %config.ws_url,
        campaigns = campaigns.len(),
        "Starting coldreach-monitor",
    );
    bus.connect(token).context("Failed to start event bus")?;

    shutdown_signal().await;

    for campaign_id in campaigns {
        bus.unsubscribe_from_campaign(campaign_id);
    }
    usage.detach(&bus);
    tracker.detach(&bus);

    let metrics = bus.metrics();
    bus.close().await;

    tracing::info!(
        total_events = metrics.total_events,
        latency_ms = ?metrics.latency_ms,
        alerts = usage.alerts().len(),
        campaigns_tracked = tracker.all().len(),
        "Monitor stopped",
    );
    Ok(())
}

fn print_event(event: &BusEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
    }
}

async fn follow_progress(
    config: &ClientConfig,
    token: &str,
    operation_id: OperationId,
) -> anyhow::Result<()> {
    let source = Arc::new(HttpProgressSource::new(config.api_url.clone()));
    let mut client = ProgressStreamClient::new(source, config.progress.clone());
    let mut rx = client.subscribe();

    client.open(operation_id.clone(), token).await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => {
                client.close().await;
                bail!("Interrupted while following {operation_id}");
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    bail!("Progress client stopped unexpectedly");
                }
                let snapshot = rx.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&snapshot)?);
                if snapshot.outcome.is_terminal() {
                    break snapshot.outcome;
                }
            }
        }
    };

    client.close().await;

    match outcome {
        ProgressOutcome::Succeeded { .. } => Ok(()),
        ProgressOutcome::Failed { message } => bail!("Operation {operation_id} failed: {message}"),
        ProgressOutcome::TimedOut => bail!("Gave up waiting for operation {operation_id}"),
        ProgressOutcome::Pending => bail!("Operation {operation_id} ended without an outcome"),
    }
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
