use anyhow::{Context, Result};
use clap::Parser;
use relay_account::{implementations::local::LocalWallet, AccountInterface};
use relay_config::{Config, ConfigLoader};
use relay_core::RelayBuilder;
use relay_types::{truncate_hash, RelayEvent};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	let config = ConfigLoader::new()
		.with_file(&args.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

	let log_level = args
		.log_level
		.clone()
		.unwrap_or_else(|| config.relay.log_level.clone());
	setup_tracing(&log_level);

	match args.command {
		Some(Command::Start) | None => start_service(config).await,
		Some(Command::Validate) => validate_config(config),
	}
}

async fn start_service(config: Config) -> Result<()> {
	info!("Starting meta-transaction relay");
	info!("Relay name: {}", config.relay.name);

	let api_config = config.api.clone();

	// The builder owns the config from here; the key is wiped once it is done.
	let engine = RelayBuilder::new(config)
		.build()
		.await
		.context("Failed to build relay engine")?;
	let engine = Arc::new(engine);

	let events = engine.event_bus().subscribe();
	let event_handle = tokio::spawn(log_events(events));

	let app = api::router(api::AppState {
		engine: engine.clone(),
	});
	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = tokio::net::TcpListener::bind(&bind_address)
		.await
		.with_context(|| format!("Failed to bind {}", bind_address))?;

	info!("API server listening on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await
		.context("API server failed")?;

	event_handle.abort();
	info!("Relay stopped");
	Ok(())
}

fn validate_config(config: Config) -> Result<()> {
	let operator = LocalWallet::new(&config.account.private_key)
		.context("Operator key is not usable")?;
	let domain = config.forwarder_domain()?;

	info!("Configuration is valid");
	info!("  Relay: {}", config.relay.name);
	info!("  Chain ID: {}", config.network.chain_id);
	info!("  Forwarder: {} ({} v{})", domain.address, domain.name, domain.version);
	info!("  Operator: {}", operator.address());
	info!(
		"  Gas: default {} / max {}",
		config.gas.default_limit, config.gas.max_limit
	);
	info!("  Storage: {:?}", config.storage.backend);
	info!("  API: {}:{}", config.api.host, config.api.port);

	Ok(())
}

/// Logs every relay event until the bus closes.
async fn log_events(mut events: broadcast::Receiver<RelayEvent>) {
	loop {
		match events.recv().await {
			Ok(event) => log_event(&event),
			Err(broadcast::error::RecvError::Lagged(skipped)) => {
				warn!(skipped, "Event logger lagging behind");
			}
			Err(broadcast::error::RecvError::Closed) => break,
		}
	}
}

fn log_event(event: &RelayEvent) {
	match event {
		RelayEvent::Accepted {
			request_id,
			user,
			nonce,
		} => info!(%request_id, %user, nonce, "Relay request accepted"),
		RelayEvent::Rejected {
			request_id,
			user,
			nonce,
			stage,
			reason,
		} => info!(%request_id, %user, nonce, %stage, %reason, "Relay request rejected"),
		RelayEvent::Submitted {
			request_id,
			tx_hash,
			..
		} => info!(%request_id, tx_hash = %truncate_hash(tx_hash), "Relay transaction submitted"),
		RelayEvent::Confirmed {
			request_id,
			tx_hash,
			block_number,
			gas_used,
		} => info!(
			%request_id,
			tx_hash = %truncate_hash(tx_hash),
			block_number,
			gas_used,
			"Relay transaction confirmed"
		),
		RelayEvent::Reverted {
			request_id,
			tx_hash,
			reason,
		} => warn!(
			%request_id,
			tx_hash = %truncate_hash(tx_hash),
			reason = reason.as_deref().unwrap_or("unknown"),
			"Relay transaction reverted"
		),
		RelayEvent::TimedOut {
			request_id,
			tx_hash,
		} => warn!(
			%request_id,
			tx_hash = %truncate_hash(tx_hash),
			"Relay transaction not confirmed in time"
		),
	}
}

fn setup_tracing(log_level: &str) {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				error!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}

	info!("Shutdown signal received");
}
