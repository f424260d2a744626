use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use cdc_core::{
    campus_client::{CampusClient, ScheduleSource},
    gateway::Gateway,
    render::FeedMetadata,
    scheduler::RefreshScheduler,
    store::Database,
};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{config::Config, state::AppState};

mod auth;
mod config;
mod error;
mod route;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let config = Config::parse();

    let database = Database::open(&config.database_url)?;
    let source: Arc<dyn ScheduleSource> = Arc::new(CampusClient::new(&config.client_config())?);

    let cancel = CancellationToken::new();
    let refresh = match config.operator() {
        Some(operator) => {
            let scheduler = RefreshScheduler::new(
                source.clone(),
                database.events(),
                operator,
                config.scheduler_config(),
            );
            let cancel = cancel.clone();
            Some(tokio::spawn(async move { scheduler.run(cancel).await }))
        }
        None => {
            warn!("USER_ID and USER_HASH are not set, the baseline schedule stays empty");
            None
        }
    };

    let state = AppState {
        gateway: Arc::new(Gateway::new(source, database.credentials())),
        events: database.events(),
        metadata: Arc::new(FeedMetadata::default()),
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, route::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Some(refresh) = refresh {
        refresh.await?;
    }
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
}
