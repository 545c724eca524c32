use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{response::IntoResponse, Json};
use certsync_destinations::DestinationsBuilder;
use certsync_domain::{secret::AnnotationKeys, store::SecretStore};
use k8s::k8s_secret_store::KubeSecretStore;
use serde_json::json;
use sync::{CycleReport, SyncOrchestrator};
use tracing::info;

pub use env_config::EnvConfig;

pub mod env_config;
pub mod k8s;
pub mod sync;

#[cfg(test)]
mod test_support;

pub const HEALTH_READINESS_PATH: &str = "/health/readiness";

struct Init {
    orchestrator: SyncOrchestrator,
    env_config: EnvConfig,
}

/// Run the controller until a termination signal arrives
pub async fn serve() -> anyhow::Result<()> {
    let Init {
        orchestrator,
        env_config,
    } = initialize().await?;

    let shutdown = tower_server::signal::termination_signal();

    tokio::spawn(
        tower_server::Builder::new(SocketAddr::new(
            Ipv4Addr::UNSPECIFIED.into(),
            env_config.health_port,
        ))
        .with_graceful_shutdown(shutdown.clone())
        .bind()
        .await?
        .serve(health_router()),
    );

    info!(
        interval = ?env_config.sync_interval(),
        namespaces = ?env_config.namespaces(),
        "starting sync loop"
    );

    orchestrator
        .run(env_config.sync_interval(), shutdown)
        .await;

    Ok(())
}

/// Run exactly one cycle
pub async fn run_once() -> anyhow::Result<CycleReport> {
    let Init { orchestrator, .. } = initialize().await?;

    Ok(orchestrator.run_cycle().await?)
}

async fn initialize() -> anyhow::Result<Init> {
    let env_config = EnvConfig::load()?;
    let keys = AnnotationKeys::new(env_config.operator_name.trim());

    let store: Arc<dyn SecretStore> = Arc::new(KubeSecretStore::try_default().await?);

    let destinations = DestinationsBuilder {
        keys: keys.clone(),
        aws: env_config.aws_params(),
        incapsula_api_url: env_config.incapsula_api_url.clone(),
        store: store.clone(),
        http_client: reqwest::Client::builder()
            .timeout(env_config.remote_timeout())
            .build()?,
    }
    .build()
    .await;

    let orchestrator = SyncOrchestrator::new(store, destinations, keys)
        .with_namespaces(env_config.namespaces())
        .with_remote_timeout(env_config.remote_timeout());

    Ok(Init {
        orchestrator,
        env_config,
    })
}

fn health_router() -> axum::Router {
    axum::Router::new().route(
        HEALTH_READINESS_PATH,
        axum::routing::get(|| async { Json(json!({ "status": "UP" })).into_response() }),
    )
}
