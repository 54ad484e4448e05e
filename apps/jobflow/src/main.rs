mod config;
mod errors;
mod host;
mod models;
mod poller;
mod reconcile;
mod routes;
mod service_client;
mod state;
mod workflow;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, HostBackend};
use crate::host::lark::LarkBase;
use crate::host::memory::InMemoryBase;
use crate::host::{HostBase, HostBinding};
use crate::routes::build_router;
use crate::service_client::{ServiceClient, ServiceKind};
use crate::state::AppState;
use crate::workflow::WorkflowRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration errors are fatal before any network call
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting jobflow v{}", env!("CARGO_PKG_VERSION"));

    let jdw = ServiceClient::new(ServiceKind::Jdw, config.jdw.clone(), config.http_timeout)?;
    let rar = ServiceClient::new(ServiceKind::Rar, config.rar.clone(), config.http_timeout)?;
    info!(
        "Service clients ready (JDW {}, RAR {})",
        config.jdw.api_url, config.rar.api_url
    );

    let base = build_host_base(&config)?;
    let host = HostBinding::bind(base.as_ref(), &config.host_table_name)
        .await
        .with_context(|| format!("Failed to bind host table '{}'", config.host_table_name))?;

    let state = AppState {
        config: config.clone(),
        jdw,
        rar,
        host,
        registry: WorkflowRegistry::new().with_retention(config.workflow_retention),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // the panel is served from the host's origin

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The in-memory base starts with an empty recruitment table so the panel works without a host.
fn build_host_base(config: &Config) -> Result<Arc<dyn HostBase>> {
    match &config.host_backend {
        HostBackend::Memory => {
            info!("Using in-memory host table '{}'", config.host_table_name);
            Ok(Arc::new(InMemoryBase::with_recruitment_table(
                &config.host_table_name,
            )))
        }
        HostBackend::Lark {
            api_url,
            app_token,
            access_token,
        } => {
            info!("Using Lark base {app_token} at {api_url}");
            let base = LarkBase::new(api_url, app_token, access_token, config.http_timeout)?;
            Ok(Arc::new(base))
        }
    }
}
