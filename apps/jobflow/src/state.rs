use crate::config::Config;
use crate::host::HostBinding;
use crate::service_client::ServiceClient;
use crate::workflow::WorkflowRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub jdw: ServiceClient,
    pub rar: ServiceClient,
    /// Target table resolved at start-up.
    pub host: HostBinding,
    pub registry: WorkflowRegistry,
}
