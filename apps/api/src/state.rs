use std::sync::Arc;

use crate::broker::BrokerHub;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// One broker client per job family, built once at startup and shared by every request.
    pub broker: Arc<BrokerHub>,
}
