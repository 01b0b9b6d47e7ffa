use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::broker::ConnectionState;
use crate::state::AppState;

/// GET /health
/// Returns service status plus per-family broker connection state and pending counts.
/// Reports "degraded" while any family's reply subscription is down.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let families = state.broker.status();
    let all_connected = families
        .iter()
        .all(|f| f.state == ConnectionState::Connected);

    Json(json!({
        "status": if all_connected { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "service": "hirewire-api",
        "broker": families,
    }))
}
