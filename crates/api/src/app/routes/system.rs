use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use tracing::warn;

use warmsend_infra::store::DataStore;

use crate::app::dto::StatusBody;
use crate::app::errors::json_error;
use crate::app::AppState;

pub async fn health() -> Json<StatusBody> {
    Json(StatusBody { status: "ok" })
}

pub async fn ready(Extension(state): Extension<Arc<AppState>>) -> axum::response::Response {
    match state.store.ping().await {
        Ok(()) => Json(StatusBody { status: "ready" }).into_response(),
        Err(err) => {
            warn!(error = %err, "readiness check failed");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "not_ready", err.to_string())
        }
    }
}
