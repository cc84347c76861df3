use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, warn};

use warmsend_core::RecipientFlag;
use warmsend_infra::standing::{flag_recipient, unflag_recipient};
use warmsend_infra::store::DataStore;

use crate::app::dto::{ImportAccepted, ImportRequest, WarmupRequest, WarmupUpdated};
use crate::app::errors::{json_error, store_error_to_response};
use crate::app::AppState;

/// Queue addresses for import. Insertion happens on the import worker.
pub async fn import(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<ImportRequest>,
) -> axum::response::Response {
    let imports = req.into_imports();
    if imports.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "validation_error", "emails must not be empty");
    }

    let mut queued = 0;
    for item in imports {
        if state.imports.send(item).await.is_err() {
            warn!(queued, "import channel closed mid-request");
            return json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "import_closed",
                "import queue is shutting down",
            );
        }
        queued += 1;
    }

    info!(queued, "recipients queued for import");
    (StatusCode::ACCEPTED, Json(ImportAccepted { queued })).into_response()
}

/// Add or remove the warmup seed flag on existing recipients.
pub async fn set_warmup(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<WarmupRequest>,
) -> axum::response::Response {
    let addresses = req.addresses();
    if addresses.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "validation_error", "emails must not be empty");
    }

    let flag = RecipientFlag::Warmup.into();
    let mut body = WarmupUpdated { updated: 0, unknown: 0 };
    for address in addresses {
        let recipient = match state.store.recipient_by_email(address).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => {
                body.unknown += 1;
                continue;
            }
            Err(err) => return store_error_to_response(err),
        };

        let result = if req.warmup {
            flag_recipient(state.store.as_ref(), &recipient, flag).await
        } else {
            unflag_recipient(state.store.as_ref(), &recipient, flag).await
        };
        if let Err(err) = result {
            return store_error_to_response(err);
        }
        body.updated += 1;
    }

    info!(warmup = req.warmup, updated = body.updated, unknown = body.unknown, "warmup seeds updated");
    Json(body).into_response()
}
