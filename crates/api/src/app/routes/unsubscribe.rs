use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{Html, IntoResponse},
};

use warmsend_core::{Recipient, RecipientFlag};
use warmsend_infra::standing::flag_recipient;
use warmsend_infra::store::DataStore;

use crate::app::dto::unsubscribe_page;
use crate::app::errors::{json_error, store_error_to_response};
use crate::app::AppState;

async fn recipient_for(state: &AppState, token: &str) -> Result<Recipient, axum::response::Response> {
    match state.store.recipient_by_token(token).await {
        Ok(Some(recipient)) => Ok(recipient),
        Ok(None) => Err(json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "unknown unsubscribe link",
        )),
        Err(err) => Err(store_error_to_response(err)),
    }
}

pub async fn page(
    Extension(state): Extension<Arc<AppState>>,
    Path(token): Path<String>,
) -> axum::response::Response {
    match recipient_for(&state, &token).await {
        Ok(_) => Html(unsubscribe_page()).into_response(),
        Err(resp) => resp,
    }
}

pub async fn confirm(
    Extension(state): Extension<Arc<AppState>>,
    Path(token): Path<String>,
) -> axum::response::Response {
    let recipient = match recipient_for(&state, &token).await {
        Ok(recipient) => recipient,
        Err(resp) => return resp,
    };

    match flag_recipient(state.store.as_ref(), &recipient, RecipientFlag::Unsubscribe.into()).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_error_to_response(err),
    }
}
