use axum::{
    routing::{get, post, put},
    Router,
};

pub mod recipients;
pub mod system;
pub mod unsubscribe;
pub mod webhooks;

/// Unauthenticated endpoints reached by the provider and by recipients.
pub fn router() -> Router {
    Router::new()
        .route("/webhooks/sendgrid", post(webhooks::sendgrid))
        .route(
            "/unsubscribe/:token",
            get(unsubscribe::page).put(unsubscribe::confirm),
        )
}

/// Endpoints behind the admin bearer token.
pub fn admin_router() -> Router {
    Router::new()
        .route("/recipients", put(recipients::import))
        .route("/recipients/warmup", put(recipients::set_warmup))
}
