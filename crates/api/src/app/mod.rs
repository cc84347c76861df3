//! HTTP application wiring (Axum router + shared state).
//!
//! - `services.rs`: store, transport and validator construction from config
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tokio::sync::mpsc;
use tower::ServiceBuilder;

use warmsend_infra::flows::RecipientImport;
use warmsend_infra::reconcile::Reconciler;
use warmsend_infra::store::DataStore;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// State shared by every handler.
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub reconciler: Reconciler<Arc<dyn DataStore>>,
    /// Feeds the import worker.
    pub imports: mpsc::Sender<RecipientImport>,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DataStore>,
        imports: mpsc::Sender<RecipientImport>,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(Arc::clone(&store)),
            store,
            imports,
            admin_token: admin_token.map(Arc::from),
        }
    }
}

/// Build the full HTTP router.
pub fn build_app(state: AppState) -> Router {
    let auth = middleware::AdminAuth {
        token: state.admin_token.clone(),
    };
    let state = Arc::new(state);

    let admin = routes::admin_router().route_layer(axum::middleware::from_fn_with_state(
        auth,
        middleware::admin_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/status/ready", get(routes::system::ready))
        .merge(routes::router())
        .merge(admin)
        .layer(ServiceBuilder::new().layer(Extension(state)))
}
