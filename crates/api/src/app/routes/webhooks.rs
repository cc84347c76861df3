use std::sync::Arc;

use axum::{body::Bytes, extract::Extension, Json};
use serde_json::Value;
use tracing::{info, warn};

use warmsend_infra::reconcile::BatchReport;

use crate::app::AppState;

/// Provider event webhook.
///
/// Always answers 200: the provider retries on anything else, and a batch
/// that failed here would fail the same way again.
pub async fn sendgrid(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Json<BatchReport> {
    let events: Vec<Value> = match serde_json::from_slice(&body) {
        Ok(events) => events,
        Err(err) => {
            warn!(error = %err, bytes = body.len(), "unparsable webhook body");
            return Json(BatchReport::default());
        }
    };

    let report = state.reconciler.apply_batch(&events).await;
    info!(
        received = report.received,
        processed = report.processed,
        unmatched = report.unmatched,
        skipped = report.skipped,
        failed = report.failed,
        "webhook batch reconciled"
    );
    Json(report)
}
