//! Bounded pool for in-flight transmissions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::{MailTransport, OutboundMessage, TransportError};

/// Owns transmissions handed off by the dispatch flow.
///
/// Each send gets its own timeout and outlives the cycle that submitted it.
/// At most `max_in_flight` sends talk to the provider at once; extra ones wait
/// for a permit inside their task.
#[derive(Clone)]
pub struct SendPool {
    transport: Arc<dyn MailTransport>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    timeout: Duration,
}

impl SendPool {
    pub fn new(transport: Arc<dyn MailTransport>, max_in_flight: usize, timeout: Duration) -> Self {
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tracker: TaskTracker::new(),
            timeout,
        }
    }

    /// Hand off one message. Returns `false` once the pool is draining.
    pub fn submit(&self, message: OutboundMessage) -> bool {
        if self.tracker.is_closed() {
            warn!(email_id = %message.email_id, "send pool is draining, message dropped");
            return false;
        }

        let transport = Arc::clone(&self.transport);
        let permits = Arc::clone(&self.permits);
        let timeout = self.timeout;

        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let result = match tokio::time::timeout(timeout, transport.send(&message)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };

            match result {
                Ok(message_id) => info!(
                    email_id = %message.email_id,
                    message_id = message_id.as_deref().unwrap_or(""),
                    "email transmitted"
                ),
                Err(err) => error!(
                    email_id = %message.email_id,
                    to = %message.to,
                    error = %err,
                    "email transmission failed"
                ),
            }
        });
        true
    }

    /// Sends submitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting sends and wait for the outstanding ones.
    pub async fn drain(&self) {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "draining send pool");
        }
        self.tracker.wait().await;
    }
}

impl std::fmt::Debug for SendPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendPool")
            .field("in_flight", &self.tracker.len())
            .field("available_permits", &self.permits.available_permits())
            .field("timeout", &self.timeout)
            .finish()
    }
}
