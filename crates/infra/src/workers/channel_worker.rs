//! Worker that drains a channel one item at a time.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::launcher::{LaunchStats, RunContext, execute, record, snapshot};
use crate::error::FlowError;

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub name: String,
    /// Upper bound for handling one item.
    pub item_timeout: Duration,
    /// Pause after a failed item before taking the next one.
    pub cooldown: Duration,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            item_timeout: Duration::from_secs(50),
            cooldown: Duration::from_secs(5),
        }
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Consumes items until every sender is dropped.
///
/// A failed, timed-out or panicking item is logged together with a JSON
/// snapshot of the item, then the worker cools down before continuing.
#[derive(Debug)]
pub struct ChannelWorker;

impl ChannelWorker {
    pub fn spawn<T, F, Fut>(
        config: ChannelConfig,
        mut receiver: mpsc::Receiver<T>,
        handler: F,
    ) -> JoinHandle<LaunchStats>
    where
        T: Serialize + Send + 'static,
        F: Fn(T, RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
    {
        tokio::spawn(async move {
            let name: Arc<str> = Arc::from(config.name.as_str());
            let stats = Mutex::new(LaunchStats::default());
            let mut run = 0u64;

            info!(worker = %name, "channel worker started");

            while let Some(item) = receiver.recv().await {
                run += 1;
                let item_snapshot = serde_json::to_string(&item)
                    .unwrap_or_else(|err| format!("<unserializable item: {err}>"));

                let ctx = RunContext::new(Arc::clone(&name), run, config.item_timeout);
                let report = execute(ctx, config.item_timeout, |ctx| handler(item, ctx)).await;
                record(&stats, report.outcome);

                if !report.is_success() {
                    error!(
                        worker = %name,
                        run,
                        outcome = ?report.outcome,
                        error = report.detail.as_deref().unwrap_or_default(),
                        item = %item_snapshot,
                        "channel item failed"
                    );
                    tokio::time::sleep(config.cooldown).await;
                }
            }

            let stats = snapshot(&stats);
            info!(
                worker = %name,
                items = stats.runs,
                failures = stats.failures,
                "channel closed, worker stopped"
            );
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize)]
    struct Item {
        n: u32,
    }

    #[tokio::test(start_paused = true)]
    async fn failed_item_triggers_cooldown_and_worker_continues() {
        let (tx, rx) = mpsc::channel(8);
        let handled = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&handled);

        let worker = ChannelWorker::spawn(ChannelConfig::new("import"), rx, move |item: Item, _ctx| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                if item.n == 2 {
                    return Err(FlowError::precondition("bad item"));
                }
                Ok(())
            }
        });

        let started = tokio::time::Instant::now();
        for n in 1..=3 {
            tx.send(Item { n }).await.unwrap();
        }
        drop(tx);

        let stats = worker.await.unwrap();
        assert_eq!(handled.load(Ordering::SeqCst), 3);
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.failures, 1);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_items_time_out_and_panics_are_contained() {
        let (tx, rx) = mpsc::channel(4);
        let config = ChannelConfig::new("slow")
            .with_item_timeout(Duration::from_secs(1))
            .with_cooldown(Duration::from_millis(10));

        let worker = ChannelWorker::spawn(config, rx, |item: Item, _ctx| async move {
            match item.n {
                0 => tokio::time::sleep(Duration::from_secs(10)).await,
                1 => panic!("handler bug"),
                _ => {}
            }
            Ok(())
        });

        for n in 0..3 {
            tx.send(Item { n }).await.unwrap();
        }
        drop(tx);

        let stats = worker.await.unwrap();
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.panics, 1);
        assert_eq!(stats.failures, 0);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn failed_item_is_logged_once_with_error_and_snapshot() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_max_level(tracing::Level::ERROR)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (tx, rx) = mpsc::channel(2);
        let config = ChannelConfig::new("import").with_cooldown(Duration::from_millis(1));
        let worker = ChannelWorker::spawn(config, rx, |item: Item, _ctx| async move {
            Err(FlowError::precondition(format!("cannot import {}", item.n)))
        });
        tx.send(Item { n: 42 }).await.unwrap();
        drop(tx);
        worker.await.unwrap();

        let logs = captured.text();
        let failures: Vec<&str> = logs.lines().filter(|line| line.contains("channel item failed")).collect();
        assert_eq!(failures.len(), 1, "{logs}");
        assert!(failures[0].contains("ERROR"), "{logs}");
        assert!(failures[0].contains("cannot import 42"), "{logs}");
        assert!(failures[0].contains(r#"item={"n":42}"#), "{logs}");
    }

    #[tokio::test]
    async fn returns_when_channel_is_closed_without_items() {
        let (tx, rx) = mpsc::channel::<Item>(1);
        drop(tx);
        let stats = ChannelWorker::spawn(ChannelConfig::new("empty"), rx, |_item, _ctx| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(stats, LaunchStats::default());
    }
}
