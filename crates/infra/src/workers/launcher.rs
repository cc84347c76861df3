//! Recurring flow launcher.
//!
//! Runs a unit of work once immediately and then on every interval tick until
//! shutdown. Every run gets a fresh cancellation token bounded by the run
//! timeout and executes behind a panic boundary, so a failing or panicking run
//! never takes the loop down with it.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use warmsend_observability::panic::payload_message;

use super::Shutdown;
use crate::error::FlowError;

/// How consecutive runs of one flow relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// Each run is awaited before the next tick is taken. A slow run delays
    /// the schedule.
    #[default]
    Serialized,
    /// Each tick starts a run without waiting for the previous one.
    Overlapping,
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub name: String,
    pub interval: Duration,
    pub run_timeout: Duration,
    pub mode: LaunchMode,
}

impl LaunchConfig {
    pub fn new(name: impl Into<String>, interval: Duration, run_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            run_timeout,
            mode: LaunchMode::Serialized,
        }
    }

    pub fn with_mode(mut self, mode: LaunchMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Per-run context handed to the unit of work.
#[derive(Debug, Clone)]
pub struct RunContext {
    name: Arc<str>,
    run: u64,
    deadline: Instant,
    token: CancellationToken,
}

impl RunContext {
    pub(crate) fn new(name: Arc<str>, run: u64, timeout: Duration) -> Self {
        Self {
            name,
            run,
            deadline: Instant::now() + timeout,
            token: CancellationToken::new(),
        }
    }

    /// Context for driving a flow by hand, outside any launcher.
    pub fn detached(name: &str, timeout: Duration) -> Self {
        Self::new(Arc::from(name), 0, timeout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based run counter of the owning launcher.
    pub fn run(&self) -> u64 {
        self.run
    }

    /// Time left before the run is timed out.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Sleep unless the run is cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), FlowError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(FlowError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Fail with `Cancelled` if the run has been cancelled.
    pub fn checkpoint(&self) -> Result<(), FlowError> {
        if self.token.is_cancelled() {
            Err(FlowError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Run counters of one launcher or worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LaunchStats {
    pub runs: u64,
    pub failures: u64,
    pub panics: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
    TimedOut,
    Panicked,
}

/// How one run ended, with the error text for anything but completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunReport {
    pub(crate) outcome: RunOutcome,
    pub(crate) detail: Option<String>,
}

impl RunReport {
    fn completed() -> Self {
        Self {
            outcome: RunOutcome::Completed,
            detail: None,
        }
    }

    fn failed(outcome: RunOutcome, detail: String) -> Self {
        Self {
            outcome,
            detail: Some(detail),
        }
    }

    pub(crate) fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

pub(crate) fn record(stats: &Mutex<LaunchStats>, outcome: RunOutcome) {
    let Ok(mut stats) = stats.lock() else {
        return;
    };
    stats.runs += 1;
    match outcome {
        RunOutcome::Completed => {}
        RunOutcome::Cancelled | RunOutcome::Failed => stats.failures += 1,
        RunOutcome::TimedOut => stats.timeouts += 1,
        RunOutcome::Panicked => stats.panics += 1,
    }
}

pub(crate) fn snapshot(stats: &Mutex<LaunchStats>) -> LaunchStats {
    stats.lock().map(|s| *s).unwrap_or_default()
}

/// Execute one unit of work with a timeout and a panic boundary.
///
/// Logging is left to the caller, which knows what else belongs on the
/// event.
pub(crate) async fn execute<Fut>(
    ctx: RunContext,
    timeout: Duration,
    work: impl FnOnce(RunContext) -> Fut,
) -> RunReport
where
    Fut: Future<Output = Result<(), FlowError>>,
{
    let token = ctx.token.clone();

    let guarded = AssertUnwindSafe(async move { tokio::time::timeout(timeout, work(ctx)).await });
    match guarded.catch_unwind().await {
        Ok(Ok(Ok(()))) => RunReport::completed(),
        Ok(Ok(Err(err @ FlowError::Cancelled))) => RunReport::failed(RunOutcome::Cancelled, err.to_string()),
        Ok(Ok(Err(err))) => RunReport::failed(RunOutcome::Failed, err.to_string()),
        Ok(Err(_elapsed)) => {
            token.cancel();
            RunReport::failed(
                RunOutcome::TimedOut,
                format!("timed out after {:.1}s", timeout.as_secs_f64()),
            )
        }
        Err(payload) => RunReport::failed(RunOutcome::Panicked, payload_message(payload.as_ref())),
    }
}

fn log_run(name: &str, run: u64, report: &RunReport) {
    let error = report.detail.as_deref().unwrap_or_default();
    match report.outcome {
        RunOutcome::Completed => debug!(flow = name, run, "run completed"),
        RunOutcome::Cancelled => warn!(flow = name, run, "run cancelled"),
        RunOutcome::Failed => error!(flow = name, run, error, "run failed"),
        RunOutcome::TimedOut => error!(flow = name, run, error, "run timed out"),
        RunOutcome::Panicked => error!(flow = name, run, panic = error, "run panicked"),
    }
}

/// Handle to a spawned launcher.
#[derive(Debug)]
pub struct FlowHandle {
    name: String,
    join: JoinHandle<LaunchStats>,
}

impl FlowHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the launcher to stop. Only returns after shutdown has been
    /// triggered and every in-flight run has finished.
    pub async fn join(self) -> LaunchStats {
        match self.join.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(flow = %self.name, error = %err, "launcher task failed");
                LaunchStats::default()
            }
        }
    }
}

#[derive(Debug)]
pub struct FlowLauncher;

impl FlowLauncher {
    /// Spawn a launcher for `unit` on the current runtime.
    pub fn spawn<F, Fut>(config: LaunchConfig, shutdown: &Shutdown, unit: F) -> FlowHandle
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
    {
        let name = config.name.clone();
        let shutdown = shutdown.clone();
        let join = tokio::spawn(launch_loop(config, shutdown, Arc::new(unit)));
        FlowHandle { name, join }
    }
}

async fn launch_loop<F, Fut>(config: LaunchConfig, shutdown: Shutdown, unit: Arc<F>) -> LaunchStats
where
    F: Fn(RunContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
{
    let name: Arc<str> = Arc::from(config.name.as_str());
    let stats = Arc::new(Mutex::new(LaunchStats::default()));
    let tracker = TaskTracker::new();

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        flow = %name,
        interval_secs = config.interval.as_secs_f64(),
        mode = ?config.mode,
        "flow started"
    );

    let mut run = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        run += 1;
        let ctx = RunContext::new(Arc::clone(&name), run, config.run_timeout);
        let unit = Arc::clone(&unit);
        let stats = Arc::clone(&stats);
        let timeout = config.run_timeout;
        let flow = Arc::clone(&name);
        let task = async move {
            let report = execute(ctx, timeout, move |ctx| unit(ctx)).await;
            log_run(&flow, run, &report);
            record(&stats, report.outcome);
        };

        match config.mode {
            LaunchMode::Serialized => task.await,
            LaunchMode::Overlapping => {
                tracker.spawn(task);
            }
        }
    }

    tracker.close();
    if !tracker.is_empty() {
        info!(flow = %name, in_flight = tracker.len(), "waiting for in-flight runs");
    }
    tracker.wait().await;

    let stats = snapshot(&stats);
    info!(
        flow = %name,
        runs = stats.runs,
        failures = stats.failures,
        panics = stats.panics,
        timeouts = stats.timeouts,
        "flow stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn config(interval: u64, timeout: u64) -> LaunchConfig {
        LaunchConfig::new("test", Duration::from_secs(interval), Duration::from_secs(timeout))
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_every_interval() {
        let shutdown = Shutdown::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        let handle = FlowLauncher::spawn(config(10, 5), &shutdown, move |_ctx| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        shutdown.trigger();
        let stats = handle.join().await;

        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(stats.runs, 4);
        assert_eq!(stats.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panics_are_contained_and_the_next_tick_still_runs() {
        let shutdown = Shutdown::new();
        let handle = FlowLauncher::spawn(config(10, 5), &shutdown, |ctx| async move {
            if ctx.run() == 1 {
                panic!("boom in first run");
            }
            Ok(())
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        shutdown.trigger();
        let stats = handle.join().await;

        assert_eq!(stats.panics, 1);
        assert_eq!(stats.runs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_counted_as_failures() {
        let shutdown = Shutdown::new();
        let handle = FlowLauncher::spawn(config(10, 5), &shutdown, |_ctx| async move {
            Err(FlowError::precondition("not enough warmup users"))
        });

        tokio::time::sleep(Duration::from_secs(15)).await;
        shutdown.trigger();
        let stats = handle.join().await;

        assert_eq!(stats.runs, 2);
        assert_eq!(stats.failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_timeout_cancels_the_run_token() {
        let shutdown = Shutdown::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let handle = FlowLauncher::spawn(config(60, 5), &shutdown, move |ctx| {
            let flag = Arc::clone(&flag);
            async move {
                let token = ctx.token().clone();
                tokio::spawn(async move {
                    token.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                });
                tokio::time::sleep(Duration::from_secs(100)).await;
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        shutdown.trigger();
        let stats = handle.join().await;

        assert_eq!(stats.timeouts, 1);
        tokio::task::yield_now().await;
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_serialized_run_in_progress() {
        let shutdown = Shutdown::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let handle = FlowLauncher::spawn(config(5, 60), &shutdown, move |_ctx| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_secs(20)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.trigger();
        let stats = handle.join().await;

        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(stats.runs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_runs_execute_concurrently() {
        let shutdown = Shutdown::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));

        let handle = FlowLauncher::spawn(
            config(10, 60).with_mode(LaunchMode::Overlapping),
            &shutdown,
            move |_ctx| {
                let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(25)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(21)).await;
        shutdown.trigger();
        let stats = handle.join().await;

        assert!(peak.load(Ordering::SeqCst) >= 2);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert_eq!(stats.runs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn context_sleep_stops_on_cancel() {
        let ctx = RunContext::detached("manual", Duration::from_secs(30));
        ctx.token().cancel();
        assert!(matches!(
            ctx.sleep(Duration::from_secs(10)).await,
            Err(FlowError::Cancelled)
        ));
        assert!(ctx.checkpoint().is_err());
    }
}
