//! Worker pool backed by a Tokio runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{
    Criticality, Decoupled, FailureRouter, ParallelConfig, ParallelOperations, PeriodicHandle,
    RepeatingTask, RetryTask, Task, retry,
};
use crate::{BoxedError, Error, Result, TRACING_TARGET_PARALLEL};

/// Worker pool running work on the blocking pool of a Tokio runtime.
///
/// Step logic is synchronous, so one-shot and retried work run through
/// `spawn_blocking`; periodic schedules are driven by a Tokio interval.
#[derive(Clone)]
pub struct TokioParallelOperations {
    handle: Handle,
    config: ParallelConfig,
    router: FailureRouter,
}

impl TokioParallelOperations {
    /// Creates a pool on the given runtime handle.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            config: ParallelConfig::default(),
            router: FailureRouter::new(),
        }
    }

    /// Creates a pool on the runtime of the calling thread.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            Error::internal_error()
                .with_message("no tokio runtime on the calling thread")
                .with_source(Box::new(e))
        })?;
        Ok(Self::new(handle))
    }

    /// Sets the pool configuration.
    pub fn with_config(mut self, config: ParallelConfig) -> Self {
        self.config = config;
        self
    }

    /// Hands every critical failure to `escalation` after logging it.
    pub fn with_escalation<F>(mut self, escalation: F) -> Self
    where
        F: Fn(&BoxedError) + Send + Sync + 'static,
    {
        self.router = FailureRouter::with_escalation(Arc::new(escalation));
        self
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    /// Runs `task` with the configured default attempts and delay.
    pub fn execute_with_defaults(&self, criticality: Criticality, task: RetryTask) {
        self.execute_with_retry(
            criticality,
            self.config.retry_attempts,
            self.config.retry_delay,
            task,
        );
    }

    /// Spawns a drain thread for `handler`, named after the configuration.
    pub fn decouple<E, F>(&self, handler: F) -> Result<Decoupled<E>>
    where
        E: Send + 'static,
        F: FnMut(E) + Send + 'static,
    {
        Decoupled::spawn(self.config.drain_thread_name.clone(), handler)
    }
}

impl ParallelOperations for TokioParallelOperations {
    fn execute(&self, criticality: Criticality, task: Task) {
        let router = self.router.clone();
        self.handle.spawn_blocking(move || {
            if let Err(error) = task() {
                router.route(criticality, &error);
            }
        });
    }

    fn schedule_periodic(
        &self,
        interval: Duration,
        criticality: Criticality,
        task: RepeatingTask,
    ) -> Result<PeriodicHandle> {
        if interval.is_zero() {
            return Err(Error::invalid_input().with_message("periodic interval must be non-zero"));
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let busy = Arc::new(AtomicBool::new(false));
        let router = self.router.clone();
        let handle = self.handle.clone();

        self.handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if busy.swap(true, Ordering::AcqRel) {
                    tracing::trace!(
                        target: TRACING_TARGET_PARALLEL,
                        "Previous periodic run still active, skipping tick"
                    );
                    continue;
                }

                let guard = BusyGuard(Arc::clone(&busy));
                let task = Arc::clone(&task);
                let router = router.clone();
                handle.spawn_blocking(move || {
                    let _guard = guard;
                    if let Err(error) = task() {
                        router.route(criticality, &error);
                    }
                });
            }

            tracing::debug!(target: TRACING_TARGET_PARALLEL, "Periodic schedule stopped");
        });

        Ok(PeriodicHandle::new(token))
    }

    fn execute_with_retry(
        &self,
        criticality: Criticality,
        attempts: u32,
        delay: Duration,
        task: RetryTask,
    ) {
        let router = self.router.clone();
        self.handle.spawn_blocking(move || {
            let mut task = task;
            if let Err(error) = retry(attempts, delay, &mut task) {
                router.route(criticality, &(Box::new(error) as BoxedError));
            }
        });
    }
}

impl std::fmt::Debug for TokioParallelOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioParallelOperations")
            .field("config", &self.config)
            .field("router", &self.router)
            .finish()
    }
}

/// Clears the busy flag of a periodic schedule, even if the task panics.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    use super::*;

    type TaskResult = std::result::Result<(), BoxedError>;

    fn escalating_pool() -> (TokioParallelOperations, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let pool = TokioParallelOperations::current()
            .expect("inside runtime")
            .with_escalation(move |error| {
                if let Ok(tx) = tx.lock() {
                    let _ = tx.send(error.to_string());
                }
            });
        (pool, rx)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_execute_runs_task() {
        let (pool, _rx) = escalating_pool();
        let (tx, rx) = mpsc::channel();
        pool.execute(
            Criticality::Critical,
            Box::new(move || -> TaskResult {
                let _ = tx.send(42);
                Ok(())
            }),
        );
        let value = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .expect("join");
        assert_eq!(value.ok(), Some(42));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_critical_failure_escalates() {
        let (pool, rx) = escalating_pool();
        pool.execute(
            Criticality::Critical,
            Box::new(|| -> TaskResult { Err("station offline".into()) }),
        );
        let message = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .expect("join");
        assert_eq!(message.ok().as_deref(), Some("station offline"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_non_critical_failure_does_not_escalate() {
        let (pool, rx) = escalating_pool();
        pool.execute(
            Criticality::NonCritical,
            Box::new(|| -> TaskResult { Err("ignored".into()) }),
        );
        let message =
            tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_millis(200)))
                .await
                .expect("join");
        assert!(message.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retry_exhaustion_escalates() {
        let (pool, rx) = escalating_pool();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        pool.execute_with_retry(
            Criticality::Critical,
            3,
            Duration::from_millis(1),
            Box::new(move || -> TaskResult {
                counted.fetch_add(1, Ordering::SeqCst);
                Err("jammed".into())
            }),
        );
        let message = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .expect("join");
        assert!(message.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_periodic_does_not_stack() {
        let (pool, _rx) = escalating_pool();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let (a, m, r) = (Arc::clone(&active), Arc::clone(&max_active), Arc::clone(&runs));
        let handle = pool
            .schedule_periodic(
                Duration::from_millis(5),
                Criticality::NonCritical,
                Arc::new(move || -> TaskResult {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    m.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    a.fetch_sub(1, Ordering::SeqCst);
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .expect("valid interval");

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop();
        assert!(handle.is_stopped());
        assert!(runs.load(Ordering::SeqCst) >= 1);
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_periodic_rejects_zero_interval() {
        let (pool, _rx) = escalating_pool();
        let result = pool.schedule_periodic(
            Duration::ZERO,
            Criticality::Critical,
            Arc::new(|| -> TaskResult { Ok(()) }),
        );
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_slow_listener_does_not_block_sender() {
        let pool = TokioParallelOperations::current()
            .expect("inside runtime")
            .with_config(ParallelConfig::new().with_drain_thread_name("slow-listener"));
        let (tx, rx) = mpsc::channel();
        let listener = pool
            .decouple(move |event: u32| {
                std::thread::sleep(Duration::from_millis(50));
                let name = std::thread::current().name().map(str::to_owned);
                let _ = tx.send((event, name));
            })
            .expect("drain thread spawns");

        let started = std::time::Instant::now();
        for event in 0..4 {
            assert!(listener.send(event));
        }
        assert!(started.elapsed() < Duration::from_millis(50));

        let received = tokio::task::spawn_blocking(move || {
            (0..4)
                .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("event"))
                .collect::<Vec<_>>()
        })
        .await
        .expect("join");
        let events: Vec<_> = received.iter().map(|(event, _)| *event).collect();
        assert_eq!(events, vec![0, 1, 2, 3]);
        assert!(received
            .iter()
            .all(|(_, name)| name.as_deref() == Some("slow-listener")));
    }
}
