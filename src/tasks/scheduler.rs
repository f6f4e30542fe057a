//! Interval scheduler with start/stop lifecycle.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};

type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Errors raised when registering a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task '{0}' has a zero interval")]
    ZeroInterval(String),
}

/// A named job repeated at a fixed interval.
pub struct Task {
    name: String,
    interval: Duration,
    job: Job,
}

impl Task {
    /// Create a task that runs `job` every `interval`.
    pub fn new<F, Fut>(name: impl Into<String>, interval: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            interval,
            job: Arc::new(move || -> BoxFuture<'static, ()> { Box::pin(job()) }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

struct State {
    phase: Phase,
    pending: Vec<Task>,
    running: Vec<(String, JoinHandle<()>)>,
}

/// Runs named periodic tasks, each on its own tokio task.
pub struct Scheduler {
    state: Mutex<State>,
    shutdown: Shutdown,
    dispatch: Dispatch,
}

impl Scheduler {
    /// Create a scheduler logging through the current default dispatcher.
    pub fn new() -> Self {
        Self::with_dispatch(tracing::dispatcher::get_default(Dispatch::clone))
    }

    /// Create a scheduler whose task lines log through `dispatch`.
    pub fn with_dispatch(dispatch: Dispatch) -> Self {
        Self {
            state: Mutex::new(State {
                phase: Phase::Idle,
                pending: Vec::new(),
                running: Vec::new(),
            }),
            shutdown: Shutdown::new(),
            dispatch,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a task. Tasks added while running start immediately;
    /// tasks added after stop are discarded.
    pub fn add(&self, task: Task) -> Result<(), TaskError> {
        if task.interval.is_zero() {
            return Err(TaskError::ZeroInterval(task.name));
        }
        let mut state = self.state();
        match state.phase {
            Phase::Idle => state.pending.push(task),
            Phase::Running => {
                let name = task.name.clone();
                let handle = self.spawn(task);
                state.running.push((name, handle));
            }
            Phase::Stopped => {
                tracing::warn!(task = %task.name, "Scheduler stopped, task discarded");
            }
        }
        Ok(())
    }

    /// Activate every registered task. No-op unless idle.
    pub fn start(&self) {
        let mut state = self.state();
        if state.phase != Phase::Idle {
            return;
        }
        state.phase = Phase::Running;
        let pending = std::mem::take(&mut state.pending);
        for task in pending {
            tracing::debug!(task = %task.name, interval = ?task.interval, "Scheduling task");
            let name = task.name.clone();
            let handle = self.spawn(task);
            state.running.push((name, handle));
        }
        tracing::info!(tasks = state.running.len(), "Scheduler started");
    }

    /// Stop every task and wait for in-flight job bodies to finish.
    pub async fn stop(&self) {
        let running = {
            let mut state = self.state();
            if state.phase == Phase::Stopped {
                return;
            }
            state.phase = Phase::Stopped;
            state.pending.clear();
            std::mem::take(&mut state.running)
        };

        self.shutdown.trigger();
        for (name, handle) in running {
            if let Err(e) = handle.await {
                tracing::error!(task = %name, error = %e, "Scheduled task ended abnormally");
            }
        }
        tracing::info!("Scheduler stopped");
    }

    /// Names of registered tasks, pending or running.
    pub fn task_names(&self) -> Vec<String> {
        let state = self.state();
        state
            .pending
            .iter()
            .map(|t| t.name.clone())
            .chain(state.running.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.state().phase == Phase::Running
    }

    fn spawn(&self, task: Task) -> JoinHandle<()> {
        let signal = self.shutdown.subscribe();
        tokio::spawn(run_task(task, signal).with_subscriber(self.dispatch.clone()))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_task(task: Task, mut signal: ShutdownSignal) {
    let mut ticker = time::interval_at(Instant::now() + task.interval, task.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = signal.recv() => break,
            _ = ticker.tick() => {}
        }
        tracing::trace!(task = %task.name, "Running scheduled task");
        (task.job)().await;
    }
    tracing::debug!(task = %task.name, "Scheduled task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn counting_task(name: &str, every: Duration, counter: &Arc<AtomicUsize>) -> Task {
        let counter = Arc::clone(counter);
        Task::new(name, every, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn runs_once_per_interval_after_start() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler.add(counting_task("tick", Duration::from_secs(30), &count)).unwrap();
        scheduler.start();

        time::sleep(Duration::from_secs(29)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_rejected() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let err = scheduler
            .add(counting_task("spin", Duration::ZERO, &count))
            .unwrap_err();
        assert!(matches!(err, TaskError::ZeroInterval(name) if name == "spin"));
        assert!(scheduler.task_names().is_empty());

        scheduler.start();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_scheduler_runs_nothing() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler.add(counting_task("idle", Duration::from_secs(1), &count)).unwrap();

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.task_names(), vec!["idle".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_runs() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler.add(counting_task("tick", Duration::from_secs(1), &count)).unwrap();
        scheduler.start();

        time::sleep(Duration::from_millis(1500)).await;
        scheduler.stop().await;
        let seen = count.load(Ordering::SeqCst);
        assert_eq!(seen, 1);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_in_flight_job() {
        let scheduler = Scheduler::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        scheduler.add(Task::new("slow", Duration::from_secs(1), move || {
            let flag = Arc::clone(&flag);
            async move {
                time::sleep(Duration::from_secs(2)).await;
                flag.store(true, Ordering::SeqCst);
            }
        }))
        .unwrap();
        scheduler.start();

        time::sleep(Duration::from_millis(1100)).await;
        assert!(!done.load(Ordering::SeqCst));
        scheduler.stop().await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn task_added_while_running_is_activated() {
        let scheduler = Scheduler::new();
        scheduler.start();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler.add(counting_task("late", Duration::from_secs(1), &count)).unwrap();

        time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_final() {
        let scheduler = Scheduler::new();
        scheduler.start();
        scheduler.stop().await;
        scheduler.stop().await;

        let count = Arc::new(AtomicUsize::new(0));
        scheduler.add(counting_task("after", Duration::from_secs(1), &count)).unwrap();
        scheduler.start();
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
