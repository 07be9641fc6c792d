//! Fixed pool of single-threaded event loops.
//!
//! # Responsibilities
//! - Start `size` loop threads, each driving its own current-thread runtime
//! - Hand out loops round-robin so long-lived sessions spread evenly
//! - Queue work onto a specific loop (cross-loop hand-off is always a message)
//! - Coordinate shutdown: refuse new work, signal sessions, drain, join
//!
//! # Design Decisions
//! - A loop never runs two tasks at the same instant; tasks interleave only at await points
//! - Tasks start in the order they were submitted to the loop
//! - A panicking task is logged and does not take its loop down

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;

use crate::config::LoopConfig;
use crate::error::{Result, TransportError};
use crate::net::connection::SessionTracker;
use crate::runtime::shutdown::{Shutdown, ShutdownSignal};
use crate::runtime::task::LoopTask;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

thread_local! {
    static CURRENT_LOOP: Cell<Option<LoopId>> = const { Cell::new(None) };
}

/// Identifier of one loop inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(usize);

impl LoopId {
    /// The loop driving the calling thread, if it is a loop thread.
    pub fn current() -> Option<LoopId> {
        CURRENT_LOOP.with(Cell::get)
    }

    /// Position of the loop in its group.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop-{}", self.0)
    }
}

#[derive(Debug)]
struct GroupState {
    name: String,
    loops: Vec<mpsc::UnboundedSender<Job>>,
    /// Round-robin cursor for `assign`.
    next: AtomicUsize,
    shutting_down: AtomicBool,
    shutdown: Shutdown,
    /// Yields `None` once every loop thread has exited.
    exited: Mutex<mpsc::Receiver<()>>,
    tracker: SessionTracker,
}

/// A group of event loops shared by every session of the process.
///
/// Cheap to clone; all clones refer to the same loops.
#[derive(Debug, Clone)]
pub struct EventLoopGroup {
    state: Arc<GroupState>,
}

impl EventLoopGroup {
    /// Start `size` loops whose threads are named `{name}-{index}`.
    pub fn create(name: impl Into<String>, size: usize) -> Result<Self> {
        Self::start(name.into(), size, DEFAULT_SHUTDOWN_GRACE)
    }

    /// Start a group sized by configuration, defaulting to the hardware parallelism.
    pub fn from_config(config: &LoopConfig) -> Result<Self> {
        let size = config.size.unwrap_or_else(default_size);
        Self::start(
            config.name.clone(),
            size,
            Duration::from_millis(config.shutdown_grace_ms),
        )
    }

    fn start(name: String, size: usize, grace: Duration) -> Result<Self> {
        if size == 0 {
            return Err(TransportError::Config(
                "event loop group needs at least one loop".into(),
            ));
        }

        let shutdown = Shutdown::new();
        let (exit_tx, exit_rx) = mpsc::channel::<()>(1);
        let mut loops = Vec::with_capacity(size);

        for index in 0..size {
            let (job_tx, job_rx) = mpsc::unbounded_channel();
            let signal = shutdown.subscribe();
            let exit = exit_tx.clone();
            let id = LoopId(index);

            std::thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || run_loop(id, job_rx, signal, grace, exit))?;
            loops.push(job_tx);
        }

        tracing::info!(group = %name, loops = size, "Event loop group started");

        Ok(Self {
            state: Arc::new(GroupState {
                name,
                loops,
                next: AtomicUsize::new(0),
                shutting_down: AtomicBool::new(false),
                shutdown,
                exited: Mutex::new(exit_rx),
                tracker: SessionTracker::new(),
            }),
        })
    }

    /// Pick the next loop, round-robin.
    pub fn assign(&self) -> Result<LoopHandle> {
        if self.is_shutting_down() {
            return Err(TransportError::ShuttingDown);
        }
        let index = self.state.next.fetch_add(1, Ordering::Relaxed) % self.state.loops.len();
        Ok(LoopHandle {
            id: LoopId(index),
            state: Arc::clone(&self.state),
        })
    }

    /// Handle to a specific loop.
    pub fn loop_handle(&self, id: LoopId) -> Option<LoopHandle> {
        (id.0 < self.state.loops.len()).then(|| LoopHandle {
            id,
            state: Arc::clone(&self.state),
        })
    }

    /// Number of loops.
    pub fn size(&self) -> usize {
        self.state.loops.len()
    }

    /// Group name (thread name prefix).
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.shutting_down.load(Ordering::SeqCst)
    }

    /// Number of sessions that have not released their resources yet.
    pub fn active_sessions(&self) -> u64 {
        self.state.tracker.active_count()
    }

    /// Wait until every session of the group has been released.
    pub async fn wait_idle(&self) {
        self.state.tracker.wait_idle().await;
    }

    /// Stop accepting work and tell every session and listener to dispose.
    pub fn begin_shutdown(&self) {
        if self.state.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(group = %self.state.name, "Event loop group shutting down");
        self.state.shutdown.trigger();
    }

    /// Shut down and wait until every loop thread has drained and exited.
    ///
    /// Must not be awaited from a task running on one of this group's loops.
    pub async fn shutdown(&self) {
        self.begin_shutdown();
        let mut exited = self.state.exited.lock().await;
        while exited.recv().await.is_some() {}
        tracing::info!(group = %self.state.name, "Event loop group stopped");
    }
}

/// Handle to one loop of a group.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    id: LoopId,
    state: Arc<GroupState>,
}

impl LoopHandle {
    pub fn id(&self) -> LoopId {
        self.id
    }

    /// True when called from this loop's thread.
    pub fn is_current(&self) -> bool {
        LoopId::current() == Some(self.id)
    }

    /// The group this loop belongs to.
    pub fn group(&self) -> EventLoopGroup {
        EventLoopGroup {
            state: Arc::clone(&self.state),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.shutting_down.load(Ordering::SeqCst)
    }

    /// Queue `future` on this loop.
    ///
    /// Fails with [`TransportError::ShuttingDown`] once the group stopped
    /// accepting work.
    pub fn spawn<F>(&self, future: F) -> Result<LoopTask<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(TransportError::ShuttingDown);
        }
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let output = future.await;
            let _ = tx.send(output);
        });
        self.state.loops[self.id.0]
            .send(job)
            .map_err(|_| TransportError::ShuttingDown)?;
        Ok(LoopTask::new(rx))
    }

    pub(crate) fn tracker(&self) -> &SessionTracker {
        &self.state.tracker
    }

    /// Resolves when the group begins shutting down.
    pub(crate) fn shutdown_signal(&self) -> ShutdownSignal {
        self.state.shutdown.subscribe()
    }
}

fn default_size() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn run_loop(
    id: LoopId,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    mut shutdown: ShutdownSignal,
    grace: Duration,
    _exit: mpsc::Sender<()>,
) {
    CURRENT_LOOP.with(|current| current.set(Some(id)));

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(loop_id = %id, error = %e, "Failed to start loop runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                job = jobs.recv() => match job {
                    Some(job) => {
                        tasks.spawn(job);
                    }
                    None => break,
                },
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        if e.is_panic() {
                            tracing::error!(loop_id = %id, "Task panicked");
                        }
                    }
                }
            }
        }

        // Work queued before the loop stopped still runs, in order.
        jobs.close();
        while let Ok(job) = jobs.try_recv() {
            tasks.spawn(job);
        }

        let drained = tokio::time::timeout(grace, drain(&mut tasks)).await;
        if drained.is_err() {
            tracing::warn!(
                loop_id = %id,
                pending = tasks.len(),
                "Shutdown grace period elapsed, aborting remaining tasks"
            );
            tasks.shutdown().await;
        }
    });

    tracing::debug!(loop_id = %id, "Loop stopped");
}

async fn drain(tasks: &mut JoinSet<()>) {
    while tasks.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn assign_is_round_robin() {
        let group = EventLoopGroup::create("rr", 3).unwrap();
        let ids: Vec<usize> = (0..6).map(|_| group.assign().unwrap().id().index()).collect();
        assert_eq!(ids, vec![0, 1, 2, 0, 1, 2]);
        group.shutdown().await;
    }

    #[tokio::test]
    async fn tasks_run_on_their_loop() {
        let group = EventLoopGroup::create("pinned", 2).unwrap();
        for _ in 0..4 {
            let handle = group.assign().unwrap();
            let expected = handle.id();
            let (before, after) = handle
                .spawn(async {
                    let before = (LoopId::current(), std::thread::current().id());
                    tokio::task::yield_now().await;
                    let after = (LoopId::current(), std::thread::current().id());
                    (before, after)
                })
                .unwrap()
                .await
                .unwrap();
            assert_eq!(before.0, Some(expected));
            assert_eq!(before, after);
        }
        assert_eq!(LoopId::current(), None);
        group.shutdown().await;
    }

    #[tokio::test]
    async fn tasks_start_in_submission_order() {
        let group = EventLoopGroup::create("order", 1).unwrap();
        let handle = group.assign().unwrap();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let mut last = None;
        for i in 0..16 {
            let seen = Arc::clone(&seen);
            last = Some(handle.spawn(async move { seen.lock().unwrap().push(i) }).unwrap());
        }
        last.unwrap().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..16).collect::<Vec<_>>());
        group.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_tasks() {
        let group = EventLoopGroup::create("drain", 2).unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        group
            .assign()
            .unwrap()
            .spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap()
            .detach();

        group.shutdown().await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work() {
        let group = EventLoopGroup::create("closed", 1).unwrap();
        let handle = group.assign().unwrap();
        group.shutdown().await;

        assert!(matches!(group.assign(), Err(TransportError::ShuttingDown)));
        assert!(matches!(
            handle.spawn(async {}),
            Err(TransportError::ShuttingDown)
        ));
        // A second shutdown is a no-op.
        group.shutdown().await;
    }

    #[tokio::test]
    async fn panicking_task_does_not_stop_loop() {
        let group = EventLoopGroup::create("panic", 1).unwrap();
        let handle = group.assign().unwrap();
        let failed = handle.spawn(async { panic!("boom") }).unwrap().await;
        assert!(matches!(failed, Err(TransportError::Cancelled)));
        assert_eq!(handle.spawn(async { 7 }).unwrap().await.unwrap(), 7);
        group.shutdown().await;
    }

    #[test]
    fn zero_loops_is_rejected() {
        assert!(matches!(
            EventLoopGroup::create("empty", 0),
            Err(TransportError::Config(_))
        ));
    }
}
