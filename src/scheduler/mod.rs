//! The worker-pool scheduler — the hardest part of the engine: one FIFO
//! work queue, N worker threads, a `router_locks` map used as a signal
//! rather than a critical-section guard, and a `deliver_lock` serializing
//! the producer's enqueue decision against the worker's re-enqueue
//! decision.
//!
//! Real OS threads, not async tasks: `update` is specified as blocking,
//! synchronous I/O, and `crossbeam_channel` gives genuine
//! multi-producer/multi-consumer semantics with a `recv_timeout` that maps
//! directly onto a blocking-with-timeout dequeue.

pub mod router_lock;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tracing::{debug, error, info, warn};

use crate::debug_store::DebugStore;
use crate::ids::RouterId;
use crate::state_machine::{RouterStateMachine, WorkerContext};
use router_lock::RouterLock;

/// Shared handle to one router's state machine. `parking_lot::Mutex`
/// (rather than a plain `&mut` or a channel) gives interior mutability
/// across the producer (`send_message`) and whichever worker eventually
/// runs `update`, while still upholding the "at most one `update` in
/// flight" invariant via the router lock, not via lock contention here —
/// in steady state this mutex is never contended.
pub type SmHandle = Arc<SyncMutex<dyn RouterStateMachine>>;

enum WorkItem {
    Run(SmHandle),
    Stop,
}

/// How long a worker blocks on an empty queue before checking
/// `keep_going` again. Default: 10s.
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for each worker thread to join before
/// abandoning it. Default: 5s.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

type ContextFactory = dyn Fn() -> Box<dyn WorkerContext> + Send + Sync;

/// The bounded worker-thread pool plus its per-router exclusion state.
pub struct WorkerPool {
    sender: Sender<WorkItem>,
    receiver: Receiver<WorkItem>,
    router_locks: DashMap<RouterId, RouterLock>,
    /// Serializes a producer's enqueue decision against a worker's
    /// release-then-maybe-re-enqueue decision.
    deliver_lock: SyncMutex<()>,
    keep_going: Arc<AtomicBool>,
    thread_status: Arc<DashMap<String, String>>,
    handles: SyncMutex<Vec<JoinHandle<()>>>,
    num_workers: usize,
    dequeue_timeout: Duration,
    join_timeout: Duration,
}

impl WorkerPool {
    /// Builds the pool and starts `num_workers` threads immediately, once
    /// every instance field they close over already exists.
    pub fn start(
        num_workers: usize,
        dequeue_timeout: Duration,
        join_timeout: Duration,
        debug_store: Arc<dyn DebugStore>,
        context_factory: Arc<ContextFactory>,
    ) -> Arc<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let pool = Arc::new(Self {
            sender,
            receiver,
            router_locks: DashMap::new(),
            deliver_lock: SyncMutex::new(()),
            keep_going: Arc::new(AtomicBool::new(true)),
            thread_status: Arc::new(DashMap::new()),
            handles: SyncMutex::new(Vec::new()),
            num_workers,
            dequeue_timeout,
            join_timeout,
        });

        let mut handles = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let name = format!("t{i:02}");
            let pool = Arc::clone(&pool);
            let debug_store = Arc::clone(&debug_store);
            let context_factory = Arc::clone(&context_factory);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || pool.worker_loop(name, debug_store, context_factory))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        *pool.handles.lock() = handles;
        pool
    }

    /// Returns or creates the [`RouterLock`] for `router_id`. Only ever
    /// called while `deliver_lock` is held, so the `DashMap` entry API's
    /// momentary internal sharding lock is the only contention here.
    fn router_lock(&self, router_id: RouterId) -> RouterLock {
        self.router_locks.entry(router_id).or_default().clone()
    }

    /// Enqueue protocol: attempts to acquire `sm`'s router
    /// lock; if acquired, pushes `sm` onto the work queue and returns
    /// `true`. If the lock was already held, does nothing and returns
    /// `false` — the caller's preceding `send_message` has already queued
    /// the event in the state machine's own inbox, so nothing is lost.
    ///
    /// # Panics
    /// In debug builds, panics if called without holding
    /// [`Self::deliver_lock`] — the caller must hold it for the whole
    /// "maybe send_message, then enqueue" sequence.
    pub fn enqueue_if_idle(&self, sm: SmHandle) -> bool {
        debug_assert!(
            self.deliver_lock.is_locked(),
            "enqueue_if_idle called without holding deliver_lock"
        );
        let router_id = sm.lock().router_id();
        let lock = self.router_lock(router_id);
        if lock.try_acquire() {
            let _ = self.sender.send(WorkItem::Run(sm));
            true
        } else {
            false
        }
    }

    /// The mutex producers and the worker loop both lock around the
    /// "enqueue" / "release-then-maybe-re-enqueue" decision.
    pub fn deliver_lock(&self) -> &SyncMutex<()> {
        &self.deliver_lock
    }

    /// Snapshot of each worker thread's last-reported status, for the
    /// `WORKERS_DEBUG` command.
    #[must_use]
    pub fn thread_status(&self) -> Vec<(String, String)> {
        self.thread_status
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Number of distinct routers currently queued-or-running.
    #[must_use]
    pub fn active_router_count(&self) -> usize {
        self.router_locks.iter().filter(|e| e.value().is_held()).count()
    }

    /// Releases `router_id`'s lock unconditionally, ignoring the case
    /// where it was already free. Backs the `ROUTER_MANAGE` command, which
    /// must be able to unstick a router that was put in debug mode while
    /// its lock was held.
    pub fn force_release(&self, router_id: RouterId) {
        if let Some(lock) = self.router_locks.get(&router_id) {
            lock.release();
        }
    }

    fn worker_loop(
        &self,
        name: String,
        debug_store: Arc<dyn DebugStore>,
        context_factory: Arc<ContextFactory>,
    ) {
        debug!(thread = %name, "worker starting");
        let mut context = context_factory();
        loop {
            self.thread_status.insert(name.clone(), "waiting for task".to_string());
            let item = match self.receiver.recv_timeout(self.dequeue_timeout) {
                Ok(item) => item,
                Err(RecvTimeoutError::Timeout) => {
                    if self.keep_going.load(Ordering::Acquire) {
                        continue;
                    }
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let sm = match item {
                WorkItem::Stop => {
                    info!(thread = %name, "received stop message");
                    break;
                }
                WorkItem::Run(sm) => sm,
            };

            let router_id = sm.lock().router_id();
            let tenant_id = sm.lock().tenant_id();

            let skip = match debug_store.router_in_debug(router_id) {
                Ok((true, reason)) => {
                    debug!(%router_id, ?reason, "skipping update, router in debug mode");
                    true
                }
                Ok((false, _)) => false,
                Err(e) => {
                    error!(%router_id, error = %e, "debug store lookup failed, skipping update (fail-closed)");
                    true
                }
            };

            if skip {
                // The finally block still runs: release the lock, but do
                // not re-enqueue while debug is active
                // "Debug-skip note"). `ROUTER_MANAGE` is what clears this
                // router for real.
                self.thread_status.insert(name.clone(), format!("finalizing task for {router_id}"));
                let _guard = self.deliver_lock.lock();
                self.force_release(router_id);
                continue;
            }

            debug!(%router_id, %tenant_id, "performing work");
            self.thread_status.insert(name.clone(), format!("updating {router_id}"));
            let result = sm.lock().update(&mut *context);
            if let Err(e) = result {
                error!(%router_id, error = %e, "could not complete update");
            }

            self.thread_status.insert(name.clone(), format!("finalizing task for {router_id}"));
            let has_more_work = {
                let _guard = self.deliver_lock.lock();
                self.force_release(router_id);
                let has_more_work = sm.lock().has_more_work();
                if has_more_work {
                    debug!(%router_id, "has more work, returning to work queue");
                    self.enqueue_if_idle(Arc::clone(&sm));
                } else {
                    debug!(%router_id, "no more work");
                }
                has_more_work
            };
            let _ = has_more_work;
        }
        self.thread_status.insert(name.clone(), "exiting".to_string());
        debug!(thread = %name, "worker exiting");
    }

    /// Shutdown sequence:
    /// 1. `keep_going = false`.
    /// 2. Discard pending work (a documented trade-off).
    /// 3. Push one `Stop` sentinel per worker.
    /// 4. Join each worker with a bounded timeout; abandon stragglers.
    pub fn shutdown(&self) {
        self.keep_going.store(false, Ordering::Release);

        let discarded = drain_queue(&self.receiver);
        if discarded > 0 {
            warn!(discarded, "discarded pending work on shutdown");
        }

        for _ in 0..self.num_workers {
            let _ = self.sender.send(WorkItem::Stop);
        }

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let name = handle.thread().name().unwrap_or("?").to_string();
            if join_with_timeout(handle, self.join_timeout) {
                debug!(thread = %name, "stopped");
            } else {
                warn!(thread = %name, "still alive after join timeout, abandoning");
            }
        }
    }
}

fn drain_queue(receiver: &Receiver<WorkItem>) -> usize {
    let mut count = 0;
    while receiver.try_recv().is_ok() {
        count += 1;
    }
    count
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if handle.is_finished() {
            let _ = handle.join();
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}
