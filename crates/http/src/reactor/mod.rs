//! Cooperative single-threaded task/timer/IO-readiness scheduler.
//!
//! This module provides the [`Reactor`] trait and its concrete [`TokioReactor`]
//! implementation, the substrate every [`crate::connector::Connector`] and
//! [`crate::connector::Endpoint`] is driven from. One `TokioReactor` is created
//! per worker thread, paired with a `tokio::task::LocalSet`, so that per-connection
//! state never has to be `Send`.
//!
//! # Design
//!
//! `Reactor` mirrors a classic single-threaded event loop (execute/executeAfter/
//! executeOnReadable/executeOnSignal/cancelFD) but is realized entirely on top of
//! the ambient `tokio` runtime rather than a hand-rolled epoll loop:
//!
//! - `execute` is `tokio::task::spawn_local`.
//! - `execute_after`/`execute_at` race `tokio::time::sleep_until` against a
//!   cancellation oneshot.
//! - `execute_on_readable`/`execute_on_writable` (and the lower-level `ready`
//!   awaitable `Endpoint` uses directly) are built from `tokio::io::unix::AsyncFd`.
//! - `execute_on_signal` is built from `tokio::signal::unix::signal`.
//! - `cancel_fd` cancels every outstanding readable/writable registration for a
//!   given fd, keyed in a per-reactor registry rather than requiring the caller to
//!   have retained every [`TaskHandle`] it handed out.
//!
//! Every registration returns a [`TaskHandle`] whose `cancel()` guarantees the
//! associated task body never runs if it hasn't already started. Counters
//! (`task_count`/`timer_count`/`reader_count`/`writer_count`) are maintained via an
//! RAII guard so they stay accurate across every cancellation path, not just the
//! happy path. State is `Rc<Cell<_>>`/`Rc<RefCell<_>>` rather than `Arc<Atomic*>`:
//! a `TokioReactor` never leaves the worker thread it was built on, so there is no
//! lock (§5 "no locks used") to pay for.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::signal::unix::SignalKind;
use tokio::sync::oneshot;
use tracing::{trace, warn};

/// A cancellation handle for a task registered with a [`Reactor`].
///
/// Dropping the handle does *not* cancel the task; call [`cancel`](TaskHandle::cancel)
/// explicitly. This mirrors the source scheduler's explicit-dispose handles rather
/// than Rust's usual drop-to-cancel idiom, since callers frequently want to store
/// the handle and cancel it from a different task than the one that registered it.
pub struct TaskHandle {
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl TaskHandle {
    fn new(cancel_tx: oneshot::Sender<()>) -> Self {
        Self { cancel_tx: Some(cancel_tx) }
    }

    /// Cancels the pending task. A task already running to completion is unaffected;
    /// a task not yet started will never run its body (including any paired
    /// `on_timeout` callback — cancelling means neither side fires).
    pub fn cancel(mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Cooperative scheduler contract used by the connector/connection layer.
///
/// All registrations are single-shot: a readable/writable/signal/timer
/// registration fires at most once and must be re-armed by the caller if
/// further notifications are wanted (this is what `Endpoint::want_read`/
/// `want_write` do on every connection turn).
pub trait Reactor {
    /// Enqueues `task` to run on a future turn of the loop. Returns immediately.
    fn execute<F>(&self, task: F)
    where
        F: Future<Output = ()> + 'static;

    /// Runs `task` after `delay` has elapsed, unless cancelled first.
    fn execute_after<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + 'static;

    /// Runs `task` at or after wall-clock `instant`, unless cancelled first.
    fn execute_at<F>(&self, instant: Instant, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + 'static;

    /// Fires `on_readable` the next time `fd` is readable, or `on_timeout` if
    /// `timeout` elapses first. Exactly one of the two ever fires, and neither
    /// fires if the returned handle is cancelled (via `cancel()` or `cancel_fd`)
    /// first.
    fn execute_on_readable<R, T>(&self, fd: RawFd, timeout: Option<Duration>, on_readable: R, on_timeout: T) -> TaskHandle
    where
        R: Future<Output = ()> + 'static,
        T: Future<Output = ()> + 'static;

    /// Symmetric to [`execute_on_readable`](Reactor::execute_on_readable) for write-readiness.
    fn execute_on_writable<R, T>(&self, fd: RawFd, timeout: Option<Duration>, on_writable: R, on_timeout: T) -> TaskHandle
    where
        R: Future<Output = ()> + 'static,
        T: Future<Output = ()> + 'static;

    /// Fires `task` on the next delivery of `signal` after registration.
    fn execute_on_signal<F>(&self, signal: SignalKind, task: F) -> io::Result<TaskHandle>
    where
        F: Future<Output = ()> + 'static;

    /// Cancels every outstanding `execute_on_readable`/`execute_on_writable`
    /// registration for `fd`, wherever its `TaskHandle` ended up. Used when a
    /// connection is torn down out-of-band (e.g. a keep-alive cap or an idle
    /// timeout elsewhere) and the code tearing it down no longer holds the
    /// handles those registrations returned.
    fn cancel_fd(&self, fd: RawFd);

    /// Number of tasks spawned via [`execute`](Reactor::execute) that have not yet completed.
    fn task_count(&self) -> usize;

    /// Number of pending `execute_after`/`execute_at` timers.
    fn timer_count(&self) -> usize;

    /// Number of pending `execute_on_readable` registrations (including `Endpoint`
    /// readiness waits performed via [`TokioReactor::ready`]).
    fn reader_count(&self) -> usize;

    /// Number of pending `execute_on_writable` registrations (including `Endpoint`
    /// readiness waits performed via [`TokioReactor::ready`]).
    fn writer_count(&self) -> usize;
}

/// Decrements a shared counter on drop, regardless of which path out of the
/// guarded scope was taken (normal completion, cancellation, or panic unwind).
struct CountGuard(Rc<Cell<usize>>);

impl CountGuard {
    fn new(counter: Rc<Cell<usize>>) -> Self {
        counter.set(counter.get() + 1);
        Self(counter)
    }
}

impl Drop for CountGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Removes a fd-keyed waiter registration from the reactor's `cancel_fd` registry
/// on drop, so a fired or cancelled wait never leaves a stale entry behind.
struct WaiterGuard {
    waiters: Rc<RefCell<HashMap<RawFd, Vec<(u64, oneshot::Sender<()>)>>>>,
    fd: RawFd,
    id: u64,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        if let Some(entries) = self.waiters.borrow_mut().get_mut(&self.fd) {
            entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// A `Reactor` layered directly on a `tokio` current-thread (`LocalSet`) runtime.
///
/// Construct one per worker thread; see [`crate::connector::Connector`] for how
/// the per-worker `LocalSet` and `TokioReactor` pair is set up.
#[derive(Clone, Default)]
pub struct TokioReactor {
    task_count: Rc<Cell<usize>>,
    timer_count: Rc<Cell<usize>>,
    reader_count: Rc<Cell<usize>>,
    writer_count: Rc<Cell<usize>>,
    fd_waiters: Rc<RefCell<HashMap<RawFd, Vec<(u64, oneshot::Sender<()>)>>>>,
    next_waiter_id: Rc<Cell<u64>>,
}

impl TokioReactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Races `task` against a cancellation oneshot; returns the handle used to cancel it.
    fn spawn_cancellable<F>(&self, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.execute(async move {
            tokio::select! {
                biased;
                _ = cancel_rx => { trace!("cancellable task cancelled before running"); }
                _ = task => {}
            }
        });
        TaskHandle::new(cancel_tx)
    }

    fn register_waiter(&self, fd: RawFd) -> (u64, oneshot::Receiver<()>, WaiterGuard) {
        let id = self.next_waiter_id.get();
        self.next_waiter_id.set(id + 1);
        let (tx, rx) = oneshot::channel();
        self.fd_waiters.borrow_mut().entry(fd).or_default().push((id, tx));
        let guard = WaiterGuard { waiters: self.fd_waiters.clone(), fd, id };
        (id, rx, guard)
    }

    fn execute_on_ready<R, T>(
        &self,
        fd: RawFd,
        interest: Interest,
        timeout: Option<Duration>,
        on_ready: R,
        on_timeout: T,
        counter: Rc<Cell<usize>>,
    ) -> TaskHandle
    where
        R: Future<Output = ()> + 'static,
        T: Future<Output = ()> + 'static,
    {
        let (_id, fd_cancel_rx, waiter_guard) = self.register_waiter(fd);
        let count_guard = CountGuard::new(counter);
        self.spawn_cancellable(async move {
            let _count_guard = count_guard;
            let _waiter_guard = waiter_guard;
            tokio::select! {
                biased;
                _ = fd_cancel_rx => { trace!(fd, "wait cancelled via cancel_fd"); }
                () = wait_ready(fd, interest, timeout, on_ready, on_timeout) => {}
            }
        })
    }

    /// Awaits `interest` readiness on `fd`, bounded by `timeout`. Ties the wait
    /// into `reader_count`/`writer_count` for the duration so those counters
    /// reflect in-flight `Endpoint` activity, not just `execute_on_readable`/
    /// `execute_on_writable` registrations, and registers into the same
    /// `fd_waiters` table `cancel_fd` drains — this is the wait `Endpoint::fill`/
    /// `flush`/`want_read`/`want_write` actually go through, so `cancel_fd` needs
    /// to reach it, not just the unused `execute_on_readable`/`execute_on_writable`
    /// registrations.
    pub async fn ready(&self, fd: RawFd, interest: Interest, timeout: Option<Duration>) -> io::Result<()> {
        let counter = if interest.is_readable() { self.reader_count.clone() } else { self.writer_count.clone() };
        let _count_guard = CountGuard::new(counter);
        let (_id, cancel_rx, _waiter_guard) = self.register_waiter(fd);
        tokio::select! {
            biased;
            _ = cancel_rx => Err(io::Error::new(io::ErrorKind::ConnectionAborted, "cancelled via cancel_fd")),
            result = ready_impl(fd, interest, timeout) => result,
        }
    }
}

impl Reactor for TokioReactor {
    fn execute<F>(&self, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let guard = CountGuard::new(self.task_count.clone());
        tokio::task::spawn_local(async move {
            task.await;
            drop(guard);
        });
    }

    fn execute_after<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + 'static,
    {
        self.execute_at(Instant::now() + delay, task)
    }

    fn execute_at<F>(&self, instant: Instant, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + 'static,
    {
        let guard = CountGuard::new(self.timer_count.clone());
        self.spawn_cancellable(async move {
            let _guard = guard;
            tokio::time::sleep_until(instant.into()).await;
            task.await;
        })
    }

    fn execute_on_readable<R, T>(&self, fd: RawFd, timeout: Option<Duration>, on_readable: R, on_timeout: T) -> TaskHandle
    where
        R: Future<Output = ()> + 'static,
        T: Future<Output = ()> + 'static,
    {
        self.execute_on_ready(fd, Interest::READABLE, timeout, on_readable, on_timeout, self.reader_count.clone())
    }

    fn execute_on_writable<R, T>(&self, fd: RawFd, timeout: Option<Duration>, on_writable: R, on_timeout: T) -> TaskHandle
    where
        R: Future<Output = ()> + 'static,
        T: Future<Output = ()> + 'static,
    {
        self.execute_on_ready(fd, Interest::WRITABLE, timeout, on_writable, on_timeout, self.writer_count.clone())
    }

    fn execute_on_signal<F>(&self, signal: SignalKind, task: F) -> io::Result<TaskHandle>
    where
        F: Future<Output = ()> + 'static,
    {
        let mut stream = tokio::signal::unix::signal(signal)?;
        Ok(self.spawn_cancellable(async move {
            stream.recv().await;
            task.await;
        }))
    }

    fn cancel_fd(&self, fd: RawFd) {
        if let Some(entries) = self.fd_waiters.borrow_mut().remove(&fd) {
            for (_, tx) in entries {
                let _ = tx.send(());
            }
        }
    }

    fn task_count(&self) -> usize {
        self.task_count.get()
    }

    fn timer_count(&self) -> usize {
        self.timer_count.get()
    }

    fn reader_count(&self) -> usize {
        self.reader_count.get()
    }

    fn writer_count(&self) -> usize {
        self.writer_count.get()
    }
}

/// Waits for `interest` on `fd` or `timeout`, whichever comes first, without
/// invoking any callback — the bare primitive both [`wait_ready`] and
/// [`TokioReactor::ready`] build on.
async fn ready_impl(fd: RawFd, interest: Interest, timeout: Option<Duration>) -> io::Result<()> {
    let async_fd = AsyncFd::with_interest(BorrowedFd(fd), interest)?;
    let wait = async {
        loop {
            let mut guard = if interest.is_readable() { async_fd.readable().await? } else { async_fd.writable().await? };
            guard.clear_ready();
            return Ok::<(), io::Error>(());
        }
    };

    match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::from(io::ErrorKind::TimedOut)),
        },
        None => wait.await,
    }
}

/// Waits for `interest` on `fd` (via a borrowed [`AsyncFd`]) or `timeout`, whichever comes first.
///
/// `fd` must stay open and valid for the duration; the caller (an [`Endpoint`](crate::connector::Endpoint)
/// impl) owns the underlying socket and is responsible for not closing it while a wait is pending.
async fn wait_ready<R, T>(fd: RawFd, interest: Interest, timeout: Option<Duration>, on_ready: R, on_timeout: T)
where
    R: Future<Output = ()> + 'static,
    T: Future<Output = ()> + 'static,
{
    match ready_impl(fd, interest, timeout).await {
        Ok(()) => on_ready.await,
        Err(e) => {
            if e.kind() != io::ErrorKind::TimedOut {
                warn!(cause = %e, fd, "failed to register fd with reactor");
            }
            on_timeout.await;
        }
    }
}

/// A non-owning fd wrapper so [`AsyncFd`] can register interest without taking ownership.
///
/// The endpoint that owns `fd` outlives this wrapper; `TokioReactor` never closes fds itself.
struct BorrowedFd(RawFd);

impl std::os::unix::io::AsRawFd for BorrowedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Type-erased future, used where a boxed trait object is more convenient than a generic.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()>>>;
