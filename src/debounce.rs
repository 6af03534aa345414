// SPDX-License-Identifier: MIT
// Request debouncer.
//
// Single-slot debounce over async operations: bursts of calls within the
// delay window collapse into one execution of the most recently scheduled
// operation, and every caller in the window resolves once that single
// execution settles. A pending operation can be flushed (run immediately) or
// cleared (discarded without running); execution errors are caught and
// logged, never propagated to waiters.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type BoxedExec = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct Window<M> {
    /// Metadata from the call that last (re)scheduled this window, handed to
    /// `should_flush` on the next call.
    meta: M,
    /// The most recently scheduled operation — the only one that will run.
    exec: BoxedExec,
    /// Everyone who joined this window and is awaiting settlement.
    waiters: Vec<oneshot::Sender<()>>,
    /// Invalidates sleeping timer tasks from earlier (re)schedules.
    timer_seq: u64,
}

struct DebounceInner<M> {
    current: Option<Window<M>>,
    next_timer_seq: u64,
}

/// Single-slot async debouncer.
///
/// Cheaply cloneable — all clones share the same slot. `M` is caller-supplied
/// metadata describing the pending request, consulted by `should_flush`.
pub struct RequestDebouncer<M> {
    inner: Arc<Mutex<DebounceInner<M>>>,
}

impl<M> Clone for RequestDebouncer<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Send + 'static> RequestDebouncer<M> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DebounceInner {
                current: None,
                next_timer_seq: 0,
            })),
        }
    }

    /// Schedule `exec` to run after `delay` of quiet, collapsing with any
    /// pending window. Resolves when the window's chosen execution (or
    /// discard) settles.
    pub async fn debounce<F, Fut>(&self, meta: M, delay: Duration, exec: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.debounce_with_flush(meta, delay, |_| false, exec).await;
    }

    /// Like [`debounce`](Self::debounce), but if a window is already pending
    /// and `should_flush` returns true for its metadata, the pending
    /// operation executes immediately before the new one is scheduled.
    pub async fn debounce_with_flush<F, Fut>(
        &self,
        meta: M,
        delay: Duration,
        should_flush: impl FnOnce(&M) -> bool,
        exec: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let boxed: BoxedExec = Box::new(move || exec().boxed());

        let seq = {
            let mut inner = self.inner.lock().expect("debouncer lock poisoned");

            // Joining an existing window keeps its waiters; a flushed window
            // executes now and the new call opens a fresh one.
            let mut waiters = Vec::new();
            if let Some(window) = inner.current.take() {
                if should_flush(&window.meta) {
                    debug!("debounce window flushed by newer request");
                    Self::execute(window.exec, window.waiters);
                } else {
                    waiters = window.waiters;
                }
            }
            waiters.push(tx);

            let seq = inner.next_timer_seq;
            inner.next_timer_seq += 1;
            inner.current = Some(Window {
                meta,
                exec: boxed,
                waiters,
                timer_seq: seq,
            });
            seq
        };

        // Restart the delay window; timers from earlier schedules go stale.
        self.spawn_timer(seq, delay);
        let _ = rx.await;
    }

    /// Force immediate execution of the pending operation, if any.
    pub fn flush(&self) {
        let window = {
            let mut inner = self.inner.lock().expect("debouncer lock poisoned");
            inner.current.take()
        };
        if let Some(window) = window {
            debug!("debounce window flushed");
            Self::execute(window.exec, window.waiters);
        }
    }

    /// Discard the pending operation without running it. Its waiters resolve
    /// immediately.
    pub fn clear(&self) {
        let window = {
            let mut inner = self.inner.lock().expect("debouncer lock poisoned");
            inner.current.take()
        };
        if let Some(window) = window {
            debug!("debounce window cleared without executing");
            for waiter in window.waiters {
                let _ = waiter.send(());
            }
        }
    }

    /// True while an operation is scheduled and its delay has not fired.
    pub fn is_pending(&self) -> bool {
        self.inner
            .lock()
            .expect("debouncer lock poisoned")
            .current
            .is_some()
    }

    fn spawn_timer(&self, seq: u64, delay: Duration) {
        let debouncer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let window = {
                let mut inner = debouncer.inner.lock().expect("debouncer lock poisoned");
                match inner.current.as_ref() {
                    // Only the timer belonging to the latest (re)schedule may
                    // take the window; earlier timers are stale.
                    Some(window) if window.timer_seq == seq => inner.current.take(),
                    _ => None,
                }
            };
            if let Some(window) = window {
                Self::execute(window.exec, window.waiters);
            }
        });
    }

    /// Run the chosen operation, then settle every waiter. Errors are caught
    /// here and do not propagate — the surrounding layer observes failures
    /// through its own result channel.
    fn execute(exec: BoxedExec, waiters: Vec<oneshot::Sender<()>>) {
        tokio::spawn(async move {
            if let Err(err) = exec().await {
                warn!(error = %err, "debounced operation failed");
            }
            for waiter in waiters {
                let _ = waiter.send(());
            }
        });
    }
}

impl<M: Send + 'static> Default for RequestDebouncer<M> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
