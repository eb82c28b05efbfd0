//! FIFO async mutex.
//!
//! A data-less lock with an explicit wait list. Waiters are resumed strictly
//! in arrival order and the lock is handed over directly, so a caller that
//! arrives while others are queued always waits behind them.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct LockState {
    locked: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Single-holder mutual exclusion with a FIFO wait list.
#[derive(Debug, Default)]
pub struct AsyncMutex {
    state: Mutex<LockState>,
}

/// Exclusive hold on an [`AsyncMutex`].
///
/// Call [`MutexHold::release`] to release explicitly; dropping the hold
/// releases too. Releasing more than once is a no-op.
#[must_use = "the lock is released as soon as the hold is dropped"]
#[derive(Debug)]
pub struct MutexHold<'a> {
    mutex: &'a AsyncMutex,
    released: bool,
}

impl AsyncMutex {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        // The state is two plain fields updated atomically under the guard,
        // so a panic elsewhere cannot leave it half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until no other holder is active, then take the lock.
    pub async fn acquire(&self) -> MutexHold<'_> {
        let rx = {
            let mut state = self.state();
            if !state.locked {
                state.locked = true;
                return MutexHold {
                    mutex: self,
                    released: false,
                };
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        let mut waiter = Waiter {
            mutex: self,
            rx: Some(rx),
        };
        waiter.granted().await;

        MutexHold {
            mutex: self,
            released: false,
        }
    }

    /// Acquire, run `f` to completion, release. The lock is released on every
    /// exit path, including a panic inside `f`.
    pub async fn run_exclusive<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut hold = self.acquire().await;
        let out = f().await;
        hold.release();
        out
    }

    /// Advisory: whether someone currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    /// Advisory: how many callers are queued behind the holder. Cancelled
    /// waiters still in the list are not counted.
    pub fn waiting_count(&self) -> usize {
        self.state()
            .waiters
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Hand the lock to the next live waiter, or mark it free.
    fn unlock(&self) {
        let mut state = self.state();
        while let Some(next) = state.waiters.pop_front() {
            // A send fails only if that waiter was cancelled; try the next one.
            if next.send(()).is_ok() {
                return;
            }
        }
        state.locked = false;
    }
}

impl MutexHold<'_> {
    /// Release the lock. Only the first call has any effect.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.mutex.unlock();
        }
    }
}

impl Drop for MutexHold<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A queued `acquire`. If it is dropped after the lock was handed to it but
/// before it noticed, the lock is passed on instead of leaking.
struct Waiter<'a> {
    mutex: &'a AsyncMutex,
    rx: Option<oneshot::Receiver<()>>,
}

impl Waiter<'_> {
    async fn granted(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            // The sender lives in the wait list until `unlock` pops it and
            // sends, so the channel only closes through a successful handoff.
            let _ = rx.await;
        }
        self.rx = None;
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if rx.try_recv().is_ok() {
                self.mutex.unlock();
            }
        }
    }
}
