// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! [`WaitMutex`]: a [`StopMutex`] with a single-slot cancelable wait.
//!
//! [`WaitGuard::wait`] lets the current holder block on a background action
//! without holding the lock, then re-acquire it. While suspended, the wait
//! races three wake sources: the action completing, an early wake from
//! [`WaitGuard::skip`], and the mutex being stopped. Stopping is the only
//! way to cancel a wait from the waiter's perspective; the background action
//! itself is never canceled (see [`WaitGuard::wait`]).
//!
//! At most one wait may be pending per mutex. A second `wait` while one is
//! pending is a reentrancy bug and panics.

use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Stopped, TryLockError};
use crate::mutex::{StopGuard, StopMutex};

/// Guarded value plus the pending-wait slot.
///
/// The slot is only touched while the inner mutex is held, except for the
/// post-stop cleanup paths in [`WaitGuard::wait`] which go through
/// `lock_unchecked`.
#[derive(Debug)]
struct Slot<T> {
    value: T,
    skip: Option<CancellationToken>,
}

/// A [`StopMutex`] extended with a cancelable wait-and-reacquire operation.
///
/// Locking, stopping, and stop observation behave exactly as on
/// [`StopMutex`]; the additional surface lives on [`WaitGuard`].
pub struct WaitMutex<T> {
    inner: StopMutex<Slot<T>>,
}

/// RAII proof of holding a [`WaitMutex`].
#[must_use = "if unused the mutex unlocks immediately"]
pub struct WaitGuard<'a, T> {
    inner: StopGuard<'a, Slot<T>>,
}

impl<T> WaitMutex<T> {
    /// Creates a new mutex guarding `value`: unlocked, not stopped, no wait
    /// pending.
    pub fn new(value: T) -> Self {
        Self {
            inner: StopMutex::new(Slot { value, skip: None }),
        }
    }

    /// Locks the mutex. See [`StopMutex::lock`].
    pub async fn lock(&self) -> Result<WaitGuard<'_, T>, Stopped> {
        let inner = self.inner.lock().await?;
        Ok(WaitGuard { inner })
    }

    /// Attempts to lock the mutex without waiting. See
    /// [`StopMutex::try_lock`].
    pub fn try_lock(&self) -> Result<WaitGuard<'_, T>, TryLockError> {
        let inner = self.inner.try_lock()?;
        Ok(WaitGuard { inner })
    }

    /// Returns a token that is cancelled when the mutex is stopped. See
    /// [`StopMutex::stop_token`].
    pub fn stop_token(&self) -> CancellationToken {
        self.inner.stop_token()
    }

    /// Resolves once the mutex has been stopped.
    pub async fn stopped(&self) {
        self.inner.stopped().await;
    }

    /// Returns `true` if the mutex has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.is_stopped()
    }

    /// Returns a mutable reference to the guarded value.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner.get_mut().value
    }

    /// Consumes the mutex and returns the guarded value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner().value
    }
}

impl<T: Default> Default for WaitMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for WaitMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitMutex")
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl<'a, T> WaitGuard<'a, T> {
    /// Releases the lock, runs `action` on a background task, and
    /// re-acquires the lock once the action finishes or the wait is woken
    /// early by [`skip`](Self::skip).
    ///
    /// Returns the fresh guard on success. Returns [`Stopped`] if the mutex
    /// is stopped while the wait is pending (or while re-acquiring); the
    /// caller does not hold the lock on the error path.
    ///
    /// The action is never canceled: if the wait ends by skip or stop while
    /// the action is still running, the action keeps running detached on its
    /// background task and its completion is discarded. Callers that need to
    /// bound background work must build that into the action itself.
    ///
    /// The action is spawned with [`tokio::spawn`], so this must be called
    /// from within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if another `wait` is already pending on this mutex — waits do
    /// not queue, and a concurrent second wait is a reentrancy bug. If the
    /// action itself panics, the panic is resumed on the waiting task.
    ///
    /// # Cancel safety
    ///
    /// This method is not cancel safe. Dropping the returned future while
    /// the wait is pending leaves the pending-wait slot occupied, and the
    /// next `wait` on this mutex will panic.
    pub async fn wait<F>(mut self, action: F) -> Result<WaitGuard<'a, T>, Stopped>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        assert!(
            self.inner.skip.is_none(),
            "wait() called while another wait is pending"
        );
        let skip = CancellationToken::new();
        self.inner.skip = Some(skip.clone());

        let mutex = self.inner.mutex();
        let stop = mutex.stop_token();
        let mut action = tokio::spawn(action);
        tracing::trace!("wait: releasing lock");
        drop(self);

        let mut joined = Ok(());
        let stopped = tokio::select! {
            res = &mut action => {
                tracing::trace!("wait: action completed");
                joined = res;
                false
            }
            _ = skip.cancelled() => {
                tracing::trace!("wait: woken early by skip");
                false
            }
            _ = stop.cancelled() => true,
        };

        if stopped {
            // the action keeps running detached; only the wait is canceled
            tracing::debug!("wait: interrupted by stop");
            clear_pending(mutex).await;
            return Err(Stopped);
        }

        let guard = match mutex.lock().await {
            Ok(mut inner) => {
                inner.skip = None;
                WaitGuard { inner }
            }
            Err(err) => {
                // stop raced in during re-acquisition
                tracing::debug!("wait: stopped during re-acquisition");
                clear_pending(mutex).await;
                return Err(err);
            }
        };
        if let Err(join) = joined {
            if join.is_panic() {
                std::panic::resume_unwind(join.into_panic());
            }
        }
        Ok(guard)
    }

    /// Like [`wait`](Self::wait), with an action that just sleeps for
    /// `duration`.
    pub async fn wait_for(self, duration: Duration) -> Result<WaitGuard<'a, T>, Stopped> {
        self.wait(tokio::time::sleep(duration)).await
    }

    /// Wakes the pending wait on this mutex, if any.
    ///
    /// Returns `true` if a waiter was woken. Returns `false` if no wait is
    /// pending, or if the pending wait was already woken (the early wake is
    /// a one-shot).
    pub fn skip(&mut self) -> bool {
        match &self.inner.skip {
            Some(skip) if !skip.is_cancelled() => {
                tracing::trace!("skip: waking pending wait");
                skip.cancel();
                true
            }
            _ => false,
        }
    }

    /// Stops the mutex, consuming the guard. See [`StopGuard::stop`].
    pub fn stop(self) {
        self.inner.stop();
    }
}

/// Clears the pending-wait slot on exit paths where the mutex is already
/// stopped and a checked `lock` would refuse.
async fn clear_pending<T>(mutex: &StopMutex<Slot<T>>) {
    mutex.lock_unchecked().await.skip = None;
}

impl<T> Deref for WaitGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T> DerefMut for WaitGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner.value
    }
}

impl<T: fmt::Debug> fmt::Debug for WaitGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
