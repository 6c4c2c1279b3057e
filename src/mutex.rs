// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! [`StopMutex`]: an async mutex with a permanent, one-shot disable switch.
//!
//! Stopping is a terminal transition. Once [`StopGuard::stop`] has run, every
//! past-and-future [`StopMutex::lock`] call returns [`Stopped`] promptly; the
//! mutex never hands out another guard. The transition is broadcast through a
//! [`CancellationToken`] so that tasks which are not holding the lock (for
//! example a task suspended in [`WaitGuard::wait`]) can observe it without
//! re-entering the critical section.
//!
//! [`WaitGuard::wait`]: crate::WaitGuard::wait

use std::fmt;
use std::ops::{Deref, DerefMut};

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{Stopped, TryLockError};

/// An async mutex that can be permanently disabled.
///
/// Behaves like [`tokio::sync::Mutex`] until the holder calls
/// [`StopGuard::stop`]. From then on the mutex is inert: [`lock`] and
/// [`try_lock`] fail with [`Stopped`] without blocking on ownership, and the
/// token returned by [`stop_token`] is cancelled.
///
/// Acquisition order among contending tasks follows the underlying tokio
/// mutex (FIFO); no additional ordering is guaranteed.
///
/// [`lock`]: Self::lock
/// [`try_lock`]: Self::try_lock
/// [`stop_token`]: Self::stop_token
pub struct StopMutex<T> {
    inner: Mutex<T>,
    stop: CancellationToken,
}

/// RAII proof of holding a [`StopMutex`].
///
/// The lock is released when the guard is dropped, or consumed by
/// [`stop`](Self::stop).
#[must_use = "if unused the mutex unlocks immediately"]
pub struct StopGuard<'a, T> {
    lock: &'a StopMutex<T>,
    inner: MutexGuard<'a, T>,
}

impl<T> StopMutex<T> {
    /// Creates a new mutex guarding `value`, unlocked and not stopped.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            stop: CancellationToken::new(),
        }
    }

    /// Locks the mutex.
    ///
    /// Waits for the current holder (if any) to release, then checks the
    /// stop state. Returns [`Stopped`] if the mutex was stopped before or
    /// while this call was waiting; the caller does not hold the lock on the
    /// error path.
    ///
    /// A stopped mutex is released by [`StopGuard::stop`] before this call
    /// can observe the flag, so `lock` never blocks indefinitely on a dead
    /// owner.
    pub async fn lock(&self) -> Result<StopGuard<'_, T>, Stopped> {
        let inner = self.inner.lock().await;
        if self.stop.is_cancelled() {
            return Err(Stopped);
        }
        Ok(StopGuard { lock: self, inner })
    }

    /// Attempts to lock the mutex without waiting.
    pub fn try_lock(&self) -> Result<StopGuard<'_, T>, TryLockError> {
        let inner = self
            .inner
            .try_lock()
            .map_err(|_| TryLockError::WouldBlock)?;
        if self.stop.is_cancelled() {
            return Err(TryLockError::Stopped);
        }
        Ok(StopGuard { lock: self, inner })
    }

    /// Returns a token that is cancelled when the mutex is stopped.
    ///
    /// The token is cheap to clone and can be polled
    /// ([`is_cancelled`](CancellationToken::is_cancelled)) or awaited
    /// ([`cancelled`](CancellationToken::cancelled)) from any task without
    /// holding the lock. The stop flag and the token fire as a single
    /// transition: any task that fails [`lock`](Self::lock) with [`Stopped`]
    /// will also observe the token as cancelled, and vice versa.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Resolves once the mutex has been stopped.
    pub async fn stopped(&self) {
        self.stop.cancelled().await;
    }

    /// Returns `true` if the mutex has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Returns a mutable reference to the guarded value.
    ///
    /// No locking is needed: the exclusive borrow proves no guard exists.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consumes the mutex and returns the guarded value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Locks the inner mutex regardless of the stop state.
    ///
    /// Used by `WaitMutex` to clear its pending-wait slot on exit paths
    /// where the mutex is already stopped and `lock` would refuse.
    pub(crate) async fn lock_unchecked(&self) -> MutexGuard<'_, T> {
        self.inner.lock().await
    }
}

impl<T: Default> Default for StopMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for StopMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopMutex")
            .field("stopped", &self.is_stopped())
            .field("inner", &self.inner)
            .finish()
    }
}

impl<'a, T> StopGuard<'a, T> {
    /// Stops the mutex, consuming the guard.
    ///
    /// The stop token is cancelled while the lock is still held, then the
    /// lock is released; the caller no longer holds it when this returns.
    /// The transition is permanent — every subsequent
    /// [`lock`](StopMutex::lock) fails with [`Stopped`].
    ///
    /// Stopping twice is unrepresentable: `stop` consumes the only live
    /// guard, and a stopped mutex never issues another one.
    pub fn stop(self) {
        tracing::debug!("stopping mutex");
        self.lock.stop.cancel();
        // dropping self releases the lock; cancellation latched while held,
        // so every later acquirer observes it
    }

    pub(crate) fn mutex(&self) -> &'a StopMutex<T> {
        self.lock
    }
}

impl<T> Deref for StopGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for StopGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for StopGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn lock_guards_value() -> Result<()> {
        let mutex = StopMutex::new(1u32);
        {
            let mut guard = mutex.lock().await?;
            *guard += 1;
        }
        assert_eq!(*mutex.lock().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn lock_fails_after_stop() -> Result<()> {
        let mutex = StopMutex::new(());
        let guard = mutex.lock().await?;
        guard.stop();

        assert!(mutex.is_stopped());
        // must fail promptly, not block on ownership
        let res = timeout(Duration::from_secs(1), mutex.lock()).await?;
        assert_eq!(res.err(), Some(Stopped));
        Ok(())
    }

    #[tokio::test]
    async fn racing_lock_then_stop() {
        // two tasks race to lock-then-stop; exactly one may win
        let mutex = Arc::new(StopMutex::new(()));
        let mut outcomes = Vec::new();
        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let mutex = mutex.clone();
                tokio::spawn(async move {
                    match mutex.lock().await {
                        Ok(guard) => {
                            guard.stop();
                            true
                        }
                        Err(Stopped) => false,
                    }
                })
            })
            .collect();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }
        assert_eq!(
            outcomes.iter().filter(|stopped| **stopped).count(),
            1,
            "exactly one task should lock and stop, got {outcomes:?}"
        );
    }

    #[tokio::test]
    async fn stop_token_observes_transition() -> Result<()> {
        let mutex = StopMutex::new(());
        let token = mutex.stop_token();
        assert!(!token.is_cancelled());
        assert!(!mutex.is_stopped());

        mutex.lock().await?.stop();

        assert!(token.is_cancelled());
        timeout(Duration::from_secs(1), mutex.stopped()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn try_lock_contention_and_stop() -> Result<()> {
        let mutex = StopMutex::new(());
        let guard = mutex.lock().await?;
        assert_eq!(mutex.try_lock().err(), Some(TryLockError::WouldBlock));

        guard.stop();
        assert_eq!(mutex.try_lock().err(), Some(TryLockError::Stopped));
        Ok(())
    }

    #[tokio::test]
    async fn pending_lock_wakes_on_stop() -> Result<()> {
        // a task queued behind the holder gets Stopped, not a deadlock
        let mutex = Arc::new(StopMutex::new(()));
        let guard = mutex.lock().await?;

        let contender = {
            let mutex = mutex.clone();
            tokio::spawn(async move { mutex.lock().await.err() })
        };
        tokio::task::yield_now().await;

        guard.stop();
        let res = timeout(Duration::from_secs(1), contender).await??;
        assert_eq!(res, Some(Stopped));
        Ok(())
    }
}
