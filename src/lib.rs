// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Stoppable mutual exclusion for tokio tasks.
//!
//! # Overview
//!
//! This crate provides two primitives for coordinating shutdown with a
//! critical section:
//!
//! - [`StopMutex`] — an async mutex that can be permanently disabled
//!   ("stopped") so that all current and future lock attempts return
//!   [`Stopped`] instead of deadlocking against a dead owner
//! - [`WaitMutex`] — a [`StopMutex`] extended with a single-slot,
//!   cancelable wait: the holder releases the lock, runs an action on a
//!   background task, and re-acquires the lock when the action finishes,
//!   is skipped, or the mutex is stopped
//!
//! Holding the lock is represented by a guard ([`StopGuard`] /
//! [`WaitGuard`]); operations that require the lock are methods on the
//! guard, so "unlock without holding" and "stop twice" cannot be
//! expressed. Stopping is observable without the lock through a
//! [`CancellationToken`] returned by [`StopMutex::stop_token`], which can
//! be polled or awaited from any task.
//!
//! # Example
//!
//! ```rust,ignore
//! use stoplock::{StopMutex, Stopped};
//!
//! let mutex = StopMutex::new(0u64);
//!
//! // normal use
//! let mut guard = mutex.lock().await?;
//! *guard += 1;
//! drop(guard);
//!
//! // shutdown: every later lock() observes Stopped
//! mutex.lock().await?.stop();
//! assert!(matches!(mutex.lock().await, Err(Stopped)));
//! ```

mod error;
mod mutex;
mod wait;

pub use error::{Stopped, TryLockError};
pub use mutex::{StopGuard, StopMutex};
pub use wait::{WaitGuard, WaitMutex};

pub use tokio_util::sync::CancellationToken;
