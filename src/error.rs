// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// The mutex has been stopped and can never be locked again.
///
/// This is an expected shutdown outcome, not a bug: callers are expected to
/// branch on it and unwind (stop in-progress work, drop the mutex). Contract
/// violations such as waiting twice on the same [`WaitMutex`] panic instead
/// of returning this error.
///
/// [`WaitMutex`]: crate::WaitMutex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("mutex has been stopped")]
pub struct Stopped;

/// Error returned by [`StopMutex::try_lock`] and [`WaitMutex::try_lock`].
///
/// [`StopMutex::try_lock`]: crate::StopMutex::try_lock
/// [`WaitMutex::try_lock`]: crate::WaitMutex::try_lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryLockError {
    /// The mutex has been stopped and can never be locked again.
    #[error("mutex has been stopped")]
    Stopped,
    /// The mutex is currently held by another task.
    #[error("mutex is currently locked")]
    WouldBlock,
}
