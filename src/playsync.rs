// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Represents the current cancel state.
#[derive(PartialEq)]
enum CancelState {
    Untouched,
    Cancelled,
}

/// A cancel handle is handed to long running loops (the transport scheduler, feedback timers).
/// It's the loop's responsibility to respect a cancel request.
#[derive(Clone)]
pub struct CancelHandle {
    /// Set to cancelled if the underlying operation should stop.
    cancelled: Arc<Mutex<CancelState>>,
    /// The condvar will handle notification of cancelling.
    condvar: Arc<Condvar>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            cancelled: Arc::new(Mutex::new(CancelState::Untouched)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Returns true if the operation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock() == CancelState::Cancelled
    }

    /// Blocks for at most `timeout`, waking early if cancelled. Returns true if the handle
    /// was cancelled when the wait finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.cancelled.lock();
        if *cancelled == CancelState::Cancelled {
            return true;
        }
        let _ = self.condvar.wait_while_for(
            &mut cancelled,
            |state| *state == CancelState::Untouched,
            timeout,
        );
        *cancelled == CancelState::Cancelled
    }

    /// Cancels the operation, waking any waiters.
    pub fn cancel(&self) {
        let mut cancel_state = self.cancelled.lock();
        if *cancel_state == CancelState::Untouched {
            *cancel_state = CancelState::Cancelled;
            self.condvar.notify_all();
        }
    }
}
