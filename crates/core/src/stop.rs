// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use crate::worker::Direction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopCause {
    /// A termination signal (SIGHUP, SIGTERM, SIGINT) was delivered.
    Signal(i32),
    /// A worker hit end-of-stream or an unrecoverable I/O error.
    Relay {
        direction: Direction,
        reason: String,
    },
    /// A ping leg failed.
    Ping { leg: &'static str, reason: String },
    /// Stopped programmatically.
    Requested,
    /// Every worker ran to completion.
    Completed,
}

impl StopCause {
    /// Administrative stops, as opposed to failures.
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            StopCause::Signal(_) | StopCause::Requested | StopCause::Completed
        )
    }
}

impl std::fmt::Display for StopCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopCause::Signal(sig) => write!(f, "signal {}", sig),
            StopCause::Relay { direction, reason } => write!(f, "{} relay: {}", direction, reason),
            StopCause::Ping { leg, reason } => write!(f, "ping leg {}: {}", leg, reason),
            StopCause::Requested => f.write_str("stop requested"),
            StopCause::Completed => f.write_str("completed"),
        }
    }
}

/// Bridge-wide cancellation.
///
/// Raising writes one byte into a self-pipe that is never drained, so the read
/// side stays readable and every `poll` that includes [`StopSignal::wake_fd`]
/// returns from then on. The first raise records the cause.
#[derive(Debug)]
pub struct StopSignal {
    raised: AtomicBool,
    cause: OnceLock<StopCause>,
    wake_rx: UnixStream,
    wake_tx: UnixStream,
}

impl StopSignal {
    pub fn new() -> io::Result<Self> {
        let (wake_rx, wake_tx) = UnixStream::pair()?;
        wake_rx.set_nonblocking(true)?;
        wake_tx.set_nonblocking(true)?;
        Ok(Self {
            raised: AtomicBool::new(false),
            cause: OnceLock::new(),
            wake_rx,
            wake_tx,
        })
    }

    /// Returns `true` if this call was the one that recorded the cause.
    pub fn raise(&self, cause: StopCause) -> bool {
        let first = self.cause.set(cause).is_ok();
        if !self.raised.swap(true, Ordering::SeqCst) {
            if let Err(e) = (&self.wake_tx).write(&[1]) {
                // The flag is still set; pollers only miss the wakeup.
                tracing::error!("Failed to write stop wakeup: {}", e);
            }
        }
        first
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    pub fn cause(&self) -> Option<&StopCause> {
        self.cause.get()
    }

    pub fn wake_fd(&self) -> BorrowedFd<'_> {
        self.wake_rx.as_fd()
    }

    /// Sleeps until raised or until `timeout` elapses. Returns `is_raised()`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_raised() {
            return true;
        }
        let mut fds = [libc::pollfd {
            fd: self.wake_rx.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }];
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // SAFETY: `fds` is a valid array of one pollfd for the duration of the call.
        unsafe {
            libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, millis);
        }
        self.is_raised()
    }
}
