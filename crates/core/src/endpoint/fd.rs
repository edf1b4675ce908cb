// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use super::{Endpoint, EndpointError, EndpointKind};
use crate::stop::StopSignal;

type Handle = Box<dyn AsRawFd + Send + Sync>;

enum Readiness {
    Ready,
    Stopped,
}

/// Endpoint over a file descriptor.
///
/// The descriptor is non-blocking; every call waits in `poll(2)` on the data
/// descriptor together with the stop signal's wake descriptor. The handle sits
/// behind a lock so `close` cannot release it under a call in flight.
pub struct FdEndpoint {
    name: String,
    kind: EndpointKind,
    handle: RwLock<Option<Handle>>,
    closed: AtomicBool,
}

impl FdEndpoint {
    /// Takes ownership of `handle`; it is dropped (closing the descriptor) on
    /// `close` or when the endpoint is dropped.
    pub fn new<H>(name: impl Into<String>, kind: EndpointKind, handle: H) -> io::Result<Self>
    where
        H: AsRawFd + Send + Sync + 'static,
    {
        set_nonblocking(handle.as_raw_fd())?;
        Ok(Self {
            name: name.into(),
            kind,
            handle: RwLock::new(Some(Box::new(handle))),
            closed: AtomicBool::new(false),
        })
    }

    fn transfer<F>(
        &self,
        events: libc::c_short,
        stop: &StopSignal,
        mut op: F,
    ) -> Result<usize, EndpointError>
    where
        F: FnMut(RawFd) -> libc::ssize_t,
    {
        let guard = self.handle.read().unwrap_or_else(PoisonError::into_inner);
        let fd = match guard.as_ref() {
            Some(handle) if !self.closed.load(Ordering::SeqCst) => handle.as_raw_fd(),
            _ => return Err(EndpointError::Closed),
        };

        loop {
            if let Readiness::Stopped = wait_for(fd, events, stop)? {
                return Err(EndpointError::Stopped);
            }
            let rc = op(fd);
            if rc >= 0 {
                return Ok(rc as usize);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => continue,
                _ => return Err(EndpointError::Io(err)),
            }
        }
    }
}

impl std::fmt::Debug for FdEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FdEndpoint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Endpoint for FdEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EndpointKind {
        self.kind
    }

    fn read_some(&self, buf: &mut [u8], stop: &StopSignal) -> Result<usize, EndpointError> {
        self.transfer(libc::POLLIN, stop, |fd| {
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
            unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) }
        })
    }

    fn write_some(&self, bytes: &[u8], stop: &StopSignal) -> Result<usize, EndpointError> {
        self.transfer(libc::POLLOUT, stop, |fd| {
            // SAFETY: `bytes` is valid for reads of `bytes.len()` bytes.
            unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) }
        })
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut guard = self.handle.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            tracing::info!("Closed {} {}", self.kind, self.name);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own; no pointers involved.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Blocks until `fd` reports `events` (or hangup/error), or the stop signal fires.
fn wait_for(fd: RawFd, events: libc::c_short, stop: &StopSignal) -> io::Result<Readiness> {
    let mut fds = [
        libc::pollfd {
            fd,
            events,
            revents: 0,
        },
        libc::pollfd {
            fd: stop.wake_fd().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
    ];

    loop {
        if stop.is_raised() {
            return Ok(Readiness::Stopped);
        }
        // SAFETY: `fds` is a valid array of pollfd for the duration of the call.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if fds[1].revents != 0 {
            return Ok(Readiness::Stopped);
        }
        if fds[0].revents & libc::POLLNVAL != 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        if fds[0].revents != 0 {
            return Ok(Readiness::Ready);
        }
    }
}
