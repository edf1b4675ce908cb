// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod affinity;
pub mod bridge;
pub mod devices;
pub mod endpoint;
pub mod io;
pub mod metrics;
pub mod ping;
pub mod stop;
pub mod worker;

pub use bridge::{Bridge, BridgeReport, BridgeSettings};
pub use endpoint::{Endpoint, EndpointError, EndpointKind, EndpointOpener, EndpointPair};
pub use stop::{StopCause, StopSignal};
pub use worker::{Direction, WorkerState};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenErrorKind {
    NotFound,
    PermissionDenied,
    Busy,
    InvalidName,
    Other,
}

/// An endpoint could not be acquired. Fatal to startup.
#[derive(Debug, thiserror::Error)]
#[error("Failed to open {endpoint} ({kind:?}): {source}")]
pub struct OpenError {
    pub endpoint: String,
    pub kind: OpenErrorKind,
    #[source]
    pub source: std::io::Error,
}

impl OpenError {
    pub fn from_io(endpoint: impl Into<String>, source: std::io::Error) -> Self {
        let kind = match (source.raw_os_error(), source.kind()) {
            (Some(libc::EBUSY), _) | (_, std::io::ErrorKind::ResourceBusy) => OpenErrorKind::Busy,
            (Some(libc::ENODEV), _) | (_, std::io::ErrorKind::NotFound) => OpenErrorKind::NotFound,
            (_, std::io::ErrorKind::PermissionDenied) => OpenErrorKind::PermissionDenied,
            _ => OpenErrorKind::Other,
        };
        Self {
            endpoint: endpoint.into(),
            kind,
            source,
        }
    }

    pub fn invalid_name(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind: OpenErrorKind::InvalidName,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, reason.into()),
        }
    }
}

/// Why a relay loop stopped.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{endpoint} reached end of stream")]
    EndOfStream { endpoint: String },
    #[error("Read from {endpoint} failed: {source}")]
    Read {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Write to {endpoint} failed after {written} of {len} bytes: {source}")]
    Write {
        endpoint: String,
        written: usize,
        len: usize,
        #[source]
        source: std::io::Error,
    },
    /// The stop signal was raised or the endpoint was closed. Not a failure.
    #[error("Relay stopped")]
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn {worker} thread: {source}")]
    Spawn {
        worker: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

pub type RelayResult<T> = Result<T, RelayError>;

/// Trait for observing relay events in a modular way.
pub trait RelayObserver: std::fmt::Debug + Send + Sync {
    fn on_worker_start(&self, _direction: Direction) {}
    fn on_worker_stop(&self, _direction: Direction) {}
    fn on_read(&self, _direction: Direction, _bytes: usize) {}
    /// `calls` is the number of write calls needed to flush `bytes`.
    fn on_write(&self, _direction: Direction, _bytes: usize, _calls: usize) {}
}
