// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::endpoint::{Endpoint, EndpointKind};
use crate::stop::{StopCause, StopSignal};
use crate::{affinity, io, BridgeError, RelayError, RelayObserver, RelayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    TunToSerial,
    SerialToTun,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::TunToSerial, Direction::SerialToTun];

    pub fn index(self) -> usize {
        match self {
            Direction::TunToSerial => 0,
            Direction::SerialToTun => 1,
        }
    }

    pub fn thread_name(self) -> &'static str {
        match self {
            Direction::TunToSerial => "relay-tun-serial",
            Direction::SerialToTun => "relay-serial-tun",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::TunToSerial => f.write_str("tun->serial"),
            Direction::SerialToTun => f.write_str("serial->tun"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Stopped,
}

/// One direction of the bridge: read from `source`, write everything to
/// `destination`, forever.
#[derive(Debug)]
pub struct Worker {
    pub direction: Direction,
    pub source: Arc<dyn Endpoint>,
    pub destination: Arc<dyn Endpoint>,
    pub buffer_size: usize,
    pub stop: Arc<StopSignal>,
    pub observers: Vec<Arc<dyn RelayObserver>>,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        direction: Direction,
        source: Arc<dyn Endpoint>,
        destination: Arc<dyn Endpoint>,
        buffer_size: usize,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            direction,
            source,
            destination,
            buffer_size,
            stop,
            observers: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> WorkerState {
        state_of(&self.running)
    }

    /// Runs the relay loop on the calling thread until it stops.
    ///
    /// A stop caused by the stop signal or a closed endpoint is `Ok`. Every
    /// stop leaves the stop signal raised so the sibling direction ends too.
    pub fn run(&self) -> RelayResult<()> {
        let _guard = RaiseOnPanic {
            stop: &self.stop,
            direction: self.direction,
        };

        self.running.store(true, Ordering::SeqCst);
        for observer in &self.observers {
            observer.on_worker_start(self.direction);
        }
        info!(
            "{} worker started ({} -> {})",
            self.direction,
            self.source.name(),
            self.destination.name()
        );

        let mut buffer = vec![0u8; self.buffer_size];
        let reason = self.relay(&mut buffer);

        self.running.store(false, Ordering::SeqCst);
        for observer in &self.observers {
            observer.on_worker_stop(self.direction);
        }

        match reason {
            RelayError::Stopped => {
                // Raised here only when an endpoint was closed under us.
                if self.stop.raise(StopCause::Requested) {
                    warn!("{} worker stopped on a closed endpoint", self.direction);
                } else {
                    info!("{} worker stopped", self.direction);
                }
                Ok(())
            }
            e => {
                error!("{} worker failed: {}", self.direction, e);
                self.stop.raise(StopCause::Relay {
                    direction: self.direction,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn relay(&self, buffer: &mut [u8]) -> RelayError {
        loop {
            let n = match io::read_some(&*self.source, buffer, &self.stop) {
                Ok(n) => n,
                Err(e) => return e,
            };
            if n == buffer.len() && self.source.kind() == EndpointKind::VirtualInterface {
                warn!(
                    "{}: read filled the {} byte buffer, frame from {} may be truncated",
                    self.direction,
                    buffer.len(),
                    self.source.name()
                );
            }
            for observer in &self.observers {
                observer.on_read(self.direction, n);
            }

            let calls = match io::write_all(&*self.destination, &buffer[..n], &self.stop) {
                Ok(calls) => calls,
                Err(e) => return e,
            };
            debug!("{}: relayed {} bytes in {} write calls", self.direction, n, calls);
            for observer in &self.observers {
                observer.on_write(self.direction, n, calls);
            }
        }
    }

    /// Starts the worker on its own named thread, optionally pinned to `cpu`.
    pub fn spawn(self, cpu: Option<usize>) -> Result<WorkerHandle, BridgeError> {
        let direction = self.direction;
        let running = self.running.clone();
        let thread = thread::Builder::new()
            .name(direction.thread_name().to_string())
            .spawn(move || {
                if let Some(cpu) = cpu {
                    match affinity::pin_current_thread(cpu) {
                        Ok(()) => info!("{} worker pinned to CPU {}", direction, cpu),
                        Err(e) => warn!("Could not pin {} worker to CPU {}: {}", direction, cpu, e),
                    }
                }
                self.run()
            })
            .map_err(|source| BridgeError::Spawn {
                worker: direction.thread_name(),
                source,
            })?;

        Ok(WorkerHandle {
            direction,
            running,
            thread,
        })
    }
}

fn state_of(running: &AtomicBool) -> WorkerState {
    if running.load(Ordering::SeqCst) {
        WorkerState::Running
    } else {
        WorkerState::Stopped
    }
}

/// Keeps the sibling from running on alone if this worker panics.
struct RaiseOnPanic<'a> {
    stop: &'a StopSignal,
    direction: Direction,
}

impl Drop for RaiseOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.stop.raise(StopCause::Relay {
                direction: self.direction,
                reason: "worker panicked".to_string(),
            });
        }
    }
}

#[derive(Debug)]
pub struct WorkerHandle {
    direction: Direction,
    running: Arc<AtomicBool>,
    thread: JoinHandle<RelayResult<()>>,
}

impl WorkerHandle {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> WorkerState {
        state_of(&self.running)
    }

    pub fn join(self) -> Result<RelayResult<()>, BridgeError> {
        self.thread
            .join()
            .map_err(|_| BridgeError::WorkerPanicked(self.direction.thread_name()))
    }
}
