// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::sync::Arc;

use tracing::{error, info};

use crate::endpoint::EndpointPair;
use crate::metrics::{DirectionStats, RelayMetrics};
use crate::stop::{StopCause, StopSignal};
use crate::worker::{Direction, Worker, WorkerHandle, WorkerState};
use crate::{BridgeError, RelayObserver};

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub buffer_size: usize,
    /// CPUs for the tun->serial and serial->tun workers.
    pub pin_cpus: Option<[usize; 2]>,
    pub observers: Vec<Arc<dyn RelayObserver>>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            buffer_size: tunlink_config::DEFAULT_BUFFER_SIZE,
            pin_cpus: None,
            observers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReport {
    pub cause: StopCause,
    pub tun_to_serial: DirectionStats,
    pub serial_to_tun: DirectionStats,
}

/// Full-duplex relay between a virtual interface and a serial port.
///
/// Owns the endpoint pair and both workers. The stop signal is the only
/// cross-thread control: raise it (for instance from the signal thread) and
/// [`Bridge::wait`] returns once both workers have wound down.
#[derive(Debug)]
pub struct Bridge {
    pair: EndpointPair,
    stop: Arc<StopSignal>,
    workers: Vec<WorkerHandle>,
    metrics: Arc<RelayMetrics>,
}

impl Bridge {
    pub fn start(
        pair: EndpointPair,
        settings: BridgeSettings,
        stop: Arc<StopSignal>,
    ) -> Result<Self, BridgeError> {
        let metrics = Arc::new(RelayMetrics::new());
        let mut observers = settings.observers.clone();
        observers.push(metrics.clone());

        let mut workers = Vec::with_capacity(Direction::ALL.len());
        for direction in Direction::ALL {
            let (source, destination) = pair.route(direction);
            let mut worker = Worker::new(
                direction,
                source,
                destination,
                settings.buffer_size,
                stop.clone(),
            );
            worker.observers = observers.clone();

            let cpu = settings.pin_cpus.map(|cpus| cpus[direction.index()]);
            match worker.spawn(cpu) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    stop.raise(StopCause::Requested);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    pair.close();
                    return Err(e);
                }
            }
        }

        info!(
            "Bridge up: {} <-> {} ({} byte buffers)",
            pair.virtual_interface().name(),
            pair.serial().name(),
            settings.buffer_size
        );

        Ok(Self {
            pair,
            stop,
            workers,
            metrics,
        })
    }

    pub fn stop_signal(&self) -> Arc<StopSignal> {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.raise(StopCause::Requested);
    }

    pub fn worker_states(&self) -> Vec<(Direction, WorkerState)> {
        self.workers
            .iter()
            .map(|w| (w.direction(), w.state()))
            .collect()
    }

    /// Joins both workers, then closes both endpoints.
    pub fn wait(self) -> Result<BridgeReport, BridgeError> {
        let mut panicked = None;
        for handle in self.workers {
            let direction = handle.direction();
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("{} relay ended: {}", direction, e),
                Err(e) => {
                    self.stop.raise(StopCause::Relay {
                        direction,
                        reason: e.to_string(),
                    });
                    panicked.get_or_insert(e);
                }
            }
        }

        self.pair.close();

        if let Some(e) = panicked {
            return Err(e);
        }

        let report = BridgeReport {
            cause: self.stop.cause().cloned().unwrap_or(StopCause::Completed),
            tun_to_serial: self.metrics.snapshot(Direction::TunToSerial),
            serial_to_tun: self.metrics.snapshot(Direction::SerialToTun),
        };
        info!("Bridge down: {}", report.cause);
        for direction in Direction::ALL {
            info!(
                "{}: {:.1} B/s average",
                direction,
                self.metrics.get_throughput(direction)
            );
        }
        Ok(report)
    }
}
