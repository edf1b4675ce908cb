// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Serial wiring check: two ports, two threads, each sending an incrementing
//! byte out of one port and reading it back on the other.

use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use crate::endpoint::Endpoint;
use crate::stop::{StopCause, StopSignal};
use crate::{affinity, io, BridgeError, RelayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    AToB,
    BToA,
}

impl Leg {
    pub fn name(self) -> &'static str {
        match self {
            Leg::AToB => "A->B",
            Leg::BToA => "B->A",
        }
    }

    fn thread_name(self) -> &'static str {
        match self {
            Leg::AToB => "ping-a-b",
            Leg::BToA => "ping-b-a",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PingSettings {
    /// Exchanges per leg; unlimited when `None`.
    pub count: Option<u64>,
    pub pin_cpus: Option<[usize; 2]>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegReport {
    pub sent: u64,
    pub received: u64,
    pub mismatched: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReport {
    pub a_to_b: LegReport,
    pub b_to_a: LegReport,
    pub cause: StopCause,
}

pub struct PingExchange;

impl PingExchange {
    /// Runs both legs to completion (or until `stop` is raised).
    pub fn run(
        port_a: Arc<dyn Endpoint>,
        port_b: Arc<dyn Endpoint>,
        settings: &PingSettings,
        stop: Arc<StopSignal>,
    ) -> Result<PingReport, BridgeError> {
        info!("Ping exchange: {} <-> {}", port_a.name(), port_b.name());

        let a_to_b = spawn_leg(Leg::AToB, port_a.clone(), port_b.clone(), settings, &stop)?;
        let b_to_a = match spawn_leg(Leg::BToA, port_b, port_a, settings, &stop) {
            Ok(handle) => handle,
            Err(e) => {
                stop.raise(StopCause::Requested);
                let _ = a_to_b.join();
                return Err(e);
            }
        };

        let a_to_b = a_to_b
            .join()
            .map_err(|_| BridgeError::WorkerPanicked(Leg::AToB.thread_name()))?;
        let b_to_a = b_to_a
            .join()
            .map_err(|_| BridgeError::WorkerPanicked(Leg::BToA.thread_name()))?;

        let report = PingReport {
            a_to_b,
            b_to_a,
            cause: stop.cause().cloned().unwrap_or(StopCause::Completed),
        };
        info!(
            "Ping exchange finished ({}): A->B {}/{} B->A {}/{}",
            report.cause,
            report.a_to_b.received,
            report.a_to_b.sent,
            report.b_to_a.received,
            report.b_to_a.sent
        );
        Ok(report)
    }
}

fn spawn_leg(
    leg: Leg,
    tx: Arc<dyn Endpoint>,
    rx: Arc<dyn Endpoint>,
    settings: &PingSettings,
    stop: &Arc<StopSignal>,
) -> Result<thread::JoinHandle<LegReport>, BridgeError> {
    let count = settings.count;
    let cpu = settings.pin_cpus.map(|cpus| match leg {
        Leg::AToB => cpus[0],
        Leg::BToA => cpus[1],
    });
    let stop = stop.clone();

    thread::Builder::new()
        .name(leg.thread_name().to_string())
        .spawn(move || {
            if let Some(cpu) = cpu {
                if let Err(e) = affinity::pin_current_thread(cpu) {
                    warn!("Could not pin ping leg {} to CPU {}: {}", leg.name(), cpu, e);
                }
            }
            let mut report = LegReport::default();
            match run_leg(leg, &*tx, &*rx, count, &stop, &mut report) {
                Ok(()) => {}
                Err(RelayError::Stopped) => {
                    if stop.raise(StopCause::Requested) {
                        warn!("Ping leg {} stopped on a closed port", leg.name());
                    }
                }
                Err(e) => {
                    error!("Ping leg {} failed: {}", leg.name(), e);
                    stop.raise(StopCause::Ping {
                        leg: leg.name(),
                        reason: e.to_string(),
                    });
                }
            }
            report
        })
        .map_err(|source| BridgeError::Spawn {
            worker: leg.thread_name(),
            source,
        })
}

fn run_leg(
    leg: Leg,
    tx: &dyn Endpoint,
    rx: &dyn Endpoint,
    count: Option<u64>,
    stop: &StopSignal,
    report: &mut LegReport,
) -> Result<(), RelayError> {
    let mut snd: u8 = 0;
    let mut rcv = [0u8; 1];

    while count.map_or(true, |limit| report.received < limit) {
        io::write_all(tx, &[snd], stop)?;
        report.sent += 1;

        io::read_some(rx, &mut rcv, stop)?;
        report.received += 1;
        info!("Ping {} rcv: {}", leg.name(), rcv[0]);
        if rcv[0] != snd {
            report.mismatched += 1;
            warn!("Ping {} expected {} got {}", leg.name(), snd, rcv[0]);
        }
        snd = snd.wrapping_add(1);
    }
    Ok(())
}
