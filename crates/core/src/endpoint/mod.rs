// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod fd;
#[cfg(test)]
pub mod mock;

use std::sync::Arc;

use tracing::info;
use tunlink_config::{InterfaceConfig, SerialConfig};

use crate::stop::StopSignal;
use crate::worker::Direction;
use crate::OpenError;

pub use fd::FdEndpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    VirtualInterface,
    Serial,
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointKind::VirtualInterface => f.write_str("virtual interface"),
            EndpointKind::Serial => f.write_str("serial port"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Stop requested")]
    Stopped,
    #[error("Endpoint is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Trait representing an open byte-stream device.
///
/// I/O takes `&self`: one worker reads while the other writes. Both calls
/// block until they make progress, the endpoint is closed, or `stop` is raised.
pub trait Endpoint: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> EndpointKind;

    /// One read call. `Ok(0)` means end-of-stream.
    fn read_some(&self, buf: &mut [u8], stop: &StopSignal) -> Result<usize, EndpointError>;

    /// One write call; may accept fewer bytes than offered.
    fn write_some(&self, bytes: &[u8], stop: &StopSignal) -> Result<usize, EndpointError>;

    /// Releases the device. Raise the stop signal first if a worker may be
    /// waiting on this endpoint.
    fn close(&self);
    fn is_closed(&self) -> bool;
}

/// Platform capability for acquiring endpoints.
pub trait EndpointOpener {
    fn open_virtual_interface(
        &self,
        config: &InterfaceConfig,
    ) -> Result<Arc<dyn Endpoint>, OpenError>;
    fn open_serial(&self, path: &str, baud: u32) -> Result<Arc<dyn Endpoint>, OpenError>;
}

/// The virtual interface and the serial port, paired once at startup.
#[derive(Debug, Clone)]
pub struct EndpointPair {
    virtual_interface: Arc<dyn Endpoint>,
    serial: Arc<dyn Endpoint>,
}

impl EndpointPair {
    pub fn new(virtual_interface: Arc<dyn Endpoint>, serial: Arc<dyn Endpoint>) -> Self {
        Self {
            virtual_interface,
            serial,
        }
    }

    /// Opens the serial port, then the virtual interface. On failure nothing
    /// stays open.
    pub fn open(
        opener: &dyn EndpointOpener,
        interface: &InterfaceConfig,
        serial: &SerialConfig,
    ) -> Result<Self, OpenError> {
        info!("Opening serial port {} at {} baud", serial.path, serial.baud);
        let serial_endpoint = opener.open_serial(&serial.path, serial.baud)?;

        info!("Opening {} interface {}", interface.mode, interface.name);
        let virtual_interface = match opener.open_virtual_interface(interface) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                serial_endpoint.close();
                return Err(e);
            }
        };

        Ok(Self::new(virtual_interface, serial_endpoint))
    }

    pub fn virtual_interface(&self) -> &Arc<dyn Endpoint> {
        &self.virtual_interface
    }

    pub fn serial(&self) -> &Arc<dyn Endpoint> {
        &self.serial
    }

    /// `(source, destination)` for a relay direction.
    pub fn route(&self, direction: Direction) -> (Arc<dyn Endpoint>, Arc<dyn Endpoint>) {
        match direction {
            Direction::TunToSerial => (self.virtual_interface.clone(), self.serial.clone()),
            Direction::SerialToTun => (self.serial.clone(), self.virtual_interface.clone()),
        }
    }

    pub fn close(&self) {
        self.virtual_interface.close();
        self.serial.close();
    }

    pub fn is_closed(&self) -> bool {
        self.virtual_interface.is_closed() && self.serial.is_closed()
    }
}
