// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod tty;
#[cfg(target_os = "linux")]
pub mod tun;

use std::sync::Arc;

use tunlink_config::InterfaceConfig;

use crate::endpoint::{Endpoint, EndpointOpener};
use crate::OpenError;

/// Opens real devices: `/dev/net/tun` and tty serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl EndpointOpener for SystemOpener {
    #[cfg(target_os = "linux")]
    fn open_virtual_interface(
        &self,
        config: &InterfaceConfig,
    ) -> Result<Arc<dyn Endpoint>, OpenError> {
        Ok(Arc::new(tun::open(config)?))
    }

    #[cfg(not(target_os = "linux"))]
    fn open_virtual_interface(
        &self,
        config: &InterfaceConfig,
    ) -> Result<Arc<dyn Endpoint>, OpenError> {
        Err(OpenError::from_io(
            config.name.clone(),
            std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "TUN/TAP devices are only supported on Linux",
            ),
        ))
    }

    fn open_serial(&self, path: &str, baud: u32) -> Result<Arc<dyn Endpoint>, OpenError> {
        Ok(Arc::new(tty::open(path, baud)?))
    }
}
