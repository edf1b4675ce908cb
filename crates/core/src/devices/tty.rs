// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;

use serial::prelude::*;
use tracing::info;

use crate::endpoint::{EndpointKind, FdEndpoint};
use crate::OpenError;

/// Opens `path` for exclusive raw access at `baud`, 8N1, no flow control.
pub fn open(path: &str, baud: u32) -> Result<FdEndpoint, OpenError> {
    let mut port = serial::open(path).map_err(|e| open_error(path, e))?;

    port.reconfigure(&|s| {
        s.set_baud_rate(serial::BaudRate::from_speed(baud as usize))?;
        s.set_char_size(serial::Bits8);
        s.set_parity(serial::ParityNone);
        s.set_stop_bits(serial::Stop1);
        s.set_flow_control(serial::FlowNone);
        Ok(())
    })
    .map_err(|e| OpenError::from_io(path, e.into()))?;

    let endpoint = FdEndpoint::new(path, EndpointKind::Serial, port)
        .map_err(|e| OpenError::from_io(path, e))?;
    info!("Serial port {} configured at {} baud", path, baud);
    Ok(endpoint)
}

/// `serial` reports most open failures as `NoDevice` without the errno, so
/// open the path once more to recover the kernel's reason.
fn open_error(path: &str, err: serial::Error) -> OpenError {
    let source = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)
        .err()
        .unwrap_or_else(|| io::Error::from(err));
    OpenError::from_io(path, source)
}
