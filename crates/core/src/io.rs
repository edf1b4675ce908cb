// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Read and write primitives shared by every relay loop.

use crate::endpoint::{Endpoint, EndpointError};
use crate::stop::StopSignal;
use crate::{RelayError, RelayResult};

/// A single blocking read. Never returns `Ok(0)`: a zero-byte read is
/// reported as [`RelayError::EndOfStream`].
pub fn read_some(source: &dyn Endpoint, buf: &mut [u8], stop: &StopSignal) -> RelayResult<usize> {
    loop {
        match source.read_some(buf, stop) {
            Ok(0) => {
                return Err(RelayError::EndOfStream {
                    endpoint: source.name().to_string(),
                })
            }
            Ok(n) => return Ok(n),
            Err(EndpointError::Io(e)) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(EndpointError::Io(e)) => {
                return Err(RelayError::Read {
                    endpoint: source.name().to_string(),
                    source: e,
                })
            }
            Err(EndpointError::Stopped) | Err(EndpointError::Closed) => {
                return Err(RelayError::Stopped)
            }
        }
    }
}

/// Writes every byte of `bytes`, issuing as many partial writes as the
/// destination needs. Returns the number of write calls made.
pub fn write_all(destination: &dyn Endpoint, bytes: &[u8], stop: &StopSignal) -> RelayResult<usize> {
    let mut written = 0;
    let mut calls = 0;

    while written < bytes.len() {
        calls += 1;
        match destination.write_some(&bytes[written..], stop) {
            Ok(0) => {
                return Err(RelayError::Write {
                    endpoint: destination.name().to_string(),
                    written,
                    len: bytes.len(),
                    source: std::io::Error::from(std::io::ErrorKind::WriteZero),
                })
            }
            Ok(n) => written += n,
            Err(EndpointError::Io(e)) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(EndpointError::Io(e)) => {
                return Err(RelayError::Write {
                    endpoint: destination.name().to_string(),
                    written,
                    len: bytes.len(),
                    source: e,
                })
            }
            Err(EndpointError::Stopped) | Err(EndpointError::Closed) => {
                return Err(RelayError::Stopped)
            }
        }
    }

    Ok(calls)
}
