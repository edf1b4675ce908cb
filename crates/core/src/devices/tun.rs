// TunLink - Serial Network Bridge
// Copyright (C) 2026 TunLink Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;

use tracing::info;
use tunlink_config::{InterfaceConfig, InterfaceMode};

use crate::endpoint::{EndpointKind, FdEndpoint};
use crate::OpenError;

pub const TUN_DEVICE_PATH: &str = "/dev/net/tun";

// _IOW('T', 202, int)
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;

const IFF_TUN: libc::c_short = 0x0001;
const IFF_TAP: libc::c_short = 0x0002;
const IFF_NO_PI: libc::c_short = 0x1000;

/// `struct ifreq` with the union reduced to `ifr_flags`.
#[repr(C)]
struct IfReq {
    name: [libc::c_char; libc::IFNAMSIZ],
    flags: libc::c_short,
    _pad: [u8; 22],
}

impl IfReq {
    fn new(name: &str, flags: libc::c_short) -> Self {
        let mut req = IfReq {
            name: [0; libc::IFNAMSIZ],
            flags,
            _pad: [0; 22],
        };
        for (dst, src) in req.name.iter_mut().zip(name.bytes()) {
            *dst = src as libc::c_char;
        }
        req
    }

    fn name(&self) -> String {
        let bytes: Vec<u8> = self
            .name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn request_flags(config: &InterfaceConfig) -> libc::c_short {
    let mut flags = match config.mode {
        InterfaceMode::Tun => IFF_TUN,
        InterfaceMode::Tap => IFF_TAP,
    };
    if !config.packet_info {
        flags |= IFF_NO_PI;
    }
    flags
}

/// Creates (or attaches to) the interface named in `config`.
///
/// The endpoint takes the kernel-assigned name, which differs from the
/// requested one only for templates such as `tun%d`.
pub fn open(config: &InterfaceConfig) -> Result<FdEndpoint, OpenError> {
    tunlink_config::validate_interface_name(&config.name)
        .map_err(|e| OpenError::invalid_name(config.name.clone(), e.to_string()))?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_CLOEXEC)
        .open(TUN_DEVICE_PATH)
        .map_err(|e| OpenError::from_io(config.name.clone(), e))?;

    let mut req = IfReq::new(&config.name, request_flags(config));
    // SAFETY: `req` is a properly sized, initialised ifreq that outlives the call.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), TUNSETIFF as _, &mut req as *mut IfReq) };
    if rc < 0 {
        return Err(OpenError::from_io(
            config.name.clone(),
            io::Error::last_os_error(),
        ));
    }

    let name = req.name();
    info!(
        "Interface {} ({}) attached to {}",
        name, config.mode, TUN_DEVICE_PATH
    );
    FdEndpoint::new(name.clone(), EndpointKind::VirtualInterface, file)
        .map_err(|e| OpenError::from_io(name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OpenErrorKind;

    #[test]
    fn test_ifreq_layout() {
        assert_eq!(std::mem::size_of::<IfReq>(), 40);
        let req = IfReq::new("inversg", IFF_TUN);
        assert_eq!(req.name(), "inversg");
    }

    #[test]
    fn test_request_flags() {
        let mut config = InterfaceConfig::default();
        assert_eq!(request_flags(&config), IFF_TUN | IFF_NO_PI);

        config.mode = InterfaceMode::Tap;
        config.packet_info = true;
        assert_eq!(request_flags(&config), IFF_TAP);
    }

    #[test]
    fn test_invalid_name_rejected_before_open() {
        let config = InterfaceConfig {
            name: "name-that-is-far-too-long".to_string(),
            ..InterfaceConfig::default()
        };
        let err = open(&config).unwrap_err();
        assert_eq!(err.kind, OpenErrorKind::InvalidName);
    }
}
