//! Scripted in-memory endpoints for relay tests.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tunlink_config::InterfaceConfig;

use super::{Endpoint, EndpointError, EndpointKind, EndpointOpener};
use crate::stop::StopSignal;
use crate::{OpenError, OpenErrorKind};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Each queued frame is returned by exactly one read call, truncated to the
/// caller's buffer like a TUN device would.
#[derive(Debug)]
pub struct MockEndpoint {
    name: String,
    kind: EndpointKind,
    frames: Mutex<VecDeque<Vec<u8>>>,
    eof_when_drained: bool,
    max_write: Option<usize>,
    fail_write_on_call: Option<usize>,
    block_writes: bool,
    written: Mutex<Vec<u8>>,
    read_calls: AtomicUsize,
    write_calls: AtomicUsize,
    closed: AtomicBool,
}

impl MockEndpoint {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: EndpointKind::Serial,
            frames: Mutex::new(VecDeque::new()),
            eof_when_drained: false,
            max_write: None,
            fail_write_on_call: None,
            block_writes: false,
            written: Mutex::new(Vec::new()),
            read_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_kind(mut self, kind: EndpointKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_frames(self, frames: &[&[u8]]) -> Self {
        {
            let mut queue = self.frames.lock().unwrap();
            queue.extend(frames.iter().map(|f| f.to_vec()));
        }
        self
    }

    /// Report end-of-stream once every queued frame has been read.
    pub fn eof_when_drained(mut self) -> Self {
        self.eof_when_drained = true;
        self
    }

    /// Accept at most `n` bytes per write call.
    pub fn max_write(mut self, n: usize) -> Self {
        self.max_write = Some(n);
        self
    }

    /// Fail the `call`-th write (1-based) with a permanent error.
    pub fn fail_write_on_call(mut self, call: usize) -> Self {
        self.fail_write_on_call = Some(call);
        self
    }

    /// Every write blocks until the stop signal is raised.
    pub fn block_writes(mut self) -> Self {
        self.block_writes = true;
        self
    }

    pub fn push_frame(&self, frame: &[u8]) {
        self.frames.lock().unwrap().push_back(frame.to_vec());
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn check_open(&self, stop: &StopSignal) -> Result<(), EndpointError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EndpointError::Closed);
        }
        if stop.is_raised() {
            return Err(EndpointError::Stopped);
        }
        Ok(())
    }
}

impl Endpoint for MockEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EndpointKind {
        self.kind
    }

    fn read_some(&self, buf: &mut [u8], stop: &StopSignal) -> Result<usize, EndpointError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        loop {
            self.check_open(stop)?;
            if let Some(frame) = self.frames.lock().unwrap().pop_front() {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                return Ok(n);
            }
            if self.eof_when_drained {
                return Ok(0);
            }
            stop.wait_timeout(POLL_INTERVAL);
        }
    }

    fn write_some(&self, bytes: &[u8], stop: &StopSignal) -> Result<usize, EndpointError> {
        let call = self.write_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_open(stop)?;
        if self.fail_write_on_call == Some(call) {
            return Err(EndpointError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        if self.block_writes {
            loop {
                self.check_open(stop)?;
                stop.wait_timeout(POLL_INTERVAL);
            }
        }
        let n = self.max_write.map_or(bytes.len(), |max| bytes.len().min(max));
        self.written.lock().unwrap().extend_from_slice(&bytes[..n]);
        Ok(n)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Records what was opened; optionally fails one of the opens.
#[derive(Debug, Default)]
pub struct MockOpener {
    serial_failure: Option<OpenErrorKind>,
    interface_failure: Option<OpenErrorKind>,
    interface_opens: AtomicUsize,
    opened_serial: Mutex<Option<Arc<MockEndpoint>>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_serial(mut self, kind: OpenErrorKind) -> Self {
        self.serial_failure = Some(kind);
        self
    }

    pub fn fail_interface(mut self, kind: OpenErrorKind) -> Self {
        self.interface_failure = Some(kind);
        self
    }

    pub fn interface_opens(&self) -> usize {
        self.interface_opens.load(Ordering::SeqCst)
    }

    pub fn opened_serial(&self) -> Option<Arc<MockEndpoint>> {
        self.opened_serial.lock().unwrap().clone()
    }
}

fn mock_open_error(endpoint: &str, kind: OpenErrorKind) -> OpenError {
    let io_kind = match kind {
        OpenErrorKind::NotFound => io::ErrorKind::NotFound,
        OpenErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
        _ => io::ErrorKind::Other,
    };
    OpenError {
        endpoint: endpoint.to_string(),
        kind,
        source: io::Error::new(io_kind, "mock open failure"),
    }
}

impl EndpointOpener for MockOpener {
    fn open_virtual_interface(
        &self,
        config: &InterfaceConfig,
    ) -> Result<Arc<dyn Endpoint>, OpenError> {
        self.interface_opens.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.interface_failure {
            return Err(mock_open_error(&config.name, kind));
        }
        Ok(Arc::new(
            MockEndpoint::new(&config.name).with_kind(EndpointKind::VirtualInterface),
        ))
    }

    fn open_serial(&self, path: &str, _baud: u32) -> Result<Arc<dyn Endpoint>, OpenError> {
        if let Some(kind) = self.serial_failure {
            return Err(mock_open_error(path, kind));
        }
        let endpoint = Arc::new(MockEndpoint::new(path));
        *self.opened_serial.lock().unwrap() = Some(endpoint.clone());
        Ok(endpoint)
    }
}
