//! Termination signals (SIGHUP, SIGTERM, SIGINT) raise the bridge stop signal.
//!
//! SIGKILL and SIGSTOP cannot be caught and are not registered.

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::info;
use tunlink_core::{StopCause, StopSignal};

pub struct SignalWatcher {
    handle: Handle,
    thread: JoinHandle<()>,
}

impl SignalWatcher {
    pub fn install(stop: Arc<StopSignal>) -> std::io::Result<Self> {
        let mut signals = Signals::new([SIGHUP, SIGTERM, SIGINT])?;
        let handle = signals.handle();

        let thread = std::thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    if stop.raise(StopCause::Signal(signal)) {
                        info!("Received signal {}, shutting down", signal);
                    } else {
                        info!("Received signal {} while already stopping", signal);
                    }
                }
            })?;

        Ok(Self { handle, thread })
    }

    /// Stops watching and joins the signal thread.
    pub fn shutdown(self) {
        self.handle.close();
        let _ = self.thread.join();
    }
}
