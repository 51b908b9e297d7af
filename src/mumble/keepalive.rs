use crate::mumble::control::{ping_packet, Outbound};
use crate::transport::errors::TransportError;
use log::warn;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Background task that pings the server on the shared outbound writer.
/// Dropping it stops the task and waits for it to exit.
pub struct Keepalive {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Keepalive {
    pub fn start(outbound: Outbound, interval: Duration) -> Result<Self, TransportError> {
        let (stop, stopped) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("ping".to_string())
            .spawn(move || run(outbound, interval, stopped))?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("keepalive task panicked");
            }
        }
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(outbound: Outbound, interval: Duration, stopped: Receiver<()>) {
    loop {
        match stopped.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        if let Err(err) = outbound.send(ping_packet(unix_seconds())) {
            warn!("keepalive failed: {err}");
            return;
        }
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
