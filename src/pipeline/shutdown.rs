//! Process shutdown signal.
//!
//! The signal is a channel that never carries a message: triggering drops the
//! only sender, which wakes every waiting receiver at once.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Owning side; trigger it once to stop the pipeline.
#[derive(Debug)]
pub struct ShutdownHandle {
    _sender: Sender<()>,
}

impl ShutdownHandle {
    pub fn trigger(self) {}
}

/// Observing side, cloned into every stage.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: Receiver<()>,
}

impl ShutdownSignal {
    /// Sleep for up to `timeout`; returns `true` if shutdown was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(
            self.receiver.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }

    pub fn is_requested(&self) -> bool {
        !matches!(self.receiver.try_recv(), Err(TryRecvError::Empty))
    }
}

pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (sender, receiver) = bounded(0);
    (
        ShutdownHandle { _sender: sender },
        ShutdownSignal { receiver },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out_until_triggered() {
        let (handle, signal) = shutdown_channel();
        assert!(!signal.is_requested());
        assert!(!signal.wait(Duration::from_millis(5)));

        let other = signal.clone();
        handle.trigger();
        let start = Instant::now();
        assert!(other.wait(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(signal.is_requested());
    }
}
