use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::event::Event;

/// Default keepalive period: one OPTIONS every 20 seconds.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Cancellable periodic timer posting [`Event::KeepaliveTick`].
///
/// The timer thread waits on a cancel channel with `recv_timeout`, so
/// [`cancel`](Self::cancel) (or drop) wakes it immediately instead of
/// waiting out the interval.
#[derive(Debug)]
pub struct Keepalive {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Keepalive {
    pub fn start(interval: Duration, events: Sender<Event>) -> Self {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            loop {
                match cancelled.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        tracing::trace!("keepalive tick");
                        if events.send(Event::KeepaliveTick).is_err() {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            tracing::debug!("keepalive timer stopped");
        });

        tracing::debug!(interval_secs = interval.as_secs_f64(), "keepalive timer started");
        Self {
            cancel: Some(cancel),
            handle: Some(handle),
        }
    }

    /// Stop the timer and wait for its thread. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_until_cancelled() {
        let (tx, rx) = mpsc::channel();
        let mut keepalive = Keepalive::start(Duration::from_millis(10), tx);

        for _ in 0..2 {
            let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert!(matches!(event, Event::KeepaliveTick));
        }

        keepalive.cancel();
        assert!(!keepalive.is_running());
        // Drain anything posted before cancellation; then the sender is gone.
        while rx.try_recv().is_ok() {}
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn cancel_is_prompt_and_idempotent() {
        let (tx, _rx) = mpsc::channel();
        let mut keepalive = Keepalive::start(Duration::from_secs(3600), tx);
        let started = std::time::Instant::now();
        keepalive.cancel();
        keepalive.cancel();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
