use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use parking_lot::RwLock;

/// Connection status as observed by callers (the reconnect driver polls it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionStatus {
    #[default]
    Unknown = 0,
    Connecting = 1,
    Connected = 2,
    ConnectFailed = 3,
    Disconnected = 4,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::ConnectFailed,
            4 => Self::Disconnected,
            _ => Self::Unknown,
        }
    }
}

/// Protocol progress of a session.
///
/// ```text
/// Connecting -> Connected -> Describing [-> Authenticating] -> SettingUp
///            -> Playing <-> Paused -> Stopped
/// ```
///
/// `Aborted` is entered silently on any non-2xx reply or authentication
/// failure; the session then sends nothing further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Connecting,
    Connected,
    Describing,
    Authenticating,
    SettingUp,
    Playing,
    Paused,
    Stopped,
    Aborted,
}

impl SessionState {
    /// `Stopped` or `Aborted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Aborted)
    }
}

/// Shared, lock-light view of a session for other threads.
///
/// Written by the engine thread, read by the client facade. The stop flag
/// is raised by `stop()` before the command is queued so that responses
/// already in flight are ignored.
#[derive(Debug, Clone, Default)]
pub struct SessionMonitor {
    status: Arc<AtomicU8>,
    state: Arc<RwLock<SessionState>>,
    stop_requested: Arc<AtomicBool>,
}

impl SessionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.swap(status as u8, Ordering::AcqRel);
        if previous != status as u8 {
            tracing::info!(?status, "connection status changed");
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: SessionState) {
        let mut current = self.state.write();
        if *current != state {
            tracing::info!(from = ?*current, to = ?state, "session state changed");
            *current = state;
        }
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}
