//! Kill switch: coordinated stop for the whole engine.
//!
//! Any component may trigger it; the executor reacts by cancelling every
//! live order and the workers drain and exit. Triggering twice is
//! harmless. Signal handlers only touch atomics.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KillSwitchState {
    Running = 0,
    /// Quoting paused; live orders keep their TTLs.
    Paused = 1,
    /// Graceful shutdown: cancel-all, drain, exit.
    ShuttingDown = 2,
    /// Immediate stop.
    EmergencyStop = 3,
}

impl From<u8> for KillSwitchState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Paused,
            2 => Self::ShuttingDown,
            3 => Self::EmergencyStop,
            _ => Self::Running,
        }
    }
}

#[derive(Clone)]
pub struct KillSwitch {
    state: Arc<AtomicU8>,
    reason: Arc<parking_lot::Mutex<Option<String>>>,
    triggered_at: Arc<parking_lot::Mutex<Option<SystemTime>>>,
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl KillSwitch {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(KillSwitchState::Running as u8)),
            reason: Arc::new(parking_lot::Mutex::new(None)),
            triggered_at: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Install SIGTERM/SIGINT handlers that trigger graceful shutdown.
    /// A watcher thread translates the async-signal-safe flags into state.
    pub fn install() -> Self {
        let ks = Self::new();

        #[cfg(unix)]
        {
            let term_flag = Arc::new(AtomicBool::new(false));
            for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
                if let Err(e) = signal_hook::flag::register(signal, term_flag.clone()) {
                    error!(signal, error = %e, "failed to register signal handler");
                }
            }

            let ks_watch = ks.clone();
            std::thread::Builder::new()
                .name("kill-switch-watch".into())
                .spawn(move || loop {
                    if term_flag.load(Ordering::Relaxed) {
                        ks_watch.shutdown("termination signal");
                        return;
                    }
                    std::thread::sleep(std::time::Duration::from_millis(50));
                })
                .ok();
        }

        ks
    }

    pub fn state(&self) -> KillSwitchState {
        self.state.load(Ordering::Acquire).into()
    }

    /// True once any stopping state is reached.
    #[inline]
    pub fn should_stop(&self) -> bool {
        matches!(
            self.state(),
            KillSwitchState::ShuttingDown | KillSwitchState::EmergencyStop
        )
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.state() == KillSwitchState::Paused
    }

    /// Graceful shutdown. Idempotent: the first reason wins, and an
    /// emergency stop is never downgraded.
    pub fn shutdown(&self, reason: &str) {
        let updated = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
            match KillSwitchState::from(cur) {
                KillSwitchState::EmergencyStop => None,
                _ => Some(KillSwitchState::ShuttingDown as u8),
            }
        });
        if updated.is_err() {
            return;
        }
        let mut r = self.reason.lock();
        if r.is_none() {
            *r = Some(reason.to_string());
            *self.triggered_at.lock() = Some(SystemTime::now());
            warn!(reason, "kill switch: shutting down");
        }
    }

    /// Immediate stop.
    pub fn emergency_stop(&self, reason: &str) {
        self.state.store(KillSwitchState::EmergencyStop as u8, Ordering::Release);
        let mut r = self.reason.lock();
        if r.is_none() {
            *r = Some(reason.to_string());
            *self.triggered_at.lock() = Some(SystemTime::now());
        }
        error!(reason, "kill switch: emergency stop");
    }

    /// Toggle pause. No effect once stopping.
    pub fn toggle_pause(&self) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            match KillSwitchState::from(current) {
                KillSwitchState::Running => Some(KillSwitchState::Paused as u8),
                KillSwitchState::Paused => Some(KillSwitchState::Running as u8),
                _ => None,
            }
        });
        info!(state = ?self.state(), "kill switch pause toggled");
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let ks = KillSwitch::new();
        assert_eq!(ks.state(), KillSwitchState::Running);
        assert!(!ks.should_stop());
    }

    #[test]
    fn shutdown_is_idempotent_and_keeps_first_reason() {
        let ks = KillSwitch::new();
        ks.shutdown("operator");
        ks.shutdown("second call");
        assert!(ks.should_stop());
        assert_eq!(ks.reason().as_deref(), Some("operator"));
    }

    #[test]
    fn emergency_outranks_graceful() {
        let ks = KillSwitch::new();
        ks.emergency_stop("ledger corrupt");
        ks.shutdown("too late");
        assert_eq!(ks.state(), KillSwitchState::EmergencyStop);
    }

    #[test]
    fn pause_toggles_and_stop_wins() {
        let ks = KillSwitch::new();
        ks.toggle_pause();
        assert!(ks.is_paused());
        ks.toggle_pause();
        assert!(!ks.is_paused());

        ks.shutdown("done");
        ks.toggle_pause();
        assert!(ks.should_stop());
    }

    #[test]
    fn clones_share_state() {
        let ks = KillSwitch::new();
        let clone = ks.clone();
        ks.shutdown("shared");
        assert!(clone.should_stop());
    }
}
