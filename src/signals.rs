//! Reload and stop requests delivered by POSIX signals.
//!
//! Handlers registered here only store `true` into an [`AtomicBool`]; all
//! real work happens in the control loop once it observes the flag.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use signal_hook::{
    consts::{SIGHUP, SIGINT, SIGTERM},
    flag,
};

/// Signals that request a graceful shutdown.
const STOP_SIGNALS: [i32; 2] = [SIGTERM, SIGINT];

/// Request flags shared between signal handlers and the control loop.
#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    reload: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes SIGHUP to the reload flag and SIGTERM/SIGINT to the stop flag.
    ///
    /// A second stop signal arriving while a stop is already pending exits
    /// the process immediately with status 1. That exit skips the device
    /// release, so the lamps keep their last frame until the firmware or a
    /// later daemon takes over; it is only meant for a loop stuck in a
    /// blocking device call.
    pub fn install(&self) -> Result<()> {
        flag::register(SIGHUP, Arc::clone(&self.reload)).context("Failed to register SIGHUP")?;

        for sig in STOP_SIGNALS {
            flag::register_conditional_shutdown(sig, 1, Arc::clone(&self.stop))
                .with_context(|| format!("Failed to register shutdown escalation for signal {sig}"))?;
            flag::register(sig, Arc::clone(&self.stop))
                .with_context(|| format!("Failed to register signal {sig}"))?;
        }
        Ok(())
    }

    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Consumes a pending reload request.
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::{Duration, Instant};

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn reload_is_consumed_once() {
        let flags = ControlFlags::new();
        assert!(!flags.take_reload());

        flags.request_reload();
        assert!(flags.take_reload());
        assert!(!flags.take_reload());
    }

    #[test]
    fn stop_is_sticky() {
        let flags = ControlFlags::new();
        let clone = flags.clone();
        assert!(!flags.stop_requested());

        clone.request_stop();
        assert!(flags.stop_requested());
        assert!(flags.stop_requested());
    }

    #[test]
    #[serial]
    fn sighup_sets_reload_flag() {
        let flags = ControlFlags::new();
        flags.install().unwrap();

        signal_hook::low_level::raise(SIGHUP).unwrap();

        assert!(wait_for(|| flags.take_reload()));
        assert!(!flags.stop_requested());
    }

    #[test]
    #[serial]
    fn first_sigterm_only_requests_stop() {
        let flags = ControlFlags::new();
        flags.install().unwrap();

        signal_hook::low_level::raise(SIGTERM).unwrap();

        assert!(wait_for(|| flags.stop_requested()));
        assert!(!flags.take_reload());
    }
}
