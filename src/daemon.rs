//! The control loop tying configuration, lighting and the device together.

use std::time::Duration;

use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};

use crate::{
    config::{ConfigStore, Mode},
    config_watcher::{ChangeDetector, MtimePoller},
    drivers::ite5570::{DEVICE_ID, DeviceChannel, HidBackend},
    lighting::{Action, LightingEngine},
    retry::RetryPolicy,
    signals::ControlFlags,
};

/// Sleep between ticks when nothing animates.
pub const IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Single-owner control loop.
///
/// Every tick polls for configuration changes, reloads if needed, computes
/// the next frame and pushes it to the device. Nothing here runs
/// concurrently: signals and file events only raise flags that the loop
/// consumes at the start of a tick.
///
/// # Example
///
/// ```no_run
/// use ite5570d::{config::ConfigStore, daemon::DaemonBuilder, drivers::ite5570::HidApiBackend};
///
/// # async fn example() -> anyhow::Result<()> {
/// DaemonBuilder::new()
///     .with_config_store(ConfigStore::locate(None))
///     .build(HidApiBackend::new()?)?
///     .run()
///     .await
/// # }
/// ```
pub struct Daemon<B: HidBackend> {
    channel: DeviceChannel<B>,
    store: ConfigStore,
    engine: LightingEngine,
    detector: Box<dyn ChangeDetector>,
    flags: ControlFlags,
}

impl<B: HidBackend> Daemon<B> {
    /// Runs until a stop is requested, then hands the device back to the
    /// firmware.
    pub async fn run(mut self) -> Result<()> {
        info!("Daemon started");

        // reflect the configuration before the first tick
        self.apply().await;

        while !self.flags.stop_requested() {
            let pause = self.tick().await;
            tokio::time::sleep(pause).await;
        }

        info!("Shutting down");
        self.channel.close();
        info!("Daemon stopped");
        Ok(())
    }

    /// One loop iteration. Returns how long to sleep before the next one.
    async fn tick(&mut self) -> Duration {
        self.reload_if_needed();
        self.apply().await;

        match self.engine.config().mode {
            Mode::Breathe => self.engine.config().breathe_step(),
            Mode::Static | Mode::Off => IDLE_INTERVAL,
        }
    }

    fn reload_if_needed(&mut self) {
        // both sources are consumed on every tick
        let changed = self.detector.poll_changed();
        let signalled = self.flags.take_reload();

        if changed {
            info!("Config file changed, reloading");
        }
        if signalled {
            info!("Reload requested by signal");
        }
        if !changed && !signalled {
            return;
        }

        match self.store.load() {
            Ok(config) => self.engine.replace_config(config),
            Err(e) => error!("Failed to load config: {e:#}; keeping previous config"),
        }
    }

    async fn apply(&mut self) {
        let result = match self.engine.next_action() {
            Action::Fill(frame) => self.channel.fill(frame).await,
            Action::Release => self.channel.release().await,
        };

        if let Err(e) = result {
            if self.flags.stop_requested() {
                debug!("Device update skipped during shutdown: {e:#}");
            } else {
                warn!("Failed to update device: {e:#}");
            }
        }
    }
}

/// Builder for [`Daemon`].
pub struct DaemonBuilder {
    store: Option<ConfigStore>,
    detector: Option<Box<dyn ChangeDetector>>,
    flags: ControlFlags,
    retry: RetryPolicy,
}

impl Default for DaemonBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            detector: None,
            flags: ControlFlags::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_config_store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the default modification-time poller.
    pub fn with_change_detector(mut self, detector: Box<dyn ChangeDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Flags the loop consumes; install signal handlers on the same instance.
    pub fn with_flags(mut self, flags: ControlFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Loads the initial configuration and assembles the daemon.
    ///
    /// An unreadable configuration is not fatal: defaults are used until a
    /// valid file shows up.
    pub fn build<B: HidBackend>(self, backend: B) -> Result<Daemon<B>> {
        let store = self
            .store
            .ok_or_else(|| anyhow!("Configuration store is required"))?;

        // capture the mtime before loading so an edit racing the load is seen
        let detector: Box<dyn ChangeDetector> = match self.detector {
            Some(detector) => detector,
            None => Box::new(MtimePoller::new(store.clone())),
        };

        let config = store.load().unwrap_or_else(|e| {
            warn!("{e:#}; starting with default configuration");
            Default::default()
        });

        Ok(Daemon {
            channel: DeviceChannel::new(backend, DEVICE_ID, self.retry, self.flags.clone()),
            store,
            engine: LightingEngine::new(config),
            detector,
            flags: self.flags,
        })
    }
}
