//! # ite5570d
//!
//! A Linux daemon driving the RGB lighting of ITE 5570 (ASUS) LampArray
//! controllers over HID feature reports.
//!
//! ## Features
//!
//! - **Lighting modes**: static color, breathing ramp, or off (firmware control)
//! - **Hot reload**: JSON configuration is re-read on file change or `SIGHUP`
//! - **Resilient device handling**: hot-plug discovery and reconnect on I/O errors
//! - **Clean shutdown**: lamps are blanked and handed back on `SIGTERM`/`SIGINT`
//!
//! ## Architecture
//!
//! A single [`Daemon`](daemon::Daemon) loop owns everything:
//! - [`ConfigStore`](config::ConfigStore) - configuration file access
//! - [`ChangeDetector`](config_watcher::ChangeDetector) - edit detection
//! - [`LightingEngine`](lighting::LightingEngine) - per-tick frame computation
//! - [`DeviceChannel`](drivers::ite5570::DeviceChannel) - connection lifecycle
//! - [`ControlFlags`](signals::ControlFlags) - signal-driven reload/stop requests
//!
//! ## Example
//!
//! ```no_run
//! use ite5570d::{
//!     config::ConfigStore, daemon::DaemonBuilder, drivers::ite5570::HidApiBackend,
//!     signals::ControlFlags,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let flags = ControlFlags::new();
//!     flags.install()?;
//!     DaemonBuilder::new()
//!         .with_config_store(ConfigStore::locate(None))
//!         .with_flags(flags)
//!         .build(HidApiBackend::new()?)?
//!         .run()
//!         .await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod config_watcher;
pub mod daemon;
pub mod drivers;
pub mod lighting;
pub mod retry;
pub mod signals;
