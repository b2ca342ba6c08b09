use std::fs::File;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::{LevelFilter, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use ite5570d::{
    cli::{Cli, WatchMode},
    config::ConfigStore,
    config_watcher::{ChangeDetector, MtimePoller, notify_or_poll},
    daemon::DaemonBuilder,
    drivers::ite5570::HidApiBackend,
    signals::ControlFlags,
};

fn init_log(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "ite5570d".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn into_daemon() -> Result<()> {
    File::create("/var/tmp/ite5570d.log")
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

fn change_detector(mode: WatchMode, store: &ConfigStore) -> Box<dyn ChangeDetector> {
    match mode {
        WatchMode::Poll => Box::new(MtimePoller::new(store.clone())) as Box<dyn ChangeDetector>,
        WatchMode::Notify => notify_or_poll(store),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // the daemon chdirs to /, so resolve relative paths first
    let located = ConfigStore::locate(cli.config);
    let store = ConfigStore::new(
        std::path::absolute(located.path())
            .with_context(|| format!("resolve {}", located.path().display()))?,
    );

    // fork before any runtime threads or device handles exist
    if cli.daemonize {
        into_daemon()?;
    }
    init_log(cli.verbose)?;

    let flags = ControlFlags::new();
    flags.install()?;

    info!("Using config {}", store.path().display());
    let detector = change_detector(cli.watch, &store);
    let backend = HidApiBackend::new()?;

    let daemon = DaemonBuilder::new()
        .with_config_store(store)
        .with_change_detector(detector)
        .with_flags(flags)
        .build(backend)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("tokio runtime")?
        .block_on(daemon.run())
}
