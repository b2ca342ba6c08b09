use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How configuration edits are detected.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WatchMode {
    /// Compare the file's modification time once per tick
    #[default]
    Poll,
    /// Filesystem notifications (inotify)
    Notify,
}

/// ite5570d: lighting daemon for ITE 5570 LampArray controllers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON config file path (default: $ITE5570D_CONFIG or /etc/ite5570/config.json)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach from the terminal and run in the background
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,

    /// Log debug messages
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Config change detection strategy
    #[arg(long = "watch", value_enum, default_value_t = WatchMode::Poll)]
    pub watch: WatchMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["ite5570d"]);
        assert_eq!(cli.config, None);
        assert!(!cli.daemonize);
        assert!(!cli.verbose);
        assert_eq!(cli.watch, WatchMode::Poll);
    }

    #[test]
    fn all_flags() {
        let cli = Cli::parse_from([
            "ite5570d",
            "-c",
            "/tmp/lights.json",
            "-d",
            "-v",
            "--watch",
            "notify",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/lights.json")));
        assert!(cli.daemonize);
        assert!(cli.verbose);
        assert_eq!(cli.watch, WatchMode::Notify);
    }

    #[test]
    fn rejects_unknown_watch_mode() {
        assert!(Cli::try_parse_from(["ite5570d", "--watch", "fanotify"]).is_err());
    }
}
