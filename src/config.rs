//! Configuration management for the ite5570d daemon.
//!
//! The configuration is a small JSON object. Lines whose first non-blank
//! characters are `//` are stripped before parsing so the file can carry
//! human-readable annotations.

use anyhow::{Context, Result, bail};
use log::{info, warn};
use serde::{
    Deserialize, Deserializer,
    de::{self, Unexpected},
};
use serde_json::Number;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

/// Configuration path used when neither the CLI nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ite5570/config.json";

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "ITE5570D_CONFIG";

/// Lighting mode requested by the configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Mode {
    #[default]
    Static,
    Breathe,
    Off,
}

impl From<String> for Mode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "static" => Mode::Static,
            "breathe" => Mode::Breathe,
            "off" => Mode::Off,
            other => {
                warn!("Unknown mode '{other}', falling back to static");
                Mode::Static
            }
        }
    }
}

/// An RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

/// Lighting configuration snapshot.
///
/// # Example
///
/// ```json
/// // breathe in teal
/// {
///   "mode": "breathe",
///   "color": [0, 128, 128],
///   "intensity": 255,
///   "breathe_step_ms": 30
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// `static`, `breathe` or `off`. Anything else behaves as `static`.
    #[serde(default)]
    pub mode: Mode,

    /// Color as `[r, g, b]`, each channel clamped to 0-255.
    #[serde(default = "defaults::color", deserialize_with = "clamped_rgb")]
    pub color: Rgb,

    /// Lamp intensity, clamped to 0-255.
    #[serde(default = "defaults::intensity", deserialize_with = "clamped_u8")]
    pub intensity: u8,

    /// Delay between two breathing steps in milliseconds.
    #[serde(default = "defaults::breathe_step_ms", deserialize_with = "positive_step")]
    pub breathe_step_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            color: defaults::color(),
            intensity: defaults::intensity(),
            breathe_step_ms: defaults::breathe_step_ms(),
        }
    }
}

impl Config {
    pub fn breathe_step(&self) -> Duration {
        Duration::from_millis(self.breathe_step_ms)
    }
}

mod defaults {
    use super::Rgb;

    pub fn color() -> Rgb {
        Rgb::new(255, 0, 0)
    }

    pub fn intensity() -> u8 {
        255
    }

    pub fn breathe_step_ms() -> u64 {
        20
    }
}

fn clamp_channel(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

/// Integer value of a JSON number, saturated to the `i64` range. Fractions
/// are rejected.
fn saturating_integer<E: de::Error>(number: &Number) -> Result<i64, E> {
    if let Some(value) = number.as_i64() {
        Ok(value)
    } else if number.is_u64() {
        Ok(i64::MAX)
    } else {
        Err(E::invalid_type(
            Unexpected::Float(number.as_f64().unwrap_or_default()),
            &"an integer",
        ))
    }
}

fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    saturating_integer(&Number::deserialize(deserializer)?)
}

fn clamped_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    integer(deserializer).map(clamp_channel)
}

fn clamped_rgb<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Rgb, D::Error> {
    let channels = Vec::<Number>::deserialize(deserializer)?;
    match channels.as_slice() {
        [r, g, b] => Ok(Rgb::new(
            clamp_channel(saturating_integer(r)?),
            clamp_channel(saturating_integer(g)?),
            clamp_channel(saturating_integer(b)?),
        )),
        other => Err(de::Error::invalid_length(
            other.len(),
            &"exactly 3 color channels",
        )),
    }
}

fn positive_step<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = integer(deserializer)?;
    if value < 1 {
        warn!(
            "breathe_step_ms must be positive, got {value}; using {}",
            defaults::breathe_step_ms()
        );
        return Ok(defaults::breathe_step_ms());
    }
    Ok(value as u64)
}

/// Removes every line whose first non-whitespace characters are `//`.
pub fn strip_comment_lines(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses configuration text (comments allowed).
pub fn parse(raw: &str) -> Result<Config> {
    let stripped = strip_comment_lines(raw);
    let value: serde_json::Value =
        serde_json::from_str(&stripped).context("Configuration is not valid JSON")?;
    if !value.is_object() {
        bail!("Configuration must be a JSON object");
    }
    serde_json::from_value(value).context("Invalid configuration field")
}

/// Location and loading of the configuration file.
///
/// Holds no configuration itself: the daemon owns the active snapshot and
/// replaces it wholesale on every successful [`ConfigStore::load`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolves the configuration path.
    ///
    /// Order: explicit path, `ITE5570D_CONFIG`, `/etc/ite5570/config.json`.
    /// The file does not have to exist yet.
    pub fn locate(explicit: Option<PathBuf>) -> Self {
        let path = explicit
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the configuration file.
    pub fn load(&self) -> Result<Config> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config file: {}", self.path.display()))?;
        let config = parse(&raw)
            .with_context(|| format!("Failed to parse config: {}", self.path.display()))?;

        info!(
            "Config loaded: mode={:?} RGB({},{},{}) intensity={} step={}ms",
            config.mode,
            config.color.red,
            config.color.green,
            config.color.blue,
            config.intensity,
            config.breathe_step_ms
        );
        Ok(config)
    }

    /// Modification time of the file, `None` if it cannot be stat'ed.
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Compares the current modification time against `last_seen` and
    /// records the new value when it differs.
    pub fn poll_changed(&self, last_seen: &mut Option<SystemTime>) -> bool {
        let current = self.modified();
        if current == *last_seen {
            return false;
        }
        *last_seen = current;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{fs::File, io::Write};
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn empty_object_takes_defaults() {
        let config = parse("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.mode, Mode::Static);
        assert_eq!(config.color, Rgb::new(255, 0, 0));
        assert_eq!(config.intensity, 255);
        assert_eq!(config.breathe_step_ms, 20);
    }

    #[test]
    fn full_config_with_comments() {
        let raw = r#"
// lighting for the desk
{
    // breathing teal
    "mode": "breathe",
    "color": [0, 128, 128],
      // dimmer at night
    "intensity": 100,
    "breathe_step_ms": 35
}
"#;
        let config = parse(raw).unwrap();
        assert_eq!(
            config,
            Config {
                mode: Mode::Breathe,
                color: Rgb::new(0, 128, 128),
                intensity: 100,
                breathe_step_ms: 35,
            }
        );
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = parse(r#"{"color": [-20, 300, 128], "intensity": 999}"#).unwrap();
        assert_eq!(config.color, Rgb::new(0, 255, 128));
        assert_eq!(config.intensity, 255);

        let config = parse(r#"{"intensity": -1}"#).unwrap();
        assert_eq!(config.intensity, 0);
    }

    #[test]
    fn integers_beyond_i64_saturate() {
        let config = parse(
            r#"{"color": [18446744073709551615, -9223372036854775808, 7],
                "intensity": 18446744073709551615,
                "breathe_step_ms": 18446744073709551615}"#,
        )
        .unwrap();
        assert_eq!(config.color, Rgb::new(255, 0, 7));
        assert_eq!(config.intensity, 255);
        assert_eq!(config.breathe_step_ms, i64::MAX as u64);
    }

    #[test]
    fn fractional_numbers_are_rejected() {
        assert!(parse(r#"{"intensity": 12.5}"#).is_err());
        assert!(parse(r#"{"color": [1, 2.0, 3]}"#).is_err());
    }

    #[test]
    fn unknown_mode_falls_back_to_static() {
        let config = parse(r#"{"mode": "disco", "color": [1, 2, 3]}"#).unwrap();
        assert_eq!(config.mode, Mode::Static);
        assert_eq!(config.color, Rgb::new(1, 2, 3));
    }

    #[test]
    fn non_positive_step_uses_default() {
        assert_eq!(parse(r#"{"breathe_step_ms": 0}"#).unwrap().breathe_step_ms, 20);
        assert_eq!(parse(r#"{"breathe_step_ms": -5}"#).unwrap().breathe_step_ms, 20);
        assert_eq!(parse(r#"{"breathe_step_ms": 1}"#).unwrap().breathe_step_ms, 1);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config = parse(r#"{"mode": "off", "speed": 3}"#).unwrap();
        assert_eq!(config.mode, Mode::Off);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(parse("{ \"mode\": ").is_err());
        assert!(parse("[1, 2, 3]").is_err());
        assert!(parse(r#"{"color": [1, 2]}"#).is_err());
        assert!(parse(r#"{"color": "red"}"#).is_err());
        assert!(parse(r#"{"intensity": "high"}"#).is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn inline_double_slash_is_not_a_comment() {
        let config = parse("{\"mode\": \"off\" // trailing\n}");
        assert!(config.is_err());
    }

    #[test]
    fn store_loads_from_file() {
        let temp_file = create_temp_config("// hi\n{\"mode\": \"breathe\"}\n");
        let store = ConfigStore::new(temp_file.path());
        let config = store.load().unwrap();
        assert_eq!(config.mode, Mode::Breathe);
    }

    #[test]
    fn store_load_fails_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("absent.json"));
        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
        assert_eq!(store.modified(), None);
    }

    #[test]
    fn locate_prefers_explicit_path() {
        let store = ConfigStore::locate(Some(PathBuf::from("/tmp/explicit.json")));
        assert_eq!(store.path(), Path::new("/tmp/explicit.json"));
    }

    #[test]
    fn poll_changed_tracks_mtime() {
        let temp_file = create_temp_config("{}");
        let store = ConfigStore::new(temp_file.path());

        let mut last_seen = store.modified();
        assert!(last_seen.is_some());
        assert!(!store.poll_changed(&mut last_seen));

        let later = last_seen.unwrap() + Duration::from_secs(10);
        File::options()
            .write(true)
            .open(temp_file.path())
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(store.poll_changed(&mut last_seen));
        assert_eq!(last_seen, Some(later));
        assert!(!store.poll_changed(&mut last_seen));
    }

    #[test]
    fn poll_changed_notices_creation_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::new(&path);

        let mut last_seen = store.modified();
        assert_eq!(last_seen, None);
        assert!(!store.poll_changed(&mut last_seen));

        fs::write(&path, "{}").unwrap();
        assert!(store.poll_changed(&mut last_seen));

        fs::remove_file(&path).unwrap();
        assert!(store.poll_changed(&mut last_seen));
        assert_eq!(last_seen, None);
    }
}
