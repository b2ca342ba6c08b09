//! Frame computation for the supported lighting modes.

use crate::config::{Config, Mode};

/// Number of steps on each flank of the breathing ramp (`0..=255` by 5).
const RAMP_HALF: usize = 256_usize.div_ceil(5);

/// Length of one full breathing cycle.
pub const RAMP_LEN: usize = RAMP_HALF * 2;

/// Triangular intensity waveform: 0, 5, ..., 255, 255, 250, ..., 0.
pub static RAMP: [u8; RAMP_LEN] = build_ramp();

const fn build_ramp() -> [u8; RAMP_LEN] {
    let mut table = [0u8; RAMP_LEN];
    let mut i = 0;
    while i < RAMP_HALF {
        table[i] = (i * 5) as u8;
        table[RAMP_HALF + i] = (255 - i * 5) as u8;
        i += 1;
    }
    table
}

/// One color/intensity vector applied to every lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub intensity: u8,
}

impl Frame {
    pub const BLACK: Frame = Frame {
        red: 0,
        green: 0,
        blue: 0,
        intensity: 0,
    };
}

/// What the device should do on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Fill(Frame),
    /// Blank the lamps and hand control back to the firmware.
    Release,
}

/// Flat frame straight from the configuration.
pub fn apply_static(cfg: &Config) -> Frame {
    Frame {
        red: cfg.color.red,
        green: cfg.color.green,
        blue: cfg.color.blue,
        intensity: cfg.intensity,
    }
}

/// One breathing step at `cursor`. Returns the frame and the next cursor.
pub fn step_breathe(cfg: &Config, cursor: usize) -> (Frame, usize) {
    let cursor = cursor % RAMP_LEN;
    let level = RAMP[cursor];
    let scale = |channel: u8| (u32::from(channel) * u32::from(level) / 255) as u8;

    let frame = Frame {
        red: scale(cfg.color.red),
        green: scale(cfg.color.green),
        blue: scale(cfg.color.blue),
        intensity: level,
    };
    (frame, (cursor + 1) % RAMP_LEN)
}

/// Active configuration plus the breathing ramp position.
#[derive(Debug, Clone, Default)]
pub struct LightingEngine {
    config: Config,
    cursor: usize,
}

impl LightingEngine {
    pub fn new(config: Config) -> Self {
        Self { config, cursor: 0 }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Swaps in a new snapshot. The ramp always restarts, even when the mode
    /// is unchanged.
    pub fn replace_config(&mut self, config: Config) {
        self.config = config;
        self.cursor = 0;
    }

    /// Computes the next action, advancing the ramp in breathe mode.
    pub fn next_action(&mut self) -> Action {
        match self.config.mode {
            Mode::Static => Action::Fill(apply_static(&self.config)),
            Mode::Breathe => {
                let (frame, next) = step_breathe(&self.config, self.cursor);
                self.cursor = next;
                Action::Fill(frame)
            }
            Mode::Off => Action::Release,
        }
    }
}
