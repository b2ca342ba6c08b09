//! LampArray feature report layouts understood by the ITE 5570 firmware.
//!
//! Every report is fixed-size and little-endian. The firmware silently drops
//! reports it cannot parse, so the layouts below must stay bit-exact.

use anyhow::{Result, anyhow};

/// Feature report ID of the LampArrayAttributes report (get).
pub const ATTRIBUTES_REPORT_ID: u8 = 0x41;

/// Total length of the LampArrayAttributes report, report ID included.
pub const ATTRIBUTES_REPORT_LEN: usize = 23;

/// Feature report ID of the LampRangeUpdate report (set).
pub const RANGE_UPDATE_REPORT_ID: u8 = 0x45;

/// Feature report ID of the LampArrayControl report (set).
pub const CONTROL_REPORT_ID: u8 = 0x46;

/// Lamp count assumed when the attribute report cannot be read.
pub const FALLBACK_LAMP_COUNT: u16 = 128;

const LAMP_COUNT_OFFSET: usize = 1;

/// Commands the host sends to the lamp array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Hand lighting to the firmware (`true`) or take it over (`false`).
    AutonomousMode { autonomous: bool },
    /// Paint lamps `start..=end` with one color.
    RangeFill {
        start: u16,
        end: u16,
        red: u8,
        green: u8,
        blue: u8,
        intensity: u8,
        apply_now: bool,
    },
}

impl Command {
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            Command::AutonomousMode { autonomous } => encode_autonomous_toggle(autonomous).to_vec(),
            Command::RangeFill {
                start,
                end,
                red,
                green,
                blue,
                intensity,
                apply_now,
            } => encode_range_fill(start, end, red, green, blue, intensity, apply_now).to_vec(),
        }
    }
}

/// Builds a LampArrayControl report.
pub fn encode_autonomous_toggle(autonomous: bool) -> [u8; 2] {
    [CONTROL_REPORT_ID, u8::from(autonomous)]
}

/// Builds a LampRangeUpdate report covering `start..=end`.
pub fn encode_range_fill(
    start: u16,
    end: u16,
    red: u8,
    green: u8,
    blue: u8,
    intensity: u8,
    apply_now: bool,
) -> [u8; 10] {
    let [s0, s1] = start.to_le_bytes();
    let [e0, e1] = end.to_le_bytes();
    [
        RANGE_UPDATE_REPORT_ID,
        u8::from(apply_now),
        s0,
        s1,
        e0,
        e1,
        red,
        green,
        blue,
        intensity,
    ]
}

/// Empty buffer for a LampArrayAttributes "get" with the report ID filled in.
pub fn attributes_request() -> [u8; ATTRIBUTES_REPORT_LEN] {
    let mut buf = [0u8; ATTRIBUTES_REPORT_LEN];
    buf[0] = ATTRIBUTES_REPORT_ID;
    buf
}

/// Reads the lamp count out of a LampArrayAttributes reply.
pub fn decode_lamp_count(raw: &[u8]) -> Result<u16> {
    raw.get(LAMP_COUNT_OFFSET..LAMP_COUNT_OFFSET + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| anyhow!("Attribute report too short: {} bytes", raw.len()))
}

/// Decoded LampArrayAttributes report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LampArrayAttributes {
    pub lamp_count: u16,
    /// Bounding box in micrometers: width, height, depth.
    pub bounding_box: (u32, u32, u32),
    pub kind: u32,
    pub min_update_interval_us: u32,
}

impl LampArrayAttributes {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < ATTRIBUTES_REPORT_LEN {
            return Err(anyhow!(
                "Attribute report too short: {} of {} bytes",
                raw.len(),
                ATTRIBUTES_REPORT_LEN
            ));
        }
        let u32_at = |off: usize| u32::from_le_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]]);

        Ok(Self {
            lamp_count: decode_lamp_count(raw)?,
            bounding_box: (u32_at(3), u32_at(7), u32_at(11)),
            kind: u32_at(15),
            min_update_interval_us: u32_at(19),
        })
    }
}
