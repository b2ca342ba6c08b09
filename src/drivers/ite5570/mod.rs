//! Driver for the ITE 5570 LampArray lighting controller.
//!
//! The controller speaks the HID LampArray feature reports. Only three of
//! them are used: attributes (get), range update (set) and array control
//! (set).

pub mod channel;
pub mod device_io;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::DeviceChannel;
pub use device_io::{DeviceIO, DeviceId, DeviceNode, HidApiBackend, HidBackend};

/// USB identity of the supported controller.
pub const DEVICE_ID: DeviceId = DeviceId {
    vid: 0x0B05,
    pid: 0x5570,
};
