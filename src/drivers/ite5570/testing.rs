//! In-memory stand-in for the HID layer.

use std::{
    ffi::CString,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{Result, anyhow, bail};

use super::{
    DEVICE_ID,
    device_io::{DeviceIO, DeviceNode, HidBackend},
};

pub(crate) fn node(path: &str, vendor_id: u16, product_id: u16, usage_page: u16) -> DeviceNode {
    DeviceNode {
        path: CString::new(path).unwrap(),
        vendor_id,
        product_id,
        usage_page,
    }
}

/// Shared device state, inspected by tests after the fact.
#[derive(Debug, Default)]
pub(crate) struct FakeDevice {
    pub nodes: Vec<DeviceNode>,
    /// Paths whose open fails with a permission error.
    pub locked: Vec<CString>,
    /// `None` makes attribute reads fail.
    pub lamp_count: Option<u16>,
    /// Number of upcoming enumerations that see no device.
    pub hidden_for: usize,
    /// Number of upcoming feature-report reads that fail.
    pub fail_next_gets: usize,
    pub fail_sends: bool,

    pub sent: Vec<Vec<u8>>,
    pub gets: usize,
    pub enumerations: usize,
    pub opens: usize,
    pub opened: Vec<CString>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBackend(Arc<Mutex<FakeDevice>>);

impl FakeBackend {
    /// One LampArray node of the supported device.
    pub fn with_device(lamp_count: u16) -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state();
            state.nodes = vec![node("/dev/hidraw3", DEVICE_ID.vid, DEVICE_ID.pid, 0x59)];
            state.lamp_count = Some(lamp_count);
        }
        backend
    }

    pub fn state(&self) -> MutexGuard<'_, FakeDevice> {
        self.0.lock().unwrap()
    }
}

#[derive(Debug)]
pub(crate) struct FakeIo(Arc<Mutex<FakeDevice>>);

impl DeviceIO for FakeIo {
    fn send_feature_report(&self, buf: &[u8]) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        if state.fail_sends {
            bail!("Broken pipe");
        }
        state.sent.push(buf.to_vec());
        Ok(())
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.0.lock().unwrap();
        state.gets += 1;
        if state.fail_next_gets > 0 {
            state.fail_next_gets -= 1;
            bail!("No such device");
        }
        let count = state.lamp_count.ok_or_else(|| anyhow!("Broken pipe"))?;
        buf[1..3].copy_from_slice(&count.to_le_bytes());
        Ok(buf.len())
    }
}

impl HidBackend for FakeBackend {
    type Io = FakeIo;

    fn enumerate(&mut self) -> Result<Vec<DeviceNode>> {
        let mut state = self.state();
        state.enumerations += 1;
        if state.hidden_for > 0 {
            state.hidden_for -= 1;
            return Ok(Vec::new());
        }
        Ok(state.nodes.clone())
    }

    fn open(&self, node: &DeviceNode) -> Result<FakeIo> {
        let mut state = self.state();
        state.opens += 1;
        state.opened.push(node.path.clone());
        if state.locked.contains(&node.path) {
            bail!("Permission denied: {}", node.path.to_string_lossy());
        }
        Ok(FakeIo(Arc::clone(&self.0)))
    }
}
