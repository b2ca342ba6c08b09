use std::ffi::CString;

use anyhow::{Context, Result, anyhow};
use hidapi::{HidApi, HidDevice};

/// HID usage page of the LampArray collection.
pub const LAMP_ARRAY_USAGE_PAGE: u16 = 0x59;

/// Open handle to a HID node, reduced to the two transfers the daemon uses.
pub trait DeviceIO: Send + 'static {
    fn send_feature_report(&self, buf: &[u8]) -> Result<()>;
    /// `buf[0]` holds the report ID on entry. Returns the number of bytes read.
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize>;
}

impl DeviceIO for HidDevice {
    fn send_feature_report(&self, buf: &[u8]) -> Result<()> {
        Self::send_feature_report(self, buf).map_err(|e| anyhow!("{e}"))
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize> {
        Self::get_feature_report(self, buf).map_err(|e| anyhow!("{e}"))
    }
}

/// Vendor/product pair identifying the device family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceId {
    pub vid: u16,
    pub pid: u16,
}

/// An enumerated HID node. Only lives for the duration of one discovery pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceNode {
    pub path: CString,
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
}

impl DeviceNode {
    pub fn matches(&self, id: DeviceId) -> bool {
        self.vendor_id == id.vid && self.product_id == id.pid
    }
}

/// Source of HID nodes: enumerates what is currently attached and opens it.
pub trait HidBackend {
    type Io: DeviceIO;

    /// Re-reads the list of attached nodes.
    fn enumerate(&mut self) -> Result<Vec<DeviceNode>>;

    fn open(&self, node: &DeviceNode) -> Result<Self::Io>;
}

/// Production backend on top of `hidapi` (hidraw on Linux).
pub struct HidApiBackend {
    api: HidApi,
}

impl HidApiBackend {
    pub fn new() -> Result<Self> {
        Ok(Self {
            api: HidApi::new().context("hidapi init")?,
        })
    }
}

impl HidBackend for HidApiBackend {
    type Io = HidDevice;

    fn enumerate(&mut self) -> Result<Vec<DeviceNode>> {
        self.api
            .refresh_devices()
            .context("Failed to refresh HID device list")?;

        Ok(self
            .api
            .device_list()
            .map(|d| DeviceNode {
                path: d.path().to_owned(),
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                usage_page: d.usage_page(),
            })
            .collect())
    }

    fn open(&self, node: &DeviceNode) -> Result<HidDevice> {
        self.api
            .open_path(&node.path)
            .with_context(|| format!("Failed to open {}", node.path.to_string_lossy()))
    }
}
