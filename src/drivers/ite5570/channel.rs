use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};

use crate::{lighting::Frame, retry::RetryPolicy, signals::ControlFlags};

use super::{
    device_io::{DeviceIO, DeviceId, DeviceNode, HidBackend, LAMP_ARRAY_USAGE_PAGE},
    protocol::{
        Command, FALLBACK_LAMP_COUNT, LampArrayAttributes, attributes_request, decode_lamp_count,
    },
};

/// An initialised device handle.
#[derive(Debug)]
struct Connection<Io: DeviceIO> {
    io: Io,
    path: String,
    lamp_count: u16,
    /// Lighting currently handed back to the firmware.
    autonomous: bool,
}

impl<Io: DeviceIO> Connection<Io> {
    /// Takes over lighting and caches the lamp count.
    fn initialize(io: Io, node: &DeviceNode) -> Result<Self> {
        let path = node.path.to_string_lossy().into_owned();
        let mut conn = Self {
            io,
            path,
            lamp_count: FALLBACK_LAMP_COUNT,
            autonomous: true,
        };

        conn.take_control()
            .with_context(|| format!("Failed to disable autonomous mode on {}", conn.path))?;

        conn.lamp_count = match conn.read_lamp_count() {
            Ok(0) => {
                warn!("Device reports zero lamps, defaulting to {FALLBACK_LAMP_COUNT}");
                FALLBACK_LAMP_COUNT
            }
            Ok(count) => count,
            Err(e) => {
                warn!("Could not read LampArray attributes ({e:#}), defaulting to {FALLBACK_LAMP_COUNT}");
                FALLBACK_LAMP_COUNT
            }
        };

        info!("Device opened: {} lamps={}", conn.path, conn.lamp_count);
        Ok(conn)
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.io.send_feature_report(&cmd.to_bytes())
    }

    fn read_attributes(&self) -> Result<Vec<u8>> {
        let mut buf = attributes_request();
        let len = self.io.get_feature_report(&mut buf)?;
        Ok(buf[..len.min(buf.len())].to_vec())
    }

    fn read_lamp_count(&self) -> Result<u16> {
        let raw = self.read_attributes()?;
        match LampArrayAttributes::parse(&raw) {
            Ok(attrs) => debug!(
                "LampArray attributes: kind={} bbox={:?}um min_update={}us",
                attrs.kind, attrs.bounding_box, attrs.min_update_interval_us
            ),
            Err(e) => debug!("Partial LampArray attributes: {e:#}"),
        }
        decode_lamp_count(&raw)
    }

    /// Cheap health check: one attribute read.
    fn probe(&self) -> Result<()> {
        self.read_attributes().map(|_| ())
    }

    fn take_control(&mut self) -> Result<()> {
        if self.autonomous {
            self.send(Command::AutonomousMode { autonomous: false })?;
            self.autonomous = false;
        }
        Ok(())
    }

    fn hand_back(&mut self) -> Result<()> {
        self.send(Command::AutonomousMode { autonomous: true })?;
        self.autonomous = true;
        Ok(())
    }

    /// Blanks the lamps and hands back. No-op while the firmware already
    /// owns the lighting.
    fn release(&mut self) -> Result<bool> {
        if self.autonomous {
            return Ok(false);
        }
        self.fill(Frame::BLACK)?;
        self.hand_back()?;
        Ok(true)
    }

    fn fill(&self, frame: Frame) -> Result<()> {
        self.send(Command::RangeFill {
            start: 0,
            end: self.lamp_count - 1,
            red: frame.red,
            green: frame.green,
            blue: frame.blue,
            intensity: frame.intensity,
            apply_now: true,
        })
    }
}

#[derive(Debug)]
enum State<Io: DeviceIO> {
    Disconnected,
    Connected(Connection<Io>),
}

/// Owner of the single device connection.
///
/// Discovery blocks until the device shows up, retrying per [`RetryPolicy`];
/// a stale handle found by the health probe is dropped and rediscovered.
///
/// # Example
///
/// ```no_run
/// use ite5570d::drivers::ite5570::{DeviceChannel, HidApiBackend, DEVICE_ID};
/// use ite5570d::{lighting::Frame, retry::RetryPolicy, signals::ControlFlags};
///
/// # async fn example() -> anyhow::Result<()> {
/// let backend = HidApiBackend::new()?;
/// let mut channel = DeviceChannel::new(backend, DEVICE_ID, RetryPolicy::default(), ControlFlags::new());
/// channel.fill(Frame { red: 0, green: 255, blue: 0, intensity: 200 }).await?;
/// channel.close();
/// # Ok(())
/// # }
/// ```
pub struct DeviceChannel<B: HidBackend> {
    backend: B,
    id: DeviceId,
    retry: RetryPolicy,
    flags: ControlFlags,
    state: State<B::Io>,
}

impl<B: HidBackend> DeviceChannel<B> {
    pub fn new(backend: B, id: DeviceId, retry: RetryPolicy, flags: ControlFlags) -> Self {
        Self {
            backend,
            id,
            retry,
            flags,
            state: State::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_))
    }

    /// Lamp count of the current connection.
    pub fn lamp_count(&self) -> Option<u16> {
        match &self.state {
            State::Connected(conn) => Some(conn.lamp_count),
            State::Disconnected => None,
        }
    }

    /// Discovers and opens the device, retrying until it appears.
    ///
    /// Returns an error only when the retry policy is exhausted or a stop was
    /// requested while waiting.
    pub async fn connect(&mut self) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            let err = match self.try_connect() {
                Ok(conn) => {
                    self.state = State::Connected(conn);
                    return Ok(());
                }
                Err(e) => e,
            };
            attempts += 1;

            if self.flags.stop_requested() {
                bail!("Device discovery cancelled by shutdown request");
            }
            if !self.retry.allows(attempts) {
                return Err(err).with_context(|| format!("Device not found after {attempts} attempts"));
            }

            warn!("{err:#}, retrying in {}s", self.retry.delay.as_secs_f32());
            tokio::time::sleep(self.retry.delay).await;

            if self.flags.stop_requested() {
                bail!("Device discovery cancelled by shutdown request");
            }
        }
    }

    fn try_connect(&mut self) -> Result<Connection<B::Io>> {
        let mut candidates: Vec<DeviceNode> = self
            .backend
            .enumerate()?
            .into_iter()
            .filter(|node| node.matches(self.id))
            .collect();

        if candidates.is_empty() {
            bail!("Device {:04X}:{:04X} not found", self.id.vid, self.id.pid);
        }
        candidates.sort_by_key(|node| (node.usage_page != LAMP_ARRAY_USAGE_PAGE, node.path.clone()));

        for node in &candidates {
            let io = match self.backend.open(node) {
                Ok(io) => io,
                Err(e) => {
                    debug!("Skipping candidate: {e:#}");
                    continue;
                }
            };
            match Connection::initialize(io, node) {
                Ok(conn) => return Ok(conn),
                Err(e) => warn!("{e:#}"),
            }
        }

        Err(anyhow!(
            "None of {} matching device node(s) could be opened",
            candidates.len()
        ))
    }

    /// Probes an existing connection and reconnects if it went stale.
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if let State::Connected(conn) = &self.state {
            match conn.probe() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Device lost ({e:#}), reconnecting");
                    self.state = State::Disconnected;
                }
            }
        }
        self.connect().await
    }

    /// Paints every lamp with `frame`.
    pub async fn fill(&mut self, frame: Frame) -> Result<()> {
        self.ensure_connected().await?;
        let conn = self.connection_mut()?;
        conn.take_control()?;
        conn.fill(frame)
    }

    /// Blanks the lamps and hands lighting back to the firmware.
    ///
    /// Once released, later calls only probe the connection; control is not
    /// taken back until the next [`fill`](Self::fill).
    pub async fn release(&mut self) -> Result<()> {
        self.ensure_connected().await?;
        if self.connection_mut()?.release()? {
            debug!("LEDs released to firmware");
        }
        Ok(())
    }

    /// Releases the device without reconnecting and drops the handle.
    ///
    /// Never fails: errors are logged.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, State::Disconnected) {
            State::Connected(mut conn) => {
                match conn.release() {
                    Ok(_) => info!("Device closed, firmware control restored"),
                    Err(e) => warn!("Failed to release {} to firmware: {e:#}", conn.path),
                }
            }
            State::Disconnected => debug!("No device to close"),
        }
    }

    fn connection_mut(&mut self) -> Result<&mut Connection<B::Io>> {
        match &mut self.state {
            State::Connected(conn) => Ok(conn),
            State::Disconnected => Err(anyhow!("Device not connected")),
        }
    }
}
