//! In-memory loopback backend.
//!
//! Every byte written is queued for reading, as if TX were wired to RX. The
//! input signal lines are plain flags the owner can set, and the backend can
//! be told to reject configurations or to act as if the device vanished.
//! This makes the whole [`SerialPort`](crate::SerialPort) state machine
//! observable without hardware.
//!
//! ## Example
//!
//! ```rust
//! use serialkit::{SerialPort, port::LoopbackBackend};
//!
//! let mut port = SerialPort::with_port("loop0", LoopbackBackend::new());
//! assert!(port.open());
//! assert_eq!(port.write(b"ping"), Some(4));
//! assert_eq!(port.read(4), b"ping");
//! ```

use {
    crate::{
        error::{Error, Result},
        port::{Backend, Directions, PortConfig, PortEntry, PortEnumerator},
    },
    log::trace,
    std::{
        collections::VecDeque,
        fmt,
        sync::{Arc, Mutex, PoisonError},
        time::Duration,
    },
};

type Validator = Box<dyn Fn(&PortConfig) -> std::result::Result<(), String> + Send>;

/// Input signal line levels seen by a [`LoopbackBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputLines {
    /// Carrier Detect.
    pub cd: bool,
    /// Data Set Ready.
    pub dsr: bool,
    /// Ring Indicator.
    pub ri: bool,
    /// Clear To Send.
    pub cts: bool,
}

/// Loopback backend that echoes written bytes.
#[derive(Default)]
pub struct LoopbackBackend {
    open: bool,
    rx: VecDeque<u8>,
    accepted_baud_rates: Option<Vec<u32>>,
    validator: Option<Validator>,
    unavailable: bool,
    line_control_fails: bool,
    write_fails: bool,
    lines: InputLines,
    dtr: bool,
    rts: bool,
    break_enabled: bool,
    breaks_sent: Vec<Duration>,
    open_count: usize,
    active_port: Option<String>,
    active_config: Option<PortConfig>,
}

impl LoopbackBackend {
    /// Create a closed loopback backend that accepts any positive baud rate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept the given baud rates at open time.
    #[must_use]
    pub fn with_baud_rates(mut self, rates: &[u32]) -> Self {
        self.accepted_baud_rates = Some(rates.to_vec());
        self
    }

    /// Run `validator` on every configuration at open time. An `Err` message
    /// is reported as [`Error::InvalidConfig`].
    #[must_use]
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&PortConfig) -> std::result::Result<(), String> + Send + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Make every subsequent open fail with [`Error::Unavailable`].
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Make DTR/RTS writes fail.
    pub fn set_line_control_fails(&mut self, fails: bool) {
        self.line_control_fails = fails;
    }

    /// Make data writes fail.
    pub fn set_write_fails(&mut self, fails: bool) {
        self.write_fails = fails;
    }

    /// Set the input signal levels.
    pub fn set_input_lines(&mut self, lines: InputLines) {
        self.lines = lines;
    }

    /// Queue bytes as if they arrived from the remote end.
    pub fn inject(&mut self, data: &[u8]) {
        self.rx
            .extend(data);
    }

    /// Current DTR output level.
    pub fn dtr(&self) -> bool {
        self.dtr
    }

    /// Current RTS output level.
    pub fn rts(&self) -> bool {
        self.rts
    }

    /// Whether the line is held in break state.
    pub fn break_enabled(&self) -> bool {
        self.break_enabled
    }

    /// Durations of every timed break sent so far.
    pub fn breaks_sent(&self) -> &[Duration] {
        &self.breaks_sent
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.open_count
    }

    /// Port name of the live handle.
    pub fn active_port(&self) -> Option<&str> {
        self.active_port
            .as_deref()
    }

    /// Configuration the live handle was opened with.
    pub fn active_config(&self) -> Option<&PortConfig> {
        self.active_config
            .as_ref()
    }

    fn validate(&self, config: &PortConfig) -> Result<()> {
        if config.baud_rate == 0 {
            return Err(Error::InvalidConfig("baud rate must be positive".to_string()));
        }
        if let Some(rates) = &self.accepted_baud_rates {
            if !rates.contains(&config.baud_rate) {
                return Err(Error::InvalidConfig(format!(
                    "baud rate {} is not supported",
                    config.baud_rate
                )));
            }
        }
        if let Some(validator) = &self.validator {
            validator(config).map_err(Error::InvalidConfig)?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open { Ok(()) } else { Err(Error::NotOpen) }
    }
}

impl fmt::Debug for LoopbackBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackBackend")
            .field("open", &self.open)
            .field("pending", &self.rx.len())
            .field("active_port", &self.active_port)
            .field("open_count", &self.open_count)
            .finish_non_exhaustive()
    }
}

impl Backend for LoopbackBackend {
    fn open(&mut self, port_name: &str, config: &PortConfig) -> Result<()> {
        self.close()?;

        if self.unavailable {
            return Err(Error::Unavailable(format!("{port_name}: device unavailable")));
        }
        self.validate(config)?;

        trace!("Loopback {port_name} opened at {}", config.baud_rate);
        self.open = true;
        self.open_count += 1;
        self.active_port = Some(port_name.to_string());
        self.active_config = Some(config.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        self.dtr = false;
        self.rts = false;
        self.break_enabled = false;
        self.active_port = None;
        self.active_config = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        let n = buf
            .len()
            .min(self.rx.len());
        for (slot, byte) in buf
            .iter_mut()
            .zip(self.rx.drain(..n))
        {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        if self.write_fails {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "loopback write failure",
            )));
        }
        self.rx
            .extend(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()
    }

    fn clear(&mut self, directions: Directions) -> Result<()> {
        self.ensure_open()?;
        // Output is delivered immediately, so only the input side holds data
        if directions.includes_input() {
            self.rx
                .clear();
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self
            .rx
            .len())
    }

    fn bytes_to_write(&mut self) -> Result<usize> {
        self.ensure_open()?;
        Ok(0)
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.ensure_open()?;
        if self.line_control_fails {
            return Err(Error::Unsupported("DTR control".to_string()));
        }
        self.dtr = level;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.ensure_open()?;
        if self.line_control_fails {
            return Err(Error::Unsupported("RTS control".to_string()));
        }
        self.rts = level;
        Ok(())
    }

    fn read_cd(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self
            .lines
            .cd)
    }

    fn read_dsr(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self
            .lines
            .dsr)
    }

    fn read_ri(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self
            .lines
            .ri)
    }

    fn read_cts(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self
            .lines
            .cts)
    }

    fn send_break(&mut self, duration: Duration) -> Result<()> {
        self.ensure_open()?;
        self.breaks_sent
            .push(duration);
        Ok(())
    }

    fn set_break(&mut self, enabled: bool) -> Result<()> {
        self.ensure_open()?;
        self.break_enabled = enabled;
        Ok(())
    }
}

/// Port enumerator serving an in-memory list.
///
/// Clones share the same list, so entries can be added or removed after a
/// [`PortInfo`](crate::PortInfo) was handed out.
#[derive(Debug, Clone, Default)]
pub struct StaticPortEnumerator {
    entries: Arc<Mutex<Vec<PortEntry>>>,
    fails: bool,
}

impl StaticPortEnumerator {
    /// Create an enumerator reporting `entries`.
    pub fn new(entries: Vec<PortEntry>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
            fails: false,
        }
    }

    /// Create an enumerator whose listing always fails.
    pub fn failing() -> Self {
        Self {
            entries: Arc::default(),
            fails: true,
        }
    }

    /// Replace the reported entries.
    pub fn set_entries(&self, entries: Vec<PortEntry>) {
        *self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = entries;
    }
}

impl PortEnumerator for StaticPortEnumerator {
    fn list_ports(&self) -> Result<Vec<PortEntry>> {
        if self.fails {
            return Err(Error::Unsupported("port enumeration".to_string()));
        }
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
