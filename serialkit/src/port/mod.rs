//! Port abstraction for serial backends.
//!
//! This module defines the line configuration types shared by every backend
//! and the two seams a [`SerialPort`](crate::SerialPort) talks through:
//!
//! - [`Backend`]: byte I/O and line control on one device handle. The
//!   configuration is only applied at [`Backend::open`]; there is no live
//!   reconfiguration primitive.
//! - [`PortEnumerator`]: listing the ports present on the system.
//!
//! Implementations:
//!
//! - **Native platforms** (Linux, macOS, Windows): [`native`], using the
//!   `serialport` crate (feature `native`, on by default)
//! - **In-memory**: [`loopback`], echoing writes back to reads
//!
//! ## Architecture
//!
//! ```text
//! +------------------+
//! |    SerialPort    |  reconfigure = close + reapply + open
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  Backend trait   |
//! +--------+---------+
//!          |
//!    +-----+--------------+
//!    v                    v
//! +--+-----------+  +-----+----------+
//! | NativeBackend|  | LoopbackBackend|
//! | (serialport) |  |  (in memory)   |
//! +--------------+  +----------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

pub mod loopback;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

use crate::error::Result;

/// Serial line configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PortConfig {
    /// Baud rate.
    pub baud_rate: u32,
    /// Data bits per character.
    pub data_bits: DataBits,
    /// Parity checking mode.
    pub parity: Parity,
    /// Stop bits per character.
    pub stop_bits: StopBits,
    /// Hardware (RTS/CTS) flow control flag.
    pub rts_cts: bool,
    /// Software (XON/XOFF) flow control flag.
    pub xon_xoff: bool,
    /// Backend read/write timeout.
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            rts_cts: false,
            xon_xoff: false,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl PortConfig {
    /// Create a configuration with the given baud rate and 8N1 framing.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the data bits.
    #[must_use]
    pub fn with_data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Set the parity.
    #[must_use]
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set the stop bits.
    #[must_use]
    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DataBits {
    /// 5 data bits.
    Five,
    /// 6 data bits.
    Six,
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

impl DataBits {
    /// Number of bits as an integer.
    pub fn bits(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = u8;

    fn try_from(bits: u8) -> std::result::Result<Self, u8> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(other),
        }
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Even parity.
    Even,
    /// Odd parity.
    Odd,
    /// Parity bit always 0.
    Space,
    /// Parity bit always 1.
    Mark,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Self::None => 'N',
            Self::Even => 'E',
            Self::Odd => 'O',
            Self::Space => 'S',
            Self::Mark => 'M',
        };
        write!(f, "{c}")
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 1.5 stop bits.
    OneAndHalf,
    /// 2 stop bits.
    Two,
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::One => "1",
            Self::OneAndHalf => "1.5",
            Self::Two => "2",
        };
        f.write_str(s)
    }
}

/// Flow control mode.
///
/// Only used to describe the unsupported flow control accessors on
/// [`SerialPort`](crate::SerialPort); the backend receives the raw
/// `rts_cts`/`xon_xoff` flags from [`PortConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
    /// Software flow control (XON/XOFF).
    Software,
}

/// Data direction selector for buffers and baud rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Directions {
    /// Receive direction.
    Input,
    /// Transmit direction.
    Output,
    /// Both directions.
    #[default]
    All,
}

impl Directions {
    /// Whether the input direction is selected.
    pub fn includes_input(self) -> bool {
        matches!(self, Self::Input | Self::All)
    }

    /// Whether the output direction is selected.
    pub fn includes_output(self) -> bool {
        matches!(self, Self::Output | Self::All)
    }
}

/// Set of RS-232 signal lines, as reported by
/// [`SerialPort::pinout_signals`](crate::SerialPort::pinout_signals).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PinoutSignals(u16);

impl PinoutSignals {
    /// No signal set.
    pub const NONE: Self = Self(0x00);
    /// Data Terminal Ready (output).
    pub const DATA_TERMINAL_READY: Self = Self(0x04);
    /// Data Carrier Detect (input).
    pub const DATA_CARRIER_DETECT: Self = Self(0x08);
    /// Data Set Ready (input).
    pub const DATA_SET_READY: Self = Self(0x10);
    /// Ring Indicator (input).
    pub const RING_INDICATOR: Self = Self(0x20);
    /// Request To Send (output).
    pub const REQUEST_TO_SEND: Self = Self(0x40);
    /// Clear To Send (input).
    pub const CLEAR_TO_SEND: Self = Self(0x80);

    const NAMED: [(Self, &'static str); 6] = [
        (Self::DATA_TERMINAL_READY, "DTR"),
        (Self::DATA_CARRIER_DETECT, "DCD"),
        (Self::DATA_SET_READY, "DSR"),
        (Self::RING_INDICATOR, "RI"),
        (Self::REQUEST_TO_SEND, "RTS"),
        (Self::CLEAR_TO_SEND, "CTS"),
    ];

    /// Raw bitmask.
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Whether every signal in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no signal is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set `other` when `enabled`.
    pub fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    /// Short names of the signals that are set, in pin order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(signal, _)| self.contains(*signal))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for PinoutSignals {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PinoutSignals {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PinoutSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PinoutSignals({self})")
    }
}

impl fmt::Display for PinoutSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join(" | "))
    }
}

/// One record from a port enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortEntry {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub name: String,
    /// Human readable description (if available).
    pub description: Option<String>,
    /// System path used to open the device (if available).
    pub system_location: Option<String>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Whether the port is known to be in use.
    pub busy: bool,
}

impl PortEntry {
    /// Create an entry with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Serial backend: the byte-level collaborator a
/// [`SerialPort`](crate::SerialPort) drives.
///
/// A backend owns at most one device handle. Configuration is applied only by
/// [`open`](Self::open); changing a setting means close and open again.
/// `open` must report a rejected configuration as
/// [`Error::InvalidConfig`](crate::Error::InvalidConfig) and a missing, denied
/// or busy device as [`Error::Unavailable`](crate::Error::Unavailable).
pub trait Backend: Send {
    /// Open `port_name` with `config`, replacing any live handle.
    fn open(&mut self, port_name: &str, config: &PortConfig) -> Result<()>;

    /// Release the handle. Closing a closed backend is not an error.
    fn close(&mut self) -> Result<()>;

    /// Whether a handle is live.
    fn is_open(&self) -> bool;

    /// Read currently available bytes into `buf`. Returns 0 when nothing is
    /// pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Block until pending output is transmitted.
    fn flush(&mut self) -> Result<()>;

    /// Discard buffered data in the selected directions.
    fn clear(&mut self, directions: Directions) -> Result<()>;

    /// Bytes waiting in the input buffer.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Bytes waiting in the output buffer.
    fn bytes_to_write(&mut self) -> Result<usize>;

    /// Set DTR (Data Terminal Ready) pin state.
    fn set_dtr(&mut self, level: bool) -> Result<()>;

    /// Set RTS (Request To Send) pin state.
    fn set_rts(&mut self, level: bool) -> Result<()>;

    /// Read CD (Carrier Detect) pin state.
    fn read_cd(&mut self) -> Result<bool>;

    /// Read DSR (Data Set Ready) pin state.
    fn read_dsr(&mut self) -> Result<bool>;

    /// Read RI (Ring Indicator) pin state.
    fn read_ri(&mut self) -> Result<bool>;

    /// Read CTS (Clear To Send) pin state.
    fn read_cts(&mut self) -> Result<bool>;

    /// Hold the line in break state for `duration`.
    fn send_break(&mut self, duration: Duration) -> Result<()>;

    /// Enter or leave the break state.
    fn set_break(&mut self, enabled: bool) -> Result<()>;
}

/// Trait for listing available serial ports.
///
/// Separate from [`Backend`] because listing doesn't need an open handle.
pub trait PortEnumerator: Send + Sync {
    /// List all available serial ports in the order the system reports them.
    fn list_ports(&self) -> Result<Vec<PortEntry>>;

    /// Find the entry named `name`, if currently present.
    fn find(&self, name: &str) -> Result<Option<PortEntry>> {
        Ok(self
            .list_ports()?
            .into_iter()
            .find(|entry| entry.name == name))
    }
}

// Re-export the native implementation when enabled
#[cfg(feature = "native")]
pub use native::{NativeBackend, NativePortEnumerator};

pub use loopback::{LoopbackBackend, StaticPortEnumerator};
