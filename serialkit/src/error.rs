//! Error types for serialkit.
//!
//! Two layers live here:
//!
//! - [`Error`] is what a [`Backend`](crate::port::Backend) returns. Its
//!   variants keep "bad configuration" apart from "device unavailable" so the
//!   port can classify a failed reopen.
//! - [`PortError`] is the sticky status code a
//!   [`SerialPort`](crate::SerialPort) records after a failed operation.

use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for backend operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on an open handle.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unclassified error from the `serialport` crate.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The backend rejected a configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The device is missing, not accessible or already claimed.
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    /// No port name was set before opening.
    #[error("No port name set")]
    NoPortName,

    /// The backend handle is not open.
    #[error("Port is not open")]
    NotOpen,

    /// The backend does not implement the operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Sticky status code of a [`SerialPort`](crate::SerialPort).
///
/// Overwritten by each failing operation and left alone by successful ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PortError {
    /// No error recorded.
    #[default]
    #[error("no error")]
    NoError,
    /// The port could not be located.
    #[error("device not found")]
    DeviceNotFound,
    /// Access to the port was denied.
    #[error("permission denied")]
    PermissionDenied,
    /// The port could not be opened.
    #[error("failed to open device")]
    OpenFailed,
    /// The operation requires an open port.
    #[error("device is not open")]
    NotOpen,
    /// Parity error detected by the hardware.
    #[error("parity error")]
    ParityError,
    /// Framing error detected by the hardware.
    #[error("framing error")]
    FramingError,
    /// Break condition detected on the input line.
    #[error("break condition")]
    BreakCondition,
    /// Writing data failed.
    #[error("write failed")]
    WriteFailed,
    /// Reading data failed.
    #[error("read failed")]
    ReadFailed,
    /// The device disappeared while in use.
    #[error("resource error")]
    ResourceError,
    /// The operation or configuration value is not supported.
    #[error("unsupported operation")]
    UnsupportedOperation,
    /// An operation timed out.
    #[error("timeout")]
    Timeout,
    /// Any other failure.
    #[error("unknown error")]
    UnknownError,
}

impl PortError {
    /// Classify a failed (re)open.
    #[must_use]
    pub fn from_open_failure(err: &Error) -> Self {
        match err {
            Error::InvalidConfig(_) => Self::UnsupportedOperation,
            Error::Unavailable(_) => Self::OpenFailed,
            Error::NoPortName => Self::DeviceNotFound,
            _ => Self::UnknownError,
        }
    }

    /// Whether this code represents a failure.
    pub fn is_error(self) -> bool {
        self != Self::NoError
    }
}
