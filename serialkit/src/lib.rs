//! # serialkit
//!
//! A serial port abstraction with live reconfiguration.
//!
//! This crate presents one device interface over any serial backend:
//!
//! - [`SerialPort`]: a connection whose baud rate, data bits, parity and
//!   stop bits can be changed while open. Each change reopens the device and
//!   rolls back to the previous working configuration if the new one is
//!   rejected.
//! - [`PortInfo`] and [`discover_ports`]: port discovery with live metadata
//!   lookups.
//! - [`PortEvent`] observers, notified synchronously after each committed
//!   change.
//! - A sticky [`PortError`] status code for every failure path.
//!
//! ## Supported Backends
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport` crate
//! - **Loopback**: in-memory echo backend for tests and demos
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use serialkit::{Directions, SerialPort, discover_ports};
//!
//! for info in discover_ports() {
//!     println!("{} {}", info.port_name(), info.description());
//! }
//!
//! let mut port = SerialPort::native("/dev/ttyUSB0");
//! port.subscribe(|event| println!("changed: {event:?}"));
//!
//! if port.open() {
//!     port.write(b"Hello Serial");
//!     if !port.set_baud_rate(115200, Directions::All) {
//!         eprintln!("kept previous baud rate: {}", port.error());
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod info;
pub mod port;
pub mod serial;

// Native-specific re-exports
#[cfg(feature = "native")]
pub use {
    info::discover_ports,
    port::{NativeBackend, NativePortEnumerator},
};
pub use {
    error::{Error, PortError, Result},
    event::{PortEvent, SubscriptionId},
    info::{BridgeKind, PortInfo, discover_ports_with, format_port_list, standard_baud_rates},
    port::{
        Backend, DataBits, Directions, FlowControl, LoopbackBackend, Parity, PinoutSignals,
        PortConfig, PortEntry, PortEnumerator, StaticPortEnumerator, StopBits,
    },
    serial::{PortSource, SerialPort},
};
