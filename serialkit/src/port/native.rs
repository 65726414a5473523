//! Native serial backend using the `serialport` crate.
//!
//! This module provides the backend for native platforms (Linux, macOS,
//! Windows, FreeBSD, etc.).

use {
    crate::{
        error::{Error, Result},
        port::{
            Backend, DataBits, Directions, Parity, PortConfig, PortEntry, PortEnumerator, StopBits,
        },
    },
    log::trace,
    serialport::{ClearBuffer, ErrorKind},
    std::{
        io::{self, Read, Write},
        thread,
        time::Duration,
    },
};

/// Native serial backend.
#[derive(Default)]
pub struct NativeBackend {
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl NativeBackend {
    /// Create a closed backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or(Error::NotOpen)
    }
}

impl Backend for NativeBackend {
    fn open(&mut self, port_name: &str, config: &PortConfig) -> Result<()> {
        // Drop any live handle first so the device is free to be reopened
        self.port
            .take();

        if config.baud_rate == 0 {
            return Err(Error::InvalidConfig("baud rate must be positive".to_string()));
        }

        trace!(
            "Opening {port_name} at {} {}{}{}",
            config.baud_rate, config.data_bits, config.parity, config.stop_bits
        );
        let port = serialport::new(port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(serial_data_bits(config.data_bits))
            .parity(serial_parity(config.parity)?)
            .stop_bits(serial_stop_bits(config.stop_bits)?)
            .flow_control(serial_flow_control(config.rts_cts, config.xon_xoff)?)
            .open()
            .map_err(|e| classify_open_error(port_name, e))?;

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Take ownership of the port and let it drop (close)
        self.port
            .take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port
            .is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port_mut()?;
        let pending = usize::try_from(port.bytes_to_read()?).unwrap_or(usize::MAX);
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }
        let len = buf
            .len()
            .min(pending);
        match port.read(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self
            .port_mut()?
            .write(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        self.port_mut()?
            .flush()?;
        Ok(())
    }

    fn clear(&mut self, directions: Directions) -> Result<()> {
        let buffer = match directions {
            Directions::Input => ClearBuffer::Input,
            Directions::Output => ClearBuffer::Output,
            Directions::All => ClearBuffer::All,
        };
        self.port_mut()?
            .clear(buffer)?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let n = self
            .port_mut()?
            .bytes_to_read()?;
        Ok(usize::try_from(n).unwrap_or(usize::MAX))
    }

    fn bytes_to_write(&mut self) -> Result<usize> {
        let n = self
            .port_mut()?
            .bytes_to_write()?;
        Ok(usize::try_from(n).unwrap_or(usize::MAX))
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        trace!("Setting DTR to {level}");
        self.port_mut()?
            .write_data_terminal_ready(level)?;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        trace!("Setting RTS to {level}");
        self.port_mut()?
            .write_request_to_send(level)?;
        Ok(())
    }

    fn read_cd(&mut self) -> Result<bool> {
        Ok(self
            .port_mut()?
            .read_carrier_detect()?)
    }

    fn read_dsr(&mut self) -> Result<bool> {
        Ok(self
            .port_mut()?
            .read_data_set_ready()?)
    }

    fn read_ri(&mut self) -> Result<bool> {
        Ok(self
            .port_mut()?
            .read_ring_indicator()?)
    }

    fn read_cts(&mut self) -> Result<bool> {
        Ok(self
            .port_mut()?
            .read_clear_to_send()?)
    }

    fn send_break(&mut self, duration: Duration) -> Result<()> {
        let port = self.port_mut()?;
        port.set_break()?;
        thread::sleep(duration);
        port.clear_break()?;
        Ok(())
    }

    fn set_break(&mut self, enabled: bool) -> Result<()> {
        trace!("Setting break to {enabled}");
        let port = self.port_mut()?;
        if enabled {
            port.set_break()?;
        } else {
            port.clear_break()?;
        }
        Ok(())
    }
}

/// Split `serialport` open failures into the two classes the port state
/// machine distinguishes; everything else stays a plain serial error.
fn classify_open_error(port_name: &str, err: serialport::Error) -> Error {
    match err.kind() {
        ErrorKind::InvalidInput => Error::InvalidConfig(err.description),
        ErrorKind::NoDevice => Error::Unavailable(format!("{port_name}: {}", err.description)),
        ErrorKind::Io(
            io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::AddrInUse
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::WouldBlock,
        ) => Error::Unavailable(format!("{port_name}: {}", err.description)),
        _ => Error::Serial(err),
    }
}

/// Native port enumerator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports(&self) -> Result<Vec<PortEntry>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let mut entry = PortEntry {
                    system_location: Some(system_location(&p.port_name)),
                    name: p.port_name,
                    ..Default::default()
                };

                match p.port_type {
                    serialport::SerialPortType::UsbPort(info) => {
                        trace!(
                            "Found USB port: {} (VID: {:04X}, PID: {:04X})",
                            entry.name, info.vid, info.pid
                        );
                        entry.vid = Some(info.vid);
                        entry.pid = Some(info.pid);
                        entry.description = info.product;
                        entry.manufacturer = info.manufacturer;
                        entry.serial_number = info.serial_number;
                    },
                    serialport::SerialPortType::BluetoothPort => {
                        entry.description = Some("Bluetooth serial port".to_string());
                    },
                    serialport::SerialPortType::PciPort => {
                        entry.description = Some("PCI serial port".to_string());
                    },
                    serialport::SerialPortType::Unknown => {},
                }

                entry
            })
            .collect())
    }
}

#[cfg(windows)]
fn system_location(port_name: &str) -> String {
    format!(r"\\.\{port_name}")
}

#[cfg(not(windows))]
fn system_location(port_name: &str) -> String {
    port_name.to_string()
}

// Explicit mappings from our line types to serialport types. Values the
// serialport crate has no representation for are configuration errors.

fn serial_data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn serial_parity(parity: Parity) -> Result<serialport::Parity> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Space | Parity::Mark => Err(Error::InvalidConfig(format!(
            "parity {parity:?} is not supported by the native backend"
        ))),
    }
}

fn serial_stop_bits(bits: StopBits) -> Result<serialport::StopBits> {
    match bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OneAndHalf => Err(Error::InvalidConfig(
            "1.5 stop bits are not supported by the native backend".to_string(),
        )),
    }
}

fn serial_flow_control(rts_cts: bool, xon_xoff: bool) -> Result<serialport::FlowControl> {
    match (rts_cts, xon_xoff) {
        (false, false) => Ok(serialport::FlowControl::None),
        (true, false) => Ok(serialport::FlowControl::Hardware),
        (false, true) => Ok(serialport::FlowControl::Software),
        (true, true) => Err(Error::InvalidConfig(
            "RTS/CTS and XON/XOFF cannot be enabled together".to_string(),
        )),
    }
}
