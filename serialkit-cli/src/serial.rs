//! Serial port resolution and opening for CLI commands.
//!
//! The port is taken from, in order: the `--port` flag (or `SERIALKIT_PORT`),
//! the configuration file, or the only port present on the system. The CLI
//! never prompts; zero or several candidates is an error that lists what was
//! found.

use {
    crate::config::Config,
    anyhow::{Result, bail},
    log::{debug, info},
    serialkit::{
        DataBits, NativeBackend, Parity, PortConfig, PortInfo, SerialPort, StopBits,
        discover_ports, format_port_list,
    },
};

/// Default baud rate when neither flag nor configuration sets one.
pub const DEFAULT_BAUD: u32 = 9600;

/// Line options collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct LineOptions {
    /// Explicit port.
    pub port: Option<String>,
    /// Explicit baud rate.
    pub baud: Option<u32>,
    /// Explicit data bits.
    pub data_bits: Option<DataBits>,
    /// Explicit parity.
    pub parity: Option<Parity>,
    /// Explicit stop bits.
    pub stop_bits: Option<StopBits>,
}

/// Build the port configuration from flags, then config file, then defaults.
pub fn resolve_config(options: &LineOptions, config: &Config) -> PortConfig {
    PortConfig::new(
        options
            .baud
            .or(config.port.baud)
            .unwrap_or(DEFAULT_BAUD),
    )
    .with_data_bits(
        options
            .data_bits
            .or(config.line.data_bits)
            .unwrap_or_default(),
    )
    .with_parity(
        options
            .parity
            .or(config.line.parity)
            .unwrap_or_default(),
    )
    .with_stop_bits(
        options
            .stop_bits
            .or(config.line.stop_bits)
            .unwrap_or_default(),
    )
}

/// Pick the port to use without prompting.
pub fn select_port(options: &LineOptions, config: &Config) -> Result<String> {
    if let Some(port) = &options.port {
        return Ok(port.clone());
    }

    if let Some(port) = &config.port.name {
        debug!("Using port from config: {port}");
        return Ok(port.clone());
    }

    pick_single(discover_ports())
}

fn pick_single(mut ports: Vec<PortInfo>) -> Result<String> {
    match ports.len() {
        0 => bail!("No serial ports found. Specify one with --port."),
        1 => {
            let port = ports.remove(0);
            info!("Auto-selected port: {}", port.port_name());
            Ok(port
                .port_name()
                .to_string())
        },
        _ => bail!(
            "Multiple serial ports found, specify one with --port:\n  {}",
            format_port_list(&ports).join("\n  ")
        ),
    }
}

/// Resolve and open the port.
pub fn open_port(options: &LineOptions, config: &Config) -> Result<SerialPort<NativeBackend>> {
    let name = select_port(options, config)?;
    let port_config = resolve_config(options, config);
    debug!(
        "Opening {name} at {} {}{}{}",
        port_config.baud_rate, port_config.data_bits, port_config.parity, port_config.stop_bits
    );

    let mut port = SerialPort::with_config(name.as_str(), port_config, NativeBackend::new());
    if !port.open() {
        bail!("Failed to open {name}: {}", port.error());
    }
    Ok(port)
}
