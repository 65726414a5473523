//! Line signal command implementation.

use {
    crate::{
        config::Config,
        serial::{LineOptions, open_port},
    },
    anyhow::{Result, bail},
    console::style,
    serialkit::{PinoutSignals, PortError},
};

const LINES: [(PinoutSignals, &str); 6] = [
    (PinoutSignals::DATA_TERMINAL_READY, "DTR  data terminal ready"),
    (PinoutSignals::REQUEST_TO_SEND, "RTS  request to send"),
    (PinoutSignals::DATA_CARRIER_DETECT, "DCD  data carrier detect"),
    (PinoutSignals::DATA_SET_READY, "DSR  data set ready"),
    (PinoutSignals::RING_INDICATOR, "RI   ring indicator"),
    (PinoutSignals::CLEAR_TO_SEND, "CTS  clear to send"),
];

/// Signals command implementation.
pub(crate) fn cmd_signals(
    options: &LineOptions,
    config: &Config,
    dtr: Option<bool>,
    rts: Option<bool>,
) -> Result<()> {
    let mut port = open_port(options, config)?;

    if let Some(level) = dtr {
        if !port.set_data_terminal_ready(level) {
            bail!("Failed to set DTR: {}", port.error());
        }
    }
    if let Some(level) = rts {
        if !port.set_request_to_send(level) {
            bail!("Failed to set RTS: {}", port.error());
        }
    }

    let signals = port.pinout_signals();
    if port.error() != PortError::NoError {
        bail!("Failed to read line signals: {}", port.error());
    }

    eprintln!(
        "{} {}",
        style("Line signals on").bold(),
        style(
            port.port_name()
                .unwrap_or_default()
        )
        .cyan()
    );
    for (signal, label) in LINES {
        let state = if signals.contains(signal) {
            style("on ").green()
        } else {
            style("off").dim()
        };
        eprintln!("  {state}  {label}");
    }
    println!("{signals}");
    Ok(())
}
