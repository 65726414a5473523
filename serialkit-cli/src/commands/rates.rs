//! Baud rate probing command implementation.

use {
    crate::{
        config::Config,
        serial::{LineOptions, open_port},
    },
    anyhow::{Result, bail},
    console::style,
    log::debug,
    serialkit::{Backend, Directions, PortError, SerialPort, standard_baud_rates},
};

/// Outcome of trying one baud rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RateProbe {
    pub baud_rate: u32,
    pub accepted: bool,
    pub error: PortError,
}

/// Try each rate in turn, then restore the starting rate.
///
/// Stops early if a rejected rate also fails to roll back and leaves the
/// port closed.
pub(crate) fn probe_rates<B: Backend>(port: &mut SerialPort<B>, rates: &[u32]) -> Vec<RateProbe> {
    let original = port.baud_rate(Directions::All);
    let mut probes = Vec::with_capacity(rates.len());

    for &baud_rate in rates {
        port.clear_error();
        let accepted = port.set_baud_rate(baud_rate, Directions::All);
        debug!("baud {baud_rate}: accepted={accepted} error={}", port.error());
        probes.push(RateProbe {
            baud_rate,
            accepted,
            error: port.error(),
        });
        if !port.is_open() {
            break;
        }
    }

    if port.is_open() && port.baud_rate(Directions::All) != original {
        port.set_baud_rate(original, Directions::All);
    }
    probes
}

/// Rates command implementation.
pub(crate) fn cmd_rates(options: &LineOptions, config: &Config, json: bool) -> Result<()> {
    let mut port = open_port(options, config)?;
    let probes = probe_rates(&mut port, standard_baud_rates());

    if json {
        let rates: Vec<serde_json::Value> = probes
            .iter()
            .map(|probe| {
                serde_json::json!({
                    "baud_rate": probe.baud_rate,
                    "accepted": probe.accepted,
                    "error": probe.error,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "port": port.port_name(),
                "rates": rates,
            }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
    } else {
        eprintln!(
            "{} {}",
            style("Baud rates on").bold(),
            style(
                port.port_name()
                    .unwrap_or_default()
            )
            .cyan()
        );
        for probe in &probes {
            if probe.accepted {
                eprintln!("  {} {}", style("✓").green(), probe.baud_rate);
            } else {
                eprintln!(
                    "  {} {} {}",
                    style("✗").red(),
                    probe.baud_rate,
                    style(format!("({})", probe.error)).dim()
                );
            }
        }
    }

    if !port.is_open() {
        bail!("Port closed after a failed rollback: {}", port.error());
    }
    Ok(())
}
