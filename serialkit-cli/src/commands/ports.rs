//! Port listing command implementation.

use {
    anyhow::Result,
    console::style,
    serialkit::{PortInfo, discover_ports, standard_baud_rates},
};

/// JSON view of one discovered port.
fn port_json(port: &PortInfo) -> serde_json::Value {
    let bridge = port.bridge_kind();
    serde_json::json!({
        "name": port.port_name(),
        "description": port.description(),
        "system_location": port.system_location(),
        "manufacturer": port.manufacturer(),
        "serial_number": port.serial_number(),
        "vid": port.has_vendor_identifier().then(|| port.vendor_identifier()),
        "pid": port.has_product_identifier().then(|| port.product_identifier()),
        "bridge": bridge.name(),
        "known": bridge.is_known(),
        "busy": port.is_busy(),
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = discover_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(port_json)
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
                "standard_baud_rates": standard_baud_rates(),
            }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports:")
            .bold()
            .underlined()
    );

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        let bridge = port.bridge_kind();
        let device_type = if bridge.is_known() {
            format!(
                " [{}]",
                style(bridge.name()).yellow()
            )
        } else {
            String::new()
        };

        let vid_pid = if port.has_vendor_identifier() && port.has_product_identifier() {
            format!(
                " ({:04X}:{:04X})",
                port.vendor_identifier(),
                port.product_identifier()
            )
        } else {
            String::new()
        };

        let description = port.description();
        eprintln!(
            "  {} {}{}{}{}",
            style("•").green(),
            style(port.port_name()).cyan(),
            device_type,
            vid_pid,
            if !description.is_empty() {
                format!(" - {}", style(description).dim())
            } else {
                String::new()
            }
        );
    }

    Ok(())
}
