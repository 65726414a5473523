//! Send command implementation.

use {
    crate::{
        config::Config,
        serial::{LineOptions, open_port},
    },
    anyhow::{Context, Result, bail},
    console::style,
    log::debug,
    std::io::Write as _,
};

/// Parse a hex payload such as `"48 65 6c"`, `"48656c"` or `"0x48,0x65"`.
pub(crate) fn parse_hex_payload(s: &str) -> Result<Vec<u8>> {
    let digits: String = s
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect();

    if let Some(bad) = digits
        .chars()
        .find(|c| !c.is_ascii_hexdigit())
    {
        bail!("Invalid hex digit '{bad}' in payload '{s}'");
    }
    if digits.len() % 2 != 0 {
        bail!("Hex payload has an odd number of digits: '{s}'");
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("Invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

/// Send command implementation.
pub(crate) fn cmd_send(
    options: &LineOptions,
    config: &Config,
    message: &str,
    hex: bool,
    newline: bool,
) -> Result<()> {
    let mut payload = if hex {
        parse_hex_payload(message)?
    } else {
        message
            .as_bytes()
            .to_vec()
    };
    if newline {
        payload.extend_from_slice(b"\r\n");
    }

    let mut port = open_port(options, config)?;
    let name = port
        .port_name()
        .unwrap_or_default()
        .to_string();

    port.write_all(&payload)
        .with_context(|| format!("Failed to write to {name} ({})", port.error()))?;
    port.flush()
        .then_some(())
        .with_context(|| format!("Failed to flush {name} ({})", port.error()))?;
    debug!("Wrote {} bytes to {name}", payload.len());

    eprintln!(
        "{} Sent {} bytes to {}",
        style("✓").green(),
        payload.len(),
        style(&name).cyan()
    );
    Ok(())
}
