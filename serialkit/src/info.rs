//! Port identity and discovery.
//!
//! A [`PortInfo`] is a name plus a handle to the enumerator it came from.
//! Its metadata accessors query that enumerator live on every call, so a
//! port unplugged after discovery simply reports empty values.
//!
//! ## Example
//!
//! ```rust,no_run
//! use serialkit::discover_ports;
//!
//! for port in discover_ports() {
//!     println!("{} - {}", port.port_name(), port.description());
//! }
//! ```

use {
    crate::port::{PortEntry, PortEnumerator},
    log::debug,
    std::{fmt, sync::Arc},
};

/// Baud rates most devices support. Informational only; ports accept any
/// positive rate the backend accepts.
const STANDARD_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Known USB-to-UART bridge families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeKind {
    /// CH340/CH341 USB-to-Serial converter.
    Ch340,
    /// Silicon Labs CP210x USB-to-Serial converter.
    Cp210x,
    /// FTDI FT232/FT2232/FT4232 USB-to-Serial converter.
    Ftdi,
    /// Prolific PL2303 USB-to-Serial converter.
    Prolific,
    /// Unknown device.
    Unknown,
}

/// Known USB VID/PID pairs for common USB-to-UART bridges.
const KNOWN_BRIDGES: &[(u16, &[u16], BridgeKind)] = &[
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x5512, 0x55D4],
        BridgeKind::Ch340,
    ),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71, 0xEA63], BridgeKind::Cp210x),
    (
        0x0403,
        &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015],
        BridgeKind::Ftdi,
    ),
    (0x067B, &[0x2303, 0x23A3, 0x23C3, 0x23D3], BridgeKind::Prolific),
];

impl BridgeKind {
    /// Classify a VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        for (known_vid, pids, kind) in KNOWN_BRIDGES {
            if vid == *known_vid && (pids.is_empty() || pids.contains(&pid)) {
                return *kind;
            }
        }
        Self::Unknown
    }

    /// Get a human-readable name for the bridge family.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a known bridge family.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A serial port known by name, with live metadata lookups.
#[derive(Clone)]
pub struct PortInfo {
    name: String,
    enumerator: Arc<dyn PortEnumerator>,
}

impl PortInfo {
    /// Create a port info for `name`, looked up through the native
    /// enumerator.
    #[cfg(feature = "native")]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_enumerator(name, Arc::new(crate::port::NativePortEnumerator))
    }

    /// Create a port info for `name`, looked up through `enumerator`.
    pub fn with_enumerator(name: impl Into<String>, enumerator: Arc<dyn PortEnumerator>) -> Self {
        Self {
            name: name.into(),
            enumerator,
        }
    }

    /// Port name/path.
    pub fn port_name(&self) -> &str {
        &self.name
    }

    /// Whether this info carries no name.
    pub fn is_null(&self) -> bool {
        self.name
            .is_empty()
    }

    /// Description of the port, empty when unknown.
    pub fn description(&self) -> String {
        self.lookup()
            .and_then(|entry| entry.description)
            .unwrap_or_default()
    }

    /// System path of the device, empty when unknown.
    pub fn system_location(&self) -> String {
        self.lookup()
            .and_then(|entry| entry.system_location)
            .unwrap_or_default()
    }

    /// Manufacturer string, empty when unknown.
    pub fn manufacturer(&self) -> String {
        self.lookup()
            .and_then(|entry| entry.manufacturer)
            .unwrap_or_default()
    }

    /// Serial number, empty when unknown.
    pub fn serial_number(&self) -> String {
        self.lookup()
            .and_then(|entry| entry.serial_number)
            .unwrap_or_default()
    }

    /// Whether the enumerator reports a vendor identifier for this port.
    pub fn has_vendor_identifier(&self) -> bool {
        self.lookup()
            .is_some_and(|entry| entry.vid.is_some())
    }

    /// USB vendor identifier, 0 when not reported.
    pub fn vendor_identifier(&self) -> u16 {
        self.lookup()
            .and_then(|entry| entry.vid)
            .unwrap_or(0)
    }

    /// Whether the enumerator reports a product identifier for this port.
    pub fn has_product_identifier(&self) -> bool {
        self.lookup()
            .is_some_and(|entry| entry.pid.is_some())
    }

    /// USB product identifier, 0 when not reported.
    pub fn product_identifier(&self) -> u16 {
        self.lookup()
            .and_then(|entry| entry.pid)
            .unwrap_or(0)
    }

    /// Whether the port is reported as in use.
    pub fn is_busy(&self) -> bool {
        self.lookup()
            .is_some_and(|entry| entry.busy)
    }

    /// USB bridge family, [`BridgeKind::Unknown`] without VID/PID.
    pub fn bridge_kind(&self) -> BridgeKind {
        match self.lookup() {
            Some(PortEntry {
                vid: Some(vid),
                pid: Some(pid),
                ..
            }) => BridgeKind::from_vid_pid(vid, pid),
            _ => BridgeKind::Unknown,
        }
    }

    /// Current enumeration entry for this port, if present.
    pub fn entry(&self) -> Option<PortEntry> {
        self.lookup()
    }

    fn lookup(&self) -> Option<PortEntry> {
        match self
            .enumerator
            .find(&self.name)
        {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Failed to look up {}: {e}", self.name);
                None
            },
        }
    }
}

impl fmt::Debug for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortInfo")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for PortInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PortInfo {}

/// Discover all available serial ports using the native enumerator.
#[cfg(feature = "native")]
#[must_use]
pub fn discover_ports() -> Vec<PortInfo> {
    discover_ports_with(Arc::new(crate::port::NativePortEnumerator))
}

/// Discover all ports reported by `enumerator`, in reported order.
///
/// An enumeration failure is logged and yields an empty list.
pub fn discover_ports_with(enumerator: Arc<dyn PortEnumerator>) -> Vec<PortInfo> {
    match enumerator.list_ports() {
        Ok(entries) => entries
            .into_iter()
            .map(|entry| PortInfo::with_enumerator(entry.name, Arc::clone(&enumerator)))
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Standard baud rates, in ascending order.
pub fn standard_baud_rates() -> &'static [u32] {
    &STANDARD_BAUD_RATES
}

/// Format a list of ports for display.
pub fn format_port_list(ports: &[PortInfo]) -> Vec<String> {
    let mut result = Vec::new();

    for port in ports {
        let Some(entry) = port.entry() else {
            result.push(port.port_name().to_string());
            continue;
        };

        let kind = match (entry.vid, entry.pid) {
            (Some(vid), Some(pid)) => BridgeKind::from_vid_pid(vid, pid),
            _ => BridgeKind::Unknown,
        };
        let device_info = if kind.is_known() {
            format!(" [{}]", kind.name())
        } else if let (Some(vid), Some(pid)) = (entry.vid, entry.pid) {
            format!(" [VID:{vid:04X} PID:{pid:04X}]")
        } else {
            String::new()
        };

        let description = entry
            .description
            .as_ref()
            .map(|d| format!(" - {d}"))
            .unwrap_or_default();

        result.push(format!("{}{}{}", entry.name, device_info, description));
    }

    result
}

#[cfg(test)]
mod tests {
    use {super::*, crate::port::StaticPortEnumerator};

    fn usb_entry() -> PortEntry {
        PortEntry {
            name: "/dev/ttyUSB0".to_string(),
            description: Some("USB-Serial".to_string()),
            system_location: Some("/dev/ttyUSB0".to_string()),
            manufacturer: Some("WCH".to_string()),
            serial_number: Some("A1".to_string()),
            vid: Some(0x1A86),
            pid: Some(0x7523),
            busy: false,
        }
    }

    fn enumerator(entries: Vec<PortEntry>) -> StaticPortEnumerator {
        StaticPortEnumerator::new(entries)
    }

    #[test]
    fn test_bridge_kind_from_vid_pid() {
        assert_eq!(BridgeKind::from_vid_pid(0x1A86, 0x7523), BridgeKind::Ch340);
        assert_eq!(BridgeKind::from_vid_pid(0x10C4, 0xEA60), BridgeKind::Cp210x);
        assert_eq!(BridgeKind::from_vid_pid(0x0403, 0x6001), BridgeKind::Ftdi);
        assert_eq!(BridgeKind::from_vid_pid(0x067B, 0x2303), BridgeKind::Prolific);
        assert_eq!(BridgeKind::from_vid_pid(0x1234, 0x5678), BridgeKind::Unknown);
        assert!(!BridgeKind::Unknown.is_known());
    }

    #[test]
    fn test_discover_keeps_backend_order() {
        let ports = discover_ports_with(Arc::new(enumerator(vec![
            PortEntry::new("COM9"),
            PortEntry::new("COM1"),
        ])));
        let names: Vec<&str> = ports
            .iter()
            .map(PortInfo::port_name)
            .collect();
        assert_eq!(names, ["COM9", "COM1"]);
    }

    #[test]
    fn test_discover_with_no_ports_is_empty() {
        assert!(discover_ports_with(Arc::new(enumerator(Vec::new()))).is_empty());
    }

    #[test]
    fn test_discover_swallows_enumeration_failure() {
        assert!(discover_ports_with(Arc::new(StaticPortEnumerator::failing())).is_empty());
    }

    #[test]
    fn test_live_metadata() {
        let info = PortInfo::with_enumerator("/dev/ttyUSB0", Arc::new(enumerator(vec![usb_entry()])));
        assert_eq!(info.description(), "USB-Serial");
        assert_eq!(info.system_location(), "/dev/ttyUSB0");
        assert_eq!(info.manufacturer(), "WCH");
        assert_eq!(info.serial_number(), "A1");
        assert!(info.has_vendor_identifier());
        assert_eq!(info.vendor_identifier(), 0x1A86);
        assert!(info.has_product_identifier());
        assert_eq!(info.product_identifier(), 0x7523);
        assert_eq!(info.bridge_kind(), BridgeKind::Ch340);
        assert!(!info.is_busy());
    }

    #[test]
    fn test_metadata_is_queried_live() {
        let source = enumerator(vec![usb_entry()]);
        let info = PortInfo::with_enumerator("/dev/ttyUSB0", Arc::new(source.clone()));
        assert_eq!(info.description(), "USB-Serial");

        source.set_entries(Vec::new());
        assert_eq!(info.description(), "");
        assert!(!info.has_vendor_identifier());
    }

    #[test]
    fn test_missing_port_reports_empty_values() {
        let info = PortInfo::with_enumerator("NON_EXISTENT", Arc::new(enumerator(vec![usb_entry()])));
        assert_eq!(info.description(), "");
        assert_eq!(info.system_location(), "");
        assert_eq!(info.manufacturer(), "");
        assert!(!info.has_vendor_identifier());
        assert!(!info.has_product_identifier());
        assert_eq!(info.vendor_identifier(), 0);
        assert_eq!(info.product_identifier(), 0);
        assert!(!info.is_busy());
        assert!(!info.is_null());
        assert_eq!(info.port_name(), "NON_EXISTENT");
    }

    #[test]
    fn test_entry_without_ids() {
        let info = PortInfo::with_enumerator(
            "/dev/ttyS0",
            Arc::new(enumerator(vec![PortEntry::new("/dev/ttyS0")])),
        );
        assert!(!info.has_vendor_identifier());
        assert_eq!(info.bridge_kind(), BridgeKind::Unknown);
        assert_eq!(info.description(), "");
    }

    #[test]
    fn test_failing_enumerator_never_raises() {
        let info = PortInfo::with_enumerator("COM1", Arc::new(StaticPortEnumerator::failing()));
        assert_eq!(info.description(), "");
        assert!(info.entry().is_none());
    }

    #[test]
    fn test_standard_baud_rates() {
        assert_eq!(
            standard_baud_rates(),
            [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200]
        );
    }

    #[test]
    fn test_format_port_list() {
        let source = Arc::new(enumerator(vec![
            usb_entry(),
            PortEntry::new("/dev/ttyUSB1"),
        ]));
        let ports = discover_ports_with(source);

        let formatted = format_port_list(&ports);
        assert_eq!(formatted.len(), 2);
        assert!(formatted[0].contains("/dev/ttyUSB0"));
        assert!(formatted[0].contains("CH340/CH341"));
        assert!(formatted[0].contains("USB-Serial"));
        assert_eq!(formatted[1], "/dev/ttyUSB1");
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_native_missing_port_does_not_panic() {
        let info = PortInfo::new("NON_EXISTENT");
        assert_eq!(info.description(), "");
        let _ = discover_ports();
    }
}
