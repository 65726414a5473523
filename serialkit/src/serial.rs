//! Serial port with transactional reconfiguration.
//!
//! Backends only apply line settings when a handle is opened, so every
//! setting change on an open [`SerialPort`] is a close, reapply and reopen.
//! If the reopen fails the old value is restored and the port reopened with
//! it, so callers see either the new configuration or the previous working
//! one, never a mix:
//!
//! ```text
//!            open() ok
//!   Closed ------------> Open
//!     ^                   |  set_*(v): reopen(v) ok -> emit, stay Open
//!     |                   |            reopen(v) err -> rollback
//!     +---- close() ------+            rollback reopen err -> Closed
//! ```
//!
//! Failures are reported through a sticky [`PortError`] and a `false`/empty
//! return value. Errors are never cleared by a successful operation; call
//! [`SerialPort::clear_error`].
//!
//! A port is driven from one thread at a time. Observers run inline on the
//! calling thread after the change is committed; a slow observer delays the
//! call that triggered it.

use {
    crate::{
        error::{Error, PortError, Result},
        event::{Observers, PortEvent, SubscriptionId},
        info::PortInfo,
        port::{
            Backend, DataBits, Directions, FlowControl, Parity, PinoutSignals, PortConfig,
            StopBits,
        },
    },
    log::{debug, trace, warn},
    std::{
        io::{self, Read, Write},
        sync::mpsc,
        time::Duration,
    },
};

/// Where a [`SerialPort`] gets its port name from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSource {
    /// Port name/path.
    Name(String),
    /// A discovered port.
    Info(PortInfo),
}

impl PortSource {
    /// Port name/path of this source.
    pub fn port_name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Info(info) => info.port_name(),
        }
    }
}

impl From<&str> for PortSource {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for PortSource {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<PortInfo> for PortSource {
    fn from(info: PortInfo) -> Self {
        Self::Info(info)
    }
}

impl From<&PortInfo> for PortSource {
    fn from(info: &PortInfo) -> Self {
        Self::Info(info.clone())
    }
}

/// A serial connection over a [`Backend`].
pub struct SerialPort<B: Backend> {
    backend: B,
    port_name: Option<String>,
    config: PortConfig,
    is_open: bool,
    error: PortError,
    data_terminal_ready: bool,
    request_to_send: bool,
    observers: Observers,
}

#[cfg(feature = "native")]
impl SerialPort<crate::port::NativeBackend> {
    /// Create a closed port on the native backend with the default
    /// configuration.
    pub fn native(source: impl Into<PortSource>) -> Self {
        Self::with_port(source, crate::port::NativeBackend::new())
    }
}

impl<B: Backend> SerialPort<B> {
    /// Create a closed port with no port name.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            port_name: None,
            config: PortConfig::default(),
            is_open: false,
            error: PortError::NoError,
            data_terminal_ready: false,
            request_to_send: false,
            observers: Observers::default(),
        }
    }

    /// Create a closed port for `source` with the default configuration.
    pub fn with_port(source: impl Into<PortSource>, backend: B) -> Self {
        Self::with_config(source, PortConfig::default(), backend)
    }

    /// Create a closed port for `source` that will open with `config`.
    pub fn with_config(source: impl Into<PortSource>, config: PortConfig, backend: B) -> Self {
        let mut port = Self::new(backend);
        port.port_name = Some(
            source
                .into()
                .port_name()
                .to_string(),
        );
        port.config = config;
        port
    }

    // ---- Identity ----

    /// Port name/path, if set.
    pub fn port_name(&self) -> Option<&str> {
        self.port_name
            .as_deref()
    }

    /// Set the port name. Takes effect at the next open.
    pub fn set_port_name(&mut self, name: impl Into<String>) {
        self.port_name = Some(name.into());
    }

    /// Set the port from a discovered [`PortInfo`]. Takes effect at the next
    /// open.
    pub fn set_port(&mut self, info: &PortInfo) {
        self.set_port_name(info.port_name());
    }

    /// Shared access to the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend.
    ///
    /// Opening or closing the backend directly bypasses the port's state
    /// tracking.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    // ---- Open / close ----

    /// Whether the backend handle is live.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Open (or reopen) the port with the current configuration.
    pub fn open(&mut self) -> bool {
        self.try_reopen("open")
    }

    /// Close the port. Closing a closed port records
    /// [`PortError::NotOpen`]. DTR and RTS read as low afterwards.
    pub fn close(&mut self) -> bool {
        if !self.require_open() {
            return false;
        }
        if let Err(e) = self
            .backend
            .close()
        {
            warn!("Error while closing {}: {e}", self.display_name());
        }
        self.is_open = false;
        self.data_terminal_ready = false;
        self.request_to_send = false;
        true
    }

    // ---- Error state ----

    /// Last recorded error.
    pub fn error(&self) -> PortError {
        self.error
    }

    /// Overwrite the recorded error.
    pub fn set_error(&mut self, error: PortError) {
        self.error = error;
    }

    /// Reset the recorded error to [`PortError::NoError`].
    pub fn clear_error(&mut self) {
        self.error = PortError::NoError;
    }

    // ---- Observers ----

    /// Register a callback invoked after every committed change.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&PortEvent) + Send + 'static,
    {
        self.observers
            .add_callback(callback)
    }

    /// Receive committed changes through a channel. The subscription ends
    /// when the receiver is dropped.
    pub fn subscribe_channel(&mut self) -> mpsc::Receiver<PortEvent> {
        self.observers
            .add_channel()
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers
            .remove(id)
    }

    // ---- Configuration ----

    /// Current configuration (last successfully applied values while open).
    pub fn configuration(&self) -> &PortConfig {
        &self.config
    }

    /// Baud rate. Only [`Directions::All`] is supported; other directions
    /// report the shared rate.
    pub fn baud_rate(&self, directions: Directions) -> u32 {
        warn_directions(directions);
        self.config
            .baud_rate
    }

    /// Apply a new baud rate by reopening the port.
    pub fn set_baud_rate(&mut self, baud_rate: u32, directions: Directions) -> bool {
        warn_directions(directions);
        self.reconfigure(
            "set_baud_rate",
            |config| &mut config.baud_rate,
            baud_rate,
            |baud_rate| PortEvent::BaudRateChanged {
                baud_rate,
                directions: Directions::All,
            },
        )
    }

    /// Data bits.
    pub fn data_bits(&self) -> DataBits {
        self.config
            .data_bits
    }

    /// Apply new data bits by reopening the port.
    pub fn set_data_bits(&mut self, data_bits: DataBits) -> bool {
        self.reconfigure(
            "set_data_bits",
            |config| &mut config.data_bits,
            data_bits,
            PortEvent::DataBitsChanged,
        )
    }

    /// Parity.
    pub fn parity(&self) -> Parity {
        self.config
            .parity
    }

    /// Apply a new parity by reopening the port.
    pub fn set_parity(&mut self, parity: Parity) -> bool {
        self.reconfigure(
            "set_parity",
            |config| &mut config.parity,
            parity,
            PortEvent::ParityChanged,
        )
    }

    /// Stop bits.
    pub fn stop_bits(&self) -> StopBits {
        self.config
            .stop_bits
    }

    /// Apply new stop bits by reopening the port.
    pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> bool {
        self.reconfigure(
            "set_stop_bits",
            |config| &mut config.stop_bits,
            stop_bits,
            PortEvent::StopBitsChanged,
        )
    }

    /// Not supported: always `None` with [`PortError::UnsupportedOperation`].
    pub fn flow_control(&mut self) -> Option<FlowControl> {
        self.unsupported("flow_control");
        None
    }

    /// Not supported: always `false` with
    /// [`PortError::UnsupportedOperation`].
    pub fn set_flow_control(&mut self, _flow_control: FlowControl) -> bool {
        self.unsupported("set_flow_control");
        false
    }

    /// Not supported: always `None` with [`PortError::UnsupportedOperation`].
    pub fn settings_restored_on_close(&mut self) -> Option<bool> {
        self.unsupported("settings_restored_on_close");
        None
    }

    /// Not supported: always `false` with
    /// [`PortError::UnsupportedOperation`].
    pub fn set_settings_restored_on_close(&mut self, _restore: bool) -> bool {
        self.unsupported("set_settings_restored_on_close");
        false
    }

    // ---- Data transfer ----

    /// Read up to `max_bytes` currently available bytes. An empty result is
    /// not an error. The buffer is sized by what is pending, so
    /// `read(usize::MAX)` drains everything available.
    pub fn read(&mut self, max_bytes: usize) -> Vec<u8> {
        if !self.require_open() {
            return Vec::new();
        }
        let available = match self
            .backend
            .bytes_available()
        {
            Ok(n) => n,
            Err(e) => {
                self.fail(PortError::ReadFailed, "read", &e);
                return Vec::new();
            },
        };
        let len = max_bytes.min(available);
        if len == 0 {
            return Vec::new();
        }
        let mut buf = vec![0u8; len];
        match self
            .backend
            .read(&mut buf)
        {
            Ok(n) => {
                buf.truncate(n);
                buf
            },
            Err(e) => {
                self.fail(PortError::ReadFailed, "read", &e);
                Vec::new()
            },
        }
    }

    /// Write bytes unmodified, returning how many the backend accepted.
    pub fn write(&mut self, data: &[u8]) -> Option<usize> {
        if !self.require_open() {
            return None;
        }
        match self
            .backend
            .write(data)
        {
            Ok(n) => Some(n),
            Err(e) => {
                self.fail(PortError::WriteFailed, "write", &e);
                None
            },
        }
    }

    /// Flush pending output.
    pub fn flush(&mut self) -> bool {
        if !self.require_open() {
            return false;
        }
        let result = self
            .backend
            .flush();
        self.check(result, PortError::WriteFailed, "flush")
            .is_some()
    }

    /// Discard buffered data in `directions`.
    pub fn clear(&mut self, directions: Directions) -> bool {
        if !self.require_open() {
            return false;
        }
        let result = self
            .backend
            .clear(directions);
        self.check(result, PortError::UnknownError, "clear")
            .is_some()
    }

    /// Bytes waiting to be read, 0 when closed.
    pub fn bytes_available(&mut self) -> usize {
        if !self.require_open() {
            return 0;
        }
        let result = self
            .backend
            .bytes_available();
        self.check(result, PortError::UnknownError, "bytes_available")
            .unwrap_or(0)
    }

    /// Bytes waiting to be transmitted, 0 when closed.
    pub fn bytes_to_write(&mut self) -> usize {
        if !self.require_open() {
            return 0;
        }
        let result = self
            .backend
            .bytes_to_write();
        self.check(result, PortError::UnknownError, "bytes_to_write")
            .unwrap_or(0)
    }

    /// Whether there is nothing left to read. Always true when closed.
    pub fn at_end(&mut self) -> bool {
        if !self.is_open {
            self.error = PortError::NotOpen;
            return true;
        }
        self.bytes_available() == 0
    }

    // ---- Signal lines ----

    /// Current signal set: DTR/RTS from local state, CD/DSR/RI/CTS read
    /// from the backend.
    pub fn pinout_signals(&mut self) -> PinoutSignals {
        if !self.require_open() {
            return PinoutSignals::NONE;
        }
        let result = self.read_signals();
        self.check(result, PortError::UnknownError, "pinout_signals")
            .unwrap_or(PinoutSignals::NONE)
    }

    /// Last DTR level successfully applied. Always false while closed.
    pub fn is_data_terminal_ready(&self) -> bool {
        self.is_open && self.data_terminal_ready
    }

    /// Drive the DTR line.
    pub fn set_data_terminal_ready(&mut self, level: bool) -> bool {
        if !self.require_open() {
            return false;
        }
        let result = self
            .backend
            .set_dtr(level);
        if self
            .check(result, PortError::UnknownError, "set_data_terminal_ready")
            .is_none()
        {
            return false;
        }
        self.data_terminal_ready = level;
        self.observers
            .emit(PortEvent::DataTerminalReadyChanged(level));
        true
    }

    /// Last RTS level successfully applied. Always false while closed.
    pub fn is_request_to_send(&self) -> bool {
        self.is_open && self.request_to_send
    }

    /// Drive the RTS line.
    pub fn set_request_to_send(&mut self, level: bool) -> bool {
        if !self.require_open() {
            return false;
        }
        let result = self
            .backend
            .set_rts(level);
        if self
            .check(result, PortError::UnknownError, "set_request_to_send")
            .is_none()
        {
            return false;
        }
        self.request_to_send = level;
        self.observers
            .emit(PortEvent::RequestToSendChanged(level));
        true
    }

    /// Hold the line in break state for `duration`. Blocks for the duration.
    pub fn send_break(&mut self, duration: Duration) -> bool {
        if !self.require_open() {
            return false;
        }
        let result = self
            .backend
            .send_break(duration);
        self.check(result, PortError::UnknownError, "send_break")
            .is_some()
    }

    /// Enter or leave the break state.
    pub fn set_break_enabled(&mut self, enabled: bool) -> bool {
        if !self.require_open() {
            return false;
        }
        let result = self
            .backend
            .set_break(enabled);
        self.check(result, PortError::UnknownError, "set_break_enabled")
            .is_some()
    }

    // ---- Internals ----

    /// Snapshot, apply, reopen; roll back and reopen on failure.
    fn reconfigure<T: Copy + std::fmt::Debug>(
        &mut self,
        context: &str,
        field: fn(&mut PortConfig) -> &mut T,
        value: T,
        event: fn(T) -> PortEvent,
    ) -> bool {
        if !self.require_open() {
            return false;
        }

        let old = std::mem::replace(field(&mut self.config), value);
        if self.try_reopen(&format!("{context}({value:?})")) {
            debug!("{} {context}({value:?}) committed", self.display_name());
            self.observers
                .emit(event(value));
            return true;
        }

        *field(&mut self.config) = old;
        if let Err(e) = self.reopen() {
            warn!(
                "{} left closed: restoring previous configuration failed: {e}",
                self.display_name()
            );
        }
        false
    }

    /// Reopen and record the classified error on failure.
    fn try_reopen(&mut self, context: &str) -> bool {
        match self.reopen() {
            Ok(()) => true,
            Err(e) => {
                let code = PortError::from_open_failure(&e);
                warn!("{} {context} failed ({code}): {e}", self.display_name());
                self.error = code;
                false
            },
        }
    }

    /// Close any live handle, open with the full configuration, then drive
    /// DTR/RTS back to the recorded levels. A fresh handle comes up with the
    /// OS defaults for those lines.
    fn reopen(&mut self) -> Result<()> {
        if self
            .backend
            .is_open()
        {
            if let Err(e) = self
                .backend
                .close()
            {
                debug!("Error while closing {} for reopen: {e}", self.display_name());
            }
        }
        self.is_open = false;

        let name = self
            .port_name
            .as_deref()
            .ok_or(Error::NoPortName)?;
        trace!("Reopening {name} with {:?}", self.config);
        self.backend
            .open(name, &self.config)?;
        self.is_open = true;
        self.restore_output_lines();
        Ok(())
    }

    fn restore_output_lines(&mut self) {
        let dtr = self.data_terminal_ready;
        let rts = self.request_to_send;
        if let Err(e) = self
            .backend
            .set_dtr(dtr)
        {
            warn!("{} could not restore DTR={dtr}: {e}", self.display_name());
        }
        if let Err(e) = self
            .backend
            .set_rts(rts)
        {
            warn!("{} could not restore RTS={rts}: {e}", self.display_name());
        }
    }

    fn read_signals(&mut self) -> Result<PinoutSignals> {
        let mut signals = PinoutSignals::NONE;
        signals.set(PinoutSignals::DATA_TERMINAL_READY, self.data_terminal_ready);
        signals.set(PinoutSignals::REQUEST_TO_SEND, self.request_to_send);
        signals.set(PinoutSignals::DATA_CARRIER_DETECT, self.backend.read_cd()?);
        signals.set(PinoutSignals::DATA_SET_READY, self.backend.read_dsr()?);
        signals.set(PinoutSignals::RING_INDICATOR, self.backend.read_ri()?);
        signals.set(PinoutSignals::CLEAR_TO_SEND, self.backend.read_cts()?);
        Ok(signals)
    }

    /// Record `NotOpen` and return false when closed.
    fn require_open(&mut self) -> bool {
        if !self.is_open {
            self.error = PortError::NotOpen;
        }
        self.is_open
    }

    fn check<T>(&mut self, result: Result<T>, code: PortError, context: &str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.fail(code, context, &e);
                None
            },
        }
    }

    fn fail(&mut self, code: PortError, context: &str, err: &Error) {
        debug!("{} {context} failed: {err}", self.display_name());
        self.error = code;
    }

    fn unsupported(&mut self, operation: &str) {
        warn!("{operation} is not supported");
        self.error = PortError::UnsupportedOperation;
    }

    fn display_name(&self) -> &str {
        self.port_name
            .as_deref()
            .unwrap_or("<unnamed>")
    }
}

fn warn_directions(directions: Directions) {
    if directions != Directions::All {
        warn!("Baud rate per direction is not supported, using all directions");
    }
}

impl<B: Backend> Drop for SerialPort<B> {
    fn drop(&mut self) {
        if self.is_open {
            let _ = self
                .backend
                .close();
        }
    }
}

impl<B: Backend> std::fmt::Debug for SerialPort<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("port_name", &self.port_name)
            .field("config", &self.config)
            .field("is_open", &self.is_open)
            .field("error", &self.error)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Read for SerialPort<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.require_open() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        self.backend
            .read(buf)
            .map_err(|e| {
                self.error = PortError::ReadFailed;
                io::Error::other(e)
            })
    }
}

impl<B: Backend> Write for SerialPort<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.require_open() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        self.backend
            .write(buf)
            .map_err(|e| {
                self.error = PortError::WriteFailed;
                io::Error::other(e)
            })
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.require_open() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        self.backend
            .flush()
            .map_err(|e| {
                self.error = PortError::WriteFailed;
                io::Error::other(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::port::{LoopbackBackend, StaticPortEnumerator, loopback::InputLines},
        std::sync::{Arc, Mutex},
    };

    fn init_logger() {
        let _ = env_logger::builder()
            .is_test(true)
            .try_init();
    }

    fn open_port(backend: LoopbackBackend) -> SerialPort<LoopbackBackend> {
        init_logger();
        let mut port = SerialPort::with_port("COM_TEST", backend);
        assert!(port.open());
        port
    }

    fn record_events(port: &mut SerialPort<LoopbackBackend>) -> Arc<Mutex<Vec<PortEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        port.subscribe(move |event| {
            sink.lock()
                .unwrap()
                .push(*event);
        });
        events
    }

    // ---- Construction ----

    #[test]
    fn test_new_port_is_closed() {
        let port = SerialPort::with_port("COM_TEST", LoopbackBackend::new());
        assert!(!port.is_open());
        assert_eq!(port.port_name(), Some("COM_TEST"));
        assert_eq!(port.error(), PortError::NoError);
        assert_eq!(port.configuration(), &PortConfig::default());
    }

    #[test]
    fn test_construct_from_port_info() {
        let enumerator = Arc::new(StaticPortEnumerator::new(Vec::new()));
        let info = PortInfo::with_enumerator("/dev/ttyACM0", enumerator);
        let port = SerialPort::with_port(&info, LoopbackBackend::new());
        assert_eq!(port.port_name(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_open_without_name_reports_device_not_found() {
        let mut port = SerialPort::new(LoopbackBackend::new());
        assert!(!port.open());
        assert!(!port.is_open());
        assert_eq!(port.error(), PortError::DeviceNotFound);

        port.set_port_name("COM_TEST");
        assert!(port.open());
        assert_eq!(port.backend().active_port(), Some("COM_TEST"));
    }

    #[test]
    fn test_open_applies_full_configuration() {
        let config = PortConfig::new(57600)
            .with_data_bits(DataBits::Seven)
            .with_parity(Parity::Even)
            .with_stop_bits(StopBits::Two);
        let mut port = SerialPort::with_config("COM_TEST", config.clone(), LoopbackBackend::new());
        assert!(port.open());
        assert_eq!(port.backend().active_config(), Some(&config));
    }

    #[test]
    fn test_open_unavailable_reports_open_failed() {
        let mut backend = LoopbackBackend::new();
        backend.set_unavailable(true);
        let mut port = SerialPort::with_port("COM_TEST", backend);
        assert!(!port.open());
        assert!(!port.is_open());
        assert_eq!(port.error(), PortError::OpenFailed);
    }

    #[test]
    fn test_close() {
        let mut port = open_port(LoopbackBackend::new());
        assert!(port.close());
        assert!(!port.is_open());
        assert!(!port.backend().is_open());

        assert!(!port.close());
        assert_eq!(port.error(), PortError::NotOpen);
    }

    #[test]
    fn test_drop_releases_observers() {
        let mut port = open_port(LoopbackBackend::new());
        let rx = port.subscribe_channel();
        drop(port);
        assert!(rx.recv().is_err());
    }

    // ---- Reconfiguration ----

    #[test]
    fn test_set_baud_rate_commits_and_notifies_once() {
        let mut port = open_port(LoopbackBackend::new());
        let events = record_events(&mut port);

        assert!(port.set_baud_rate(115200, Directions::All));
        assert!(port.is_open());
        assert_eq!(port.baud_rate(Directions::All), 115200);
        assert_eq!(
            port.backend()
                .active_config()
                .map(|c| c.baud_rate),
            Some(115200)
        );
        assert_eq!(
            *events.lock().unwrap(),
            [PortEvent::BaudRateChanged {
                baud_rate: 115200,
                directions: Directions::All,
            }]
        );
    }

    #[test]
    fn test_set_same_baud_rate_still_notifies() {
        let mut port = open_port(LoopbackBackend::new());
        let events = record_events(&mut port);
        let opens = port.backend().open_count();

        assert!(port.set_baud_rate(9600, Directions::All));
        assert_eq!(port.baud_rate(Directions::All), 9600);
        assert_eq!(port.backend().open_count(), opens + 1);
        assert_eq!(
            *events.lock().unwrap(),
            [PortEvent::BaudRateChanged {
                baud_rate: 9600,
                directions: Directions::All,
            }]
        );
    }

    #[test]
    fn test_set_baud_rate_other_direction_applies_to_all() {
        let mut port = open_port(LoopbackBackend::new());
        assert!(port.set_baud_rate(19200, Directions::Input));
        assert_eq!(port.baud_rate(Directions::Output), 19200);
    }

    #[test]
    fn test_rejected_baud_rate_rolls_back() {
        let mut port = open_port(LoopbackBackend::new().with_baud_rates(&[9600, 115200]));
        let events = record_events(&mut port);

        assert!(!port.set_baud_rate(12345, Directions::All));
        assert_eq!(port.error(), PortError::UnsupportedOperation);
        assert_eq!(port.baud_rate(Directions::All), 9600);
        assert!(port.is_open());
        assert_eq!(
            port.backend()
                .active_config()
                .map(|c| c.baud_rate),
            Some(9600)
        );
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_zero_baud_rate_rejected() {
        let mut port = open_port(LoopbackBackend::new());
        assert!(!port.set_baud_rate(0, Directions::All));
        assert_eq!(port.error(), PortError::UnsupportedOperation);
        assert_eq!(port.baud_rate(Directions::All), 9600);
        assert!(port.is_open());
    }

    #[test]
    fn test_each_field_commits() {
        let mut port = open_port(LoopbackBackend::new());
        let events = record_events(&mut port);

        assert!(port.set_data_bits(DataBits::Seven));
        assert!(port.set_parity(Parity::Odd));
        assert!(port.set_stop_bits(StopBits::Two));

        assert!(port.is_open());
        assert_eq!(port.data_bits(), DataBits::Seven);
        assert_eq!(port.parity(), Parity::Odd);
        assert_eq!(port.stop_bits(), StopBits::Two);
        assert_eq!(
            *events.lock().unwrap(),
            [
                PortEvent::DataBitsChanged(DataBits::Seven),
                PortEvent::ParityChanged(Parity::Odd),
                PortEvent::StopBitsChanged(StopBits::Two),
            ]
        );
    }

    #[test]
    fn test_rejected_fields_roll_back() {
        let backend = LoopbackBackend::new().with_validator(|config| {
            if config.data_bits == DataBits::Five {
                return Err("5 data bits".to_string());
            }
            if config.parity == Parity::Mark {
                return Err("mark parity".to_string());
            }
            if config.stop_bits == StopBits::OneAndHalf {
                return Err("1.5 stop bits".to_string());
            }
            Ok(())
        });
        let mut port = open_port(backend);
        let events = record_events(&mut port);

        assert!(!port.set_data_bits(DataBits::Five));
        assert_eq!(port.data_bits(), DataBits::Eight);
        assert!(!port.set_parity(Parity::Mark));
        assert_eq!(port.parity(), Parity::None);
        assert!(!port.set_stop_bits(StopBits::OneAndHalf));
        assert_eq!(port.stop_bits(), StopBits::One);

        assert_eq!(port.error(), PortError::UnsupportedOperation);
        assert!(port.is_open());
        assert_eq!(
            port.backend().active_config(),
            Some(&PortConfig::default())
        );
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_rollback_leaves_port_closed() {
        let mut port = open_port(LoopbackBackend::new());
        port.backend_mut()
            .set_unavailable(true);

        assert!(!port.set_parity(Parity::Even));
        assert_eq!(port.error(), PortError::OpenFailed);
        assert_eq!(port.parity(), Parity::None);
        assert!(!port.is_open());
        assert!(!port.backend().is_open());

        // Device comes back: a plain open restores the old configuration
        port.backend_mut()
            .set_unavailable(false);
        assert!(port.open());
        assert_eq!(port.parity(), Parity::None);
    }

    #[test]
    fn test_mutators_require_open() {
        let mut port = SerialPort::with_port("COM_TEST", LoopbackBackend::new());
        let events = record_events(&mut port);

        assert!(!port.set_baud_rate(115200, Directions::All));
        assert_eq!(port.error(), PortError::NotOpen);
        assert!(!port.set_data_bits(DataBits::Seven));
        assert!(!port.set_parity(Parity::Even));
        assert!(!port.set_stop_bits(StopBits::Two));
        assert!(!port.set_data_terminal_ready(true));
        assert!(!port.set_request_to_send(true));
        assert!(!port.send_break(Duration::from_millis(10)));
        assert!(!port.set_break_enabled(true));
        assert!(!port.flush());
        assert!(!port.clear(Directions::All));
        assert_eq!(port.write(b"x"), None);
        assert!(port.read(8).is_empty());
        assert_eq!(port.bytes_available(), 0);
        assert_eq!(port.bytes_to_write(), 0);
        assert_eq!(port.pinout_signals(), PinoutSignals::NONE);
        assert!(port.at_end());

        assert_eq!(port.error(), PortError::NotOpen);
        assert!(!port.is_open());
        assert_eq!(port.configuration(), &PortConfig::default());
        assert!(!port.is_data_terminal_ready());
        assert!(!port.is_request_to_send());
        assert_eq!(port.backend().open_count(), 0);
        assert!(events.lock().unwrap().is_empty());
    }

    // ---- Errors ----

    #[test]
    fn test_error_is_sticky_until_cleared() {
        let mut port = SerialPort::with_port("COM_TEST", LoopbackBackend::new());
        assert_eq!(port.write(b"x"), None);
        assert_eq!(port.error(), PortError::NotOpen);

        assert!(port.open());
        assert_eq!(port.error(), PortError::NotOpen);
        assert_eq!(port.write(b"x"), Some(1));
        assert_eq!(port.error(), PortError::NotOpen);

        port.clear_error();
        port.clear_error();
        assert_eq!(port.error(), PortError::NoError);
    }

    #[test]
    fn test_set_error() {
        let mut port = SerialPort::new(LoopbackBackend::new());
        port.set_error(PortError::FramingError);
        assert_eq!(port.error(), PortError::FramingError);
    }

    #[test]
    fn test_unsupported_operations() {
        let mut port = open_port(LoopbackBackend::new());
        assert_eq!(port.flow_control(), None);
        assert_eq!(port.error(), PortError::UnsupportedOperation);

        port.clear_error();
        assert!(!port.set_flow_control(FlowControl::Hardware));
        assert_eq!(port.error(), PortError::UnsupportedOperation);

        port.clear_error();
        assert_eq!(port.settings_restored_on_close(), None);
        assert!(!port.set_settings_restored_on_close(true));
        assert_eq!(port.error(), PortError::UnsupportedOperation);
        assert!(port.is_open());
    }

    // ---- Data transfer ----

    #[test]
    fn test_write_read_round_trip() {
        let mut port = open_port(LoopbackBackend::new());
        let data = b"Hello Serial";
        assert_eq!(port.write(data), Some(data.len()));
        assert_eq!(port.bytes_available(), data.len());
        assert_eq!(port.read(data.len()), data);
        assert!(port.at_end());
        assert_eq!(port.error(), PortError::NoError);
    }

    #[test]
    fn test_read_is_bounded_and_empty_is_ok() {
        let mut port = open_port(LoopbackBackend::new());
        assert!(port.read(16).is_empty());
        assert_eq!(port.error(), PortError::NoError);

        port.backend_mut()
            .inject(b"abcdef");
        assert_eq!(port.read(4), b"abcd");
        assert_eq!(port.read(4), b"ef");
    }

    #[test]
    fn test_read_unbounded_returns_pending_bytes() {
        let mut port = open_port(LoopbackBackend::new());
        assert_eq!(port.write(b"hi"), Some(2));
        assert_eq!(port.read(usize::MAX), b"hi");
        assert!(port.read(usize::MAX).is_empty());
        assert!(port.read(usize::MAX / 2).is_empty());
        assert_eq!(port.error(), PortError::NoError);
    }

    #[test]
    fn test_write_failure() {
        let mut port = open_port(LoopbackBackend::new());
        port.backend_mut()
            .set_write_fails(true);
        assert_eq!(port.write(b"data"), None);
        assert_eq!(port.error(), PortError::WriteFailed);
        assert!(port.is_open());
    }

    #[test]
    fn test_clear_directions() {
        let mut port = open_port(LoopbackBackend::new());
        port.backend_mut()
            .inject(b"stale");
        assert!(port.clear(Directions::Output));
        assert_eq!(port.bytes_available(), 5);
        assert!(port.clear(Directions::All));
        assert_eq!(port.bytes_available(), 0);
        assert_eq!(port.bytes_to_write(), 0);
        assert!(port.flush());
    }

    #[test]
    fn test_reconfigure_keeps_port_usable() {
        let mut port = open_port(LoopbackBackend::new());
        assert!(port.set_baud_rate(115200, Directions::All));
        assert_eq!(port.write(b"ok"), Some(2));
        assert_eq!(port.read(2), b"ok");
    }

    #[test]
    fn test_io_traits() {
        let mut port = open_port(LoopbackBackend::new());
        port.write_all(b"io")
            .unwrap();
        Write::flush(&mut port).unwrap();

        let mut buf = [0u8; 2];
        port.read_exact(&mut buf)
            .unwrap();
        assert_eq!(&buf, b"io");

        assert!(port.close());
        let err = port
            .write_all(b"x")
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert_eq!(port.error(), PortError::NotOpen);
    }

    // ---- Signal lines ----

    #[test]
    fn test_line_control_updates_state_and_notifies() {
        let mut port = open_port(LoopbackBackend::new());
        let events = record_events(&mut port);

        assert!(port.set_data_terminal_ready(true));
        assert!(port.set_request_to_send(true));
        assert!(port.is_data_terminal_ready());
        assert!(port.is_request_to_send());
        assert!(port.backend().dtr());
        assert!(port.backend().rts());
        assert_eq!(
            *events.lock().unwrap(),
            [
                PortEvent::DataTerminalReadyChanged(true),
                PortEvent::RequestToSendChanged(true),
            ]
        );
    }

    #[test]
    fn test_output_lines_survive_reconfigure() {
        let mut port = open_port(LoopbackBackend::new());
        assert!(port.set_data_terminal_ready(true));
        assert!(port.set_request_to_send(false));

        assert!(port.set_baud_rate(115200, Directions::All));
        assert!(port.backend().dtr());
        assert!(!port.backend().rts());
        assert!(port.is_data_terminal_ready());
        assert!(
            port.pinout_signals()
                .contains(PinoutSignals::DATA_TERMINAL_READY)
        );

        // Rejected value: the rollback reopen restores the lines too
        assert!(port.set_request_to_send(true));
        assert!(!port.set_baud_rate(0, Directions::All));
        assert!(port.is_open());
        assert!(port.backend().dtr());
        assert!(port.backend().rts());
    }

    #[test]
    fn test_close_drops_output_line_state() {
        let mut port = open_port(LoopbackBackend::new());
        assert!(port.set_data_terminal_ready(true));
        assert!(port.set_request_to_send(true));

        assert!(port.close());
        assert!(!port.is_data_terminal_ready());
        assert!(!port.is_request_to_send());
        assert!(!port.backend().dtr());

        assert!(port.open());
        assert!(!port.is_data_terminal_ready());
        assert!(!port.backend().dtr());
    }

    #[test]
    fn test_line_control_failure_keeps_state() {
        let mut port = open_port(LoopbackBackend::new());
        let events = record_events(&mut port);
        port.backend_mut()
            .set_line_control_fails(true);

        assert!(!port.set_data_terminal_ready(true));
        assert!(!port.set_request_to_send(true));
        assert!(!port.is_data_terminal_ready());
        assert!(!port.is_request_to_send());
        assert_eq!(port.error(), PortError::UnknownError);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_pinout_signals() {
        let mut port = open_port(LoopbackBackend::new());
        assert!(port.set_data_terminal_ready(true));
        port.backend_mut()
            .set_input_lines(InputLines {
                cd: true,
                dsr: false,
                ri: true,
                cts: true,
            });

        let signals = port.pinout_signals();
        assert_eq!(
            signals,
            PinoutSignals::DATA_TERMINAL_READY
                | PinoutSignals::DATA_CARRIER_DETECT
                | PinoutSignals::RING_INDICATOR
                | PinoutSignals::CLEAR_TO_SEND
        );
        assert!(!signals.contains(PinoutSignals::REQUEST_TO_SEND));
    }

    #[test]
    fn test_breaks() {
        let mut port = open_port(LoopbackBackend::new());
        assert!(port.send_break(Duration::from_millis(25)));
        assert!(port.set_break_enabled(true));
        assert!(port.backend().break_enabled());
        assert!(port.set_break_enabled(false));
        assert!(!port.backend().break_enabled());
        assert_eq!(port.backend().breaks_sent(), [Duration::from_millis(25)]);
    }

    // ---- Observers ----

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut port = open_port(LoopbackBackend::new());
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let id = port.subscribe(move |_| *counter.lock().unwrap() += 1);

        assert!(port.set_parity(Parity::Even));
        assert!(port.unsubscribe(id));
        assert!(port.set_parity(Parity::Odd));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_channel_subscription() {
        let mut port = open_port(LoopbackBackend::new());
        let rx = port.subscribe_channel();

        assert!(port.set_stop_bits(StopBits::Two));
        assert!(!port.set_baud_rate(0, Directions::All));
        assert_eq!(rx.try_recv(), Ok(PortEvent::StopBitsChanged(StopBits::Two)));
        assert!(rx.try_recv().is_err());
    }
}
