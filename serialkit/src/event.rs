//! Change notifications emitted by [`SerialPort`](crate::SerialPort).
//!
//! Observers are invoked synchronously, in registration order, after a change
//! has been committed. Failed or rejected changes never notify.

use {
    crate::port::{DataBits, Directions, Parity, StopBits},
    std::{fmt, sync::mpsc},
};

/// A committed change on a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEvent {
    /// Baud rate was applied.
    BaudRateChanged {
        /// New baud rate.
        baud_rate: u32,
        /// Directions the rate applies to.
        directions: Directions,
    },
    /// Data bits were applied.
    DataBitsChanged(DataBits),
    /// Parity was applied.
    ParityChanged(Parity),
    /// Stop bits were applied.
    StopBitsChanged(StopBits),
    /// DTR output level changed.
    DataTerminalReadyChanged(bool),
    /// RTS output level changed.
    RequestToSendChanged(bool),
}

/// Handle returned by [`SerialPort::subscribe`](crate::SerialPort::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum Observer {
    Callback(Box<dyn FnMut(&PortEvent) + Send>),
    Channel(mpsc::Sender<PortEvent>),
}

/// Ordered list of observers.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Observer)>,
}

impl Observers {
    pub(crate) fn add_callback<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&PortEvent) + Send + 'static,
    {
        self.push(Observer::Callback(Box::new(callback)))
    }

    pub(crate) fn add_channel(&mut self) -> mpsc::Receiver<PortEvent> {
        let (tx, rx) = mpsc::channel();
        self.push(Observer::Channel(tx));
        rx
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self
            .entries
            .len();
        self.entries
            .retain(|(entry_id, _)| *entry_id != id);
        self.entries
            .len()
            != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .len()
    }

    pub(crate) fn emit(&mut self, event: PortEvent) {
        // Channels whose receiver is gone are dropped on the way
        self.entries
            .retain_mut(|(_, observer)| match observer {
                Observer::Callback(callback) => {
                    callback(&event);
                    true
                },
                Observer::Channel(tx) => tx
                    .send(event)
                    .is_ok(),
            });
    }

    fn push(&mut self, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries
            .push((id, observer));
        id
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::{Arc, Mutex},
    };

    #[test]
    fn test_emit_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut observers = Observers::default();

        let first = Arc::clone(&seen);
        observers.add_callback(move |_| first.lock().unwrap().push(1));
        let second = Arc::clone(&seen);
        observers.add_callback(move |_| second.lock().unwrap().push(2));

        observers.emit(PortEvent::ParityChanged(Parity::Odd));
        assert_eq!(*seen.lock().unwrap(), [1, 2]);
    }

    #[test]
    fn test_remove_subscription() {
        let mut observers = Observers::default();
        let id = observers.add_callback(|_| {});
        assert_eq!(observers.len(), 1);
        assert!(observers.remove(id));
        assert!(!observers.remove(id));
        assert_eq!(observers.len(), 0);
    }

    #[test]
    fn test_channel_dropped_with_receiver() {
        let mut observers = Observers::default();
        let rx = observers.add_channel();
        observers.emit(PortEvent::DataBitsChanged(DataBits::Seven));
        assert_eq!(rx.try_recv(), Ok(PortEvent::DataBitsChanged(DataBits::Seven)));

        drop(rx);
        observers.emit(PortEvent::DataBitsChanged(DataBits::Eight));
        assert_eq!(observers.len(), 0);
    }
}
