//! Ingress transport abstraction: the engine is agnostic to how
//! `(target, event)` tuples arrive — an AMQP listener is the reference
//! producer, out of scope here. [`ChannelTransport`] is the in-process
//! stand-in used by the binary's `serve` command and by tests.

use crossbeam_channel::{Receiver, RecvError, Sender};

use crate::event::Event;

/// One unit delivered by the transport: either a normal message to route,
/// or the shutdown signal.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A `(target, event)` tuple to route.
    Message {
        /// The raw ingress target string (wildcard or tenant id).
        target: String,
        /// The event to deliver to the resolved router(s).
        event: Event,
    },
    /// Equivalent to `handle_message(null, null)`: begin the shutdown
    /// sequence.
    Shutdown,
}

/// Blocking source of [`Delivery`] values for the ingress loop.
pub trait Transport: Send {
    /// Blocks until the next delivery is available. Returns `Err` only
    /// when the transport has been torn down without an explicit
    /// [`Delivery::Shutdown`] — callers should treat that the same as a
    /// shutdown signal.
    fn recv(&mut self) -> Result<Delivery, RecvError>;
}

/// A `crossbeam_channel`-backed transport: the reference implementation
/// for in-process use and for driving the engine from tests.
pub struct ChannelTransport {
    receiver: Receiver<Delivery>,
}

/// The producer half of a [`ChannelTransport`] pair.
#[derive(Clone)]
pub struct ChannelTransportHandle {
    sender: Sender<Delivery>,
}

impl ChannelTransport {
    /// Creates a connected producer/consumer pair.
    #[must_use]
    pub fn pair() -> (ChannelTransportHandle, Self) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (ChannelTransportHandle { sender }, Self { receiver })
    }
}

impl Transport for ChannelTransport {
    fn recv(&mut self) -> Result<Delivery, RecvError> {
        self.receiver.recv()
    }
}

impl ChannelTransportHandle {
    /// Delivers `event` addressed to `target`.
    pub fn send(&self, target: impl Into<String>, event: Event) -> bool {
        self.sender
            .send(Delivery::Message {
                target: target.into(),
                event,
            })
            .is_ok()
    }

    /// Delivers the shutdown signal.
    pub fn shutdown(&self) -> bool {
        self.sender.send(Delivery::Shutdown).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Kind;
    use crate::ids::TenantId;
    use serde_json::Map;

    #[test]
    fn delivers_messages_in_order() {
        let (handle, mut transport) = ChannelTransport::pair();
        let tenant = TenantId::generate();
        handle.send("t1", Event::new(tenant, None, Kind::Update, Map::new()));
        handle.send("t1", Event::new(tenant, None, Kind::Delete, Map::new()));

        let first = transport.recv().unwrap();
        let second = transport.recv().unwrap();
        match (first, second) {
            (Delivery::Message { event: e1, .. }, Delivery::Message { event: e2, .. }) => {
                assert_eq!(e1.kind(), Kind::Update);
                assert_eq!(e2.kind(), Kind::Delete);
            }
            _ => panic!("expected two messages"),
        }
    }

    #[test]
    fn shutdown_signal_round_trips() {
        let (handle, mut transport) = ChannelTransport::pair();
        handle.shutdown();
        assert!(matches!(transport.recv().unwrap(), Delivery::Shutdown));
    }
}
