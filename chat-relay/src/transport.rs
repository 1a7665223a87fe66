//! Room-scoped fan-out over live connections.
//!
//! The relay never writes to sockets itself. It asks a [`Transport`] to put a
//! connection into a room group and to emit events to a group; [`Hub`] is the
//! in-process implementation the TCP and WebSocket servers share.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc;
use tracing::debug;

use crate::{message::ServerEvent, registry::ConnectionId};

/// Room-scoped broadcast capability of the connection layer.
pub trait Transport: Send + Sync {
    fn join_group(&self, id: &ConnectionId, room: &str);

    fn leave_group(&self, id: &ConnectionId, room: &str);

    /// Delivers `event` to every connection in `room`, skipping `except`.
    fn emit(&self, room: &str, except: Option<&ConnectionId>, event: &ServerEvent);
}

/// Receiving end of a connection's outbound queue.
pub type Outbox = mpsc::UnboundedReceiver<ServerEvent>;

/// Connection table plus room groups.
///
/// Each connection gets an unbounded queue; a session task drains it onto
/// the wire. Pushing never blocks, so emitting is safe while the caller holds
/// the registry lock.
#[derive(Debug, Default)]
pub struct Hub {
    state: Mutex<HubState>,
}

#[derive(Debug, Default)]
struct HubState {
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    groups: HashMap<String, BTreeSet<ConnectionId>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and returns its id and outbound queue.
    pub fn connect(&self) -> (ConnectionId, Outbox) {
        let id = ConnectionId::generate();
        let (sender, outbox) = mpsc::unbounded_channel();
        self.state().connections.insert(id.clone(), sender);
        (id, outbox)
    }

    /// Forgets a connection and removes it from every group.
    pub fn disconnect(&self, id: &ConnectionId) {
        let mut state = self.state();
        state.connections.remove(id);
        state.groups.retain(|_, members| {
            members.remove(id);
            !members.is_empty()
        });
    }

    /// Drops every outbound queue so sessions see their outbox close.
    pub fn close_all(&self) {
        self.state().connections.clear();
    }

    pub fn connection_count(&self) -> usize {
        self.state().connections.len()
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for Hub {
    fn join_group(&self, id: &ConnectionId, room: &str) {
        self.state()
            .groups
            .entry(room.to_string())
            .or_default()
            .insert(id.clone());
    }

    fn leave_group(&self, id: &ConnectionId, room: &str) {
        let mut state = self.state();
        if let Some(members) = state.groups.get_mut(room) {
            members.remove(id);
            if members.is_empty() {
                state.groups.remove(room);
            }
        }
    }

    fn emit(&self, room: &str, except: Option<&ConnectionId>, event: &ServerEvent) {
        let state = self.state();
        let Some(members) = state.groups.get(room) else {
            return;
        };

        for id in members.iter().filter(|id| Some(*id) != except) {
            match state.connections.get(id) {
                Some(sender) => {
                    if sender.send(event.clone()).is_err() {
                        debug!(connection = %id, "outbox closed; dropping event");
                    }
                }
                None => debug!(connection = %id, room, "no live connection for group member"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;
    use crate::message::ChatMessage;

    fn event(text: &str) -> ServerEvent {
        ServerEvent::Message(ChatMessage {
            username: "Bot".into(),
            text: text.into(),
            time: "00:00".into(),
        })
    }

    #[test]
    fn emit_reaches_group_except_excluded() {
        let hub = Hub::new();
        let (alice, mut alice_rx) = hub.connect();
        let (bob, mut bob_rx) = hub.connect();
        let (_carol, mut carol_rx) = hub.connect();
        hub.join_group(&alice, "r1");
        hub.join_group(&bob, "r1");

        hub.emit("r1", Some(&alice), &event("hello"));

        assert_eq!(bob_rx.try_recv(), Ok(event("hello")));
        assert_eq!(alice_rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(carol_rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn leaving_a_group_stops_delivery() {
        let hub = Hub::new();
        let (alice, mut alice_rx) = hub.connect();
        hub.join_group(&alice, "r1");
        hub.leave_group(&alice, "r1");

        hub.emit("r1", None, &event("anyone?"));
        assert_eq!(alice_rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn disconnect_closes_outbox_and_clears_groups() {
        let hub = Hub::new();
        let (alice, mut alice_rx) = hub.connect();
        let (bob, mut bob_rx) = hub.connect();
        hub.join_group(&alice, "r1");
        hub.join_group(&bob, "r1");

        hub.disconnect(&alice);
        hub.emit("r1", None, &event("bye"));

        assert_eq!(alice_rx.try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(bob_rx.try_recv(), Ok(event("bye")));
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn close_all_disconnects_every_outbox() {
        let hub = Hub::new();
        let (_alice, mut alice_rx) = hub.connect();
        let (_bob, mut bob_rx) = hub.connect();

        hub.close_all();

        assert_eq!(hub.connection_count(), 0);
        assert_eq!(alice_rx.try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(bob_rx.try_recv(), Err(TryRecvError::Disconnected));
    }
}
