//! Room broadcaster: turns connection events into room fan-out.
//!
//! Every handler takes the registry lock first and keeps it until its last
//! emission, so each event is applied and announced as one step with respect
//! to every other handler.

use std::sync::Arc;

use chrono::FixedOffset;
use tracing::{debug, info};

use crate::{
    clock::{self, Clock, SystemClock},
    message::{ChatMessage, ClientEvent, RoomUsers, ServerEvent},
    registry::{ConnectionId, Members, Registry, User},
    transport::Transport,
};

/// Display name used for join and leave notices.
pub const BOT_NAME: &str = "Bot";

#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// Offset applied to the `HH:MM` stamp on every chat message.
    pub utc_offset: FixedOffset,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            utc_offset: clock::default_utc_offset(),
        }
    }
}

pub struct Relay {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn Transport>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            registry,
            transport,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    /// Replaces the wall clock used for message timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn handle(&self, id: &ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::Join { username, room } => self.join(id, username, room).await,
            ClientEvent::Message { text } => self.message(id, text).await,
        }
    }

    /// Adds the connection to `room` and announces it.
    ///
    /// Joining again from an already joined connection first leaves the
    /// previous room, with the usual departure notices.
    pub async fn join(&self, id: &ConnectionId, username: String, room: String) {
        let mut members = self.registry.lock().await;
        let user = User {
            id: id.clone(),
            username,
            room,
        };

        // The old room must see a roster without this connection, so the
        // previous record goes before the new one is inserted.
        if let Some(previous) = members.remove(id) {
            info!(connection = %id, room = %previous.room, "connection rejoined; leaving previous room");
            self.transport.leave_group(id, &previous.room);
            self.announce_departure(&members, &previous);
        }
        members.insert(user.clone());

        self.transport.join_group(id, &user.room);
        info!(connection = %id, username = %user.username, room = %user.room, "user joined");

        let notice = self.chat_message(BOT_NAME, format!("{} has joined the chat", user.username));
        self.transport.emit(&user.room, Some(id), &notice);
        self.transport.emit(&user.room, None, &roster(&members, &user.room));
    }

    /// Relays `text` to everyone in the sender's room, sender included.
    ///
    /// Messages from connections that never joined are dropped.
    pub async fn message(&self, id: &ConnectionId, text: String) {
        let members = self.registry.lock().await;
        let Some(sender) = members.get(id) else {
            debug!(connection = %id, "message from connection outside any room; dropping");
            return;
        };

        let message = self.chat_message(&sender.username, text);
        self.transport.emit(&sender.room, None, &message);
    }

    /// Removes the connection and tells the remaining members.
    pub async fn disconnect(&self, id: &ConnectionId) {
        let mut members = self.registry.lock().await;
        let Some(user) = members.remove(id) else {
            return;
        };

        info!(connection = %id, username = %user.username, room = %user.room, "user left");
        self.transport.leave_group(id, &user.room);
        self.announce_departure(&members, &user);
    }

    fn announce_departure(&self, members: &Members, user: &User) {
        let notice = self.chat_message(BOT_NAME, format!("{} has left the chat", user.username));
        self.transport.emit(&user.room, None, &notice);
        self.transport.emit(&user.room, None, &roster(members, &user.room));
    }

    fn chat_message(&self, username: &str, text: String) -> ServerEvent {
        ServerEvent::Message(ChatMessage {
            username: username.to_string(),
            text,
            time: clock::format_time(self.clock.now(), self.settings.utc_offset),
        })
    }
}

fn roster(members: &Members, room: &str) -> ServerEvent {
    ServerEvent::RoomUsers(RoomUsers {
        room: room.to_string(),
        users: members.in_room(room),
    })
}
