//! In-memory membership table for joined connections.
//!
//! Every joined connection owns exactly one [`User`] record, keyed by the
//! connection id the transport assigned to it. Records are created on join
//! and removed on disconnect; there is no update path.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

const ID_LENGTH: usize = 20;

/// Opaque identifier the transport assigns to each live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Creates a fresh random, URL-safe id.
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(ID_LENGTH))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A joined connection: who it is and which room it is in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: ConnectionId,
    pub username: String,
    pub room: String,
}

/// Shared membership registry.
///
/// The relay holds one instance behind an `Arc` and every connection handler
/// goes through it. Single-operation helpers lock for the duration of the
/// call; [`Registry::lock`] hands out the table itself so an event handler can
/// read, write and fan out without another handler interleaving.
#[derive(Debug, Default)]
pub struct Registry {
    members: Mutex<Members>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record for `id`, replacing whatever was there before.
    pub async fn add_user(
        &self,
        id: ConnectionId,
        username: impl Into<String>,
        room: impl Into<String>,
    ) -> User {
        let user = User {
            id,
            username: username.into(),
            room: room.into(),
        };
        self.members.lock().await.insert(user.clone());
        user
    }

    /// Removes the record for `id`, returning it if one existed.
    pub async fn remove_user(&self, id: &ConnectionId) -> Option<User> {
        self.members.lock().await.remove(id)
    }

    pub async fn get_user(&self, id: &ConnectionId) -> Option<User> {
        self.members.lock().await.get(id).cloned()
    }

    /// Returns the members of `room` in insertion order.
    pub async fn users_in_room(&self, room: &str) -> Vec<User> {
        self.members.lock().await.in_room(room)
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    /// Grants exclusive access to the table until the guard is dropped.
    pub async fn lock(&self) -> MutexGuard<'_, Members> {
        self.members.lock().await
    }
}

/// The table behind [`Registry`].
///
/// A `Vec` keeps insertion order for room listings without a second index;
/// rooms in this relay hold a handful of users, so linear scans are fine.
#[derive(Debug, Default)]
pub struct Members {
    users: Vec<User>,
}

impl Members {
    /// Inserts `user`, returning the record it replaced.
    ///
    /// A replaced record loses its position: the new one is appended.
    pub fn insert(&mut self, user: User) -> Option<User> {
        let previous = self.remove(&user.id);
        self.users.push(user);
        previous
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<User> {
        let position = self.users.iter().position(|user| &user.id == id)?;
        Some(self.users.remove(position))
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&User> {
        self.users.iter().find(|user| &user.id == id)
    }

    pub fn in_room(&self, room: &str) -> Vec<User> {
        self.users
            .iter()
            .filter(|user| user.room == room)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
