//! Network front ends for the relay.
//!
//! Both listeners share one [`ChatState`]: a connection is opened on the hub,
//! its inbound events go through the relay, and closing it runs the relay's
//! disconnect handler before the hub forgets the connection.

use std::sync::Arc;

use tracing::info;

use crate::{
    registry::{ConnectionId, Registry},
    relay::{Relay, RelaySettings},
    transport::{Hub, Outbox},
};

pub mod http;
pub mod tcp;

#[derive(Clone)]
pub struct ChatState {
    relay: Arc<Relay>,
    hub: Arc<Hub>,
}

impl ChatState {
    pub fn new(settings: RelaySettings) -> Self {
        let hub = Arc::new(Hub::new());
        let relay = Relay::new(Arc::new(Registry::new()), hub.clone(), settings);
        Self::from_parts(relay, hub)
    }

    /// Wraps a relay that was built on top of `hub`.
    pub fn from_parts(relay: Relay, hub: Arc<Hub>) -> Self {
        Self {
            relay: Arc::new(relay),
            hub,
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn open(&self) -> (ConnectionId, Outbox) {
        self.hub.connect()
    }

    pub async fn close(&self, id: &ConnectionId) {
        self.relay.disconnect(id).await;
        self.hub.disconnect(id);
    }

    /// Closes every open connection's outbound queue.
    pub fn shutdown(&self) {
        info!(connections = self.hub.connection_count(), "closing open connections");
        self.hub.close_all();
    }
}
