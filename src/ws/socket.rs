//! Server-side socket: live clients plus their outbound links

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::clients::{ClientId, Clients, Selection};

/// Per-connection outbound queue, drained by the connection's writer task
pub type Outbound = mpsc::Sender<Bytes>;

#[derive(Default)]
pub struct Socket {
    clients: Clients,
    links: HashMap<ClientId, Outbound>,
}

impl Socket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly connected client
    pub fn attach(&mut self, client: ClientId, link: Outbound) -> bool {
        self.links.insert(client, link);
        self.clients.connect(client)
    }

    /// Forget a disconnected client
    pub fn detach(&mut self, client: ClientId) -> bool {
        self.links.remove(&client);
        self.clients.disconnect(client)
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    /// Start a send of one encoded frame. Pick recipients on the result.
    pub fn send(&self, data: Bytes) -> SendSelector<'_> {
        SendSelector { socket: self, data }
    }

    fn deliver(&self, client: ClientId, data: Bytes) -> bool {
        let Some(link) = self.links.get(&client) else {
            return false;
        };

        match link.try_send(data) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(client = %client, "Outbound queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(client = %client, "Outbound queue closed");
                false
            }
        }
    }
}

/// Recipient binder returned by [`Socket::send`]
#[must_use = "a send does nothing until recipients are chosen"]
pub struct SendSelector<'s> {
    socket: &'s Socket,
    data: Bytes,
}

impl SendSelector<'_> {
    /// Send to the live clients picked by `selection`. Returns how many
    /// frames were queued.
    pub fn to<'a>(self, selection: impl Into<Selection<'a>>) -> usize {
        let targets = self.socket.clients.select(selection);
        self.deliver_all(targets)
    }

    /// Send to every live client
    pub fn all(self) -> usize {
        let targets: Vec<ClientId> = self.socket.clients.iter().collect();
        self.deliver_all(targets)
    }

    fn deliver_all(self, targets: Vec<ClientId>) -> usize {
        targets
            .into_iter()
            .filter(|client| self.socket.deliver(*client, self.data.clone()))
            .count()
    }
}
