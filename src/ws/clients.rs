//! Live client registry and send addressing

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection identifier assigned by the transport. Unique for the life of
/// the process.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Send target
pub enum Selection<'a> {
    One(ClientId),
    Many(&'a [ClientId]),
    /// Every live client for which the predicate returns `true`
    Where(&'a dyn Fn(ClientId) -> bool),
}

impl From<ClientId> for Selection<'_> {
    fn from(client: ClientId) -> Self {
        Self::One(client)
    }
}

impl<'a> From<&'a [ClientId]> for Selection<'a> {
    fn from(clients: &'a [ClientId]) -> Self {
        Self::Many(clients)
    }
}

/// Set of currently connected clients
#[derive(Debug, Default)]
pub struct Clients {
    live: BTreeSet<ClientId>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the client was already registered
    pub fn connect(&mut self, client: ClientId) -> bool {
        self.live.insert(client)
    }

    /// Returns `false` if the client was not registered
    pub fn disconnect(&mut self, client: ClientId) -> bool {
        self.live.remove(&client)
    }

    pub fn contains(&self, client: ClientId) -> bool {
        self.live.contains(&client)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.live.iter().copied()
    }

    /// Resolve a selection against current membership. Every returned id is
    /// live and appears once.
    pub fn select<'a>(&self, selection: impl Into<Selection<'a>>) -> Vec<ClientId> {
        match selection.into() {
            Selection::One(client) => {
                if self.contains(client) {
                    vec![client]
                } else {
                    Vec::new()
                }
            }
            Selection::Many(clients) => {
                let mut seen = BTreeSet::new();
                clients
                    .iter()
                    .copied()
                    .filter(|client| self.contains(*client) && seen.insert(*client))
                    .collect()
            }
            Selection::Where(predicate) => self.iter().filter(|c| predicate(*c)).collect(),
        }
    }

    /// True if every listed client is live
    pub fn exist(&self, clients: &[ClientId]) -> bool {
        clients.iter().all(|client| self.contains(*client))
    }
}
