//! Application state shared across routes

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::game::ServerHandle;
use crate::ws::clients::ClientId;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Mailbox and stats of the game loop
    pub server: ServerHandle,
    next_client_id: Arc<AtomicU32>,
}

impl AppState {
    pub fn new(config: Config, server: ServerHandle) -> Self {
        Self {
            config: Arc::new(config),
            server,
            next_client_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Allocate an id for a new connection. Ids are not reused, so the
    /// supply runs out instead of wrapping.
    pub fn next_client_id(&self) -> Option<ClientId> {
        self.next_client_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .ok()
            .map(ClientId)
    }
}
