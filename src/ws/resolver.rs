//! Dispatch registry: (main, sub) channel -> handler
//!
//! A resolver holds at most one handler per exact channel key. Registering a
//! key again replaces the previous handler, so two features binding the same
//! sub-channel silently override each other (last registration wins).
//! Lookups are exact; there is no wildcard or fallback handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use super::clients::ClientId;
use super::packet::{ChannelKey, Packet};
use super::protocol::channel;

/// Packet handler. Receives the context it was dispatched with.
pub type Handler<C> = Arc<dyn Fn(&mut C, &Packet) + Send + Sync>;

/// Connection lifecycle listener. Receives the affected client when the
/// resolver runs on the server side.
pub type Listener<C> = Box<dyn Fn(&mut C, Option<ClientId>) + Send + Sync>;

pub struct Resolver<C> {
    handlers: BTreeMap<ChannelKey, Handler<C>>,
    open: Option<Listener<C>>,
    close: Option<Listener<C>>,
}

impl<C> Default for Resolver<C> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
            open: None,
            close: None,
        }
    }
}

impl<C> Resolver<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to every `(main, sub)` pair, replacing existing bindings
    pub fn register<F>(&mut self, main: u8, subs: &[u16], handler: F)
    where
        F: Fn(&mut C, &Packet) + Send + Sync + 'static,
    {
        let handler: Handler<C> = Arc::new(handler);
        for sub in subs {
            self.handlers
                .insert(ChannelKey::new(main, *sub), Arc::clone(&handler));
        }
    }

    /// Remove bindings. Unknown keys are ignored.
    pub fn unregister(&mut self, main: u8, subs: &[u16]) {
        for sub in subs {
            self.handlers.remove(&ChannelKey::new(main, *sub));
        }
    }

    pub fn is_registered(&self, key: ChannelKey) -> bool {
        self.handlers.contains_key(&key)
    }

    /// Invoke the handler bound to the packet's key. Returns whether one ran.
    pub fn dispatch(&self, context: &mut C, packet: &Packet) -> bool {
        match self.handlers.get(&packet.key) {
            Some(handler) => {
                handler(context, packet);
                true
            }
            None => {
                trace!(key = %packet.key, "No handler for packet");
                false
            }
        }
    }

    pub fn system<'r>(&'r mut self, subs: &'r [u16]) -> Binder<'r, C> {
        Binder::new(self, channel::SYSTEM, subs)
    }

    pub fn game<'r>(&'r mut self, subs: &'r [u16]) -> Binder<'r, C> {
        Binder::new(self, channel::GAME, subs)
    }

    pub fn debug<'r>(&'r mut self, subs: &'r [u16]) -> Binder<'r, C> {
        Binder::new(self, channel::DEBUG, subs)
    }

    /// Set the single connection-open listener
    pub fn on_open<F>(&mut self, listener: F)
    where
        F: Fn(&mut C, Option<ClientId>) + Send + Sync + 'static,
    {
        self.open = Some(Box::new(listener));
    }

    /// Set the single connection-close listener
    pub fn on_close<F>(&mut self, listener: F)
    where
        F: Fn(&mut C, Option<ClientId>) + Send + Sync + 'static,
    {
        self.close = Some(Box::new(listener));
    }

    pub fn ignore_open(&mut self) {
        self.open = None;
    }

    pub fn ignore_close(&mut self) {
        self.close = None;
    }

    pub fn open(&self, context: &mut C, client: Option<ClientId>) {
        if let Some(listener) = &self.open {
            listener(context, client);
        }
    }

    pub fn close(&self, context: &mut C, client: Option<ClientId>) {
        if let Some(listener) = &self.close {
            listener(context, client);
        }
    }
}

/// Pending binding of one main channel and a set of sub-channels
pub struct Binder<'r, C> {
    resolver: &'r mut Resolver<C>,
    main: u8,
    subs: &'r [u16],
}

impl<'r, C> Binder<'r, C> {
    fn new(resolver: &'r mut Resolver<C>, main: u8, subs: &'r [u16]) -> Self {
        Self {
            resolver,
            main,
            subs,
        }
    }

    pub fn handle<F>(self, handler: F)
    where
        F: Fn(&mut C, &Packet) + Send + Sync + 'static,
    {
        self.resolver.register(self.main, self.subs, handler);
    }

    pub fn ignore(self) {
        self.resolver.unregister(self.main, self.subs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[derive(Default)]
    struct Log {
        calls: Vec<(&'static str, ChannelKey)>,
        opened: Vec<Option<ClientId>>,
        closed: Vec<Option<ClientId>>,
    }

    fn packet(main: u8, sub: u16) -> Packet {
        let header = ChannelKey::new(main, sub).header().to_be_bytes();
        Packet::parse(Some(ClientId(1)), Bytes::copy_from_slice(&header)).unwrap()
    }

    #[test]
    fn test_dispatch_is_exact() {
        let mut resolver = Resolver::<Log>::new();
        resolver.register(1, &[5], |log, p| log.calls.push(("a", p.key)));

        let mut log = Log::default();
        assert!(resolver.dispatch(&mut log, &packet(1, 5)));
        assert!(!resolver.dispatch(&mut log, &packet(1, 6)));
        assert!(!resolver.dispatch(&mut log, &packet(2, 5)));
        assert_eq!(log.calls, vec![("a", ChannelKey::new(1, 5))]);
    }

    #[test]
    fn test_unregister_stops_dispatch() {
        let mut resolver = Resolver::<Log>::new();
        resolver.register(1, &[5, 6], |log, p| log.calls.push(("a", p.key)));
        resolver.unregister(1, &[5]);
        resolver.unregister(3, &[9]);

        let mut log = Log::default();
        assert!(!resolver.dispatch(&mut log, &packet(1, 5)));
        assert!(resolver.dispatch(&mut log, &packet(1, 6)));
        assert_eq!(log.calls.len(), 1);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut resolver = Resolver::<Log>::new();
        resolver.game(&[1]).handle(|log, p| log.calls.push(("first", p.key)));
        resolver.game(&[1]).handle(|log, p| log.calls.push(("second", p.key)));

        let mut log = Log::default();
        resolver.dispatch(&mut log, &packet(channel::GAME, 1));
        assert_eq!(log.calls, vec![("second", ChannelKey::new(1, 1))]);
    }

    #[test]
    fn test_binder_channels() {
        let mut resolver = Resolver::<Log>::new();
        resolver.system(&[0]).handle(|log, p| log.calls.push(("sys", p.key)));
        resolver.debug(&[0, 1]).handle(|log, p| log.calls.push(("dbg", p.key)));
        resolver.debug(&[1]).ignore();

        assert!(resolver.is_registered(ChannelKey::new(0, 0)));
        assert!(resolver.is_registered(ChannelKey::new(2, 0)));
        assert!(!resolver.is_registered(ChannelKey::new(2, 1)));
    }

    #[test]
    fn test_lifecycle_listeners() {
        let mut resolver = Resolver::<Log>::new();
        let mut log = Log::default();

        // No listener bound: nothing happens
        resolver.open(&mut log, Some(ClientId(1)));

        resolver.on_open(|log, client| log.opened.push(client));
        resolver.on_close(|log, client| log.closed.push(client));
        resolver.open(&mut log, Some(ClientId(2)));
        resolver.close(&mut log, Some(ClientId(2)));

        resolver.ignore_open();
        resolver.ignore_close();
        resolver.open(&mut log, Some(ClientId(3)));
        resolver.close(&mut log, Some(ClientId(3)));

        assert_eq!(log.opened, vec![Some(ClientId(2))]);
        assert_eq!(log.closed, vec![Some(ClientId(2))]);
    }
}
