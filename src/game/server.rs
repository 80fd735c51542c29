//! The game loop: one task owning the arena, the socket and the resolver
//!
//! Connection tasks never touch simulation state. They post
//! [`TransportEvent`]s to the loop's mailbox, and the loop applies them
//! between ticks, so handlers and ticks run strictly one after another.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ArenaConfig;
use crate::util::scheduler::{Scheduler, StopHandle};
use crate::util::time::TickBudget;
use crate::ws::clients::{ClientId, Selection};
use crate::ws::codec::{Codec, CodecError};
use crate::ws::packet::{frame, ChannelKey, Packet};
use crate::ws::protocol::{
    debug as debug_channel, game, system, Codecs, DeathNotice, KillNotice, Welcome, DEATH_KEY,
    KILL_KEY, LEADERBOARD_KEY, STATE_KEY, WELCOME_KEY,
};
use crate::ws::resolver::Resolver;
use crate::ws::socket::{Outbound, Socket};

use super::arena::{Arena, GameEvent, DEFAULT_NAME};
use super::snapshot::SnapshotBuilder;

/// Mailbox capacity of the game loop
const EVENT_BUFFER: usize = 1024;

/// What the transport boundary reports
#[derive(Debug)]
pub enum TransportEvent {
    Connected {
        client: ClientId,
        /// Frames pushed here are written to the client's connection
        outbound: Outbound,
    },
    Message {
        client: ClientId,
        data: Bytes,
    },
    Disconnected {
        client: ClientId,
    },
}

/// Counters published after every tick for the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ServerStats {
    pub clients: usize,
    pub tanks: usize,
    pub bullets: usize,
    pub tick: u64,
}

/// Everything packet handlers may touch
pub struct World {
    pub arena: Arena,
    pub socket: Socket,
    pub codecs: Codecs,
}

impl World {
    /// Encode and send one message. Returns how many clients got it.
    pub fn send<'a, T>(
        &self,
        codec: &Codec<T>,
        key: ChannelKey,
        value: &T,
        to: impl Into<Selection<'a>>,
    ) -> usize
    where
        T: Serialize + DeserializeOwned,
    {
        match frame(codec, key, value) {
            Ok(data) => self.socket.send(data).to(to),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode outbound message");
                0
            }
        }
    }

    fn broadcast<T>(&self, codec: &Codec<T>, key: ChannelKey, value: &T) -> usize
    where
        T: Serialize + DeserializeOwned,
    {
        match frame(codec, key, value) {
            Ok(data) => self.socket.send(data).all(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode broadcast");
                0
            }
        }
    }

    /// Send every client its own view of the world
    fn send_snapshots(&self) {
        let world_frame = SnapshotBuilder::frame(&self.arena);
        for client in self.socket.clients().iter() {
            if let Some(update) = world_frame.for_recipient(client) {
                self.send(&self.codecs.state, STATE_KEY, &update, client);
            }
        }
    }

    fn notify(&self, event: &GameEvent) {
        match *event {
            GameEvent::Killed { killer, victim } => {
                let killer_name = killer
                    .and_then(|id| self.arena.tank(id))
                    .map_or(DEFAULT_NAME, |tank| tank.name.as_str());
                let victim_name = self
                    .arena
                    .tank(victim)
                    .map_or(DEFAULT_NAME, |tank| tank.name.as_str());

                self.send(
                    &self.codecs.death,
                    DEATH_KEY,
                    &DeathNotice {
                        by: killer_name.to_string(),
                    },
                    victim,
                );
                if let Some(killer) = killer {
                    self.send(
                        &self.codecs.kill,
                        KILL_KEY,
                        &KillNotice {
                            victim: victim_name.to_string(),
                        },
                        killer,
                    );
                }
            }
        }
    }
}

/// Bind the server's packet handlers
pub fn routes() -> Resolver<World> {
    let mut resolver = Resolver::<World>::new();

    resolver.on_open(on_open);
    resolver.on_close(on_close);
    resolver.system(&[system::IDENTIFY]).handle(on_identify);
    resolver.game(&[game::IDENTIFY]).handle(on_identify);
    resolver.game(&[game::STATE]).handle(on_input);
    resolver.debug(&[debug_channel::ECHO]).handle(on_echo);

    resolver
}

fn on_open(world: &mut World, client: Option<ClientId>) {
    let Some(client) = client else {
        return;
    };
    world.arena.spawn(client);
    world.send(&world.codecs.welcome, WELCOME_KEY, &Welcome { id: client }, client);
}

fn on_close(world: &mut World, client: Option<ClientId>) {
    if let Some(client) = client {
        world.arena.remove(client);
    }
}

fn on_identify(world: &mut World, packet: &Packet) {
    let (Some(client), Some(identify)) = (packet.client, packet.decode(&world.codecs.identify))
    else {
        return;
    };
    if world.arena.rename(client, &identify.name) {
        info!(client = %client, name = %identify.name.trim(), "Client identified");
    }
}

fn on_input(world: &mut World, packet: &Packet) {
    let (Some(client), Some(input)) = (packet.client, packet.decode(&world.codecs.input)) else {
        return;
    };
    world.arena.apply_input(client, &input);
}

fn on_echo(world: &mut World, packet: &Packet) {
    if let Some(client) = packet.client {
        world.socket.send(packet.frame().clone()).to(client);
    }
}

/// Handle to a running game loop
#[derive(Clone)]
pub struct ServerHandle {
    events: mpsc::Sender<TransportEvent>,
    stop: Arc<StopHandle>,
    stats: Arc<RwLock<ServerStats>>,
}

impl ServerHandle {
    /// Mailbox for transport events
    pub fn events(&self) -> &mpsc::Sender<TransportEvent> {
        &self.events
    }

    pub fn stats(&self) -> ServerStats {
        *self.stats.read()
    }

    /// Cancel the pending tick; the loop exits afterwards
    pub fn stop(&self) {
        self.stop.stop();
    }
}

/// The authoritative game server
pub struct GameServer {
    resolver: Resolver<World>,
    world: World,
    snapshots: SnapshotBuilder,
    scheduler: Scheduler,
    events: mpsc::Receiver<TransportEvent>,
    stats: Arc<RwLock<ServerStats>>,
}

impl GameServer {
    pub fn new(config: ArenaConfig, seed: u64) -> Result<(Self, ServerHandle), CodecError> {
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (scheduler, stop) = Scheduler::new(config.tick_interval());
        let stats = Arc::new(RwLock::new(ServerStats::default()));

        let handle = ServerHandle {
            events: events_tx,
            stop: Arc::new(stop),
            stats: stats.clone(),
        };

        let server = Self {
            resolver: routes(),
            snapshots: SnapshotBuilder::new(config.leaderboard_ticks),
            world: World {
                arena: Arena::new(config, seed),
                socket: Socket::new(),
                codecs: Codecs::new()?,
            },
            scheduler,
            events,
            stats,
        };

        Ok((server, handle))
    }

    /// Run until stopped or every handle is dropped
    pub async fn run(mut self) {
        info!(
            tick_rate = self.world.arena.config().tick_rate,
            "Game loop started"
        );

        loop {
            tokio::select! {
                biased;

                ticked = self.scheduler.wait() => {
                    if !ticked {
                        break;
                    }
                    self.scheduler.begin_tick();
                    self.tick();
                    self.scheduler.finish_tick();
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("Event channel closed");
                        break;
                    }
                },
            }
        }

        info!(tick = self.world.arena.tick(), "Game loop stopped");
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { client, outbound } => {
                if !self.world.socket.attach(client, outbound) {
                    warn!(client = %client, "Client id connected twice");
                    return;
                }
                info!(client = %client, clients = self.world.socket.clients().len(), "Client connected");
                self.resolver.open(&mut self.world, Some(client));
            }
            TransportEvent::Message { client, data } => {
                if !self.world.socket.clients().contains(client) {
                    return;
                }
                let Some(packet) = Packet::parse(Some(client), data) else {
                    debug!(client = %client, "Dropped frame shorter than header");
                    return;
                };
                self.resolver.dispatch(&mut self.world, &packet);
            }
            TransportEvent::Disconnected { client } => {
                if self.world.socket.detach(client) {
                    self.resolver.close(&mut self.world, Some(client));
                    info!(client = %client, clients = self.world.socket.clients().len(), "Client disconnected");
                }
            }
        }
    }

    fn tick(&mut self) {
        let budget = TickBudget::start(self.scheduler.clock().interval());

        let events = self.world.arena.step();
        for event in &events {
            self.world.notify(event);
            self.snapshots.force_leaderboard();
        }

        self.world.send_snapshots();

        if self.snapshots.should_send_leaderboard() {
            let leaderboard = SnapshotBuilder::leaderboard(&self.world.arena);
            self.world
                .broadcast(&self.world.codecs.leaderboard, LEADERBOARD_KEY, &leaderboard);
        }

        self.world.arena.sweep();
        self.publish_stats();

        if let Some(over) = budget.overrun() {
            warn!(
                tick = self.world.arena.tick(),
                elapsed_micros = budget.elapsed().as_micros() as u64,
                over_micros = over.as_micros() as u64,
                "Tick took longer than its interval"
            );
        }
    }

    fn publish_stats(&self) {
        *self.stats.write() = ServerStats {
            clients: self.world.socket.clients().len(),
            tanks: self.world.arena.tank_count(),
            bullets: self.world.arena.bullets().len(),
            tick: self.world.arena.tick(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{Identify, StateUpdate, IDENTIFY_KEY};

    fn server() -> GameServer {
        GameServer::new(ArenaConfig::default(), 3).unwrap().0
    }

    fn connect(server: &mut GameServer, id: u32) -> mpsc::Receiver<Bytes> {
        let (outbound, rx) = mpsc::channel(64);
        server.handle_event(TransportEvent::Connected {
            client: ClientId(id),
            outbound,
        });
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Packet> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|data| Packet::parse(None, data))
            .collect()
    }

    #[test]
    fn test_connect_spawns_and_welcomes() {
        let mut server = server();
        let mut rx = connect(&mut server, 5);

        assert!(server.world.arena.tank(ClientId(5)).is_some());
        let packets = drain(&mut rx);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].key, WELCOME_KEY);
        let welcome = packets[0].decode(&server.world.codecs.welcome).unwrap();
        assert_eq!(welcome.id, ClientId(5));
    }

    #[test]
    fn test_identify_on_both_channels() {
        let mut server = server();
        let _rx = connect(&mut server, 1);
        let codec = server.world.codecs.identify.clone();

        for (key, name) in [(WELCOME_KEY, "Ann"), (IDENTIFY_KEY, "Bob")] {
            let data = frame(&codec, key, &Identify { name: name.into() }).unwrap();
            server.handle_event(TransportEvent::Message {
                client: ClientId(1),
                data,
            });
            assert_eq!(server.world.arena.tank(ClientId(1)).unwrap().name, name);
        }
    }

    #[test]
    fn test_tick_sends_each_client_its_own_view() {
        let mut server = server();
        let mut one = connect(&mut server, 1);
        let mut two = connect(&mut server, 2);
        drain(&mut one);
        drain(&mut two);

        server.tick();

        let codec = server.world.codecs.state.clone();
        for (rx, me, other) in [(&mut one, 1, 2), (&mut two, 2, 1)] {
            let packets = drain(rx);
            let update: StateUpdate = packets
                .iter()
                .find(|p| p.key == STATE_KEY)
                .and_then(|p| p.decode(&codec))
                .unwrap();
            assert_eq!(update.user.id, ClientId(me));
            assert_eq!(update.players.len(), 1);
            assert_eq!(update.players[0].id, ClientId(other));
        }
        assert_eq!(server.stats.read().tick, 1);
        assert_eq!(server.stats.read().tanks, 2);
    }

    #[test]
    fn test_kill_notices() {
        let mut server = server();
        let mut one = connect(&mut server, 1);
        let mut two = connect(&mut server, 2);

        let target = server.world.arena.tank(ClientId(2)).unwrap().position;
        server.world.arena.tank_mut(ClientId(2)).unwrap().health = 0.1;
        server.world.arena.rename(ClientId(1), "Ann");
        server.world.arena.rename(ClientId(2), "Bob");
        server
            .world
            .arena
            .insert_bullet(ClientId(1), target, crate::game::vector::Vec2::ZERO);
        drain(&mut one);
        drain(&mut two);

        server.tick();

        let victim = drain(&mut two);
        let death = victim.iter().find(|p| p.key == DEATH_KEY).unwrap();
        assert_eq!(death.decode(&server.world.codecs.death).unwrap().by, "Ann");

        let killer = drain(&mut one);
        let kill = killer.iter().find(|p| p.key == KILL_KEY).unwrap();
        assert_eq!(kill.decode(&server.world.codecs.kill).unwrap().victim, "Bob");
        let board = killer.iter().find(|p| p.key == LEADERBOARD_KEY).unwrap();
        let board = board.decode(&server.world.codecs.leaderboard).unwrap();
        assert_eq!(board.entries[0].id, ClientId(1));
        assert_eq!(board.entries[0].kills, 1);

        // The spent bullet was shown once and is now gone
        assert!(server.world.arena.bullets().is_empty());
    }

    #[test]
    fn test_echo_and_short_frames() {
        let mut server = server();
        let mut rx = connect(&mut server, 1);
        drain(&mut rx);

        let probe = Bytes::from_static(&[0x20, 0x00, 1, 2, 3]);
        server.handle_event(TransportEvent::Message {
            client: ClientId(1),
            data: probe.clone(),
        });
        assert_eq!(rx.try_recv().unwrap(), probe);

        server.handle_event(TransportEvent::Message {
            client: ClientId(1),
            data: Bytes::from_static(&[0x20]),
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_removes_tank() {
        let mut server = server();
        let _rx = connect(&mut server, 1);
        server.handle_event(TransportEvent::Disconnected { client: ClientId(1) });
        assert!(server.world.arena.tank(ClientId(1)).is_none());
        assert!(server.world.socket.clients().is_empty());

        // Messages from a gone client are ignored
        server.handle_event(TransportEvent::Message {
            client: ClientId(1),
            data: Bytes::from_static(&[0x20, 0x00]),
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_handle() {
        let (server, handle) = GameServer::new(ArenaConfig::default(), 1).unwrap();
        let task = tokio::spawn(server.run());

        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        handle.stop();
        task.await.unwrap();
        assert_eq!(handle.stats().tick, 3);
    }
}
