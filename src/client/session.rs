//! Headless client: the browser client's model without rendering
//!
//! The session is transport agnostic. Feed it every frame the server sends
//! with [`ClientSession::receive`] and write the frames it returns back to
//! the server.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::game::physics::keys;
use crate::ws::clients::ClientId;
use crate::ws::codec::{Codec, CodecError};
use crate::ws::packet::{frame, ChannelKey, Packet};
use crate::ws::protocol::{
    game, system, ClientInput, Codecs, DeathNotice, Identify, KillNotice, Leaderboard,
    StateUpdate, STATE_KEY, WELCOME_KEY,
};
use crate::ws::resolver::Resolver;

use super::interpolation::{Sample, WorldView};

/// Most samples buffered between two snapshots
const MAX_PENDING_SAMPLES: usize = 16;

/// Client-side state the packet handlers work on
pub struct ClientWorld {
    pub codecs: Codecs,
    pub name: String,
    /// Assigned by the server's welcome
    pub id: Option<ClientId>,
    pub view: WorldView,
    /// Last snapshot as received
    pub latest: Option<StateUpdate>,
    pub deaths: Vec<DeathNotice>,
    pub kills: Vec<KillNotice>,
    pub leaderboard: Option<Leaderboard>,
    /// Direction keys currently held
    held: u8,
    /// Key samples since the last reply
    pending: Vec<u32>,
    aim: f32,
    shoot: bool,
    outbox: Vec<Bytes>,
}

fn queue<T>(outbox: &mut Vec<Bytes>, codec: &Codec<T>, key: ChannelKey, value: &T)
where
    T: Serialize + DeserializeOwned,
{
    match frame(codec, key, value) {
        Ok(data) => outbox.push(data),
        Err(e) => warn!(key = %key, error = %e, "Failed to encode client message"),
    }
}

impl ClientWorld {
    /// Reply to a snapshot with the input gathered since the last one
    fn reply_input(&mut self) {
        let mut input = std::mem::take(&mut self.pending);
        if input.is_empty() {
            input.push(u32::from(self.held));
        }
        let reply = ClientInput {
            input,
            angle: self.aim,
            shoot: self.shoot,
        };
        queue(&mut self.outbox, &self.codecs.input, STATE_KEY, &reply);
    }
}

/// Bind the client's packet handlers
pub fn routes() -> Resolver<ClientWorld> {
    let mut resolver = Resolver::<ClientWorld>::new();

    resolver.on_open(|world: &mut ClientWorld, _| {
        let identify = Identify {
            name: world.name.clone(),
        };
        queue(&mut world.outbox, &world.codecs.identify, WELCOME_KEY, &identify);
    });

    resolver.on_close(|world: &mut ClientWorld, _| {
        world.id = None;
        world.latest = None;
        world.view = WorldView::default();
    });

    resolver.system(&[system::IDENTIFY]).handle(|world, packet| {
        if let Some(welcome) = packet.decode(&world.codecs.welcome) {
            debug!(id = %welcome.id, "Welcomed");
            world.id = Some(welcome.id);
        }
    });

    resolver.game(&[game::STATE]).handle(|world, packet| {
        let Some(update) = packet.decode(&world.codecs.state) else {
            return;
        };
        world.view.apply(&update);
        world.latest = Some(update);
        world.reply_input();
    });

    resolver.game(&[game::DEATH]).handle(|world, packet| {
        if let Some(notice) = packet.decode(&world.codecs.death) {
            world.deaths.push(notice);
        }
    });

    resolver.game(&[game::KILL]).handle(|world, packet| {
        if let Some(notice) = packet.decode(&world.codecs.kill) {
            world.kills.push(notice);
        }
    });

    resolver.game(&[game::LEADERBOARD]).handle(|world, packet| {
        if let Some(board) = packet.decode(&world.codecs.leaderboard) {
            world.leaderboard = Some(board);
        }
    });

    resolver
}

pub struct ClientSession {
    resolver: Resolver<ClientWorld>,
    world: ClientWorld,
}

impl ClientSession {
    pub fn new(name: impl Into<String>) -> Result<Self, CodecError> {
        Ok(Self {
            resolver: routes(),
            world: ClientWorld {
                codecs: Codecs::new()?,
                name: name.into(),
                id: None,
                view: WorldView::default(),
                latest: None,
                deaths: Vec::new(),
                kills: Vec::new(),
                leaderboard: None,
                held: 0,
                pending: Vec::new(),
                aim: 0.0,
                shoot: false,
                outbox: Vec::new(),
            },
        })
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    /// Connection established. Returns frames to send.
    pub fn open(&mut self) -> Vec<Bytes> {
        self.resolver.open(&mut self.world, None);
        std::mem::take(&mut self.world.outbox)
    }

    pub fn close(&mut self) {
        self.resolver.close(&mut self.world, None);
    }

    /// Handle one frame from the server. Returns frames to send back.
    pub fn receive(&mut self, data: Bytes) -> Vec<Bytes> {
        if let Some(packet) = Packet::parse(None, data) {
            self.resolver.dispatch(&mut self.world, &packet);
        }
        std::mem::take(&mut self.world.outbox)
    }

    /// Replace the set of held direction keys
    pub fn hold(&mut self, held: u8) {
        self.world.held = held & keys::MASK;
    }

    pub fn aim(&mut self, angle: f32) {
        self.world.aim = angle;
    }

    pub fn shoot(&mut self, shoot: bool) {
        self.world.shoot = shoot;
    }

    /// One render frame: sample the held keys and advance interpolation
    pub fn frame(&mut self, dt: f32) {
        if self.world.pending.len() < MAX_PENDING_SAMPLES {
            self.world.pending.push(u32::from(self.world.held));
        }
        self.world.view.advance(dt);
    }

    /// Own tank as currently displayed
    pub fn own(&self) -> Option<Sample> {
        self.world.id.and_then(|id| self.world.view.tank(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{TankState, Welcome, DEATH_KEY, KILL_KEY};

    fn server_codecs() -> Codecs {
        Codecs::new().unwrap()
    }

    #[test]
    fn test_open_sends_identify() {
        let mut session = ClientSession::new("Ann").unwrap();
        let frames = session.open();
        assert_eq!(frames.len(), 1);

        let packet = Packet::parse(Some(ClientId(1)), frames[0].clone()).unwrap();
        assert_eq!(packet.key, WELCOME_KEY);
        assert_eq!(packet.decode(&server_codecs().identify).unwrap().name, "Ann");
    }

    #[test]
    fn test_snapshot_answered_with_samples() {
        let codecs = server_codecs();
        let mut session = ClientSession::new("Ann").unwrap();
        session.open();

        let welcome = frame(&codecs.welcome, WELCOME_KEY, &Welcome { id: ClientId(3) }).unwrap();
        assert!(session.receive(welcome).is_empty());
        assert_eq!(session.world().id, Some(ClientId(3)));

        session.hold(keys::LEFT);
        session.frame(0.016);
        session.hold(keys::LEFT | keys::UP);
        session.frame(0.016);
        session.aim(1.25);
        session.shoot(true);

        let update = StateUpdate {
            user: TankState {
                id: ClientId(3),
                health: 1.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let replies = session.receive(frame(&codecs.state, STATE_KEY, &update).unwrap());
        assert_eq!(replies.len(), 1);

        let packet = Packet::parse(Some(ClientId(3)), replies[0].clone()).unwrap();
        let input = packet.decode(&codecs.input).unwrap();
        assert_eq!(input.input, vec![1, 5]);
        assert_eq!(input.angle, 1.25);
        assert!(input.shoot);
        assert!(session.own().is_some());

        // Nothing sampled since: the held keys are reported once
        let replies = session.receive(frame(&codecs.state, STATE_KEY, &update).unwrap());
        let input = Packet::parse(None, replies[0].clone())
            .unwrap()
            .decode(&codecs.input)
            .unwrap();
        assert_eq!(input.input, vec![5]);
    }

    #[test]
    fn test_notices_recorded() {
        let codecs = server_codecs();
        let mut session = ClientSession::new("Ann").unwrap();

        let death = DeathNotice { by: "Bob".into() };
        session.receive(frame(&codecs.death, DEATH_KEY, &death).unwrap());
        // Wrong shape on the kill channel is ignored
        session.receive(frame(&codecs.death, KILL_KEY, &death).unwrap());

        assert_eq!(session.world().deaths, vec![death]);
        assert!(session.world().kills.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_then_move_left() {
        use crate::config::ArenaConfig;
        use crate::game::{GameServer, TransportEvent};
        use tokio::sync::mpsc;

        let (server, handle) = GameServer::new(ArenaConfig::default(), 11).unwrap();
        let server_task = tokio::spawn(server.run());
        let events = handle.events().clone();
        let client = ClientId(1);

        let (outbound, mut inbound) = mpsc::channel(64);
        events
            .send(TransportEvent::Connected { client, outbound })
            .await
            .unwrap();

        let mut session = ClientSession::new("Ann").unwrap();
        for data in session.open() {
            events
                .send(TransportEvent::Message { client, data })
                .await
                .unwrap();
        }

        // Wait for a snapshot that carries the chosen name
        let mut named = false;
        for _ in 0..10 {
            let data = inbound.recv().await.unwrap();
            for data in session.receive(data) {
                events
                    .send(TransportEvent::Message { client, data })
                    .await
                    .unwrap();
            }
            if let Some(update) = &session.world().latest {
                if update.user.name == "Ann" {
                    named = true;
                    break;
                }
            }
        }
        assert!(named);
        assert_eq!(session.world().id, Some(client));

        // Hold left: x shrinks every tick until the wall stops it
        session.hold(keys::LEFT);
        let bound = ArenaConfig::default().bound();
        let mut xs = Vec::new();
        while xs.len() < 120 {
            let data = inbound.recv().await.unwrap();
            let is_state = ChannelKey::read(&data) == Some(STATE_KEY);
            session.frame(0.05);
            for data in session.receive(data) {
                events
                    .send(TransportEvent::Message { client, data })
                    .await
                    .unwrap();
            }
            if let (true, Some(update)) = (is_state, &session.world().latest) {
                xs.push(update.user.position.x);
            }
        }

        let moving: Vec<f32> = xs
            .iter()
            .copied()
            .skip_while(|x| *x == xs[0])
            .take_while(|x| *x > -bound)
            .collect();
        assert!(moving.len() > 5);
        assert!(moving.windows(2).all(|pair| pair[1] < pair[0]));
        assert_eq!(*xs.last().unwrap(), -bound);

        handle.stop();
        server_task.await.unwrap();
    }
}
