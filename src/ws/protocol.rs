//! Wire protocol: channel numbers and message records
//! These are the payload types exchanged between browser clients and the server

use serde::{Deserialize, Serialize};

use crate::game::vector::Vec2;

use super::clients::ClientId;
use super::codec::{Codec, CodecError};
use super::packet::ChannelKey;

/// Main channels
pub mod channel {
    /// Connection lifecycle and identification
    pub const SYSTEM: u8 = 0x00;
    /// Simulation traffic
    pub const GAME: u8 = 0x01;
    /// Free-form diagnostics
    pub const DEBUG: u8 = 0x02;
}

/// Sub-channels of [`channel::SYSTEM`]
pub mod system {
    /// Client -> server: identify. Server -> client: welcome.
    pub const IDENTIFY: u16 = 0x00;
}

/// Sub-channels of [`channel::GAME`]
pub mod game {
    pub const IDENTIFY: u16 = 0x00;
    /// Server -> client: snapshot. Client -> server: input reply.
    pub const STATE: u16 = 0x01;
    pub const DEATH: u16 = 0x02;
    pub const KILL: u16 = 0x03;
    pub const LEADERBOARD: u16 = 0x04;
}

/// Sub-channels of [`channel::DEBUG`]
pub mod debug {
    pub const ECHO: u16 = 0x00;
}

pub const WELCOME_KEY: ChannelKey = ChannelKey::new(channel::SYSTEM, system::IDENTIFY);
pub const STATE_KEY: ChannelKey = ChannelKey::new(channel::GAME, game::STATE);
pub const DEATH_KEY: ChannelKey = ChannelKey::new(channel::GAME, game::DEATH);
pub const KILL_KEY: ChannelKey = ChannelKey::new(channel::GAME, game::KILL);
pub const LEADERBOARD_KEY: ChannelKey = ChannelKey::new(channel::GAME, game::LEADERBOARD);
pub const IDENTIFY_KEY: ChannelKey = ChannelKey::new(channel::GAME, game::IDENTIFY);

/// Client -> server: display name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identify {
    pub name: String,
}

/// Server -> client: assigned tank id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub id: ClientId,
}

/// Client -> server: reply to a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientInput {
    /// Direction bitmask samples, oldest first
    pub input: Vec<u32>,
    /// Aim angle in radians
    pub angle: f32,
    pub shoot: bool,
}

/// Tank as seen by clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TankState {
    pub id: ClientId,
    pub name: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
    /// 1 = full, <= 0 = dead
    pub health: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulletState {
    pub id: u64,
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Server -> client: per-recipient snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// The recipient's own tank
    pub user: TankState,
    /// Every other tank
    pub players: Vec<TankState>,
    pub bullets: Vec<BulletState>,
}

/// Server -> victim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeathNotice {
    /// Killer's name
    pub by: String,
}

/// Server -> killer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KillNotice {
    pub victim: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: ClientId,
    pub name: String,
    pub kills: u32,
}

/// Server -> all: kill ranking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
}

/// One codec per message type, built once at startup
#[derive(Debug, Clone)]
pub struct Codecs {
    pub identify: Codec<Identify>,
    pub welcome: Codec<Welcome>,
    pub input: Codec<ClientInput>,
    pub state: Codec<StateUpdate>,
    pub death: Codec<DeathNotice>,
    pub kill: Codec<KillNotice>,
    pub leaderboard: Codec<Leaderboard>,
}

impl Codecs {
    pub fn new() -> Result<Self, CodecError> {
        Ok(Self {
            identify: Codec::new(&Identify::default())?,
            welcome: Codec::new(&Welcome::default())?,
            input: Codec::new(&ClientInput {
                input: vec![0],
                ..Default::default()
            })?,
            state: Codec::new(&StateUpdate {
                user: TankState::default(),
                players: vec![TankState::default()],
                bullets: vec![BulletState::default()],
            })?,
            death: Codec::new(&DeathNotice::default())?,
            kill: Codec::new(&KillNotice::default())?,
            leaderboard: Codec::new(&Leaderboard {
                entries: vec![LeaderboardEntry::default()],
            })?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::packet::{frame, Packet};
    use bson::doc;

    #[test]
    fn test_state_update_through_frame() {
        let codecs = Codecs::new().unwrap();
        let update = StateUpdate {
            user: TankState {
                id: ClientId(4),
                name: "Ann".into(),
                position: Vec2::new(0.5, -1.0),
                velocity: Vec2::new(0.25, 0.0),
                angle: 1.5,
                health: 0.75,
            },
            players: vec![],
            bullets: vec![BulletState {
                id: 12,
                position: Vec2::new(1.0, 1.0),
                velocity: Vec2::new(-2.5, 0.0),
            }],
        };

        let data = frame(&codecs.state, STATE_KEY, &update).unwrap();
        let packet = Packet::parse(None, data).unwrap();
        assert_eq!(packet.key, STATE_KEY);
        assert_eq!(packet.decode(&codecs.state), Some(update));
    }

    #[test]
    fn test_input_from_browser_document() {
        // Field order and integer widths as a browser encoder writes them
        let codecs = Codecs::new().unwrap();
        let document = doc! { "shoot": true, "angle": 2_i32, "input": [1_i32, 4_i32] };
        let mut bytes = STATE_KEY.header().to_be_bytes().to_vec();
        document.to_writer(&mut bytes).unwrap();

        let packet = Packet::parse(Some(ClientId(1)), bytes.into()).unwrap();
        let input = packet.decode(&codecs.input).unwrap();
        assert_eq!(input.input, vec![1, 4]);
        assert_eq!(input.angle, 2.0);
        assert!(input.shoot);
    }

    #[test]
    fn test_input_rejected_by_state_codec() {
        let codecs = Codecs::new().unwrap();
        let input = ClientInput {
            input: vec![1],
            angle: 0.0,
            shoot: false,
        };
        let data = frame(&codecs.input, STATE_KEY, &input).unwrap();
        let packet = Packet::parse(None, data).unwrap();
        assert!(packet.decode(&codecs.state).is_none());
        assert!(packet.decode(&codecs.identify).is_none());
    }
}
