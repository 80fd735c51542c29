//! Snapshot and leaderboard building

use crate::ws::clients::ClientId;
use crate::ws::protocol::{BulletState, Leaderboard, LeaderboardEntry, StateUpdate, TankState};

use super::arena::Arena;

/// Builds per-recipient snapshots and paces leaderboard broadcasts
pub struct SnapshotBuilder {
    /// Ticks since the last leaderboard
    ticks_since_leaderboard: u32,
    /// Leaderboard interval in ticks
    leaderboard_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(leaderboard_interval: u32) -> Self {
        Self {
            ticks_since_leaderboard: 0,
            leaderboard_interval: leaderboard_interval.max(1),
        }
    }

    /// Check if it's time to send a leaderboard
    pub fn should_send_leaderboard(&mut self) -> bool {
        self.ticks_since_leaderboard += 1;
        if self.ticks_since_leaderboard >= self.leaderboard_interval {
            self.ticks_since_leaderboard = 0;
            true
        } else {
            false
        }
    }

    /// Send a leaderboard on the next check (a kill just happened)
    pub fn force_leaderboard(&mut self) {
        self.ticks_since_leaderboard = self.leaderboard_interval;
    }

    /// Tank and bullet states shared by every recipient of this tick
    pub fn frame(arena: &Arena) -> WorldFrame {
        WorldFrame {
            tanks: arena.tanks().map(|tank| tank.state()).collect(),
            bullets: arena.bullets().iter().map(|bullet| bullet.state()).collect(),
        }
    }

    /// Current kill ranking: most kills first, ties by ascending id
    pub fn leaderboard(arena: &Arena) -> Leaderboard {
        let mut entries: Vec<LeaderboardEntry> = arena
            .tanks()
            .map(|tank| LeaderboardEntry {
                id: tank.id,
                name: tank.name.clone(),
                kills: tank.kills,
            })
            .collect();
        entries.sort_by(|a, b| b.kills.cmp(&a.kills).then(a.id.cmp(&b.id)));
        Leaderboard { entries }
    }
}

/// All tank and bullet states of one tick
#[derive(Debug, Clone, Default)]
pub struct WorldFrame {
    /// Ascending id order
    pub tanks: Vec<TankState>,
    pub bullets: Vec<BulletState>,
}

impl WorldFrame {
    /// Snapshot for one client: its own tank plus every other tank.
    /// Returns `None` if the client has no tank.
    pub fn for_recipient(&self, recipient: ClientId) -> Option<StateUpdate> {
        let user = self.tanks.iter().find(|tank| tank.id == recipient)?.clone();
        let players = self
            .tanks
            .iter()
            .filter(|tank| tank.id != recipient)
            .cloned()
            .collect();

        Some(StateUpdate {
            user,
            players,
            bullets: self.bullets.clone(),
        })
    }
}
