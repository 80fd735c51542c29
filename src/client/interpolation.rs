//! Smoothing between authoritative snapshots
//!
//! Every displayed entity keeps a `before` and an `after` sample. A shared
//! fraction moves from 0 to 1 between snapshots; rendering reads the blend.
//! When a snapshot arrives mid-way, the blend at the current fraction
//! becomes the new `before`, so irregular network timing never causes a
//! visible jump.

use std::collections::BTreeMap;
use std::f32::consts::{PI, TAU};

use crate::game::vector::Vec2;
use crate::ws::clients::ClientId;
use crate::ws::protocol::{BulletState, StateUpdate, TankState};

/// Default fraction advance per second, roughly one snapshot every 1/15 s
pub const DEFAULT_RATE: f32 = 15.0;

/// Wrap an angle into (-PI, PI]
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

pub fn lerp(before: f32, after: f32, t: f32) -> f32 {
    (1.0 - t) * before + t * after
}

/// Interpolate along the shorter arc between two angles
pub fn lerp_angle(before: f32, after: f32, t: f32) -> f32 {
    let mut from = wrap_angle(before);
    let mut to = wrap_angle(after);

    if (to - from).abs() > PI {
        // Move the endpoint nearer zero across the seam
        if from.abs() < to.abs() {
            from += TAU.copysign(to);
        } else {
            to += TAU.copysign(from);
        }
    }
    wrap_angle(lerp(from, to, t))
}

/// One authoritative value of an entity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    pub position: Vec2,
    pub angle: f32,
    pub health: f32,
}

impl Sample {
    pub fn blend(before: &Sample, after: &Sample, t: f32) -> Sample {
        Sample {
            position: before.position.lerp(after.position, t),
            angle: lerp_angle(before.angle, after.angle, t),
            health: lerp(before.health, after.health, t),
        }
    }
}

impl From<&TankState> for Sample {
    fn from(tank: &TankState) -> Self {
        Self {
            position: tank.position,
            angle: tank.angle,
            health: tank.health,
        }
    }
}

/// Faces along the velocity. A frozen bullet has none, see [`WorldView::apply`].
impl From<&BulletState> for Sample {
    fn from(bullet: &BulletState) -> Self {
        Self {
            position: bullet.position,
            angle: bullet.velocity.angle(),
            health: 1.0,
        }
    }
}

/// The before/after pair of one entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolated {
    before: Sample,
    after: Sample,
}

impl Interpolated {
    /// First sighting: nothing to animate from
    pub fn new(sample: Sample) -> Self {
        Self {
            before: sample,
            after: sample,
        }
    }

    pub fn value(&self, t: f32) -> Sample {
        Sample::blend(&self.before, &self.after, t)
    }

    /// Start a new segment from wherever the entity is displayed at `t`
    pub fn retarget(&mut self, next: Sample, t: f32) {
        self.before = self.value(t);
        self.after = next;
    }
}

/// Interpolated entities keyed by id
#[derive(Debug, Clone)]
pub struct Tracks<K> {
    entries: BTreeMap<K, Interpolated>,
}

impl<K> Default for Tracks<K> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> Tracks<K> {
    /// Replace the tracked set. Known ids continue from their value at `t`,
    /// new ids start still, ids missing from `items` are dropped.
    pub fn update<I>(&mut self, items: I, t: f32)
    where
        I: IntoIterator<Item = (K, Sample)>,
    {
        let mut previous = std::mem::take(&mut self.entries);
        for (id, sample) in items {
            let entry = match previous.remove(&id) {
                Some(mut known) => {
                    known.retarget(sample, t);
                    known
                }
                None => Interpolated::new(sample),
            };
            self.entries.insert(id, entry);
        }
    }

    /// The sample an entity is heading towards
    pub fn target(&self, id: K) -> Option<Sample> {
        self.entries.get(&id).map(|entry| entry.after)
    }

    pub fn get(&self, id: K, t: f32) -> Option<Sample> {
        self.entries.get(&id).map(|entry| entry.value(t))
    }

    pub fn ids(&self) -> impl Iterator<Item = K> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Client-side picture of the arena
#[derive(Debug, Clone)]
pub struct WorldView {
    /// Progress from the last snapshot towards the next, in [0, 1]
    fraction: f32,
    rate: f32,
    tanks: Tracks<ClientId>,
    bullets: Tracks<u64>,
}

impl Default for WorldView {
    fn default() -> Self {
        Self::new(DEFAULT_RATE)
    }
}

impl WorldView {
    pub fn new(rate: f32) -> Self {
        Self {
            fraction: 0.0,
            rate,
            tanks: Tracks::default(),
            bullets: Tracks::default(),
        }
    }

    pub fn fraction(&self) -> f32 {
        self.fraction
    }

    /// Move the fraction forward by one render frame. Holds at 1.
    pub fn advance(&mut self, dt: f32) {
        self.fraction = (self.fraction + dt * self.rate).min(1.0);
    }

    /// Feed a new authoritative snapshot
    pub fn apply(&mut self, update: &StateUpdate) {
        let t = self.fraction;
        let tanks = std::iter::once(&update.user)
            .chain(update.players.iter())
            .map(|tank| (tank.id, Sample::from(tank)));
        self.tanks.update(tanks, t);

        // A bullet frozen on impact keeps facing the way it flew
        let bullets: Vec<(u64, Sample)> = update
            .bullets
            .iter()
            .map(|bullet| {
                let mut sample = Sample::from(bullet);
                if bullet.velocity == Vec2::ZERO {
                    if let Some(previous) = self.bullets.target(bullet.id) {
                        sample.angle = previous.angle;
                    }
                }
                (bullet.id, sample)
            })
            .collect();
        self.bullets.update(bullets, t);
        self.fraction = 0.0;
    }

    pub fn tank(&self, id: ClientId) -> Option<Sample> {
        self.tanks.get(id, self.fraction)
    }

    pub fn bullet(&self, id: u64) -> Option<Sample> {
        self.bullets.get(id, self.fraction)
    }

    pub fn tanks(&self) -> &Tracks<ClientId> {
        &self.tanks
    }

    pub fn bullets(&self) -> &Tracks<u64> {
        &self.bullets
    }
}
