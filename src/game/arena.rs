//! Arena state and the authoritative tick step

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::ArenaConfig;
use crate::ws::clients::ClientId;
use crate::ws::protocol::{ClientInput, TankState};

use super::combat::{Bullet, CombatSystem, HitResult, WeaponStats};
use super::physics::PhysicsSystem;
use super::vector::Vec2;
use super::{InputState, INPUT_SUBSTEPS};

/// Name a tank carries until its client identifies
pub const DEFAULT_NAME: &str = "Unnamed";

/// Spawn positions stay inside this share of the arena
const SPAWN_SPREAD: f32 = 0.8;

/// Tank state (authoritative)
#[derive(Debug, Clone)]
pub struct Tank {
    /// Same as the owning client id
    pub id: ClientId,
    pub name: String,

    // Position and movement
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,

    // Combat
    /// 1 = full, pinned to -1 once dead
    pub health: f32,
    pub cooldown: f32,
    pub kills: u32,

    pub input: InputState,
}

impl Tank {
    pub fn new(id: ClientId, position: Vec2, angle: f32) -> Self {
        Self {
            id,
            name: DEFAULT_NAME.to_string(),
            position,
            velocity: Vec2::ZERO,
            angle,
            health: 1.0,
            cooldown: 0.0,
            kills: 0,
            input: InputState {
                angle,
                ..InputState::default()
            },
        }
    }

    pub fn alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn state(&self) -> TankState {
        TankState {
            id: self.id,
            name: self.name.clone(),
            position: self.position,
            velocity: self.velocity,
            angle: self.angle,
            health: self.health,
        }
    }
}

/// Something the network layer has to tell players about
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// `victim` died from a bullet fired by `killer`; `killer` is `None`
    /// when the shooter has since disconnected
    Killed {
        killer: Option<ClientId>,
        victim: ClientId,
    },
}

/// Authoritative simulation state, owned by the game loop
pub struct Arena {
    config: ArenaConfig,
    weapon: WeaponStats,
    tanks: BTreeMap<ClientId, Tank>,
    /// Always sorted by id, new bullets are appended
    bullets: Vec<Bullet>,
    next_bullet_id: u64,
    tick: u64,
    rng: ChaCha8Rng,
}

impl Arena {
    pub fn new(config: ArenaConfig, seed: u64) -> Self {
        Self {
            weapon: WeaponStats::from_config(&config),
            config,
            tanks: BTreeMap::new(),
            bullets: Vec::new(),
            next_bullet_id: 0,
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Completed ticks
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn tank(&self, id: ClientId) -> Option<&Tank> {
        self.tanks.get(&id)
    }

    /// Tanks in ascending id order
    pub fn tanks(&self) -> impl Iterator<Item = &Tank> {
        self.tanks.values()
    }

    pub fn tank_count(&self) -> usize {
        self.tanks.len()
    }

    /// Bullets in ascending id order, including ones frozen this tick
    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    /// Create the tank for a newly connected client at a random spawn point
    pub fn spawn(&mut self, id: ClientId) -> &Tank {
        let spread = self.config.bound() * SPAWN_SPREAD;
        let position = Vec2::new(
            self.rng.gen_range(-spread..=spread),
            self.rng.gen_range(-spread..=spread),
        );
        let angle = self.rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);

        let tank = self
            .tanks
            .entry(id)
            .or_insert_with(|| Tank::new(id, position, angle));

        info!(
            client = %id,
            x = tank.position.x,
            y = tank.position.y,
            "Tank spawned"
        );
        tank
    }

    /// Remove a disconnected client's tank. Its bullets keep flying.
    pub fn remove(&mut self, id: ClientId) -> Option<Tank> {
        let tank = self.tanks.remove(&id)?;
        info!(client = %id, kills = tank.kills, "Tank removed");
        Some(tank)
    }

    /// Set a display name. Control characters are stripped and the result is
    /// trimmed and truncated; an empty result leaves the name unchanged.
    pub fn rename(&mut self, id: ClientId, raw: &str) -> bool {
        let Some(tank) = self.tanks.get_mut(&id) else {
            return false;
        };

        let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
        let name: String = cleaned
            .trim()
            .chars()
            .take(self.config.max_name_len)
            .collect();
        let name = name.trim_end();
        if name.is_empty() {
            return false;
        }

        debug!(client = %id, name = %name, "Tank renamed");
        tank.name = name.to_string();
        true
    }

    /// Store the latest input of a tank. Malformed input is dropped without
    /// touching state; dead tanks always end up with neutral input.
    pub fn apply_input(&mut self, id: ClientId, msg: &ClientInput) -> bool {
        let Some(tank) = self.tanks.get_mut(&id) else {
            return false;
        };
        let Some(mut input) = InputState::from_client(msg) else {
            debug!(client = %id, samples = msg.input.len(), "Dropped malformed input");
            return false;
        };

        if !tank.alive() {
            input.neutralize();
        }
        tank.input = input;
        true
    }

    /// Advance the simulation by one fixed tick
    pub fn step(&mut self) -> Vec<GameEvent> {
        let dt = self.config.tick_delta();
        self.tick += 1;

        self.update_bullets(dt);
        self.update_weapons(dt);
        self.update_movement(dt);
        self.resolve_hits()
    }

    /// Drop bullets that hit something. Runs after snapshots went out so the
    /// impact point is seen by every client.
    pub fn sweep(&mut self) -> usize {
        let before = self.bullets.len();
        self.bullets.retain(|bullet| !bullet.spent);
        before - self.bullets.len()
    }

    fn update_bullets(&mut self, dt: f32) {
        let lifetime = self.weapon.lifetime;
        self.bullets.retain_mut(|bullet| bullet.age(dt, lifetime));
        for bullet in &mut self.bullets {
            bullet.advance(dt);
        }
    }

    fn update_weapons(&mut self, dt: f32) {
        for tank in self.tanks.values_mut() {
            tank.angle = tank.input.angle;
            tank.cooldown = CombatSystem::update_cooldown(tank.cooldown, dt);

            if tank.alive() && tank.input.shoot && CombatSystem::can_fire(tank.cooldown) {
                let bullet = Bullet::fire(
                    self.next_bullet_id,
                    tank.id,
                    tank.position,
                    tank.angle,
                    &self.weapon,
                );
                self.next_bullet_id += 1;
                self.bullets.push(bullet);

                tank.cooldown = self.weapon.cooldown;
                tank.velocity += CombatSystem::recoil(tank.angle, &self.weapon);
            }
        }
    }

    fn update_movement(&mut self, dt: f32) {
        let sub_dt = dt / INPUT_SUBSTEPS as f32;
        let bound = self.config.bound();

        for tank in self.tanks.values_mut() {
            if !tank.alive() {
                tank.input.neutralize();
            }

            for sample in tank.input.samples {
                let accel = PhysicsSystem::acceleration(sample, self.config.acceleration);
                let (position, velocity) = PhysicsSystem::integrate(
                    tank.position,
                    tank.velocity,
                    accel,
                    sub_dt,
                    self.config.momentum,
                );
                tank.position = PhysicsSystem::clamp_to_arena(position, bound);
                tank.velocity = velocity;
            }
        }
    }

    /// Tanks in ascending id, bullets in spawn order. A bullet hits at most
    /// one tank and never its owner; a tank that died this tick takes no
    /// further hits.
    fn resolve_hits(&mut self) -> Vec<GameEvent> {
        let mut hits: Vec<HitResult> = Vec::new();

        for tank in self.tanks.values_mut() {
            for bullet in self.bullets.iter_mut() {
                if !tank.alive() {
                    break;
                }
                if bullet.spent || bullet.owner == tank.id {
                    continue;
                }
                if !bullet.hits(tank.position, &self.weapon) {
                    continue;
                }

                let (health, killed) = CombatSystem::apply_damage(tank.health, self.weapon.damage);
                tank.health = health;
                tank.velocity += CombatSystem::impulse(bullet, &self.weapon);
                bullet.freeze();

                if killed {
                    tank.input.neutralize();
                }

                hits.push(HitResult {
                    bullet_id: bullet.id,
                    shooter: bullet.owner,
                    target: tank.id,
                    target_killed: killed,
                });
            }
        }

        let mut events = Vec::new();
        for hit in hits {
            debug!(
                tick = self.tick,
                bullet = hit.bullet_id,
                shooter = %hit.shooter,
                target = %hit.target,
                "Bullet hit"
            );
            if !hit.target_killed {
                continue;
            }

            let killer = self.tanks.get_mut(&hit.shooter).map(|shooter| {
                shooter.kills += 1;
                shooter.id
            });
            info!(tick = self.tick, victim = %hit.target, killer = ?killer, "Tank destroyed");
            events.push(GameEvent::Killed {
                killer,
                victim: hit.target,
            });
        }
        events
    }

    #[cfg(test)]
    pub(crate) fn tank_mut(&mut self, id: ClientId) -> Option<&mut Tank> {
        self.tanks.get_mut(&id)
    }

    #[cfg(test)]
    pub(crate) fn insert_bullet(&mut self, owner: ClientId, position: Vec2, velocity: Vec2) -> u64 {
        let id = self.next_bullet_id;
        self.next_bullet_id += 1;
        self.bullets.push(Bullet {
            id,
            owner,
            position,
            velocity,
            age: 0.0,
            spent: false,
        });
        id
    }
}
