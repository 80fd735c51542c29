//! Combat system - bullets, cooldowns, damage

use crate::config::ArenaConfig;
use crate::ws::clients::ClientId;
use crate::ws::protocol::BulletState;

use super::physics::PhysicsSystem;
use super::vector::Vec2;

/// Health a tank is pinned to once it dies
pub const DEAD_HEALTH: f32 = -1.0;

/// Weapon stats shared by every tank
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: f32,
    pub bullet_speed: f32,
    /// Cooldown between shots (seconds)
    pub cooldown: f32,
    /// Bullet lifetime (seconds)
    pub lifetime: f32,
    /// Spawn distance in front of the tank centre
    pub muzzle_offset: f32,
    /// Speed pushed back onto the shooter
    pub recoil: f32,
    /// Tank/bullet centre distance that counts as a hit
    pub hit_radius: f32,
    /// Fraction of bullet velocity transferred on hit
    pub hit_impulse: f32,
}

impl WeaponStats {
    pub fn from_config(config: &ArenaConfig) -> Self {
        Self {
            damage: config.bullet_damage,
            bullet_speed: config.bullet_speed,
            cooldown: config.fire_cooldown,
            lifetime: config.bullet_lifetime,
            muzzle_offset: config.muzzle_offset,
            recoil: config.recoil,
            hit_radius: config.hit_radius,
            hit_impulse: config.hit_impulse,
        }
    }
}

/// Bullet in flight
#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    /// Unique for the lifetime of the arena, never reused
    pub id: u64,
    pub owner: ClientId,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Seconds since spawn
    pub age: f32,
    /// Set on hit; the bullet is shown frozen once and removed after the tick
    pub spent: bool,
}

impl Bullet {
    /// Spawn at the muzzle of a tank at `origin` aiming along `angle`
    pub fn fire(id: u64, owner: ClientId, origin: Vec2, angle: f32, stats: &WeaponStats) -> Self {
        Self {
            id,
            owner,
            position: origin + Vec2::polar(angle, stats.muzzle_offset),
            velocity: Vec2::polar(angle, stats.bullet_speed),
            age: 0.0,
            spent: false,
        }
    }

    /// Age the bullet, returns false once it outlived `lifetime`
    pub fn age(&mut self, dt: f32, lifetime: f32) -> bool {
        self.age += dt;
        self.age <= lifetime
    }

    pub fn advance(&mut self, dt: f32) {
        self.position += self.velocity * dt;
    }

    /// Check collision with a tank centre
    pub fn hits(&self, target: Vec2, stats: &WeaponStats) -> bool {
        PhysicsSystem::within(self.position, target, stats.hit_radius)
    }

    /// Stop the bullet where it hit and mark it for removal
    pub fn freeze(&mut self) {
        self.velocity = Vec2::ZERO;
        self.spent = true;
    }

    pub fn state(&self) -> BulletState {
        BulletState {
            id: self.id,
            position: self.position,
            velocity: self.velocity,
        }
    }
}

/// Combat system for managing weapons and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Check if a tank can fire (cooldown check)
    pub fn can_fire(cooldown: f32) -> bool {
        cooldown <= 0.0
    }

    /// Update weapon cooldown
    pub fn update_cooldown(cooldown: f32, dt: f32) -> f32 {
        (cooldown - dt).max(0.0)
    }

    /// Velocity change on the shooter when firing along `angle`
    pub fn recoil(angle: f32, stats: &WeaponStats) -> Vec2 {
        -Vec2::polar(angle, stats.recoil)
    }

    /// Velocity change on a tank hit by `bullet`
    pub fn impulse(bullet: &Bullet, stats: &WeaponStats) -> Vec2 {
        bullet.velocity * stats.hit_impulse
    }

    /// Apply damage to health, returns (new_health, killed).
    ///
    /// `killed` is only true on the hit that takes health to zero or below;
    /// the health is then pinned to [`DEAD_HEALTH`]. Dead tanks take no
    /// further damage.
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        if current_health <= 0.0 {
            return (current_health, false);
        }
        let new_health = current_health - damage;
        if new_health <= 0.0 {
            (DEAD_HEALTH, true)
        } else {
            (new_health, false)
        }
    }
}

/// Hit result from combat resolution
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub bullet_id: u64,
    pub shooter: ClientId,
    pub target: ClientId,
    pub target_killed: bool,
}
