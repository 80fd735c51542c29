//! Tank movement: input bitmask to acceleration, integration, arena clamp

use super::vector::Vec2;

/// Direction bits of an input sample
pub mod keys {
    pub const LEFT: u8 = 1 << 0;
    pub const RIGHT: u8 = 1 << 1;
    pub const UP: u8 = 1 << 2;
    pub const DOWN: u8 = 1 << 3;
    pub const MASK: u8 = LEFT | RIGHT | UP | DOWN;
}

/// Physics system for updating tank positions and velocities
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Acceleration for a held-direction bitmask. Diagonals are normalized;
    /// opposing keys cancel.
    pub fn acceleration(sample: u8, magnitude: f32) -> Vec2 {
        let mut direction = Vec2::ZERO;
        if sample & keys::LEFT != 0 {
            direction.x -= 1.0;
        }
        if sample & keys::RIGHT != 0 {
            direction.x += 1.0;
        }
        if sample & keys::UP != 0 {
            direction.y += 1.0;
        }
        if sample & keys::DOWN != 0 {
            direction.y -= 1.0;
        }
        direction.normalize() * magnitude
    }

    /// One movement sub-step. Returns (new_position, new_velocity).
    pub fn integrate(
        position: Vec2,
        velocity: Vec2,
        acceleration: Vec2,
        dt: f32,
        momentum: f32,
    ) -> (Vec2, Vec2) {
        let velocity = velocity + acceleration * dt;
        let position = position + velocity * dt;
        (position, velocity * momentum)
    }

    /// Keep a centre inside [-bound, bound] on both axes
    pub fn clamp_to_arena(position: Vec2, bound: f32) -> Vec2 {
        Vec2::new(
            position.x.clamp(-bound, bound),
            position.y.clamp(-bound, bound),
        )
    }

    /// True if two circles overlap or touch
    pub fn within(a: Vec2, b: Vec2, radius: f32) -> bool {
        (a - b).magnitude_squared() <= radius * radius
    }
}
