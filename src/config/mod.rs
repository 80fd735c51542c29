//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, `*` for any
    pub client_origin: String,
    /// Max inbound frames per second per connection
    pub input_rate_limit: u32,
    /// Simulation constants
    pub arena: ArenaConfig,
}

/// Simulation constants
#[derive(Clone, Debug, PartialEq)]
pub struct ArenaConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Arena spans [-half_extent, half_extent] on both axes
    pub half_extent: f32,
    /// Tank collision radius, used for the wall clamp
    pub tank_radius: f32,
    /// Acceleration from a held direction (units/s^2)
    pub acceleration: f32,
    /// Velocity retained after each movement sub-step
    pub momentum: f32,
    /// Seconds between shots
    pub fire_cooldown: f32,
    /// Bullet spawn distance from the tank centre
    pub muzzle_offset: f32,
    pub bullet_speed: f32,
    /// Seconds a bullet lives
    pub bullet_lifetime: f32,
    /// Health removed per hit
    pub bullet_damage: f32,
    /// Tank/bullet centre distance that counts as a hit
    pub hit_radius: f32,
    /// Speed kicked back onto the shooter, opposite the aim
    pub recoil: f32,
    /// Fraction of bullet velocity transferred to the tank it hits
    pub hit_impulse: f32,
    /// Ticks between leaderboard broadcasts
    pub leaderboard_ticks: u32,
    pub max_name_len: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            half_extent: 2.0,
            tank_radius: 0.08,
            acceleration: 6.0,
            momentum: 0.95,
            fire_cooldown: 0.25,
            muzzle_offset: 0.1,
            bullet_speed: 2.5,
            bullet_lifetime: 1.0,
            bullet_damage: 0.24,
            hit_radius: 0.105,
            recoil: 0.4,
            hit_impulse: 0.25,
            leaderboard_ticks: 20,
            max_name_len: 16,
        }
    }
}

impl ArenaConfig {
    /// Fixed simulation step in seconds
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate))
    }

    /// Largest coordinate a tank centre may reach on either axis
    pub fn bound(&self) -> f32 {
        self.half_extent - self.tank_radius
    }

    /// Reject values the simulation cannot run with. NaN fails every check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }
        // A tank must fit inside the walls, otherwise spawn and clamp ranges are empty
        if !(self.half_extent.is_finite() && self.half_extent > self.tank_radius) {
            return Err(ConfigError::Invalid("ARENA_HALF_EXTENT"));
        }
        if !(self.fire_cooldown.is_finite() && self.fire_cooldown >= 0.0) {
            return Err(ConfigError::Invalid("FIRE_COOLDOWN"));
        }
        if !(self.bullet_damage.is_finite() && self.bullet_damage >= 0.0) {
            return Err(ConfigError::Invalid("BULLET_DAMAGE"));
        }
        if !(self.bullet_speed.is_finite() && self.bullet_speed > 0.0) {
            return Err(ConfigError::Invalid("BULLET_SPEED"));
        }
        if !(self.bullet_lifetime.is_finite() && self.bullet_lifetime > 0.0) {
            return Err(ConfigError::Invalid("BULLET_LIFETIME"));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let defaults = ArenaConfig::default();
        let tick_rate: u32 = parse_var("TICK_RATE", defaults.tick_rate)?;

        let arena = ArenaConfig {
            tick_rate,
            half_extent: parse_var("ARENA_HALF_EXTENT", defaults.half_extent)?,
            fire_cooldown: parse_var("FIRE_COOLDOWN", defaults.fire_cooldown)?,
            bullet_speed: parse_var("BULLET_SPEED", defaults.bullet_speed)?,
            bullet_damage: parse_var("BULLET_DAMAGE", defaults.bullet_damage)?,
            bullet_lifetime: parse_var("BULLET_LIFETIME", defaults.bullet_lifetime)?,
            leaderboard_ticks: tick_rate,
            ..defaults
        };
        arena.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            input_rate_limit: parse_var("INPUT_RATE_LIMIT", 120)?,
            arena,
        })
    }
}

/// Read an optional variable; present but unparseable is an error
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let arena = ArenaConfig::default();
        assert_eq!(arena.tick_interval(), Duration::from_millis(50));
        assert!((arena.tick_delta() - 0.05).abs() < 1e-6);
        assert!((arena.bound() - 1.92).abs() < 1e-6);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        // Unique name so parallel tests do not race on the environment
        env::set_var("TANK_ARENA_TEST_GARBAGE", "fast");
        let result: Result<u32, _> = parse_var("TANK_ARENA_TEST_GARBAGE", 1);
        assert!(matches!(result, Err(ConfigError::Invalid("TANK_ARENA_TEST_GARBAGE"))));

        let missing: u32 = parse_var("TANK_ARENA_TEST_MISSING", 7).unwrap();
        assert_eq!(missing, 7);
    }

    #[test]
    fn test_parse_var_trims() {
        env::set_var("TANK_ARENA_TEST_PADDED", " 3.5 ");
        let value: f32 = parse_var("TANK_ARENA_TEST_PADDED", 1.0).unwrap();
        assert_eq!(value, 3.5);
    }

    fn rejected(arena: ArenaConfig) -> &'static str {
        match arena.validate() {
            Err(ConfigError::Invalid(name)) => name,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_arena_smaller_than_tank_rejected() {
        assert!(ArenaConfig::default().validate().is_ok());

        let tiny = ArenaConfig {
            half_extent: 0.05,
            ..Default::default()
        };
        assert_eq!(rejected(tiny), "ARENA_HALF_EXTENT");

        let flush = ArenaConfig {
            half_extent: 0.08,
            ..Default::default()
        };
        assert_eq!(rejected(flush), "ARENA_HALF_EXTENT");

        let nan = ArenaConfig {
            half_extent: f32::NAN,
            ..Default::default()
        };
        assert_eq!(rejected(nan), "ARENA_HALF_EXTENT");
    }

    #[test]
    fn test_weapon_values_must_be_finite_and_non_negative() {
        for damage in [f32::NAN, -0.1, f32::INFINITY] {
            let arena = ArenaConfig {
                bullet_damage: damage,
                ..Default::default()
            };
            assert_eq!(rejected(arena), "BULLET_DAMAGE");
        }
        for cooldown in [f32::NAN, -1.0] {
            let arena = ArenaConfig {
                fire_cooldown: cooldown,
                ..Default::default()
            };
            assert_eq!(rejected(arena), "FIRE_COOLDOWN");
        }

        // Zero is allowed for both
        let free_fire = ArenaConfig {
            fire_cooldown: 0.0,
            bullet_damage: 0.0,
            ..Default::default()
        };
        assert!(free_fire.validate().is_ok());
    }

    #[test]
    fn test_zero_rates_rejected() {
        let stopped = ArenaConfig {
            tick_rate: 0,
            ..Default::default()
        };
        assert_eq!(rejected(stopped), "TICK_RATE");

        let stuck = ArenaConfig {
            bullet_speed: -2.0,
            ..Default::default()
        };
        assert_eq!(rejected(stuck), "BULLET_SPEED");
    }

    #[test]
    fn test_from_env_rejects_tiny_arena() {
        env::set_var("ARENA_HALF_EXTENT", "0.05");
        let result = Config::from_env();
        env::remove_var("ARENA_HALF_EXTENT");
        assert!(matches!(result, Err(ConfigError::Invalid("ARENA_HALF_EXTENT"))));
    }
}
