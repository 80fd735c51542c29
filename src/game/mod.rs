//! Game simulation modules

pub mod arena;
pub mod combat;
pub mod physics;
pub mod server;
pub mod snapshot;
pub mod vector;

pub use arena::{Arena, GameEvent, Tank};
pub use server::{GameServer, ServerHandle, TransportEvent};

use crate::ws::protocol::ClientInput;

use physics::keys;

/// Movement sub-steps per tick, one input sample each
pub const INPUT_SUBSTEPS: usize = 4;

/// Longer sample lists are treated as malformed
pub const MAX_INPUT_SAMPLES: usize = 16;

/// Latest accepted input of one tank
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    /// Direction bitmask per sub-step
    pub samples: [u8; INPUT_SUBSTEPS],
    /// Aim angle in radians
    pub angle: f32,
    pub shoot: bool,
}

impl InputState {
    /// Validate a client reply.
    ///
    /// Extra samples beyond [`INPUT_SUBSTEPS`] are truncated and short lists
    /// are padded by repeating the last sample. Returns `None` for lists
    /// longer than [`MAX_INPUT_SAMPLES`], out-of-range samples or a
    /// non-finite angle.
    pub fn from_client(msg: &ClientInput) -> Option<Self> {
        if msg.input.len() > MAX_INPUT_SAMPLES || !msg.angle.is_finite() {
            return None;
        }

        let mut samples = [0u8; INPUT_SUBSTEPS];
        let mut last = 0u8;
        for (slot, index) in samples.iter_mut().zip(0..) {
            if let Some(raw) = msg.input.get(index) {
                last = u8::try_from(*raw).ok().filter(|v| (v & !keys::MASK) == 0)?;
            }
            *slot = last;
        }

        // Samples past the used window still have to be in range
        if msg.input.iter().skip(INPUT_SUBSTEPS).any(|raw| *raw > u32::from(keys::MASK)) {
            return None;
        }

        Some(Self {
            samples,
            angle: msg.angle,
            shoot: msg.shoot,
        })
    }

    /// Drop movement and firing, keep the aim
    pub fn neutralize(&mut self) {
        self.samples = [0; INPUT_SUBSTEPS];
        self.shoot = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(samples: &[u32]) -> ClientInput {
        ClientInput {
            input: samples.to_vec(),
            angle: 0.5,
            shoot: true,
        }
    }

    #[test]
    fn test_short_lists_repeat_last_sample() {
        let state = InputState::from_client(&input(&[1, 2])).unwrap();
        assert_eq!(state.samples, [1, 2, 2, 2]);
        assert!(state.shoot);
        assert_eq!(state.angle, 0.5);

        let empty = InputState::from_client(&input(&[])).unwrap();
        assert_eq!(empty.samples, [0, 0, 0, 0]);
    }

    #[test]
    fn test_long_lists_truncate() {
        let state = InputState::from_client(&input(&[1, 2, 4, 8, 1, 1])).unwrap();
        assert_eq!(state.samples, [1, 2, 4, 8]);
    }

    #[test]
    fn test_malformed_input_rejected() {
        assert!(InputState::from_client(&input(&[16])).is_none());
        assert!(InputState::from_client(&input(&[1, 2, 3, 4, 99])).is_none());
        assert!(InputState::from_client(&input(&[1; MAX_INPUT_SAMPLES + 1])).is_none());

        let mut bad_angle = input(&[1]);
        bad_angle.angle = f32::NAN;
        assert!(InputState::from_client(&bad_angle).is_none());
    }

    #[test]
    fn test_neutralize_keeps_aim() {
        let mut state = InputState::from_client(&input(&[1])).unwrap();
        state.neutralize();
        assert_eq!(state.samples, [0; INPUT_SUBSTEPS]);
        assert!(!state.shoot);
        assert_eq!(state.angle, 0.5);
    }
}
