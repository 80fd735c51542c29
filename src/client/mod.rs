//! Client-side model: snapshot interpolation and a headless session

pub mod interpolation;
pub mod session;

pub use interpolation::{lerp_angle, wrap_angle, WorldView};
pub use session::ClientSession;
