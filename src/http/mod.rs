//! HTTP surface: health check and the WebSocket endpoint

mod routes;

pub use routes::{build_router, AppError};
