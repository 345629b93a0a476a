#[cfg(feature = "desktop")]
pub mod camera;
pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod vision;
