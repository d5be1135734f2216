pub mod auth;
pub mod config;
pub mod pending;
pub mod stats;
pub mod timer;
