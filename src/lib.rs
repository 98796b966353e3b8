pub mod backoff;
pub mod config;
pub mod deck;
pub mod error;
pub mod host;
pub mod model;
pub mod render;
pub mod session;
