//! penstream Settings Crate
//!
//! Loads, validates and persists the application configuration and turns it
//! into the parameters the link, the engine and the loader take.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, GeometrySettings, StreamingSettings};
pub use error::{SettingsError, SettingsResult};
