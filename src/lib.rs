//! # penstream
//!
//! Streams G-code to GRBL-style pen plotters over a serial link.
//!
//! ## Architecture
//!
//! penstream is organized as a workspace with multiple crates:
//!
//! 1. **penstream-core** - Shared data model, events, errors, position trace
//! 2. **penstream-gcode** - Comment stripping, arc linearization, pen estimate
//! 3. **penstream-communication** - Serial link, firmware emulator, status
//!    parsing, acknowledgment-gated streaming engine
//! 4. **penstream-settings** - Persistent TOML/JSON configuration
//! 5. **penstream** - Command-line binary that integrates all crates

pub use penstream_core::{
    Command, ConnectError, ConnectionState, ControllerError, ControllerEvent, ControllerTrait,
    Error, LoadError, MachineState, PenState, Position, PositionTrace, Result, SessionId,
    SessionProgress, Snapshot, StreamState, TracePoint,
};

pub use penstream_gcode::{ArcLinearizer, ArcLinearizerConfig, ProgramLoader};

pub use penstream_communication::{
    list_ports, ConnectionParams, EngineConfig, PlotterController, SerialPortInfo, VirtualDevice,
};

pub use penstream_settings::{Config, SettingsError};

/// Build timestamp set by `build.rs`
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging.
///
/// Honors `RUST_LOG`; defaults to `info`. Log output goes to stderr so it
/// does not interleave with event output on stdout.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
