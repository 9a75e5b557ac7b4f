//! # penstream Core
//!
//! Core types, traits, and utilities for penstream.
//! Provides the data model shared by the loader, the streaming engine and
//! whatever front-end renders machine state: positions, pen state, the
//! position trace, controller events and the error taxonomy.

pub mod core;
pub mod data;
pub mod error;
pub mod trace;
pub mod types;

pub use core::{
    event::{ControllerEvent, EventDispatcher},
    ControllerTrait,
};

pub use data::{
    Command, ConnectionState, MachineState, PenState, Position, SessionId, SessionProgress,
    Snapshot, StreamState,
};

pub use error::{ConnectError, ControllerError, Error, LoadError, Result};

pub use trace::{PositionTrace, TracePoint, DEFAULT_TRACE_EPSILON};

pub use types::{thread_safe, thread_safe_rw, ThreadSafe, ThreadSafeRw};
