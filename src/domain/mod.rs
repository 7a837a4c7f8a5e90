//! Domain models - core types and error taxonomy
//!
//! This module contains the canonical data types used throughout the system:
//! - `Position` - a single timestamped fix
//! - `GeofenceDefinition` - the circular safe zone
//! - `ZoneState` / `TransitionEvent` - containment and its changes
//! - `Intent` - action selected from a voice phrase
//! - `GeoError` - errors surfaced to callers

pub mod error;
pub mod types;

pub use error::{GeoError, GeoResult};
pub use types::{
    epoch_ms, GeofenceDefinition, Intent, Position, Transition, TransitionEvent, ZoneState,
};
