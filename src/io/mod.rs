//! IO modules - external system interfaces
//!
//! This module contains the platform-facing collaborators:
//! - `location` - Location sources (programmatic channel, route replay)
//! - `persistence` - Key-value persistence (in memory, JSON file)
//! - `actions` - ActionSink for emergency actions and its logging implementation
//! - `notifier` - Status notifications fed from the AlertBus

pub mod actions;
pub mod location;
pub mod notifier;
pub mod persistence;

// Re-export commonly used types
pub use actions::{ActionError, ActionSink, LoggingActionSink};
pub use location::{ChannelLocationSource, LocationSource, ReplayLocationSource};
pub use notifier::{alert_message, spawn_notifier, status_message};
pub use persistence::{FilePersistence, MemoryPersistence, Persistence};
