//! Services - business logic and state management
//!
//! This module contains the core pipeline:
//! - `sampler` - Latest-value-wins location sampling
//! - `evaluator` - Containment test and per-fence transition detection
//! - `status_store` - Persisted single-slot status
//! - `alert_bus` - Publish/subscribe delivery of transition events
//! - `command_router` - Phrase to intent routing and action dispatch
//! - `profile` - Emergency profile storage
//! - `geofence_service` - Fence lifecycle orchestrator

pub mod alert_bus;
pub mod command_router;
pub mod evaluator;
pub mod geofence_service;
pub mod profile;
pub mod sampler;
pub mod status_store;

// Re-export commonly used types
pub use alert_bus::{AlertBus, SubscriberId, Subscription};
pub use command_router::CommandRouter;
pub use evaluator::GeofenceEvaluator;
pub use geofence_service::GeofenceService;
pub use profile::{Profile, ProfileStore};
pub use sampler::{FixStream, LocationSampler};
pub use status_store::StatusStore;
