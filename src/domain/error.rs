//! Error taxonomy for the geofence and command pipelines

use thiserror::Error;

/// Result type for core operations.
pub type GeoResult<T> = Result<T, GeoError>;

/// Errors reported to the immediate caller. None of these are fatal to the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// Location, voice or SMS access has not been granted.
    #[error("permission denied: {capability} access not granted")]
    PermissionDenied { capability: String },

    /// Operation needs an active geofence but none is set.
    #[error("no active geofence")]
    NoActiveFence,

    /// An ActionSink call failed. Never retried.
    #[error("action '{action}' failed: {reason}")]
    ActionFailed { action: String, reason: String },

    /// Fence rejected at activation time.
    #[error("malformed geofence definition: {reason}")]
    MalformedFenceDefinition { reason: String },

    /// The location source ended before producing a fix.
    #[error("location source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    /// A durable write failed.
    #[error("persistence failed for '{key}': {reason}")]
    Persistence { key: String, reason: String },
}

impl GeoError {
    pub fn permission_denied(capability: &str) -> Self {
        GeoError::PermissionDenied { capability: capability.to_string() }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        GeoError::MalformedFenceDefinition { reason: reason.into() }
    }

    pub fn persistence(key: &str, reason: impl std::fmt::Display) -> Self {
        GeoError::Persistence { key: key.to_string(), reason: reason.to_string() }
    }

    /// Line shown to the user for this failure
    pub fn status_message(&self) -> String {
        match self {
            GeoError::PermissionDenied { capability } => {
                format!("Permission needed: allow {} access", capability)
            }
            GeoError::NoActiveFence => "No geofence is active".to_string(),
            GeoError::ActionFailed { action, reason } => {
                format!("Could not {}: {}", action.replace('_', " "), reason)
            }
            GeoError::MalformedFenceDefinition { reason } => {
                format!("Geofence not activated: {}", reason)
            }
            GeoError::SourceUnavailable { .. } => "Location unavailable".to_string(),
            GeoError::Persistence { .. } => "Status could not be saved".to_string(),
        }
    }
}
