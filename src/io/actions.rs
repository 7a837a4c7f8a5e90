//! Emergency action sink
//!
//! SMS, dialing and navigation are platform side effects. The core only
//! selects which action to run; an `ActionSink` performs it. The payload
//! helpers here build exactly what the phone-side sink sends.

use crate::domain::Position;
use crate::io::location::LocationSource;
use crate::services::profile::ProfileStore;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Failure reported by an action sink
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{reason}")]
pub struct ActionError {
    pub reason: String,
}

impl ActionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Performs the side effects behind each voice intent
///
/// Each call is a single attempt; the caller never retries.
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Text the emergency contact with the current location and open directions home
    async fn go_home(&self) -> Result<(), ActionError>;
    /// Dial the emergency contact
    async fn call_for_help(&self) -> Result<(), ActionError>;
    /// Tell the user the phrase was not understood
    async fn announce_unrecognized(&self) -> Result<(), ActionError>;
}

/// SMS body sent to the emergency contact when the user is lost
pub fn lost_sms_body(position: &Position) -> String {
    format!("I am LOST: https://maps.google.com/?q={},{}", position.latitude, position.longitude)
}

/// Navigation URL from the current location to `address`
pub fn directions_url(address: &str) -> String {
    format!(
        "https://www.google.com/maps/dir/?api=1&destination={}",
        urlencoding::encode(address)
    )
}

/// Dial URI for a phone number
pub fn dial_uri(number: &str) -> String {
    format!("tel:{}", number)
}

/// Reference sink that logs the payloads it would hand to the platform
///
/// Resolves the emergency profile and last known position on every call, so
/// profile edits take effect without rebuilding the sink.
pub struct LoggingActionSink {
    profile: ProfileStore,
    location: Arc<dyn LocationSource>,
}

impl LoggingActionSink {
    pub fn new(profile: ProfileStore, location: Arc<dyn LocationSource>) -> Self {
        Self { profile, location }
    }

    fn contact(&self) -> Result<String, ActionError> {
        self.profile
            .load()
            .map(|p| p.emergency_contact)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ActionError::new("no emergency contact saved"))
    }
}

#[async_trait]
impl ActionSink for LoggingActionSink {
    async fn go_home(&self) -> Result<(), ActionError> {
        let contact = self.contact()?;
        let address = self
            .profile
            .load()
            .map(|p| p.home_address)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ActionError::new("no home address saved"))?;
        let position = self
            .location
            .last_known()
            .ok_or_else(|| ActionError::new("current location unknown"))?;

        info!(to = %contact, body = %lost_sms_body(&position), "sms_sent");
        info!(url = %directions_url(&address), "navigation_opened");
        Ok(())
    }

    async fn call_for_help(&self) -> Result<(), ActionError> {
        let contact = self.contact()?;
        warn!(uri = %dial_uri(&contact), "emergency_call_placed");
        Ok(())
    }

    async fn announce_unrecognized(&self) -> Result<(), ActionError> {
        info!("command_not_understood");
        Ok(())
    }
}
