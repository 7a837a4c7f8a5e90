//! Emergency profile stored alongside the zone status

use crate::domain::GeoResult;
use crate::io::persistence::{
    Persistence, KEY_EMERGENCY_CONTACT, KEY_HOME_ADDRESS, KEY_NAME, KEY_PROFILE_DONE,
};
use std::sync::Arc;
use tracing::info;

/// Who to call and where home is
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub home_address: String,
    pub emergency_contact: String,
}

/// Reads and writes the profile fields in the shared persistence
#[derive(Clone)]
pub struct ProfileStore {
    persistence: Arc<dyn Persistence>,
}

impl ProfileStore {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Save all fields, then mark the profile complete
    pub fn save(&self, name: &str, home_address: &str, emergency_contact: &str) -> GeoResult<()> {
        self.persistence.set_string(KEY_NAME, name)?;
        self.persistence.set_string(KEY_HOME_ADDRESS, home_address)?;
        self.persistence.set_string(KEY_EMERGENCY_CONTACT, emergency_contact)?;
        self.persistence.set_bool(KEY_PROFILE_DONE, true)?;
        info!(name = %name, "profile_saved");
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.persistence.get_bool(KEY_PROFILE_DONE, false)
    }

    /// `None` until a profile has been saved
    pub fn load(&self) -> Option<Profile> {
        if !self.is_complete() {
            return None;
        }
        Some(Profile {
            name: self.persistence.get_string(KEY_NAME, ""),
            home_address: self.persistence.get_string(KEY_HOME_ADDRESS, ""),
            emergency_contact: self.persistence.get_string(KEY_EMERGENCY_CONTACT, ""),
        })
    }
}
