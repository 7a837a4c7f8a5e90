//! Persisted single-slot zone status
//!
//! The in-memory slot is the source of truth for readers. `set` writes the
//! durable copy first and then replaces the slot, so a concurrent `get` sees
//! either the old or the new value, never a mix.
//!
//! Setters are serialized by their own mutex, held across the durable write.
//! The slot's write lock is only taken for the replace itself, so `get` never
//! waits on disk I/O.

use crate::domain::{GeoResult, ZoneState};
use crate::io::persistence::{Persistence, KEY_LIVE_STATUS};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info};

pub struct StatusStore {
    persistence: Arc<dyn Persistence>,
    slot: RwLock<ZoneState>,
    /// Orders durable writes with slot replaces across concurrent setters
    writer: Mutex<()>,
}

impl StatusStore {
    /// Open the store, seeding the slot from the last persisted value
    pub fn open(persistence: Arc<dyn Persistence>) -> Self {
        let initial: ZoneState = persistence
            .get_string(KEY_LIVE_STATUS, ZoneState::Unknown.as_str())
            .parse()
            .unwrap_or_default();
        info!(status = %initial, "status_restored");
        Self { persistence, slot: RwLock::new(initial), writer: Mutex::new(()) }
    }

    /// Current status, UNKNOWN if never set
    #[inline]
    pub fn get(&self) -> ZoneState {
        *self.slot.read()
    }

    /// Replace the status
    ///
    /// The in-memory value is always replaced, so readers see the newest
    /// determination even if the durable write fails; that failure is returned.
    pub fn set(&self, state: ZoneState) -> GeoResult<()> {
        let _writer = self.writer.lock();
        let durable = self.persistence.set_string(KEY_LIVE_STATUS, state.as_str());
        *self.slot.write() = state;
        debug!(status = %state, durable = %durable.is_ok(), "status_set");
        durable
    }
}
