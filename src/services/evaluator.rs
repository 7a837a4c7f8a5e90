//! Geofence containment and transition detection
//!
//! `classify` is the pure geometric core: haversine distance from the fix to
//! the fence center, INSIDE on the closed disk (distance ≤ radius).
//!
//! `GeofenceEvaluator` keeps the last classified state per fence id and emits a
//! `TransitionEvent` only when the classification changes. The first fix after
//! a reset always transitions out of UNKNOWN. No hysteresis band is applied, so
//! fixes oscillating across the radius produce alternating events.

use crate::domain::{epoch_ms, GeofenceDefinition, Position, TransitionEvent, ZoneState};
use std::collections::HashMap;
use tracing::debug;

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two positions in meters
pub fn haversine_meters(a: &Position, b: &Position) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Clamp guards asin against rounding just above 1.0 for antipodal points
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Classify a fix against a fence
#[inline]
pub fn classify(fix: &Position, fence: &GeofenceDefinition) -> ZoneState {
    if haversine_meters(fix, &fence.center) <= fence.radius_meters {
        ZoneState::Inside
    } else {
        ZoneState::Outside
    }
}

/// Debouncing state machine over classified fixes
#[derive(Debug, Default)]
pub struct GeofenceEvaluator {
    /// Last classified state by fence id
    last_states: HashMap<String, ZoneState>,
}

impl GeofenceEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last recorded state for a fence, UNKNOWN if never evaluated
    pub fn state(&self, fence_id: &str) -> ZoneState {
        self.last_states.get(fence_id).copied().unwrap_or_default()
    }

    /// Classify `fix` and return an event if the state changed
    pub fn evaluate(
        &mut self,
        fix: &Position,
        fence: &GeofenceDefinition,
    ) -> Option<TransitionEvent> {
        let to_state = classify(fix, fence);
        let from_state = self.state(&fence.id);

        if to_state == from_state {
            debug!(fence_id = %fence.id, state = %to_state, "fix_same_state");
            return None;
        }

        self.last_states.insert(fence.id.clone(), to_state);
        Some(TransitionEvent {
            geofence_id: fence.id.clone(),
            from_state,
            to_state,
            position: *fix,
            timestamp: epoch_ms(),
        })
    }

    /// Drop the recorded state for one fence
    pub fn forget(&mut self, fence_id: &str) {
        self.last_states.remove(fence_id);
    }

    /// Drop all recorded state; every fence starts from UNKNOWN again
    pub fn reset(&mut self) {
        self.last_states.clear();
    }
}
