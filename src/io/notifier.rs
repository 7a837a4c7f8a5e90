//! Status notifications for transition events
//!
//! Stands in for the platform's persistent notification: every transition
//! delivered on the AlertBus is logged on one channel with the state the
//! event reports. The StatusStore value seen at that moment is attached as a
//! separate field.

use crate::domain::{Transition, TransitionEvent, ZoneState};
use crate::services::alert_bus::Subscription;
use crate::services::status_store::StatusStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Channel name attached to every notification
pub const GEOFENCE_ALERT_CHANNEL: &str = "GEOFENCE_ALERT_CHANNEL";

/// User-facing line for a status
pub fn status_message(state: ZoneState) -> &'static str {
    match state {
        ZoneState::Inside => "Patient is INSIDE Safe Zone",
        ZoneState::Outside => "Patient is OUTSIDE Safe Zone",
        ZoneState::Unknown => "Status unknown",
    }
}

/// Line raised for one transition, taken from the event itself
///
/// The store may already hold a newer value when a lagging notifier gets
/// here, so it is only logged alongside.
pub fn alert_message(event: &TransitionEvent) -> &'static str {
    status_message(event.to_state)
}

/// Log every event from `subscription` until it is closed
///
/// Resolves to the number of notifications raised.
pub fn spawn_notifier(mut subscription: Subscription, store: Arc<StatusStore>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut raised = 0;
        while let Some(event) = subscription.recv().await {
            let stored = store.get();
            let message = alert_message(&event);
            match event.kind() {
                Transition::Exit => warn!(
                    channel = GEOFENCE_ALERT_CHANNEL,
                    fence_id = %event.geofence_id,
                    to = %event.to_state,
                    stored_status = %stored,
                    "{}", message
                ),
                Transition::Enter => info!(
                    channel = GEOFENCE_ALERT_CHANNEL,
                    fence_id = %event.geofence_id,
                    to = %event.to_state,
                    stored_status = %stored,
                    "{}", message
                ),
            }
            raised += 1;
        }
        info!(subscriber = %subscription.id(), "notifier_stopped");
        raised
    })
}
