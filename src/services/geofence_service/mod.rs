//! Geofence lifecycle and fix processing
//!
//! The GeofenceService owns the single active fence and wires
//! LocationSampler → GeofenceEvaluator → StatusStore → AlertBus:
//! - `activate` validates the fence, starts sampling and spawns the worker
//! - the worker evaluates fixes one at a time (see `handlers`)
//! - `clear` stops sampling and resets the evaluator to UNKNOWN, leaving the
//!   persisted status untouched
//! - `shutdown` does the same but keeps the persisted fence for `restore`
//! - a location stream that ends on its own deactivates the fence
//!
//! Every activation bumps a generation counter. Fix processing checks it under
//! the same lock `clear` takes, so once `clear` returns no fix from the old
//! activation can still persist or publish.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::{GeoError, GeoResult, GeofenceDefinition, Position, TransitionEvent, ZoneState};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::location::LocationSource;
use crate::io::persistence::{Persistence, KEY_ACTIVE_FENCE};
use crate::services::alert_bus::{AlertBus, SubscriberId, Subscription};
use crate::services::evaluator::GeofenceEvaluator;
use crate::services::sampler::LocationSampler;
use crate::services::status_store::StatusStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Mutable state guarded by one lock
pub(crate) struct ServiceState {
    pub(crate) fence: Option<GeofenceDefinition>,
    pub(crate) evaluator: GeofenceEvaluator,
    /// Bumped on every activate and clear
    pub(crate) generation: u64,
    pub(crate) worker: Option<JoinHandle<()>>,
}

pub(crate) struct ServiceInner {
    pub(crate) state: Mutex<ServiceState>,
    /// Serializes activations; `clear` never waits on it
    activation: tokio::sync::Mutex<()>,
    pub(crate) sampler: LocationSampler,
    interval_ms: u64,
    store: Arc<StatusStore>,
    bus: Arc<AlertBus>,
    persistence: Arc<dyn Persistence>,
    pub(crate) metrics: Arc<Metrics>,
}

/// Orchestrator for the single active geofence
#[derive(Clone)]
pub struct GeofenceService {
    pub(crate) inner: Arc<ServiceInner>,
}

impl GeofenceService {
    /// Create an inactive service
    pub fn new(
        config: &Config,
        source: Arc<dyn LocationSource>,
        persistence: Arc<dyn Persistence>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let store = Arc::new(StatusStore::open(persistence.clone()));
        let bus = Arc::new(AlertBus::new(config.subscriber_capacity(), metrics.clone()));
        let inner = ServiceInner {
            state: Mutex::new(ServiceState {
                fence: None,
                evaluator: GeofenceEvaluator::new(),
                generation: 0,
                worker: None,
            }),
            activation: tokio::sync::Mutex::new(()),
            sampler: LocationSampler::new(source, config.sampler_high_accuracy()),
            interval_ms: config.sampler_interval_ms(),
            store,
            bus,
            persistence,
            metrics,
        };
        Self { inner: Arc::new(inner) }
    }

    /// Activate `fence`, replacing any active one
    ///
    /// Suspends until the first fix arrives. The new fence always starts from
    /// UNKNOWN, so its first fix produces exactly one transition event.
    pub async fn activate(&self, fence: GeofenceDefinition) -> GeoResult<()> {
        validate_fence(&fence)?;

        let _activation = self.inner.activation.lock().await;
        if !self.inner.sampler.source().is_authorized() {
            warn!(fence_id = %fence.id, "fence_activation_permission_denied");
            return Err(GeoError::permission_denied("location"));
        }

        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            if let Some(worker) = state.worker.take() {
                worker.abort();
            }
            if let Some(old) = state.fence.replace(fence.clone()) {
                info!(old_fence_id = %old.id, new_fence_id = %fence.id, "fence_replaced");
            }
            state.evaluator.reset();
            state.generation
        };
        self.persist_fence(Some(&fence));

        let stream = match self.inner.sampler.start(self.inner.interval_ms).await {
            Ok(stream) => stream,
            Err(e) => {
                let mut state = self.inner.state.lock();
                if state.generation == generation {
                    state.generation += 1;
                    state.fence = None;
                    state.evaluator.reset();
                    drop(state);
                    self.persist_fence(None);
                }
                warn!(fence_id = %fence.id, error = %e, "fence_activation_failed");
                return Err(e);
            }
        };

        let mut state = self.inner.state.lock();
        if state.generation != generation {
            // Cleared while waiting for the first fix
            drop(state);
            self.inner.sampler.stop();
            info!(fence_id = %fence.id, "fence_cleared_during_activation");
            return Err(GeoError::NoActiveFence);
        }

        let worker = tokio::spawn(handlers::run_worker(
            Arc::downgrade(&self.inner),
            generation,
            stream,
        ));
        state.worker = Some(worker);

        info!(
            fence_id = %fence.id,
            lat = %fence.center.latitude,
            lng = %fence.center.longitude,
            radius_m = %fence.radius_meters,
            generation = %generation,
            "fence_activated"
        );
        Ok(())
    }

    /// Deactivate the fence at the user's request
    ///
    /// Stops sampling, resets the evaluator and forgets the persisted fence.
    /// The persisted status keeps its last value. Returns `NoActiveFence`
    /// (and changes nothing) when inactive.
    pub fn clear(&self) -> GeoResult<()> {
        let cleared = self.deactivate().ok_or(GeoError::NoActiveFence)?;
        self.persist_fence(None);
        info!(fence_id = %cleared.id, "fence_cleared");
        Ok(())
    }

    /// Stop monitoring for process shutdown
    ///
    /// Same as `clear` except the persisted fence is kept, so the next run
    /// picks it up through `restore`. No-op when inactive.
    pub fn shutdown(&self) {
        if let Some(fence) = self.deactivate() {
            info!(fence_id = %fence.id, "fence_suspended_for_shutdown");
        }
    }

    fn deactivate(&self) -> Option<GeofenceDefinition> {
        let (fence, worker) = {
            let mut state = self.inner.state.lock();
            let fence = state.fence.take()?;
            state.generation += 1;
            state.evaluator.reset();
            (fence, state.worker.take())
        };

        if let Some(worker) = worker {
            worker.abort();
        }
        self.inner.sampler.stop();
        Some(fence)
    }

    /// Re-activate the fence persisted by an earlier run, if any
    pub async fn restore(&self) -> GeoResult<Option<GeofenceDefinition>> {
        let json = self.inner.persistence.get_string(KEY_ACTIVE_FENCE, "");
        if json.is_empty() {
            return Ok(None);
        }

        let fence: GeofenceDefinition = match serde_json::from_str(&json) {
            Ok(fence) => fence,
            Err(e) => {
                warn!(error = %e, "persisted_fence_unreadable");
                self.persist_fence(None);
                return Ok(None);
            }
        };

        info!(fence_id = %fence.id, "fence_restoring");
        self.activate(fence.clone()).await?;
        Ok(Some(fence))
    }

    /// Evaluate one fix against the active fence outside the sampling loop
    ///
    /// Runs under the same serialization as sampled fixes.
    pub fn handle_fix(&self, fix: Position) -> GeoResult<Option<TransitionEvent>> {
        self.inner.handle_fix(fix)
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().fence.is_some()
    }

    pub fn active_fence(&self) -> Option<GeofenceDefinition> {
        self.inner.state.lock().fence.clone()
    }

    /// Evaluator's view of the active fence; UNKNOWN when inactive or before the first fix
    pub fn zone_state(&self) -> ZoneState {
        let state = self.inner.state.lock();
        match &state.fence {
            Some(fence) => state.evaluator.state(&fence.id),
            None => ZoneState::Unknown,
        }
    }

    /// Last persisted status
    pub fn status(&self) -> ZoneState {
        self.inner.store.get()
    }

    pub fn status_store(&self) -> Arc<StatusStore> {
        self.inner.store.clone()
    }

    pub fn alert_bus(&self) -> Arc<AlertBus> {
        self.inner.bus.clone()
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    pub fn last_known_position(&self) -> Option<Position> {
        self.inner.sampler.last_known()
    }

    fn persist_fence(&self, fence: Option<&GeofenceDefinition>) {
        let json = match fence.map(serde_json::to_string).transpose() {
            Ok(json) => json.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "fence_serialize_failed");
                return;
            }
        };
        if let Err(e) = self.inner.persistence.set_string(KEY_ACTIVE_FENCE, &json) {
            warn!(error = %e, "fence_persist_failed");
        }
    }
}

/// Reject fences that can never classify a fix meaningfully
pub fn validate_fence(fence: &GeofenceDefinition) -> GeoResult<()> {
    if fence.id.trim().is_empty() {
        return Err(GeoError::malformed("fence id is empty"));
    }
    if !fence.center.is_valid() {
        return Err(GeoError::malformed(format!("center {} is not a valid coordinate", fence.center)));
    }
    if !fence.radius_meters.is_finite() || fence.radius_meters <= 0.0 {
        return Err(GeoError::malformed(format!(
            "radius must be a positive number of meters, got {}",
            fence.radius_meters
        )));
    }
    Ok(())
}
