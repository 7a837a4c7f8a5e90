//! Fix processing for the GeofenceService
//!
//! One worker per activation drains the sampler's FixStream. Each fix is
//! evaluated, persisted and published while holding the service state lock,
//! which serializes fixes with each other and with `clear`.

use super::{ServiceInner, ServiceState};
use crate::domain::{GeoError, GeoResult, Position, TransitionEvent};
use crate::services::sampler::FixStream;
use std::sync::Weak;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drain `stream` until it ends, the activation goes stale or the service is dropped
pub(crate) async fn run_worker(inner: Weak<ServiceInner>, generation: u64, mut stream: FixStream) {
    debug!(generation = %generation, "fence_worker_started");

    while let Some(fix) = stream.next().await {
        let Some(service) = inner.upgrade() else {
            return;
        };
        if service.process_sampled_fix(generation, fix).is_err() {
            debug!(generation = %generation, "fence_worker_stopped");
            return;
        }
    }

    // Also reached after stop/clear, which already bumped the generation
    if let Some(service) = inner.upgrade() {
        service.source_ended(generation);
    }
    debug!(generation = %generation, "fence_worker_stopped");
}

impl ServiceInner {
    /// Process a fix from the worker for `generation`
    ///
    /// Returns `Err(NoActiveFence)` when the activation has been cleared or
    /// replaced; the fix is discarded without touching any state.
    pub(crate) fn process_sampled_fix(
        &self,
        generation: u64,
        fix: Position,
    ) -> GeoResult<Option<TransitionEvent>> {
        let mut state = self.state.lock();
        if state.generation != generation || state.fence.is_none() {
            self.metrics.record_stale_fix();
            debug!(
                generation = %generation,
                current_generation = %state.generation,
                "stale_fix_discarded"
            );
            return Err(GeoError::NoActiveFence);
        }
        Ok(self.apply_fix(&mut state, fix))
    }

    /// Deactivate after the location stream ended on its own
    ///
    /// The persisted fence is kept so a later `restore` can resume it.
    pub(crate) fn source_ended(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        let Some(fence) = state.fence.take() else {
            return;
        };
        state.generation += 1;
        state.evaluator.reset();
        state.worker.take();
        // Under the state lock so a newer activation's sampler is never stopped
        self.sampler.stop();
        drop(state);

        self.metrics.record_source_lost();
        let error = GeoError::SourceUnavailable { reason: "location stream ended".to_string() };
        warn!(
            fence_id = %fence.id,
            generation = %generation,
            error = %error,
            message = %error.status_message(),
            "fence_deactivated_source_lost"
        );
    }

    /// Process a fix handed in directly, against whatever fence is active
    pub(crate) fn handle_fix(&self, fix: Position) -> GeoResult<Option<TransitionEvent>> {
        if !fix.is_valid() {
            debug!(fix = %fix, "fix_rejected_invalid");
            return Ok(None);
        }
        let mut state = self.state.lock();
        if state.fence.is_none() {
            return Err(GeoError::NoActiveFence);
        }
        Ok(self.apply_fix(&mut state, fix))
    }

    /// Evaluate, then persist before publish
    ///
    /// The recorded latency covers the whole path, durable write included.
    fn apply_fix(&self, state: &mut ServiceState, fix: Position) -> Option<TransitionEvent> {
        let start = Instant::now();
        let event = self.apply_fix_inner(state, fix);
        self.metrics.record_fix_evaluated(start.elapsed().as_micros() as u64);
        event
    }

    fn apply_fix_inner(&self, state: &mut ServiceState, fix: Position) -> Option<TransitionEvent> {
        let ServiceState { fence, evaluator, .. } = state;
        let fence = fence.as_ref()?;

        let event = evaluator.evaluate(&fix, fence)?;
        self.metrics.record_transition();

        if let Err(e) = self.store.set(event.to_state) {
            self.metrics.record_persist_failure();
            warn!(fence_id = %event.geofence_id, error = %e, "status_persist_failed");
        }

        info!(
            fence_id = %event.geofence_id,
            from = %event.from_state,
            to = %event.to_state,
            lat = %fix.latitude,
            lng = %fix.longitude,
            "zone_transition"
        );

        let kind = event.kind();
        if fence.reports(kind) {
            self.bus.publish(&event);
        } else {
            debug!(fence_id = %event.geofence_id, kind = %kind.as_str(), "transition_not_reported");
        }

        Some(event)
    }
}
