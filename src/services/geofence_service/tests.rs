//! Tests for the GeofenceService module

use super::*;
use crate::domain::{Transition, ZoneState};
use crate::io::location::ChannelLocationSource;
use crate::io::persistence::MemoryPersistence;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const SF_LAT: f64 = 37.7749;
const SF_LNG: f64 = -122.4194;

/// Test harness that keeps handles to the injected collaborators
struct TestService {
    service: GeofenceService,
    source: Arc<ChannelLocationSource>,
    persistence: Arc<MemoryPersistence>,
    metrics: Arc<Metrics>,
}

impl std::ops::Deref for TestService {
    type Target = GeofenceService;
    fn deref(&self) -> &Self::Target {
        &self.service
    }
}

fn create_test_service() -> TestService {
    create_test_service_with(Arc::new(MemoryPersistence::new()))
}

fn create_test_service_with(persistence: Arc<MemoryPersistence>) -> TestService {
    let source = Arc::new(ChannelLocationSource::new());
    let metrics = Arc::new(Metrics::new());
    let service =
        GeofenceService::new(&Config::default(), source.clone(), persistence.clone(), metrics.clone());
    TestService { service, source, persistence, metrics }
}

fn sf_fence() -> GeofenceDefinition {
    GeofenceDefinition::new("USER_GEOFENCE", Position::new(SF_LAT, SF_LNG, 0), 200.0)
}

fn at_center() -> Position {
    Position::now(SF_LAT, SF_LNG)
}

/// Roughly 5 km north of the fence center
fn far_away() -> Position {
    Position::now(SF_LAT + 0.045, SF_LNG)
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Keep pushing `fix` until `fut` completes, so a first fix is always available
async fn feeding<F: Future>(source: &Arc<ChannelLocationSource>, fix: Position, fut: F) -> F::Output {
    let done = Arc::new(AtomicBool::new(false));
    let feeder = {
        let source = source.clone();
        let done = done.clone();
        tokio::spawn(async move {
            while !done.load(Ordering::Relaxed) {
                source.push(fix).await;
                tokio::time::sleep(millis(2)).await;
            }
        })
    };
    let output = fut.await;
    done.store(true, Ordering::Relaxed);
    feeder.await.unwrap();
    output
}

async fn activate_with_fix(
    t: &TestService,
    fence: GeofenceDefinition,
    first: Position,
) -> GeoResult<()> {
    feeding(&t.source, first, t.activate(fence)).await
}

async fn next_event(sub: &mut Subscription) -> TransitionEvent {
    tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("timed out waiting for transition")
        .expect("alert bus closed")
}

async fn wait_for_zone_state(t: &TestService, expected: ZoneState) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while t.zone_state() != expected {
            tokio::time::sleep(millis(2)).await;
        }
    })
    .await
    .expect("zone state never reached");
}

#[tokio::test]
async fn test_enter_exit_enter_scenario() {
    let t = create_test_service();
    let mut sub = t.subscribe();

    activate_with_fix(&t, sf_fence(), at_center()).await.unwrap();
    let event = next_event(&mut sub).await;
    assert_eq!(event.geofence_id, "USER_GEOFENCE");
    assert_eq!((event.from_state, event.to_state), (ZoneState::Unknown, ZoneState::Inside));
    assert_eq!(t.status(), ZoneState::Inside);

    t.source.push(far_away()).await;
    let event = next_event(&mut sub).await;
    assert_eq!((event.from_state, event.to_state), (ZoneState::Inside, ZoneState::Outside));
    assert_eq!(t.status(), ZoneState::Outside);

    t.source.push(at_center()).await;
    let event = next_event(&mut sub).await;
    assert_eq!((event.from_state, event.to_state), (ZoneState::Outside, ZoneState::Inside));
    assert_eq!(t.status(), ZoneState::Inside);

    assert_eq!(t.metrics.transitions_total(), 3);
}

#[tokio::test]
async fn test_status_persisted_before_publish() {
    let t = create_test_service();
    let store = t.status_store();
    let mut sub = t.subscribe();

    let observer = tokio::spawn(async move {
        let mut observed = Vec::new();
        while let Some(event) = sub.recv().await {
            observed.push((event.to_state, store.get()));
            if observed.len() == 2 {
                break;
            }
        }
        observed
    });

    activate_with_fix(&t, sf_fence(), at_center()).await.unwrap();
    wait_for_zone_state(&t, ZoneState::Inside).await;
    t.source.push(far_away()).await;

    let observed = tokio::time::timeout(Duration::from_secs(2), observer).await.unwrap().unwrap();
    assert_eq!(
        observed,
        vec![(ZoneState::Inside, ZoneState::Inside), (ZoneState::Outside, ZoneState::Outside)]
    );
}

#[tokio::test]
async fn test_first_fix_outside_emits_one_event() {
    let t = create_test_service();
    let mut sub = t.subscribe();

    activate_with_fix(&t, sf_fence(), far_away()).await.unwrap();
    let event = next_event(&mut sub).await;
    assert_eq!((event.from_state, event.to_state), (ZoneState::Unknown, ZoneState::Outside));

    tokio::time::sleep(millis(20)).await;
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_repeated_fixes_in_same_state_emit_nothing() {
    let t = create_test_service();
    let mut sub = t.subscribe();

    activate_with_fix(&t, sf_fence(), at_center()).await.unwrap();
    next_event(&mut sub).await;

    let processed = t.metrics.fixes_total();
    assert_eq!(t.handle_fix(at_center()).unwrap(), None);
    assert_eq!(t.handle_fix(Position::now(SF_LAT + 0.0005, SF_LNG)).unwrap(), None);
    // Fixes without a transition are still timed
    assert_eq!(t.metrics.fixes_total(), processed + 2);
    assert!(sub.try_recv().is_none());
    assert_eq!(t.metrics.transitions_total(), 1);
}

#[tokio::test]
async fn test_handle_fix_requires_active_fence() {
    let t = create_test_service();
    assert_eq!(t.handle_fix(at_center()), Err(GeoError::NoActiveFence));
}

#[tokio::test]
async fn test_clear_when_inactive_reports_no_active_fence() {
    let t = create_test_service();
    assert_eq!(t.clear(), Err(GeoError::NoActiveFence));
}

#[tokio::test]
async fn test_clear_keeps_persisted_status_and_resets_baseline() {
    let t = create_test_service();
    let mut sub = t.subscribe();

    activate_with_fix(&t, sf_fence(), far_away()).await.unwrap();
    next_event(&mut sub).await;

    t.clear().unwrap();
    assert!(!t.is_active());
    assert_eq!(t.zone_state(), ZoneState::Unknown);
    assert_eq!(t.status(), ZoneState::Outside);
    assert_eq!(t.persistence.get_string(KEY_ACTIVE_FENCE, "missing"), "");

    // Same fence again behaves like a first-ever activation
    activate_with_fix(&t, sf_fence(), far_away()).await.unwrap();
    let event = next_event(&mut sub).await;
    assert_eq!((event.from_state, event.to_state), (ZoneState::Unknown, ZoneState::Outside));
}

#[tokio::test]
async fn test_fixes_after_clear_are_ignored() {
    let t = create_test_service();
    let mut sub = t.subscribe();

    activate_with_fix(&t, sf_fence(), at_center()).await.unwrap();
    next_event(&mut sub).await;
    t.clear().unwrap();

    t.source.push(far_away()).await;
    tokio::time::sleep(millis(20)).await;

    assert!(sub.try_recv().is_none());
    assert_eq!(t.status(), ZoneState::Inside);
}

#[tokio::test]
async fn test_stale_generation_is_discarded() {
    let t = create_test_service();
    let mut sub = t.subscribe();

    activate_with_fix(&t, sf_fence(), at_center()).await.unwrap();
    next_event(&mut sub).await;
    let generation = t.inner.state.lock().generation;

    t.clear().unwrap();
    let result = t.inner.process_sampled_fix(generation, far_away());

    assert_eq!(result, Err(GeoError::NoActiveFence));
    assert_eq!(t.status(), ZoneState::Inside);
    assert_eq!(t.metrics.stale_fixes_total(), 1);
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_replacing_fence_starts_from_unknown() {
    let t = create_test_service();
    let mut sub = t.subscribe();

    activate_with_fix(&t, sf_fence(), at_center()).await.unwrap();
    next_event(&mut sub).await;

    let park = GeofenceDefinition::new("PARK", Position::new(SF_LAT, SF_LNG, 0), 50.0);
    activate_with_fix(&t, park, at_center()).await.unwrap();
    let event = next_event(&mut sub).await;

    assert_eq!(event.geofence_id, "PARK");
    assert_eq!((event.from_state, event.to_state), (ZoneState::Unknown, ZoneState::Inside));
    assert_eq!(t.active_fence().map(|f| f.id), Some("PARK".to_string()));
}

#[tokio::test]
async fn test_malformed_fences_rejected() {
    let t = create_test_service();

    let zero = GeofenceDefinition { radius_meters: 0.0, ..sf_fence() };
    let negative = GeofenceDefinition { radius_meters: -10.0, ..sf_fence() };
    let infinite = GeofenceDefinition { radius_meters: f64::INFINITY, ..sf_fence() };
    let no_center = GeofenceDefinition { center: Position::new(f64::NAN, f64::NAN, 0), ..sf_fence() };
    let no_id = GeofenceDefinition { id: " ".to_string(), ..sf_fence() };

    for fence in [zero, negative, infinite, no_center, no_id] {
        let result = t.activate(fence).await;
        assert!(matches!(result, Err(GeoError::MalformedFenceDefinition { .. })));
    }
    assert!(!t.is_active());
    assert_eq!(t.persistence.get_string(KEY_ACTIVE_FENCE, "missing"), "missing");
}

#[tokio::test]
async fn test_permission_denied_does_not_activate() {
    let t = create_test_service();
    t.source.set_authorized(false);

    let result = t.activate(sf_fence()).await;
    assert!(matches!(result, Err(GeoError::PermissionDenied { .. })));
    assert!(!t.is_active());
    assert_eq!(t.persistence.get_string(KEY_ACTIVE_FENCE, "missing"), "missing");
}

#[tokio::test]
async fn test_clear_during_activation() {
    let t = create_test_service();
    let activation = {
        let service = t.service.clone();
        tokio::spawn(async move { service.activate(sf_fence()).await })
    };

    // Let activation reach the wait for the first fix
    tokio::time::sleep(millis(20)).await;
    assert!(t.is_active());
    t.clear().unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), activation).await.unwrap().unwrap();
    assert!(result.is_err());
    assert!(!t.is_active());
    assert_eq!(t.status(), ZoneState::Unknown);
}

#[tokio::test]
async fn test_unreported_transitions_are_persisted_not_published() {
    let t = create_test_service();
    let mut sub = t.subscribe();
    let fence = sf_fence().with_transitions([Transition::Exit]);

    activate_with_fix(&t, fence, at_center()).await.unwrap();
    wait_for_zone_state(&t, ZoneState::Inside).await;
    assert_eq!(t.status(), ZoneState::Inside);
    assert!(sub.try_recv().is_none());

    t.source.push(far_away()).await;
    let event = next_event(&mut sub).await;
    assert_eq!(event.kind(), Transition::Exit);
}

#[tokio::test]
async fn test_restore_reactivates_persisted_fence() {
    let persistence = Arc::new(MemoryPersistence::new());

    {
        let t = create_test_service_with(persistence.clone());
        activate_with_fix(&t, sf_fence(), far_away()).await.unwrap();
        wait_for_zone_state(&t, ZoneState::Outside).await;
    }

    let t = create_test_service_with(persistence);
    assert_eq!(t.status(), ZoneState::Outside);
    assert!(!t.is_active());

    let mut sub = t.subscribe();
    let restored = feeding(&t.source, at_center(), t.restore()).await.unwrap();
    let restored = restored.unwrap();
    assert_eq!(restored.id, "USER_GEOFENCE");
    assert_eq!(restored.radius_meters, 200.0);
    assert!((restored.center.latitude - SF_LAT).abs() < 1e-9);
    assert!(t.is_active());

    let event = next_event(&mut sub).await;
    assert_eq!((event.from_state, event.to_state), (ZoneState::Unknown, ZoneState::Inside));
}

#[tokio::test]
async fn test_restore_without_persisted_fence() {
    let t = create_test_service();
    assert_eq!(t.restore().await, Ok(None));

    t.persistence.set_string(KEY_ACTIVE_FENCE, "{broken").unwrap();
    assert_eq!(t.restore().await, Ok(None));
    assert_eq!(t.persistence.get_string(KEY_ACTIVE_FENCE, "missing"), "");
}

#[tokio::test]
async fn test_unsubscribe_via_service() {
    let t = create_test_service();
    let sub = t.subscribe();
    assert!(t.unsubscribe(sub.id()));
    assert!(!t.unsubscribe(sub.id()));
}

#[tokio::test]
async fn test_source_closing_deactivates_fence() {
    let t = create_test_service();
    let mut sub = t.subscribe();

    activate_with_fix(&t, sf_fence(), at_center()).await.unwrap();
    next_event(&mut sub).await;

    t.source.close();
    tokio::time::timeout(Duration::from_secs(2), async {
        while t.is_active() {
            tokio::time::sleep(millis(2)).await;
        }
    })
    .await
    .expect("fence still active after the source closed");

    assert_eq!(t.zone_state(), ZoneState::Unknown);
    assert_eq!(t.status(), ZoneState::Inside);
    assert_eq!(t.metrics.source_lost_total(), 1);
    assert!(!t.inner.sampler.is_running());
    assert!(!t.source.push(far_away()).await);
    assert_eq!(t.handle_fix(far_away()), Err(GeoError::NoActiveFence));
    assert!(sub.try_recv().is_none());

    // The fence stays persisted for a later restore
    assert_ne!(t.persistence.get_string(KEY_ACTIVE_FENCE, ""), "");
}

#[tokio::test]
async fn test_source_closing_after_clear_is_quiet() {
    let t = create_test_service();
    let mut sub = t.subscribe();

    activate_with_fix(&t, sf_fence(), at_center()).await.unwrap();
    next_event(&mut sub).await;
    t.clear().unwrap();
    t.source.close();
    tokio::time::sleep(millis(20)).await;

    assert_eq!(t.metrics.source_lost_total(), 0);
}

#[tokio::test]
async fn test_shutdown_keeps_fence_for_restore() {
    let persistence = Arc::new(MemoryPersistence::new());

    {
        let t = create_test_service_with(persistence.clone());
        activate_with_fix(&t, sf_fence(), far_away()).await.unwrap();
        wait_for_zone_state(&t, ZoneState::Outside).await;

        t.shutdown();
        assert!(!t.is_active());
        assert!(!t.inner.sampler.is_running());
        // Second call is a no-op
        t.shutdown();
    }

    let t = create_test_service_with(persistence);
    let mut sub = t.subscribe();
    let restored = feeding(&t.source, at_center(), t.restore()).await.unwrap();

    assert_eq!(restored.map(|f| f.id), Some("USER_GEOFENCE".to_string()));
    let event = next_event(&mut sub).await;
    assert_eq!((event.from_state, event.to_state), (ZoneState::Unknown, ZoneState::Inside));
}

#[tokio::test]
async fn test_clear_forgets_fence_for_restore() {
    let persistence = Arc::new(MemoryPersistence::new());

    {
        let t = create_test_service_with(persistence.clone());
        activate_with_fix(&t, sf_fence(), at_center()).await.unwrap();
        t.clear().unwrap();
    }

    let t = create_test_service_with(persistence);
    assert_eq!(t.restore().await, Ok(None));
    assert!(!t.is_active());
}
