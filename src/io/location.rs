//! Platform location sources
//!
//! The core depends only on the narrow `LocationSource` contract. Two sources
//! ship with the crate:
//! - `ChannelLocationSource` - fixes pushed programmatically (tests, embedding)
//! - `ReplayLocationSource` - loops over a fixed route (simulation)

use crate::domain::{epoch_ms, GeoError, GeoResult, Position};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Channel depth between a source and the sampler pump
const SOURCE_BUFFER: usize = 16;

/// Narrow contract over a platform location provider
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Whether location access has been granted
    fn is_authorized(&self) -> bool;

    /// Begin producing fixes at roughly `interval_ms`
    ///
    /// Each call opens a fresh stream; dropping the receiver ends it.
    async fn request_updates(
        &self,
        interval_ms: u64,
        high_accuracy: bool,
    ) -> GeoResult<mpsc::Receiver<Position>>;

    /// Most recent fix the platform knows about, if any
    fn last_known(&self) -> Option<Position>;
}

/// Source fed by `push`; one live stream at a time
pub struct ChannelLocationSource {
    authorized: AtomicBool,
    tx: Mutex<Option<mpsc::Sender<Position>>>,
    last: Mutex<Option<Position>>,
}

impl Default for ChannelLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelLocationSource {
    pub fn new() -> Self {
        Self { authorized: AtomicBool::new(true), tx: Mutex::new(None), last: Mutex::new(None) }
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::Relaxed);
    }

    /// Deliver a fix to the current stream
    ///
    /// Returns false when no stream is open or its consumer has gone away.
    /// The fix still becomes the last known position.
    pub async fn push(&self, fix: Position) -> bool {
        *self.last.lock() = Some(fix);
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => tx.send(fix).await.is_ok(),
            None => false,
        }
    }

    /// Close the current stream, as if the platform stopped delivering
    pub fn close(&self) {
        self.tx.lock().take();
    }
}

#[async_trait]
impl LocationSource for ChannelLocationSource {
    fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Relaxed)
    }

    async fn request_updates(
        &self,
        interval_ms: u64,
        high_accuracy: bool,
    ) -> GeoResult<mpsc::Receiver<Position>> {
        if !self.is_authorized() {
            return Err(GeoError::permission_denied("location"));
        }
        let (tx, rx) = mpsc::channel(SOURCE_BUFFER);
        *self.tx.lock() = Some(tx);
        debug!(interval_ms = %interval_ms, high_accuracy = %high_accuracy, "channel_source_opened");
        Ok(rx)
    }

    fn last_known(&self) -> Option<Position> {
        *self.last.lock()
    }
}

/// Source that replays a route, looping until the stream is dropped
pub struct ReplayLocationSource {
    route: Arc<[(f64, f64)]>,
    interval: Option<Duration>,
    last: Arc<Mutex<Option<Position>>>,
}

impl ReplayLocationSource {
    /// Replay `route` at the interval requested by the sampler
    pub fn new(route: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self { route: route.into_iter().collect(), interval: None, last: Arc::new(Mutex::new(None)) }
    }

    /// Replay at a fixed interval regardless of what the sampler asks for
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

#[async_trait]
impl LocationSource for ReplayLocationSource {
    fn is_authorized(&self) -> bool {
        true
    }

    async fn request_updates(
        &self,
        interval_ms: u64,
        _high_accuracy: bool,
    ) -> GeoResult<mpsc::Receiver<Position>> {
        if self.route.is_empty() {
            return Err(GeoError::SourceUnavailable { reason: "replay route is empty".to_string() });
        }

        let (tx, rx) = mpsc::channel(SOURCE_BUFFER);
        let route = self.route.clone();
        let last = self.last.clone();
        let period = self.interval.unwrap_or(Duration::from_millis(interval_ms.max(1)));

        info!(points = %route.len(), period_ms = %period.as_millis(), "replay_source_started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            for &(lat, lng) in route.iter().cycle() {
                ticker.tick().await;
                let fix = Position::new(lat, lng, epoch_ms());
                *last.lock() = Some(fix);
                if tx.send(fix).await.is_err() {
                    break;
                }
            }
            debug!("replay_source_stopped");
        });

        Ok(rx)
    }

    fn last_known(&self) -> Option<Position> {
        *self.last.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_denied() {
        let source = ChannelLocationSource::new();
        source.set_authorized(false);
        let result = source.request_updates(1000, true).await;
        assert!(matches!(result, Err(GeoError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn test_channel_source_delivers_and_remembers() {
        let source = ChannelLocationSource::new();
        assert!(!source.push(Position::new(1.0, 2.0, 1)).await);
        assert_eq!(source.last_known(), Some(Position::new(1.0, 2.0, 1)));

        let mut rx = source.request_updates(1000, true).await.unwrap();
        assert!(source.push(Position::new(3.0, 4.0, 2)).await);
        assert_eq!(rx.recv().await, Some(Position::new(3.0, 4.0, 2)));

        source.close();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_channel_source_restartable() {
        let source = ChannelLocationSource::new();
        let first = source.request_updates(1000, true).await.unwrap();
        drop(first);

        let mut second = source.request_updates(1000, true).await.unwrap();
        assert!(source.push(Position::new(5.0, 6.0, 3)).await);
        assert_eq!(second.recv().await.map(|p| p.latitude), Some(5.0));
    }

    #[tokio::test]
    async fn test_replay_source_loops_route() {
        let source = ReplayLocationSource::new([(1.0, 1.0), (2.0, 2.0)])
            .with_interval(Duration::from_millis(1));
        let mut rx = source.request_updates(1000, true).await.unwrap();

        let lats: Vec<f64> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .iter()
        .map(|p| p.latitude)
        .collect();
        assert_eq!(lats, vec![1.0, 2.0, 1.0]);
        assert!(source.last_known().is_some());
    }

    #[tokio::test]
    async fn test_replay_source_empty_route() {
        let source = ReplayLocationSource::new(Vec::new());
        assert!(matches!(
            source.request_updates(1000, true).await,
            Err(GeoError::SourceUnavailable { .. })
        ));
    }
}
