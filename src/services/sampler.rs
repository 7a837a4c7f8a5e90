//! Location sampling with latest-value-wins delivery
//!
//! A pump task moves fixes from the platform source into a `watch` slot that
//! holds only the most recent fix. A consumer that falls behind skips straight
//! to the newest fix instead of working through a backlog.

use crate::domain::{GeoError, GeoResult, Position};
use crate::io::location::LocationSource;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lazy, infinite sequence of fixes; ends when the sampler is stopped
pub struct FixStream {
    rx: watch::Receiver<Option<Position>>,
    /// First fix, already awaited by `start`
    pending: Option<Position>,
}

impl FixStream {
    /// Next fix, skipping any that were superseded while the caller was busy
    pub async fn next(&mut self) -> Option<Position> {
        if let Some(fix) = self.pending.take() {
            return Some(fix);
        }
        self.rx.changed().await.ok()?;
        let fix = *self.rx.borrow_and_update();
        fix
    }
}

struct RunningPump {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Wraps a `LocationSource`; restartable via `start` after `stop`
pub struct LocationSampler {
    source: Arc<dyn LocationSource>,
    high_accuracy: bool,
    running: Mutex<Option<RunningPump>>,
}

impl LocationSampler {
    pub fn new(source: Arc<dyn LocationSource>, high_accuracy: bool) -> Self {
        Self { source, high_accuracy, running: Mutex::new(None) }
    }

    pub fn source(&self) -> &Arc<dyn LocationSource> {
        &self.source
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(|p| !p.task.is_finished())
    }

    /// Start sampling at roughly `interval_ms`
    ///
    /// Suspends until the first fix arrives, with no timeout. Fails with
    /// `PermissionDenied` when location access is not authorized. A running
    /// stream is stopped first.
    pub async fn start(&self, interval_ms: u64) -> GeoResult<FixStream> {
        if !self.source.is_authorized() {
            warn!("sampler_permission_denied");
            return Err(GeoError::permission_denied("location"));
        }

        self.stop();
        let mut source_rx = self.source.request_updates(interval_ms, self.high_accuracy).await?;

        let (fix_tx, mut fix_rx) = watch::channel(None);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    fix = source_rx.recv() => match fix {
                        Some(fix) if fix.is_valid() => {
                            fix_tx.send_replace(Some(fix));
                        }
                        Some(fix) => {
                            debug!(fix = %fix, "sampler_fix_rejected");
                        }
                        None => break,
                    },
                }
            }
            debug!("sampler_pump_stopped");
        });

        *self.running.lock() = Some(RunningPump { shutdown_tx, task });
        info!(interval_ms = %interval_ms, high_accuracy = %self.high_accuracy, "sampler_started");

        let first = match fix_rx.wait_for(|fix| fix.is_some()).await {
            Ok(fix) => *fix,
            Err(_) => {
                warn!("sampler_source_ended_before_first_fix");
                return Err(GeoError::SourceUnavailable {
                    reason: "location stream ended before the first fix".to_string(),
                });
            }
        };

        Ok(FixStream { rx: fix_rx, pending: first })
    }

    /// Stop sampling; any open `FixStream` ends. Safe to call at any time
    pub fn stop(&self) {
        if let Some(pump) = self.running.lock().take() {
            let _ = pump.shutdown_tx.send(true);
            info!("sampler_stopped");
        }
    }

    /// Most recent fix the platform knows about
    pub fn last_known(&self) -> Option<Position> {
        self.source.last_known()
    }
}

impl Drop for LocationSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
