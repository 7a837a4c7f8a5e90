//! Voice command routing
//!
//! Maps a recognized phrase to an `Intent` by case-insensitive substring match
//! and invokes the matching `ActionSink` call exactly once. GO_HOME keywords
//! are checked before CALL_FOR_HELP keywords, so a phrase containing both
//! ("help, I'm lost") routes to GO_HOME.

use crate::domain::{GeoError, GeoResult, Intent};
use crate::infra::metrics::Metrics;
use crate::io::actions::ActionSink;
use std::sync::Arc;
use tracing::{info, warn};

const GO_HOME_KEYWORDS: [&str; 2] = ["lost", "go home"];
const CALL_FOR_HELP_KEYWORDS: [&str; 2] = ["help", "emergency"];

pub struct CommandRouter {
    sink: Arc<dyn ActionSink>,
    metrics: Arc<Metrics>,
}

impl CommandRouter {
    pub fn new(sink: Arc<dyn ActionSink>, metrics: Arc<Metrics>) -> Self {
        Self { sink, metrics }
    }

    /// Select the intent for a phrase
    pub fn route(phrase: &str) -> Intent {
        let normalized = phrase.to_lowercase();
        if GO_HOME_KEYWORDS.iter().any(|k| normalized.contains(k)) {
            Intent::GoHome
        } else if CALL_FOR_HELP_KEYWORDS.iter().any(|k| normalized.contains(k)) {
            Intent::CallForHelp
        } else {
            Intent::Unrecognized
        }
    }

    /// Invoke the action for `intent`, once, with no retry
    pub async fn dispatch(&self, intent: Intent) -> GeoResult<()> {
        self.metrics.record_command(intent);

        let result = match intent {
            Intent::GoHome => self.sink.go_home().await,
            Intent::CallForHelp => self.sink.call_for_help().await,
            Intent::Unrecognized => self.sink.announce_unrecognized().await,
        };

        match result {
            Ok(()) => {
                info!(intent = %intent.as_str(), "command_dispatched");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_action_failure();
                warn!(intent = %intent.as_str(), error = %e, "command_action_failed");
                Err(GeoError::ActionFailed { action: intent.as_str().to_string(), reason: e.reason })
            }
        }
    }

    /// Route a phrase and dispatch its intent
    pub async fn handle(&self, phrase: &str) -> GeoResult<Intent> {
        let intent = Self::route(phrase);
        info!(phrase = %phrase, intent = %intent.as_str(), "command_routed");
        self.dispatch(intent).await?;
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::actions::ActionError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records every call; optionally fails all of them
    #[derive(Default)]
    struct RecordingActionSink {
        calls: Mutex<Vec<&'static str>>,
        fail: bool,
    }

    impl RecordingActionSink {
        fn failing() -> Self {
            Self { fail: true, ..Default::default() }
        }

        fn record(&self, name: &'static str) -> Result<(), ActionError> {
            self.calls.lock().push(name);
            if self.fail {
                Err(ActionError::new("sms service unavailable"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ActionSink for RecordingActionSink {
        async fn go_home(&self) -> Result<(), ActionError> {
            self.record("go_home")
        }
        async fn call_for_help(&self) -> Result<(), ActionError> {
            self.record("call_for_help")
        }
        async fn announce_unrecognized(&self) -> Result<(), ActionError> {
            self.record("announce_unrecognized")
        }
    }

    fn router(sink: Arc<RecordingActionSink>) -> (CommandRouter, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        (CommandRouter::new(sink, metrics.clone()), metrics)
    }

    #[test]
    fn test_route_keywords() {
        assert_eq!(CommandRouter::route("I think I am LOST"), Intent::GoHome);
        assert_eq!(CommandRouter::route("please HELP me"), Intent::CallForHelp);
        assert_eq!(CommandRouter::route("good morning"), Intent::Unrecognized);
        assert_eq!(CommandRouter::route("I want to Go Home"), Intent::GoHome);
        assert_eq!(CommandRouter::route("this is an emergency"), Intent::CallForHelp);
        assert_eq!(CommandRouter::route(""), Intent::Unrecognized);
    }

    #[test]
    fn test_route_go_home_wins_ties() {
        assert_eq!(CommandRouter::route("help, I'm lost"), Intent::GoHome);
        assert_eq!(CommandRouter::route("emergency, go home now"), Intent::GoHome);
    }

    #[test]
    fn test_route_is_substring_match() {
        // "helpful" contains "help"
        assert_eq!(CommandRouter::route("that was helpful"), Intent::CallForHelp);
        // "go" and "home" apart do not form "go home"
        assert_eq!(CommandRouter::route("go to my home"), Intent::Unrecognized);
    }

    #[tokio::test]
    async fn test_dispatch_invokes_matching_action_once() {
        let sink = Arc::new(RecordingActionSink::default());
        let (router, metrics) = router(sink.clone());

        router.dispatch(Intent::GoHome).await.unwrap();
        router.dispatch(Intent::CallForHelp).await.unwrap();
        router.dispatch(Intent::Unrecognized).await.unwrap();

        assert_eq!(*sink.calls.lock(), vec!["go_home", "call_for_help", "announce_unrecognized"]);
        assert_eq!(metrics.action_failures(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_retried() {
        let sink = Arc::new(RecordingActionSink::failing());
        let (router, metrics) = router(sink.clone());

        let err = router.handle("please help").await.unwrap_err();
        assert_eq!(
            err,
            GeoError::ActionFailed {
                action: "call_for_help".to_string(),
                reason: "sms service unavailable".to_string(),
            }
        );
        assert_eq!(sink.calls.lock().len(), 1);
        assert_eq!(metrics.action_failures(), 1);
    }

    #[tokio::test]
    async fn test_handle_returns_intent() {
        let sink = Arc::new(RecordingActionSink::default());
        let (router, _) = router(sink.clone());
        assert_eq!(router.handle("I am lost").await.unwrap(), Intent::GoHome);
        assert_eq!(*sink.calls.lock(), vec!["go_home"]);
    }
}
