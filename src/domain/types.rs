//! Shared types for the geofence alert core

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch time in milliseconds
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// A single timestamped position reading (a "fix")
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch milliseconds when the fix was taken
    pub timestamp: u64,
}

impl Position {
    #[inline]
    pub fn new(latitude: f64, longitude: f64, timestamp: u64) -> Self {
        Self { latitude, longitude, timestamp }
    }

    /// Position stamped with the current wall clock
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, epoch_ms())
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Kind of zone transition a fence reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Enter,
    Exit,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Enter => "enter",
            Transition::Exit => "exit",
        }
    }
}

/// Circular safe zone around a center point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceDefinition {
    pub id: String,
    pub center: Position,
    pub radius_meters: f64,
    #[serde(default = "default_transitions")]
    pub transitions_of_interest: BTreeSet<Transition>,
}

fn default_transitions() -> BTreeSet<Transition> {
    BTreeSet::from([Transition::Enter, Transition::Exit])
}

impl GeofenceDefinition {
    /// Create a fence that reports both enter and exit transitions
    pub fn new(id: impl Into<String>, center: Position, radius_meters: f64) -> Self {
        Self {
            id: id.into(),
            center,
            radius_meters,
            transitions_of_interest: default_transitions(),
        }
    }

    pub fn with_transitions(mut self, transitions: impl IntoIterator<Item = Transition>) -> Self {
        self.transitions_of_interest = transitions.into_iter().collect();
        self
    }

    /// Whether observers should be told about this kind of transition
    pub fn reports(&self, transition: Transition) -> bool {
        self.transitions_of_interest.contains(&transition)
    }
}

/// Containment state relative to the active fence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneState {
    #[default]
    Unknown,
    Inside,
    Outside,
}

impl ZoneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneState::Unknown => "UNKNOWN",
            ZoneState::Inside => "INSIDE",
            ZoneState::Outside => "OUTSIDE",
        }
    }
}

impl std::fmt::Display for ZoneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ZoneState {
    type Err = std::convert::Infallible;

    /// Unrecognized values read back as `Unknown`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "INSIDE" => ZoneState::Inside,
            "OUTSIDE" => ZoneState::Outside,
            _ => ZoneState::Unknown,
        })
    }
}

/// A recorded change in containment state for one fence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub geofence_id: String,
    pub from_state: ZoneState,
    pub to_state: ZoneState,
    pub position: Position,
    /// Epoch milliseconds when the transition was detected
    pub timestamp: u64,
}

impl TransitionEvent {
    /// Enter for transitions into the zone, exit otherwise
    pub fn kind(&self) -> Transition {
        match self.to_state {
            ZoneState::Inside => Transition::Enter,
            _ => Transition::Exit,
        }
    }
}

/// Action selected from a recognized voice phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    GoHome,
    CallForHelp,
    Unrecognized,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::GoHome => "go_home",
            Intent::CallForHelp => "call_for_help",
            Intent::Unrecognized => "unrecognized",
        }
    }

    /// Phrase spoken back to the user once the intent is selected
    pub fn spoken_response(&self) -> &'static str {
        match self {
            Intent::GoHome => "Helping you go home",
            Intent::CallForHelp => "Calling emergency contact",
            Intent::Unrecognized => "Please say help or lost",
        }
    }
}
