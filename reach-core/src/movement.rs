use serde::{Deserialize, Serialize};

/// One raw touch sample, timestamped by the session clock (ms).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchSample {
    pub x: f32,
    pub y: f32,
    pub timestamp_ms: u64,
}

impl TouchSample {
    pub fn new(x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self { x, y, timestamp_ms }
    }

    pub fn distance_to(&self, x: f32, y: f32) -> f64 {
        let dx = (self.x - x) as f64;
        let dy = (self.y - y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Path point relative to the go-cue, as stored in trial records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub x: f32,
    pub y: f32,
    /// Milliseconds since the go-cue.
    pub t: u64,
}

/// A timestamp or duration that may never have happened.
///
/// Serialized as `null` or a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum Timing {
    #[default]
    NotReached,
    Reached(u64),
}

impl Timing {
    pub fn value(self) -> Option<u64> {
        match self {
            Timing::NotReached => None,
            Timing::Reached(ms) => Some(ms),
        }
    }

    pub fn is_reached(self) -> bool {
        matches!(self, Timing::Reached(_))
    }

    /// Duration from `start` to this mark, clamped at zero.
    pub fn since(self, start: u64) -> Timing {
        match self {
            Timing::NotReached => Timing::NotReached,
            Timing::Reached(ms) => Timing::Reached(ms.saturating_sub(start)),
        }
    }

    /// Duration between two marks; absent unless both happened.
    pub fn between(start: Timing, end: Timing) -> Timing {
        match start {
            Timing::Reached(s) => end.since(s),
            Timing::NotReached => Timing::NotReached,
        }
    }
}

impl From<Option<u64>> for Timing {
    fn from(value: Option<u64>) -> Self {
        value.map_or(Timing::NotReached, Timing::Reached)
    }
}

impl From<Timing> for Option<u64> {
    fn from(value: Timing) -> Self {
        value.value()
    }
}

/// Axis-aligned target rectangle in screen pixels, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetZone {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl TargetZone {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) * 0.5,
            (self.top + self.bottom) * 0.5,
        )
    }
}

/// Movement metrics of one reach trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KinematicsResult {
    #[serde(rename = "firstMovementTimestamp")]
    pub first_movement: Timing,
    #[serde(rename = "targetReachedTimestamp")]
    pub target_reached: Timing,
    pub reaction_time: Timing,
    pub movement_time: Timing,
    #[serde(rename = "totalResponseTime")]
    pub total_response_time_ms: u64,
    #[serde(rename = "movementPath")]
    pub path: Vec<PathPoint>,
    pub path_length: f64,
    /// Pixels per second over the movement time.
    pub average_speed: f64,
}

/// Velocity-profile metrics derived from a recorded path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementProfile {
    pub mean_velocity: f64,
    pub peak_velocity: f64,
    pub speed_variance: f64,
    pub velocity_peaks: u32,
    pub jerk: f64,
    pub path_efficiency: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_since_clamps_and_propagates_absence() {
        assert_eq!(Timing::Reached(1200).since(1000), Timing::Reached(200));
        assert_eq!(Timing::Reached(900).since(1000), Timing::Reached(0));
        assert_eq!(Timing::NotReached.since(1000), Timing::NotReached);
        assert_eq!(
            Timing::between(Timing::NotReached, Timing::Reached(5)),
            Timing::NotReached
        );
        assert_eq!(
            Timing::between(Timing::Reached(20), Timing::Reached(200)),
            Timing::Reached(180)
        );
    }

    #[test]
    fn timing_serializes_flat() {
        let json = serde_json::to_string(&[Timing::Reached(42), Timing::NotReached]).unwrap();
        assert_eq!(json, "[42,null]");
        let back: Vec<Timing> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Timing::Reached(42), Timing::NotReached]);
    }

    #[test]
    fn zone_edges_are_inclusive() {
        let zone = TargetZone::new(40.0, -10.0, 60.0, 10.0);
        assert!(zone.contains(40.0, 0.0));
        assert!(zone.contains(60.0, 10.0));
        assert!(!zone.contains(60.1, 0.0));
        assert_eq!(zone.center(), (50.0, 0.0));
    }
}
