//! Per-trial movement kinematics from the raw touch stream.

use reach_core::{KinematicsResult, PathPoint, TargetIndex, TargetZone, Timing, TouchSample};

/// Distance from the origin (px) a touch must exceed to count as movement.
pub const MOVEMENT_THRESHOLD_PX: f32 = 5.0;

/// Tracks one reach trial at a time. Call [`reset`](Self::reset) before every
/// trial, aborted ones included.
#[derive(Debug, Clone)]
pub struct MovementKinematicsTracker {
    movement_threshold_px: f32,
    zone: Option<(TargetZone, TargetIndex)>,
    cue: Option<u64>,
    origin: Option<(f32, f32)>,
    first_movement: Timing,
    target_reached: Timing,
    samples: Vec<TouchSample>,
    path_length: f64,
    finalized: bool,
}

impl MovementKinematicsTracker {
    pub fn new(movement_threshold_px: f32) -> Self {
        Self {
            movement_threshold_px,
            zone: None,
            cue: None,
            origin: None,
            first_movement: Timing::NotReached,
            target_reached: Timing::NotReached,
            samples: Vec::with_capacity(256),
            path_length: 0.0,
            finalized: false,
        }
    }

    pub fn reset(&mut self) {
        self.zone = None;
        self.cue = None;
        self.origin = None;
        self.first_movement = Timing::NotReached;
        self.target_reached = Timing::NotReached;
        self.samples.clear();
        self.path_length = 0.0;
        self.finalized = false;
    }

    pub fn arm_target_zone(&mut self, bounds: TargetZone, index: TargetIndex) {
        self.zone = Some((bounds, index));
    }

    pub fn record_cue(&mut self, timestamp_ms: u64) {
        self.cue = Some(timestamp_ms);
    }

    pub fn record_origin(&mut self, x: f32, y: f32) {
        self.origin = Some((x, y));
    }

    /// Feeds one touch sample. Returns true when it was appended to the path.
    ///
    /// Samples before the go-cue are dropped. Until movement starts, samples
    /// within the noise threshold of the origin are dropped too.
    pub fn on_sample(&mut self, sample: TouchSample) -> bool {
        if self.finalized {
            return false;
        }
        let Some(cue) = self.cue else {
            return false;
        };
        if sample.timestamp_ms < cue {
            return false;
        }

        let (ox, oy) = *self.origin.get_or_insert((sample.x, sample.y));
        if !self.first_movement.is_reached() {
            if sample.distance_to(ox, oy) <= self.movement_threshold_px as f64 {
                return false;
            }
            self.first_movement = Timing::Reached(sample.timestamp_ms);
            tracing::trace!(t = sample.timestamp_ms, "movement started");
        }

        if let Some(last) = self.samples.last() {
            self.path_length += sample.distance_to(last.x, last.y);
        }
        self.samples.push(sample);

        if !self.target_reached.is_reached() {
            if let Some((zone, index)) = self.zone {
                if zone.contains(sample.x, sample.y) {
                    self.target_reached = Timing::Reached(sample.timestamp_ms);
                    tracing::trace!(t = sample.timestamp_ms, zone = index, "target reached");
                }
            }
        }
        true
    }

    /// Derives the trial's metrics. Later samples are ignored until the next
    /// reset; calling this again yields the same result.
    pub fn finalize(&mut self, response_timestamp_ms: u64) -> KinematicsResult {
        self.finalized = true;
        let cue = self.cue.unwrap_or(response_timestamp_ms);

        let reaction_time = self.first_movement.since(cue);
        let movement_time = Timing::between(self.first_movement, self.target_reached);
        let average_speed = match movement_time {
            Timing::Reached(ms) if ms > 0 => self.path_length / (ms as f64 / 1000.0),
            _ => 0.0,
        };

        let path = self
            .samples
            .iter()
            .map(|s| PathPoint {
                x: s.x,
                y: s.y,
                t: s.timestamp_ms.saturating_sub(cue),
            })
            .collect();

        KinematicsResult {
            first_movement: self.first_movement,
            target_reached: self.target_reached,
            reaction_time,
            movement_time,
            total_response_time_ms: response_timestamp_ms.saturating_sub(cue),
            path,
            path_length: self.path_length,
            average_speed,
        }
    }

    /// Movement started and produced more than two path points.
    pub fn has_significant_movement(&self) -> bool {
        self.first_movement.is_reached() && self.samples.len() > 2
    }

    pub fn path_length(&self) -> f64 {
        self.path_length
    }

    pub fn samples(&self) -> &[TouchSample] {
        &self.samples
    }

    pub fn first_movement(&self) -> Timing {
        self.first_movement
    }

    pub fn target_reached(&self) -> Timing {
        self.target_reached
    }

    pub fn target_index(&self) -> Option<TargetIndex> {
        self.zone.map(|(_, index)| index)
    }

    pub fn cue(&self) -> Option<u64> {
        self.cue
    }
}

impl Default for MovementKinematicsTracker {
    fn default() -> Self {
        Self::new(MOVEMENT_THRESHOLD_PX)
    }
}
