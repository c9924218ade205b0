use serde::{Deserialize, Serialize};

use crate::movement::{KinematicsResult, MovementProfile};
use crate::stimulus::StimulusLevel;

/// Index of one of the four reach targets.
pub type TargetIndex = u8;

/// Side of the screen in a 2AFC presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// One 2AFC presentation: the candidate on one side, the reference on the other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Presentation {
    pub trial_number: usize,
    pub candidate: usize,
    pub level: StimulusLevel,
    pub reference_hue: f32,
    pub candidate_side: Side,
}

impl Presentation {
    /// Hue shown on `side`.
    pub fn hue_on(&self, side: Side) -> f32 {
        if side == self.candidate_side {
            self.level.hue
        } else {
            self.reference_hue
        }
    }
}

/// Per-candidate counters of a threshold session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdStats {
    times_shown: u32,
    times_shown_on_left: u32,
    times_correct: u32,
}

impl ThresholdStats {
    pub fn times_shown(&self) -> u32 {
        self.times_shown
    }

    pub fn times_shown_on_left(&self) -> u32 {
        self.times_shown_on_left
    }

    pub fn times_correct(&self) -> u32 {
        self.times_correct
    }

    /// Counts one answered presentation.
    pub fn record(&mut self, side: Side, correct: bool) {
        self.times_shown += 1;
        if side == Side::Left {
            self.times_shown_on_left += 1;
        }
        if correct {
            self.times_correct += 1;
        }
    }

    pub fn percent_correct(&self) -> Option<f64> {
        (self.times_shown > 0)
            .then(|| 100.0 * self.times_correct as f64 / self.times_shown as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    pub level: StimulusLevel,
    pub times_shown: u32,
    pub times_shown_on_left: u32,
    pub times_correct: u32,
    pub percent_correct: Option<f64>,
}

impl CandidateSummary {
    pub fn new(level: StimulusLevel, stats: &ThresholdStats) -> Self {
        Self {
            level,
            times_shown: stats.times_shown(),
            times_shown_on_left: stats.times_shown_on_left(),
            times_correct: stats.times_correct(),
            percent_correct: stats.percent_correct(),
        }
    }
}

/// Persisted result of a completed threshold session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdOutcome {
    pub participant_id: String,
    #[serde(rename = "jndThreshold")]
    pub threshold: StimulusLevel,
    pub trials_run: usize,
    pub ended_early: bool,
    pub candidates: Vec<CandidateSummary>,
}

/// Reach trial conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReachTrialType {
    /// Target shown at the obvious level before the go-cue.
    PreSupra,
    /// Target shown at the threshold level before the go-cue, switched to
    /// the obvious level at the go-cue.
    PreJnd,
    /// Obvious level revealed at the go-cue, nothing shown before.
    ConcurrentSupra,
}

impl ReachTrialType {
    pub const ALL: [ReachTrialType; 3] = [
        ReachTrialType::PreSupra,
        ReachTrialType::PreJnd,
        ReachTrialType::ConcurrentSupra,
    ];

    pub fn has_pre_exposure(self) -> bool {
        !matches!(self, ReachTrialType::ConcurrentSupra)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReachTrialSpec {
    pub index: usize,
    pub trial_type: ReachTrialType,
    pub target: TargetIndex,
    pub initial: StimulusLevel,
    pub final_level: Option<StimulusLevel>,
    /// Same (type, target) as the previous trial, accepted after the
    /// location draw budget ran out.
    pub duplicate_neighbor: bool,
}

impl ReachTrialSpec {
    /// Level visible before the go-cue, if any.
    pub fn pre_cue_level(&self) -> Option<StimulusLevel> {
        self.trial_type.has_pre_exposure().then_some(self.initial)
    }

    /// Level visible from the go-cue on.
    pub fn go_level(&self) -> StimulusLevel {
        self.final_level.unwrap_or(self.initial)
    }
}

/// Reach trial state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    /// Finger on the origin, cues counting down.
    Fixation,
    /// Go-cue fired, movement is being tracked.
    Response,
    Complete,
}

/// Anomalies kept on the record so analysis can exclude or study them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialFlags {
    /// Released without a recorded movement path. Never set on a timeout.
    pub no_significant_movement: bool,
    /// Released without the path ever entering the target zone.
    pub target_not_reached: bool,
    /// Released on a zone the recorded path never entered.
    pub selection_not_reached: bool,
    pub duplicate_neighbor: bool,
}

impl TrialFlags {
    /// A response the recorded movement does not account for.
    pub fn is_movement_anomaly(&self) -> bool {
        self.no_significant_movement || self.selection_not_reached
    }
}

/// Recorded result per reach trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReachTrialRecord {
    pub participant_id: String,
    pub trial_number: usize,
    pub trial_type: ReachTrialType,
    pub target_index: TargetIndex,
    pub selected_index: Option<TargetIndex>,
    pub correct: bool,
    pub initial_hue: f32,
    pub final_hue: Option<f32>,
    pub trial_start_timestamp: u64,
    #[serde(rename = "goBeepTimestamp")]
    pub go_cue_timestamp: u64,
    pub response_timestamp: u64,
    #[serde(flatten)]
    pub kinematics: KinematicsResult,
    #[serde(flatten)]
    pub profile: MovementProfile,
    #[serde(flatten)]
    pub flags: TrialFlags,
}

impl ReachTrialRecord {
    pub fn key(&self) -> (&str, usize) {
        (&self.participant_id, self.trial_number)
    }
}
