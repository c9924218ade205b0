pub mod error;
pub mod movement;
pub mod phase;
pub mod stimulus;
pub mod trial;

pub use error::{Error, Result};
pub use movement::{
    KinematicsResult, MovementProfile, PathPoint, TargetZone, Timing, TouchSample,
};
pub use phase::{Phase, ProtocolPhase};
pub use stimulus::{StimulusLevel, StimulusSet, CANDIDATE_COUNT};
pub use trial::{
    CandidateSummary, Presentation, ReachTrialRecord, ReachTrialSpec, ReachTrialType, Side,
    TargetIndex, ThresholdOutcome, ThresholdStats, TrialFlags, TrialState,
};
