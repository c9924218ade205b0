pub mod config;
pub mod kinematics;
pub mod profile;
pub mod sequencer;
pub mod sink;
pub mod state;
pub mod threshold;
pub mod trial;

pub use config::{CueTimeline, ProtocolConfig};
pub use kinematics::{MovementKinematicsTracker, MOVEMENT_THRESHOLD_PX};
pub use sequencer::TrialSequencer;
pub use sink::{JsonFileSink, MemorySink, ParticipantRecords, RecordSink};
pub use state::{ExperimentEvent, ExperimentSession};
pub use threshold::{DoneReason, ThresholdEstimator, ThresholdStep};
pub use trial::{CueKind, ReachTrial, TrialTimestamps};
