pub mod clock;
pub mod cue;

pub use clock::{HighPrecisionClock, ManualClock, SessionClock};
pub use cue::{CueScheduler, FiredCue};
