use reach_core::{ReachTrialSpec, StimulusLevel, TargetIndex, TrialState};

/// Audio cues of a reach trial, all anchored to the trial start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    Ready,
    Set,
    /// Opens the response window and reveals or switches the target hue.
    Go,
}

/// The one live reach trial of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachTrial {
    pub spec: ReachTrialSpec,
    pub state: TrialState,
    pub timestamps: TrialTimestamps,
    /// Level the target currently shows; `None` while hidden.
    pub displayed: Option<StimulusLevel>,
    pub selected: Option<TargetIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialTimestamps {
    /// Anchor every cue offset is measured from.
    pub start: u64,
    pub go_cue: Option<u64>,
    pub response: Option<u64>,
}

impl ReachTrial {
    pub fn new(spec: ReachTrialSpec, start: u64) -> Self {
        Self {
            spec,
            state: TrialState::Fixation,
            timestamps: TrialTimestamps {
                start,
                go_cue: None,
                response: None,
            },
            displayed: spec.pre_cue_level(),
            selected: None,
        }
    }

    /// Applies the go-cue: opens the response window and shows the go level.
    pub fn go(&mut self, at: u64) {
        self.timestamps.go_cue = Some(at);
        self.state = TrialState::Response;
        self.displayed = Some(self.spec.go_level());
    }

    pub fn respond(&mut self, at: u64, selected: Option<TargetIndex>) {
        self.timestamps.response = Some(at);
        self.selected = selected;
        self.state = TrialState::Complete;
    }

    pub fn accepts_release(&self) -> bool {
        self.state == TrialState::Response
    }
}
