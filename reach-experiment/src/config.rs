use std::path::Path;

use reach_core::{Error, Result, StimulusSet, TargetZone, CANDIDATE_COUNT};
use serde::{Deserialize, Serialize};

/// Offsets of the reach-trial cues from the trial anchor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CueTimeline {
    pub ready_ms: u64,
    pub set_ms: u64,
    pub go_ms: u64,
}

impl Default for CueTimeline {
    fn default() -> Self {
        Self {
            ready_ms: 500,
            set_ms: 1500,
            go_ms: 2500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    pub threshold_trials: usize,
    pub exposure_cap: u32,
    pub left_cap: u32,

    pub reference_hue: f32,
    pub candidate_hues: Vec<f32>,
    pub obvious_hue: f32,

    pub trials_per_type: usize,
    pub max_location_attempts: u32,
    pub movement_threshold_px: f32,
    pub target_zones: Vec<TargetZone>,

    pub cues: CueTimeline,
    pub response_window_ms: u64,
    pub inter_trial_interval_ms: u64,
    /// Complete reach-trial set required before upload.
    pub upload_set_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let standard = StimulusSet::standard();
        Self {
            threshold_trials: 100,
            exposure_cap: 10,
            left_cap: 5,
            reference_hue: standard.reference(),
            candidate_hues: standard.candidates().iter().map(|c| c.hue).collect(),
            obvious_hue: standard.obvious().hue,
            trials_per_type: 5,
            max_location_attempts: 10,
            movement_threshold_px: 5.0,
            // Four targets along the top edge of a 1080×1920 portrait screen,
            // origin button at the bottom centre.
            target_zones: vec![
                TargetZone::new(40.0, 200.0, 240.0, 400.0),
                TargetZone::new(300.0, 200.0, 500.0, 400.0),
                TargetZone::new(580.0, 200.0, 780.0, 400.0),
                TargetZone::new(840.0, 200.0, 1040.0, 400.0),
            ],
            cues: CueTimeline::default(),
            response_window_ms: 5000,
            inter_trial_interval_ms: 1000,
            upload_set_size: 15,
        }
    }
}

impl ProtocolConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let config: ProtocolConfig = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        tracing::info!(path = %path.display(), "protocol configuration loaded");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn stimulus_set(&self) -> Result<StimulusSet> {
        StimulusSet::new(self.reference_hue, &self.candidate_hues, self.obvious_hue)
    }

    pub fn target_count(&self) -> usize {
        self.target_zones.len()
    }

    pub fn reach_trial_count(&self) -> usize {
        self.trials_per_type * reach_core::ReachTrialType::ALL.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.candidate_hues.len() != CANDIDATE_COUNT {
            return Err(Error::Config(format!(
                "candidate_hues must hold {} values",
                CANDIDATE_COUNT
            )));
        }
        self.stimulus_set()?;

        if self.threshold_trials == 0 {
            return Err(Error::Config("threshold_trials must be positive".into()));
        }
        if self.exposure_cap == 0 {
            return Err(Error::Config("exposure_cap must be positive".into()));
        }
        if self.left_cap > self.exposure_cap {
            return Err(Error::Config(format!(
                "left_cap ({}) exceeds exposure_cap ({})",
                self.left_cap, self.exposure_cap
            )));
        }
        if self.trials_per_type == 0 {
            return Err(Error::Config("trials_per_type must be positive".into()));
        }
        if self.target_zones.is_empty() || self.target_zones.len() > u8::MAX as usize {
            return Err(Error::Config(format!(
                "target_zones must hold 1..={} zones",
                u8::MAX
            )));
        }
        if let Some(zone) = self
            .target_zones
            .iter()
            .find(|z| z.left > z.right || z.top > z.bottom)
        {
            return Err(Error::Config(format!("degenerate target zone {:?}", zone)));
        }
        if self.max_location_attempts == 0 {
            return Err(Error::Config("max_location_attempts must be positive".into()));
        }
        if !(self.movement_threshold_px >= 0.0) {
            return Err(Error::Config("movement_threshold_px must be non-negative".into()));
        }
        let CueTimeline {
            ready_ms,
            set_ms,
            go_ms,
        } = self.cues;
        if !(ready_ms <= set_ms && set_ms <= go_ms) {
            return Err(Error::Config(format!(
                "cue offsets must be ordered ready <= set <= go ({ready_ms}, {set_ms}, {go_ms})"
            )));
        }
        if self.upload_set_size != self.reach_trial_count() {
            return Err(Error::Config(format!(
                "upload_set_size ({}) must equal the reach trial count ({})",
                self.upload_set_size,
                self.reach_trial_count()
            )));
        }
        Ok(())
    }
}
