use super::config::ProtocolConfig;
use super::kinematics::MovementKinematicsTracker;
use super::profile;
use super::sequencer::TrialSequencer;
use super::sink::RecordSink;
use super::threshold::{ThresholdEstimator, ThresholdStep};
use super::trial::{CueKind, ReachTrial};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reach_core::{
    Error, Phase, Presentation, ReachTrialRecord, Result, Side, StimulusLevel, StimulusSet,
    TargetIndex, TouchSample, TrialFlags, TrialState,
};
use reach_timing::{CueScheduler, FiredCue, SessionClock};

#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentEvent {
    /// Participant confirmed the welcome screen.
    Start,
    ThresholdChoice(Side),
    TouchDown { x: f32, y: f32 },
    TouchMove { x: f32, y: f32 },
    Release { x: f32, y: f32 },
    Cue(FiredCue<CueKind>),
    Timeout,
    PhaseComplete,
    /// Session abandoned; partial reach data is discarded.
    Abort,
}

pub struct ExperimentSession<P, C, R, K>
where
    P: Phase,
    C: SessionClock,
    R: Rng,
    K: RecordSink,
{
    pub phase: P,
    pub config: ProtocolConfig,
    participant_id: String,
    clock: C,
    rng: R,
    sink: K,
    stimuli: StimulusSet,
    estimator: Option<ThresholdEstimator<StdRng>>,
    threshold: Option<StimulusLevel>,
    restarts: u32,
    sequencer: Option<TrialSequencer>,
    tracker: MovementKinematicsTracker,
    cues: CueScheduler<CueKind>,
    current: Option<ReachTrial>,
    next_trial_at: Option<u64>,
    results: Vec<ReachTrialRecord>,
    aborted: bool,
}

impl<P, C, R, K> ExperimentSession<P, C, R, K>
where
    P: Phase,
    C: SessionClock,
    R: Rng,
    K: RecordSink,
{
    pub fn new(
        config: ProtocolConfig,
        participant_id: impl Into<String>,
        clock: C,
        rng: R,
        sink: K,
    ) -> Result<Self> {
        config.validate()?;
        let stimuli = config.stimulus_set()?;
        let tracker = MovementKinematicsTracker::new(config.movement_threshold_px);
        Ok(Self {
            phase: P::default(),
            config,
            participant_id: participant_id.into(),
            clock,
            rng,
            sink,
            stimuli,
            estimator: None,
            threshold: None,
            restarts: 0,
            sequencer: None,
            tracker,
            cues: CueScheduler::new(),
            current: None,
            next_trial_at: None,
            results: Vec::new(),
            aborted: false,
        })
    }

    pub fn advance_phase(&mut self) -> bool {
        if let Some(next) = self.phase.next() {
            tracing::info!(from = ?self.phase, to = ?next, "phase transition");
            self.phase = next;
            true
        } else {
            false
        }
    }

    /// Polls time-driven transitions: cues, response timeouts, the next
    /// trial after the inter-trial interval, and threshold draws.
    pub fn update(&mut self) -> Vec<ExperimentEvent> {
        let mut events = Vec::new();

        match self.phase {
            phase if phase.is_threshold() => {
                if let Some(estimator) = &mut self.estimator {
                    if let ThresholdStep::Done(_) = estimator.next_trial() {
                        events.push(ExperimentEvent::PhaseComplete);
                    }
                }
            }
            phase if phase.is_reaching() => {
                let now = self.clock.now_ms();
                match &self.current {
                    Some(trial) => {
                        events.extend(self.cues.poll(now).into_iter().map(ExperimentEvent::Cue));
                        if let (TrialState::Response, Some(go)) =
                            (trial.state, trial.timestamps.go_cue)
                        {
                            if now.saturating_sub(go) >= self.config.response_window_ms {
                                events.push(ExperimentEvent::Timeout);
                            }
                        }
                    }
                    None => {
                        if self.next_trial_at.is_some_and(|at| now >= at) {
                            self.next_trial_at = None;
                            if !self.start_reach_trial() {
                                events.push(ExperimentEvent::PhaseComplete);
                            }
                        }
                    }
                }
            }
            _ => {}
        }

        events
    }

    pub fn handle_event(&mut self, event: ExperimentEvent) -> bool {
        match (&self.phase, event) {
            (phase, ExperimentEvent::Start) if phase.is_welcome() => {
                if self.advance_phase() {
                    self.begin_threshold();
                    true
                } else {
                    false
                }
            }

            (phase, ExperimentEvent::ThresholdChoice(side)) if phase.is_threshold() => self
                .estimator
                .as_mut()
                .and_then(|e| e.record_response(side))
                .is_some(),

            (phase, ExperimentEvent::PhaseComplete) if phase.is_threshold() => {
                self.complete_threshold()
            }

            (phase, ExperimentEvent::Cue(fired)) if phase.is_reaching() => self.apply_cue(fired),

            (phase, ExperimentEvent::TouchDown { x, y }) if phase.is_reaching() => {
                match self.current.as_ref().map(|t| t.state) {
                    Some(TrialState::Fixation) => {
                        self.tracker.record_origin(x, y);
                        true
                    }
                    Some(TrialState::Response) => self.feed(x, y),
                    _ => false,
                }
            }

            (phase, ExperimentEvent::TouchMove { x, y }) if phase.is_reaching() => self.feed(x, y),

            (phase, ExperimentEvent::Release { x, y }) if phase.is_reaching() => {
                if !self.current.as_ref().is_some_and(|t| t.accepts_release()) {
                    tracing::debug!(x, y, "release outside the response window ignored");
                    return false;
                }
                self.feed(x, y);
                let selected = self.target_at(x, y);
                self.complete_current_trial(selected);
                true
            }

            (phase, ExperimentEvent::Timeout) if phase.is_reaching() => {
                if self.current.as_ref().is_some_and(|t| t.accepts_release()) {
                    tracing::info!("response window elapsed without release");
                    self.complete_current_trial(None);
                    true
                } else {
                    false
                }
            }

            (phase, ExperimentEvent::PhaseComplete) if phase.is_reaching() => {
                self.advance_phase();
                self.analyze_results();
                true
            }

            (phase, ExperimentEvent::Abort) if !phase.is_debrief() => {
                self.abandon();
                true
            }

            _ => false, // Event not handled
        }
    }

    fn begin_threshold(&mut self) {
        let rng = StdRng::from_rng(&mut self.rng);
        let mut estimator = ThresholdEstimator::new(self.stimuli.clone(), &self.config, rng);
        // Draw the first presentation right away so it is ready to show.
        estimator.next_trial();
        self.estimator = Some(estimator);
        tracing::info!(
            participant = %self.participant_id,
            trials = self.config.threshold_trials,
            restarts = self.restarts,
            "threshold procedure started"
        );
    }

    fn complete_threshold(&mut self) -> bool {
        let Some(estimator) = self.estimator.take() else {
            return false;
        };

        let outcome = match estimator.finish(&self.participant_id) {
            Ok(outcome) => outcome,
            Err(Error::EstimationFailure) => {
                self.restarts += 1;
                tracing::warn!(
                    participant = %self.participant_id,
                    restarts = self.restarts,
                    "threshold estimation failed, restarting the procedure"
                );
                self.begin_threshold();
                return true;
            }
            Err(e) => {
                tracing::error!(error = %e, "threshold session could not be finished");
                return false;
            }
        };

        tracing::info!(
            participant = %self.participant_id,
            hue = outcome.threshold.hue,
            distance = outcome.threshold.distance,
            trials = outcome.trials_run,
            ended_early = outcome.ended_early,
            "threshold estimated"
        );
        if let Err(e) = self.sink.save_threshold_outcome(&outcome) {
            tracing::warn!(error = %e, "failed to save threshold outcome, continuing");
        }

        self.threshold = Some(outcome.threshold);
        match TrialSequencer::new(outcome.threshold, &self.stimuli, &self.config, &mut self.rng) {
            Ok(sequencer) => self.sequencer = Some(sequencer),
            Err(e) => {
                tracing::error!(error = %e, "reach sequence could not be built");
                return false;
            }
        }

        if self.advance_phase() && self.phase.is_reaching() {
            self.start_reach_trial();
        }
        true
    }

    /// Starts the next reach trial; false once the sequence is exhausted.
    pub fn start_reach_trial(&mut self) -> bool {
        let Some(spec) = self.sequencer.as_mut().and_then(|s| s.next_trial()) else {
            return false;
        };
        let Some(&zone) = self.config.target_zones.get(spec.target as usize) else {
            tracing::error!(target_index = spec.target, "no zone configured for target");
            return false;
        };

        let anchor = self.clock.now_ms();
        self.tracker.reset();
        self.tracker.arm_target_zone(zone, spec.target);

        let cues = &self.config.cues;
        self.cues.anchor(
            anchor,
            [
                (cues.ready_ms, CueKind::Ready),
                (cues.set_ms, CueKind::Set),
                (cues.go_ms, CueKind::Go),
            ],
        );

        tracing::debug!(
            trial = spec.index,
            trial_type = ?spec.trial_type,
            target_index = spec.target,
            anchor,
            "reach trial started"
        );
        self.current = Some(ReachTrial::new(spec, anchor));
        true
    }

    fn apply_cue(&mut self, fired: FiredCue<CueKind>) -> bool {
        let Some(trial) = &mut self.current else {
            return false;
        };
        tracing::debug!(cue = ?fired.cue, scheduled_at = fired.scheduled_at, fired_at = fired.fired_at, "cue");
        if fired.cue == CueKind::Go {
            self.tracker.record_cue(fired.fired_at);
            trial.go(fired.fired_at);
        }
        true
    }

    fn feed(&mut self, x: f32, y: f32) -> bool {
        if self.current.is_none() {
            return false;
        }
        let sample = TouchSample::new(x, y, self.clock.now_ms());
        self.tracker.on_sample(sample)
    }

    fn target_at(&self, x: f32, y: f32) -> Option<TargetIndex> {
        self.config
            .target_zones
            .iter()
            .position(|zone| zone.contains(x, y))
            .map(|i| i as TargetIndex)
    }

    fn path_entered(&self, index: TargetIndex) -> bool {
        self.config
            .target_zones
            .get(index as usize)
            .is_some_and(|zone| self.tracker.samples().iter().any(|s| zone.contains(s.x, s.y)))
    }

    /// Completes the current trial and stores its record.
    fn complete_current_trial(&mut self, selected: Option<TargetIndex>) {
        let Some(mut trial) = self.current.take() else {
            return;
        };
        let now = self.clock.now_ms();
        trial.respond(now, selected);

        let kinematics = self.tracker.finalize(now);
        let profile = profile::analyze(&kinematics.path);
        let correct = selected.is_some_and(|s| TrialSequencer::check_response(s, trial.spec.target));
        let selection_not_reached = match selected {
            Some(s) if s == trial.spec.target => !kinematics.target_reached.is_reached(),
            Some(s) => !self.path_entered(s),
            None => false,
        };
        let flags = TrialFlags {
            no_significant_movement: selected.is_some() && !self.tracker.has_significant_movement(),
            target_not_reached: !kinematics.target_reached.is_reached(),
            selection_not_reached,
            duplicate_neighbor: trial.spec.duplicate_neighbor,
        };
        if flags.is_movement_anomaly() {
            tracing::warn!(
                trial = trial.spec.index,
                ?selected,
                no_significant_movement = flags.no_significant_movement,
                selection_not_reached = flags.selection_not_reached,
                "movement anomaly flagged"
            );
        }

        let record = ReachTrialRecord {
            participant_id: self.participant_id.clone(),
            trial_number: trial.spec.index,
            trial_type: trial.spec.trial_type,
            target_index: trial.spec.target,
            selected_index: selected,
            correct,
            initial_hue: trial.spec.initial.hue,
            final_hue: trial.spec.final_level.map(|l| l.hue),
            trial_start_timestamp: trial.timestamps.start,
            go_cue_timestamp: trial.timestamps.go_cue.unwrap_or(now),
            response_timestamp: now,
            kinematics,
            profile,
            flags,
        };

        tracing::debug!(
            trial = record.trial_number,
            correct,
            reaction_time = ?record.kinematics.reaction_time.value(),
            movement_time = ?record.kinematics.movement_time.value(),
            "reach trial complete"
        );

        if let Err(e) = self.sink.save_reach_trial(&record) {
            tracing::warn!(trial = record.trial_number, error = %e, "failed to save reach trial, continuing");
        }
        self.results.push(record);

        self.cues.cancel();
        self.next_trial_at = Some(now + self.config.inter_trial_interval_ms);
    }

    fn abandon(&mut self) {
        tracing::warn!(participant = %self.participant_id, phase = ?self.phase, "session abandoned");
        self.cues.cancel();
        self.tracker.reset();
        self.current = None;
        self.next_trial_at = None;
        self.estimator = None;
        self.aborted = true;
        match self.sink.discard_incomplete(&self.participant_id) {
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to discard partial reach trials"),
        }
        while self.advance_phase() {}
    }

    pub fn analyze_results(&self) {
        if self.results.is_empty() {
            return;
        }
        let correct = self.results.iter().filter(|r| r.correct).count();
        let anomalies = self
            .results
            .iter()
            .filter(|r| r.flags.is_movement_anomaly())
            .count();
        let reaction_times: Vec<f64> = self
            .results
            .iter()
            .filter_map(|r| r.kinematics.reaction_time.value())
            .map(|rt| rt as f64)
            .collect();
        let mean_rt = if reaction_times.is_empty() {
            0.0
        } else {
            reaction_times.iter().sum::<f64>() / reaction_times.len() as f64
        };

        tracing::info!(
            participant = %self.participant_id,
            trials = self.results.len(),
            correct,
            anomalies,
            mean_reaction_time_ms = mean_rt,
            "reach task complete"
        );
    }

    /// Presentation waiting for a threshold response, if any.
    pub fn current_presentation(&self) -> Option<&Presentation> {
        self.estimator.as_ref().and_then(|e| e.pending())
    }

    pub fn current_trial(&self) -> Option<&ReachTrial> {
        self.current.as_ref()
    }

    pub fn current_phase(&self) -> &P {
        &self.phase
    }

    pub fn threshold(&self) -> Option<StimulusLevel> {
        self.threshold
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_debrief()
    }

    pub fn sequencer(&self) -> Option<&TrialSequencer> {
        self.sequencer.as_ref()
    }

    pub fn tracker(&self) -> &MovementKinematicsTracker {
        &self.tracker
    }

    pub fn next_cue_due(&self) -> Option<u64> {
        self.cues.next_due()
    }

    /// Reach records of this session
    pub fn results(&self) -> &[ReachTrialRecord] {
        &self.results
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        if self.phase.is_threshold() {
            self.estimator
                .as_ref()
                .map(|e| (e.trials_run() + 1, e.max_trials()))
        } else if self.phase.is_reaching() {
            self.sequencer
                .as_ref()
                .map(|s| (s.served(), s.sequence().len()))
        } else {
            None
        }
    }
}
