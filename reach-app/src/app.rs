use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reach_core::{Phase, ProtocolPhase, TrialState};
use reach_experiment::{
    ExperimentEvent, ExperimentSession, JsonFileSink, MemorySink, ProtocolConfig, RecordSink,
};
use reach_timing::SessionClock;
use std::time::Duration;

use crate::participant::{ReachPlan, ReachStyle, SimulatedParticipant, HOME};

/// Display refresh the driver loop is paced at.
const FRAME: Duration = Duration::from_millis(16);

pub struct RunOptions {
    pub participant: String,
    pub seed: u64,
    pub jnd: f32,
    pub abort_after: Option<usize>,
}

pub struct App<C: SessionClock, K: RecordSink = JsonFileSink> {
    session: ExperimentSession<ProtocolPhase, C, StdRng, K>,
    participant: SimulatedParticipant,
    clock: C,
    abort_after: Option<usize>,
    /// Presentation number and the time the participant answers it.
    answer_due: Option<(usize, u64)>,
    plan: Option<ReachPlan>,
}

impl<C: SessionClock, K: RecordSink> App<C, K> {
    pub fn new(config: ProtocolConfig, options: RunOptions, clock: C, sink: K) -> Result<Self> {
        let mut seeds = StdRng::seed_from_u64(options.seed);
        let protocol_rng = StdRng::from_rng(&mut seeds);
        let participant =
            SimulatedParticipant::new(StdRng::from_rng(&mut seeds), options.jnd);
        let session = ExperimentSession::new(
            config,
            options.participant,
            clock.clone(),
            protocol_rng,
            sink,
        )?;

        Ok(Self {
            session,
            participant,
            clock,
            abort_after: options.abort_after,
            answer_due: None,
            plan: None,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        tracing::info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            participant = self.session.participant_id(),
            "session ready"
        );

        if !self.session.handle_event(ExperimentEvent::Start) {
            bail!("session did not leave the welcome phase");
        }

        let mut last_progress = None;
        while self.step() {
            let progress = self.session.trial_progress();
            if progress != last_progress {
                if let Some((current, total)) = progress {
                    tracing::debug!(phase = ?self.session.current_phase(), current, total, "progress");
                }
                last_progress = progress;
            }
        }

        if self.session.is_aborted() {
            tracing::warn!(
                participant = self.session.participant_id(),
                completed = self.session.results().len(),
                "session abandoned before the reach set was complete"
            );
        }
        Ok(())
    }

    /// Advances one frame. Returns false once the session is over.
    fn step(&mut self) -> bool {
        if self.session.is_finished() {
            return false;
        }
        self.clock.sleep(FRAME);

        for event in self.session.update() {
            self.session.handle_event(event);
        }

        if self.session.current_phase().is_threshold() {
            self.answer_threshold();
        } else if self.session.current_phase().is_reaching() {
            if self
                .abort_after
                .is_some_and(|n| self.session.results().len() >= n)
            {
                self.session.handle_event(ExperimentEvent::Abort);
                return false;
            }
            self.drive_reach();
        }
        !self.session.is_finished()
    }

    fn answer_threshold(&mut self) {
        let Some(presentation) = self.session.current_presentation().copied() else {
            return;
        };
        let now = self.clock.now_ms();
        match self.answer_due {
            Some((trial, due)) if trial == presentation.trial_number => {
                if now >= due {
                    let side = self.participant.choose(&presentation);
                    self.session
                        .handle_event(ExperimentEvent::ThresholdChoice(side));
                }
            }
            _ => {
                let due = now + self.participant.decision_time_ms();
                self.answer_due = Some((presentation.trial_number, due));
            }
        }
    }

    fn drive_reach(&mut self) {
        let Some(trial) = self.session.current_trial().cloned() else {
            self.plan = None;
            return;
        };

        let plan = match self.plan {
            Some(plan) if plan.trial == trial.spec.index => plan,
            _ => {
                let plan = self.participant.plan_reach(
                    trial.spec.index,
                    trial.spec.target as usize,
                    &self.session.config.target_zones,
                );
                if plan.style != ReachStyle::Tap {
                    let (x, y) = HOME;
                    self.session
                        .handle_event(ExperimentEvent::TouchDown { x, y });
                }
                self.plan = Some(plan);
                plan
            }
        };

        let (TrialState::Response, Some(go)) = (trial.state, trial.timestamps.go_cue) else {
            return;
        };
        let t = self.clock.now_ms().saturating_sub(go);

        match plan.style {
            ReachStyle::Freeze => {}
            ReachStyle::Tap => {
                if t >= plan.release_at() {
                    let (x, y) = plan.end;
                    self.session.handle_event(ExperimentEvent::Release { x, y });
                }
            }
            ReachStyle::Drag => {
                let Some((x, y)) = plan.position_at(t) else {
                    return;
                };
                if t >= plan.release_at() {
                    self.session.handle_event(ExperimentEvent::Release { x, y });
                } else {
                    self.session.handle_event(ExperimentEvent::TouchMove { x, y });
                }
            }
        }
    }

    pub fn session(&self) -> &ExperimentSession<ProtocolPhase, C, StdRng, K> {
        &self.session
    }
}

/// Prints one line per participant of a records file.
pub fn print_summary(records: &MemorySink) {
    for id in records.participant_ids() {
        let trials = records.reach_trials(id);
        let correct = trials.iter().filter(|r| r.correct).count();
        let anomalies = trials
            .iter()
            .filter(|r| r.flags.is_movement_anomaly())
            .count();
        let threshold = records
            .participant(id)
            .and_then(|p| p.threshold.as_ref())
            .map_or("-".to_string(), |t| format!("{:.1}", t.threshold.hue));
        println!(
            "{id:<12} threshold={threshold:<6} trials={:>2}/{} correct={correct:>2} anomalies={anomalies:>2} upload={}",
            trials.len(),
            records.set_size(),
            if records.is_upload_eligible(id) { "ready" } else { "held" },
        );
    }
}
