//! Two-alternative forced-choice threshold estimation.
//!
//! Each trial shows one candidate hue beside the reference hue and asks the
//! participant which side differs. Candidates are drawn uniformly among those
//! still under the exposure cap. The estimated JND is the farthest candidate
//! the participant could not discriminate better than chance.

use rand::Rng;
use reach_core::{
    CandidateSummary, Error, Presentation, Result, Side, StimulusLevel, StimulusSet,
    ThresholdOutcome, ThresholdStats,
};

use crate::config::ProtocolConfig;

/// Detection line, in percent correct.
pub const CHANCE_PERCENT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// All configured trials were run.
    Completed,
    /// Every candidate hit its exposure cap first. Not an error.
    ExhaustedCandidatePool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdStep {
    Present(Presentation),
    Done(DoneReason),
}

pub struct ThresholdEstimator<R: Rng> {
    stimuli: StimulusSet,
    stats: Vec<ThresholdStats>,
    rng: R,
    max_trials: usize,
    exposure_cap: u32,
    left_cap: u32,
    trials_run: usize,
    pending: Option<Presentation>,
    done: Option<DoneReason>,
}

impl<R: Rng> ThresholdEstimator<R> {
    pub fn new(stimuli: StimulusSet, config: &ProtocolConfig, rng: R) -> Self {
        Self::with_limits(
            stimuli,
            config.threshold_trials,
            config.exposure_cap,
            config.left_cap,
            rng,
        )
    }

    pub fn with_limits(
        stimuli: StimulusSet,
        max_trials: usize,
        exposure_cap: u32,
        left_cap: u32,
        rng: R,
    ) -> Self {
        let stats = vec![ThresholdStats::default(); stimuli.len()];
        Self {
            stimuli,
            stats,
            rng,
            max_trials,
            exposure_cap,
            left_cap,
            trials_run: 0,
            pending: None,
            done: None,
        }
    }

    /// Draws the next presentation.
    ///
    /// While a presentation is unanswered the same one is returned again, so
    /// counters are always up to date before a new draw reads them.
    pub fn next_trial(&mut self) -> ThresholdStep {
        if let Some(pending) = self.pending {
            return ThresholdStep::Present(pending);
        }
        if let Some(reason) = self.done {
            return ThresholdStep::Done(reason);
        }
        if self.trials_run >= self.max_trials {
            return self.finish_with(DoneReason::Completed);
        }

        let eligible: Vec<usize> = self
            .stats
            .iter()
            .enumerate()
            .filter(|(_, s)| s.times_shown() < self.exposure_cap)
            .map(|(i, _)| i)
            .collect();
        if eligible.is_empty() {
            return self.finish_with(DoneReason::ExhaustedCandidatePool);
        }

        let candidate = eligible[self.rng.random_range(0..eligible.len())];

        // Soft lateral cap: coin flip until the left quota is used up, then
        // always right. Deliberately not a forced 50/50 split.
        let candidate_side = if self.stats[candidate].times_shown_on_left() < self.left_cap {
            if self.rng.random_bool(0.5) {
                Side::Left
            } else {
                Side::Right
            }
        } else {
            Side::Right
        };

        let level = self.stimuli.candidates()[candidate];
        let presentation = Presentation {
            trial_number: self.trials_run,
            candidate,
            level,
            reference_hue: self.stimuli.reference(),
            candidate_side,
        };
        tracing::debug!(
            trial = self.trials_run,
            candidate,
            hue = level.hue,
            side = ?candidate_side,
            "threshold trial presented"
        );
        self.pending = Some(presentation);
        ThresholdStep::Present(presentation)
    }

    fn finish_with(&mut self, reason: DoneReason) -> ThresholdStep {
        match reason {
            DoneReason::Completed => {
                tracing::info!(trials = self.trials_run, "threshold session complete")
            }
            DoneReason::ExhaustedCandidatePool => tracing::info!(
                trials = self.trials_run,
                planned = self.max_trials,
                "every candidate reached its exposure cap, ending threshold session early"
            ),
        }
        self.done = Some(reason);
        ThresholdStep::Done(reason)
    }

    /// Scores the pending presentation. Returns whether the choice was
    /// correct, or `None` when nothing was pending.
    pub fn record_response(&mut self, chosen: Side) -> Option<bool> {
        let Some(presentation) = self.pending.take() else {
            tracing::warn!(?chosen, "response without a pending presentation ignored");
            return None;
        };

        let correct = chosen == presentation.candidate_side;
        self.stats[presentation.candidate].record(presentation.candidate_side, correct);
        self.trials_run += 1;
        tracing::debug!(
            trial = presentation.trial_number,
            candidate = presentation.candidate,
            correct,
            "threshold response recorded"
        );
        Some(correct)
    }

    /// Farthest candidate at or under the detection line; the nearest
    /// candidate when everything was discriminated; `None` when no
    /// candidate was ever answered.
    pub fn compute_threshold(&self) -> Option<StimulusLevel> {
        let scored: Vec<(usize, f64)> = self
            .stats
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.percent_correct().map(|pct| (i, pct)))
            .collect();
        if scored.is_empty() {
            return None;
        }

        // Candidates are ordered by distance, so the highest index is the farthest.
        let index = scored
            .iter()
            .filter(|(_, pct)| *pct <= CHANCE_PERCENT)
            .map(|(i, _)| *i)
            .max()
            .unwrap_or(0);
        self.stimuli.candidate(index)
    }

    /// Consumes the session into its persisted summary.
    pub fn finish(self, participant_id: &str) -> Result<ThresholdOutcome> {
        let threshold = self.compute_threshold().ok_or(Error::EstimationFailure)?;
        let candidates = self
            .stimuli
            .candidates()
            .iter()
            .zip(&self.stats)
            .map(|(level, stats)| CandidateSummary::new(*level, stats))
            .collect();
        Ok(ThresholdOutcome {
            participant_id: participant_id.to_string(),
            threshold,
            trials_run: self.trials_run,
            ended_early: self.ended_early(),
            candidates,
        })
    }

    pub fn ended_early(&self) -> bool {
        self.done == Some(DoneReason::ExhaustedCandidatePool) && self.trials_run < self.max_trials
    }

    pub fn stats(&self) -> &[ThresholdStats] {
        &self.stats
    }

    pub fn trials_run(&self) -> usize {
        self.trials_run
    }

    pub fn max_trials(&self) -> usize {
        self.max_trials
    }

    pub fn stimuli(&self) -> &StimulusSet {
        &self.stimuli
    }

    pub fn pending(&self) -> Option<&Presentation> {
        self.pending.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.done.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn estimator(seed: u64) -> ThresholdEstimator<StdRng> {
        ThresholdEstimator::new(
            StimulusSet::standard(),
            &ProtocolConfig::default(),
            StdRng::seed_from_u64(seed),
        )
    }

    /// Runs the session to completion, answering with `respond`.
    fn run<F>(est: &mut ThresholdEstimator<StdRng>, mut respond: F) -> DoneReason
    where
        F: FnMut(&Presentation) -> Side,
    {
        loop {
            match est.next_trial() {
                ThresholdStep::Present(p) => {
                    est.record_response(respond(&p)).unwrap();
                }
                ThresholdStep::Done(reason) => return reason,
            }
        }
    }

    #[test]
    fn always_correct_participant_gets_nearest_candidate() {
        let mut est = estimator(7);
        let reason = run(&mut est, |p| p.candidate_side);
        assert_eq!(reason, DoneReason::Completed);
        assert_eq!(est.trials_run(), 100);
        for s in est.stats() {
            assert_eq!(s.times_shown(), 10);
            assert_eq!(s.percent_correct(), Some(100.0));
        }
        assert_eq!(est.compute_threshold(), Some(StimulusSet::standard().nearest()));
    }

    #[test]
    fn random_participant_gets_farthest_candidate_at_or_under_chance() {
        let mut est = estimator(42);
        let mut answers = StdRng::seed_from_u64(1234);
        run(&mut est, |_| {
            if answers.random_bool(0.5) {
                Side::Left
            } else {
                Side::Right
            }
        });

        let expected = est
            .stats()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.percent_correct().is_some_and(|p| p <= 50.0))
            .map(|(i, _)| i)
            .max()
            .map_or(StimulusSet::standard().nearest(), |i| {
                StimulusSet::standard().candidates()[i]
            });
        assert_eq!(est.compute_threshold(), Some(expected));

        // Same seeds, same answer.
        let mut again = estimator(42);
        let mut answers = StdRng::seed_from_u64(1234);
        run(&mut again, |_| {
            if answers.random_bool(0.5) {
                Side::Left
            } else {
                Side::Right
            }
        });
        assert_eq!(again.compute_threshold(), est.compute_threshold());
    }

    #[test]
    fn caps_hold_for_any_response_pattern() {
        for seed in 0..50 {
            let mut est = estimator(seed);
            let mut answers = StdRng::seed_from_u64(seed ^ 0xdead_beef);
            loop {
                match est.next_trial() {
                    ThresholdStep::Present(_) => {
                        let side = if answers.random_bool(0.3) {
                            Side::Left
                        } else {
                            Side::Right
                        };
                        est.record_response(side);
                    }
                    ThresholdStep::Done(_) => break,
                }
                for s in est.stats() {
                    assert!(s.times_shown() <= 10);
                    assert!(s.times_shown_on_left() <= 5);
                }
            }
        }
    }

    #[test]
    fn threshold_never_above_chance_except_floor_fallback() {
        let nearest = StimulusSet::standard().nearest();
        for seed in 0..50 {
            let mut est = estimator(seed);
            let mut answers = StdRng::seed_from_u64(seed + 1000);
            // Accuracy grows with distance, like a real psychometric curve.
            run(&mut est, |p| {
                let p_correct = 0.3 + 0.07 * p.candidate as f64;
                if answers.random_bool(p_correct.min(1.0)) {
                    p.candidate_side
                } else {
                    p.candidate_side.opposite()
                }
            });

            let threshold = est.compute_threshold().unwrap();
            let index = StimulusSet::standard()
                .candidates()
                .iter()
                .position(|c| *c == threshold)
                .unwrap();
            let pct = est.stats()[index].percent_correct().unwrap();
            let any_at_or_under = est
                .stats()
                .iter()
                .any(|s| s.percent_correct().is_some_and(|p| p <= 50.0));
            if any_at_or_under {
                assert!(pct <= 50.0, "seed {seed}: threshold at {pct}%");
            } else {
                assert_eq!(threshold, nearest);
            }
        }
    }

    #[test]
    fn no_responses_is_an_estimation_failure() {
        let est = estimator(1);
        assert_eq!(est.compute_threshold(), None);
        assert!(matches!(est.finish("p"), Err(Error::EstimationFailure)));
    }

    #[test]
    fn unanswered_presentation_is_served_again() {
        let mut est = estimator(3);
        let first = est.next_trial();
        let second = est.next_trial();
        assert_eq!(first, second);
        assert_eq!(est.trials_run(), 0);
    }

    #[test]
    fn response_without_presentation_is_ignored() {
        let mut est = estimator(3);
        assert_eq!(est.record_response(Side::Left), None);
        assert!(est.stats().iter().all(|s| s.times_shown() == 0));
    }

    #[test]
    fn exhausted_pool_ends_early_and_still_computes() {
        let mut est = ThresholdEstimator::with_limits(
            StimulusSet::standard(),
            150,
            10,
            5,
            StdRng::seed_from_u64(9),
        );
        let reason = run(&mut est, |p| p.candidate_side.opposite());
        assert_eq!(reason, DoneReason::ExhaustedCandidatePool);
        assert_eq!(est.trials_run(), 100);
        assert!(est.ended_early());
        // Done is terminal and side-effect free.
        assert_eq!(est.next_trial(), ThresholdStep::Done(reason));
        assert_eq!(est.trials_run(), 100);

        let outcome = est.finish("p-09").unwrap();
        assert!(outcome.ended_early);
        assert_eq!(outcome.threshold, StimulusSet::standard().farthest());
        assert_eq!(outcome.candidates.len(), 10);
    }

    #[test]
    fn exhausted_left_quota_forces_right() {
        let mut est = ThresholdEstimator::with_limits(
            StimulusSet::standard(),
            100,
            10,
            0,
            StdRng::seed_from_u64(5),
        );
        run(&mut est, |p| {
            assert_eq!(p.candidate_side, Side::Right);
            Side::Right
        });
        assert!(est.stats().iter().all(|s| s.times_shown_on_left() == 0));
    }

    #[test]
    fn short_session_uses_only_shown_candidates() {
        let mut est = ThresholdEstimator::with_limits(
            StimulusSet::standard(),
            3,
            10,
            5,
            StdRng::seed_from_u64(11),
        );
        let mut shown = Vec::new();
        run(&mut est, |p| {
            shown.push(p.candidate);
            p.candidate_side.opposite()
        });
        let expected = StimulusSet::standard().candidates()[*shown.iter().max().unwrap()];
        assert_eq!(est.compute_threshold(), Some(expected));
    }
}
