//! Balanced, constrained-random reach trial order.

use rand::seq::SliceRandom;
use rand::Rng;
use reach_core::{
    Error, ReachTrialSpec, ReachTrialType, Result, StimulusLevel, StimulusSet, TargetIndex,
};

use crate::config::ProtocolConfig;

/// Builds the whole reach sequence once and serves it one trial at a time.
#[derive(Debug, Clone)]
pub struct TrialSequencer {
    sequence: Vec<ReachTrialSpec>,
    cursor: usize,
    starvation_count: usize,
}

impl TrialSequencer {
    pub fn new<R: Rng>(
        threshold: StimulusLevel,
        stimuli: &StimulusSet,
        config: &ProtocolConfig,
        rng: &mut R,
    ) -> Result<Self> {
        Self::build(
            threshold,
            stimuli.obvious(),
            config.trials_per_type,
            config.target_count() as TargetIndex,
            config.max_location_attempts,
            rng,
        )
    }

    /// Fails when there is no target location to draw from.
    pub fn build<R: Rng>(
        threshold: StimulusLevel,
        obvious: StimulusLevel,
        trials_per_type: usize,
        target_count: TargetIndex,
        max_attempts: u32,
        rng: &mut R,
    ) -> Result<Self> {
        if target_count == 0 {
            return Err(Error::Config("reach sequence needs at least one target".into()));
        }

        let mut tags: Vec<ReachTrialType> = ReachTrialType::ALL
            .iter()
            .flat_map(|&t| std::iter::repeat_n(t, trials_per_type))
            .collect();
        tags.shuffle(rng);

        let mut sequence: Vec<ReachTrialSpec> = Vec::with_capacity(tags.len());
        let mut starvation_count = 0;

        for (index, trial_type) in tags.into_iter().enumerate() {
            let previous = sequence.last().map(|p| (p.trial_type, p.target));

            let mut target = rng.random_range(0..target_count);
            let mut attempts = 1;
            while previous == Some((trial_type, target)) && attempts < max_attempts {
                target = rng.random_range(0..target_count);
                attempts += 1;
            }

            let duplicate_neighbor = previous == Some((trial_type, target));
            if duplicate_neighbor {
                starvation_count += 1;
                tracing::warn!(
                    index,
                    ?trial_type,
                    target,
                    attempts,
                    "location draw budget exhausted, accepting repeated (type, target) pair"
                );
            }

            let (initial, final_level) = match trial_type {
                ReachTrialType::PreJnd => (threshold, Some(obvious)),
                ReachTrialType::PreSupra | ReachTrialType::ConcurrentSupra => (obvious, None),
            };

            sequence.push(ReachTrialSpec {
                index,
                trial_type,
                target,
                initial,
                final_level,
                duplicate_neighbor,
            });
        }

        tracing::info!(
            trials = sequence.len(),
            starvation_count,
            threshold_hue = threshold.hue,
            "reach sequence generated"
        );

        Ok(Self {
            sequence,
            cursor: 0,
            starvation_count,
        })
    }

    /// Next spec, or `None` once every trial was served.
    pub fn next_trial(&mut self) -> Option<ReachTrialSpec> {
        let spec = self.sequence.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(spec)
    }

    /// Scoring contract for a release: the selected target is the one shown.
    pub fn check_response(selected: TargetIndex, target: TargetIndex) -> bool {
        selected == target
    }

    pub fn sequence(&self) -> &[ReachTrialSpec] {
        &self.sequence
    }

    pub fn served(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.sequence.len() - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn starvation_count(&self) -> usize {
        self.starvation_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn levels() -> (StimulusLevel, StimulusLevel) {
        let set = StimulusSet::standard();
        (set.candidates()[4], set.obvious())
    }

    fn sequencer(seed: u64) -> TrialSequencer {
        let (threshold, _) = levels();
        let mut rng = StdRng::seed_from_u64(seed);
        TrialSequencer::new(
            threshold,
            &StimulusSet::standard(),
            &ProtocolConfig::default(),
            &mut rng,
        )
        .unwrap()
    }

    #[test]
    fn balanced_fifteen_trials() {
        for seed in 0..100 {
            let seq = sequencer(seed);
            assert_eq!(seq.sequence().len(), 15);
            for t in ReachTrialType::ALL {
                let n = seq.sequence().iter().filter(|s| s.trial_type == t).count();
                assert_eq!(n, 5, "seed {seed}: {t:?}");
            }
            assert!(seq.sequence().iter().all(|s| s.target < 4));
            assert!(seq
                .sequence()
                .iter()
                .enumerate()
                .all(|(i, s)| s.index == i));
        }
    }

    #[test]
    fn no_adjacent_duplicates_unless_flagged() {
        for seed in 0..200 {
            let seq = sequencer(seed);
            for pair in seq.sequence().windows(2) {
                let same = pair[0].trial_type == pair[1].trial_type
                    && pair[0].target == pair[1].target;
                assert_eq!(same, pair[1].duplicate_neighbor, "seed {seed}");
            }
            let flagged = seq
                .sequence()
                .iter()
                .filter(|s| s.duplicate_neighbor)
                .count();
            assert_eq!(flagged, seq.starvation_count());
        }
    }

    #[test]
    fn hue_policy_by_trial_type() {
        let (threshold, obvious) = levels();
        let seq = sequencer(17);
        let pre_jnd: Vec<_> = seq
            .sequence()
            .iter()
            .filter(|s| s.trial_type == ReachTrialType::PreJnd)
            .collect();
        assert_eq!(pre_jnd.len(), 5);
        for s in pre_jnd {
            assert_eq!(s.initial, threshold);
            assert_eq!(s.final_level, Some(obvious));
        }
        for s in seq
            .sequence()
            .iter()
            .filter(|s| s.trial_type != ReachTrialType::PreJnd)
        {
            assert_eq!(s.initial, obvious);
            assert_eq!(s.final_level, None);
        }
    }

    #[test]
    fn single_target_starves_and_flags() {
        let (threshold, obvious) = levels();
        let mut rng = StdRng::seed_from_u64(0);
        let seq = TrialSequencer::build(threshold, obvious, 5, 1, 10, &mut rng).unwrap();
        assert_eq!(seq.sequence().len(), 15);
        // With one location every same-type neighbour is a forced duplicate.
        let expected = seq
            .sequence()
            .windows(2)
            .filter(|w| w[0].trial_type == w[1].trial_type)
            .count();
        assert_eq!(seq.starvation_count(), expected);
    }

    #[test]
    fn zero_targets_is_rejected() {
        let (threshold, obvious) = levels();
        let mut rng = StdRng::seed_from_u64(0);
        let result = TrialSequencer::build(threshold, obvious, 5, 0, 10, &mut rng);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn serves_in_order_then_stays_done() {
        let mut seq = sequencer(5);
        let expected: Vec<ReachTrialSpec> = seq.sequence().to_vec();
        let mut served = Vec::new();
        while let Some(spec) = seq.next_trial() {
            served.push(spec);
        }
        assert_eq!(served, expected);
        assert!(seq.is_exhausted());
        assert_eq!(seq.next_trial(), None);
        assert_eq!(seq.next_trial(), None);
        assert_eq!(seq.served(), 15);
    }

    #[test]
    fn response_check_is_equality() {
        assert!(TrialSequencer::check_response(2, 2));
        assert!(!TrialSequencer::check_response(1, 2));
    }
}
