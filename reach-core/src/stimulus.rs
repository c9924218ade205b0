use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of candidate levels in the threshold procedure.
pub const CANDIDATE_COUNT: usize = 10;

/// A hue shown to the participant and its distance from the reference hue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StimulusLevel {
    pub hue: f32,
    pub distance: f32,
}

impl StimulusLevel {
    pub fn new(hue: f32, reference: f32) -> Self {
        Self {
            hue,
            distance: (hue - reference).abs(),
        }
    }
}

/// Fixed candidate levels ordered by increasing distance from the reference,
/// plus the supra-threshold marker used by the reaching task.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusSet {
    reference: f32,
    candidates: Vec<StimulusLevel>,
    obvious: StimulusLevel,
}

impl StimulusSet {
    pub fn new(reference: f32, candidate_hues: &[f32], obvious_hue: f32) -> Result<Self> {
        if candidate_hues.len() != CANDIDATE_COUNT {
            return Err(Error::InvalidStimulusSet(format!(
                "expected {} candidates, got {}",
                CANDIDATE_COUNT,
                candidate_hues.len()
            )));
        }

        let candidates: Vec<StimulusLevel> = candidate_hues
            .iter()
            .map(|&hue| StimulusLevel::new(hue, reference))
            .collect();

        if let Some(pair) = candidates
            .windows(2)
            .find(|pair| pair[1].distance <= pair[0].distance)
        {
            return Err(Error::InvalidStimulusSet(format!(
                "candidate distances must strictly increase ({} then {})",
                pair[0].distance, pair[1].distance
            )));
        }

        let obvious = StimulusLevel::new(obvious_hue, reference);
        // Non-empty after the count check above.
        let farthest = candidates[candidates.len() - 1];
        if obvious.distance <= farthest.distance {
            return Err(Error::InvalidStimulusSet(format!(
                "obvious marker (distance {}) must lie beyond every candidate (max {})",
                obvious.distance, farthest.distance
            )));
        }

        Ok(Self {
            reference,
            candidates,
            obvious,
        })
    }

    /// The published protocol: green reference, two-degree candidate steps,
    /// a far blue-green marker.
    pub fn standard() -> Self {
        Self {
            reference: 120.0,
            candidates: (1..=CANDIDATE_COUNT)
                .map(|step| StimulusLevel::new(120.0 + 2.0 * step as f32, 120.0))
                .collect(),
            obvious: StimulusLevel::new(180.0, 120.0),
        }
    }

    pub fn reference(&self) -> f32 {
        self.reference
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidate(&self, index: usize) -> Option<StimulusLevel> {
        self.candidates.get(index).copied()
    }

    pub fn candidates(&self) -> &[StimulusLevel] {
        &self.candidates
    }

    pub fn nearest(&self) -> StimulusLevel {
        self.candidates[0]
    }

    pub fn farthest(&self) -> StimulusLevel {
        self.candidates[self.candidates.len() - 1]
    }

    pub fn obvious(&self) -> StimulusLevel {
        self.obvious
    }
}

impl Default for StimulusSet {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_is_ordered() {
        let set = StimulusSet::standard();
        assert_eq!(set.len(), CANDIDATE_COUNT);
        assert!(set
            .candidates()
            .windows(2)
            .all(|w| w[0].distance < w[1].distance));
        assert_eq!(set.nearest().distance, 2.0);
        assert_eq!(set.farthest().distance, 20.0);
        assert!(set.obvious().distance > set.farthest().distance);
    }

    #[test]
    fn distance_is_symmetric_around_reference() {
        let below = StimulusLevel::new(110.0, 120.0);
        let above = StimulusLevel::new(130.0, 120.0);
        assert_eq!(below.distance, above.distance);
    }

    #[test]
    fn rejects_wrong_candidate_count() {
        let err = StimulusSet::new(0.0, &[1.0, 2.0], 50.0).unwrap_err();
        assert!(matches!(err, Error::InvalidStimulusSet(_)));
    }

    #[test]
    fn rejects_unordered_candidates() {
        let hues = [1.0, 2.0, 3.0, 5.0, 4.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        assert!(StimulusSet::new(0.0, &hues, 50.0).is_err());
    }

    #[test]
    fn rejects_marker_inside_candidate_range() {
        let hues: Vec<f32> = (1..=10).map(|h| h as f32).collect();
        assert!(StimulusSet::new(0.0, &hues, 9.0).is_err());
        assert!(StimulusSet::new(0.0, &hues, 11.0).is_ok());
    }
}
