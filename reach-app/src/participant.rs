//! Scripted participant that answers the 2AFC trials and performs reaches.

use rand::rngs::StdRng;
use rand::Rng;
use reach_core::{Presentation, Side, TargetZone};

/// Touch origin at the bottom centre of the screen.
pub const HOME: (f32, f32) = (540.0, 1700.0);

const MISS_RATE: f64 = 0.04;
const TAP_RATE: f64 = 0.03;
const FREEZE_RATE: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReachStyle {
    /// Drags from home to the chosen zone.
    Drag,
    /// Taps the chosen zone without dragging.
    Tap,
    /// Never responds; the trial times out.
    Freeze,
}

/// One planned reach, timed relative to the go-cue.
#[derive(Debug, Clone, Copy)]
pub struct ReachPlan {
    pub trial: usize,
    pub style: ReachStyle,
    pub reaction_ms: u64,
    pub duration_ms: u64,
    pub end: (f32, f32),
    /// Lateral bow of the path, in px at mid-reach.
    pub bow: f32,
}

impl ReachPlan {
    /// Finger position `t` ms after the go-cue, or `None` before movement.
    pub fn position_at(&self, t: u64) -> Option<(f32, f32)> {
        let moving = t.checked_sub(self.reaction_ms)?;
        let f = (moving as f32 / self.duration_ms as f32).min(1.0);
        // Minimum-jerk time course.
        let s = f * f * f * (10.0 - 15.0 * f + 6.0 * f * f);
        let bulge = self.bow * (s * std::f32::consts::PI).sin();
        Some((
            HOME.0 + (self.end.0 - HOME.0) * s + bulge,
            HOME.1 + (self.end.1 - HOME.1) * s,
        ))
    }

    pub fn release_at(&self) -> u64 {
        self.reaction_ms + self.duration_ms
    }
}

pub struct SimulatedParticipant {
    rng: StdRng,
    jnd: f32,
}

impl SimulatedParticipant {
    pub fn new(rng: StdRng, jnd: f32) -> Self {
        Self { rng, jnd }
    }

    /// Probability of a correct 2AFC answer at hue distance `distance`,
    /// 75% at the participant's JND.
    pub fn p_correct(&self, distance: f32) -> f64 {
        let z = ((distance - self.jnd) / (self.jnd * 0.25)) as f64;
        0.5 + 0.5 / (1.0 + (-z).exp())
    }

    pub fn choose(&mut self, presentation: &Presentation) -> Side {
        let p = self.p_correct(presentation.level.distance);
        if self.rng.random_bool(p) {
            presentation.candidate_side
        } else {
            presentation.candidate_side.opposite()
        }
    }

    pub fn decision_time_ms(&mut self) -> u64 {
        self.rng.random_range(350..900)
    }

    pub fn plan_reach(&mut self, trial: usize, target: usize, zones: &[TargetZone]) -> ReachPlan {
        let roll: f64 = self.rng.random();
        let style = if roll < FREEZE_RATE {
            ReachStyle::Freeze
        } else if roll < FREEZE_RATE + TAP_RATE {
            ReachStyle::Tap
        } else {
            ReachStyle::Drag
        };

        let chosen = if zones.len() > 1 && self.rng.random_bool(MISS_RATE) {
            let other = self.rng.random_range(0..zones.len() - 1);
            if other >= target { other + 1 } else { other }
        } else {
            target
        };
        let end = zones.get(chosen).map_or(HOME, |z| z.center());

        ReachPlan {
            trial,
            style,
            reaction_ms: self.rng.random_range(180..420),
            duration_ms: self.rng.random_range(350..750),
            end,
            bow: self.rng.random_range(-80.0..80.0),
        }
    }
}
