//! Anchored cue scheduling.
//!
//! Every cue of a trial is an offset from one anchor timestamp taken when the
//! trial starts. Polling compares the clock against `anchor + offset`, so a late
//! poll never shifts the cues that follow it.

use std::fmt::Debug;

/// A cue that came due, with the time it was scheduled for and the time the
/// poll observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredCue<K> {
    pub cue: K,
    pub scheduled_at: u64,
    pub fired_at: u64,
}

#[derive(Debug, Clone)]
pub struct CueScheduler<K> {
    anchor: Option<u64>,
    pending: Vec<(u64, K)>,
}

impl<K: Copy + Debug> CueScheduler<K> {
    pub fn new() -> Self {
        Self {
            anchor: None,
            pending: Vec::new(),
        }
    }

    /// Replaces any pending cues with `cues`, as offsets from `anchor_ms`.
    pub fn anchor<I>(&mut self, anchor_ms: u64, cues: I)
    where
        I: IntoIterator<Item = (u64, K)>,
    {
        let mut pending: Vec<(u64, K)> = cues.into_iter().collect();
        // Stable sort keeps the declared order for cues sharing an offset.
        pending.sort_by_key(|(offset, _)| *offset);
        // Stored back to front so firing pops from the end.
        pending.reverse();
        self.anchor = Some(anchor_ms);
        self.pending = pending;
    }

    /// Fires every cue due at `now_ms`, each exactly once, in offset order.
    pub fn poll(&mut self, now_ms: u64) -> Vec<FiredCue<K>> {
        let Some(anchor) = self.anchor else {
            return Vec::new();
        };

        let mut fired = Vec::new();
        while let Some(&(offset, cue)) = self.pending.last() {
            let scheduled_at = anchor + offset;
            if scheduled_at > now_ms {
                break;
            }
            self.pending.pop();
            tracing::trace!(?cue, scheduled_at, fired_at = now_ms, "cue fired");
            fired.push(FiredCue {
                cue,
                scheduled_at,
                fired_at: now_ms,
            });
        }
        fired
    }

    /// Absolute time of the next pending cue.
    pub fn next_due(&self) -> Option<u64> {
        let anchor = self.anchor?;
        self.pending.last().map(|(offset, _)| anchor + offset)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn anchor_ms(&self) -> Option<u64> {
        self.anchor
    }

    /// Drops pending cues, e.g. when a trial is aborted.
    pub fn cancel(&mut self) {
        self.anchor = None;
        self.pending.clear();
    }
}

impl<K: Copy + Debug> Default for CueScheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Beep {
        Ready,
        Set,
        Go,
    }

    #[test]
    fn fires_in_offset_order_exactly_once() {
        let mut scheduler = CueScheduler::new();
        scheduler.anchor(1000, [(1000, Beep::Set), (0, Beep::Ready), (2000, Beep::Go)]);

        let first = scheduler.poll(1000);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].cue, Beep::Ready);

        assert!(scheduler.poll(1500).is_empty());

        let rest = scheduler.poll(3100);
        let cues: Vec<Beep> = rest.iter().map(|f| f.cue).collect();
        assert_eq!(cues, vec![Beep::Set, Beep::Go]);
        assert!(scheduler.poll(10_000).is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn late_poll_does_not_shift_schedule() {
        let mut scheduler = CueScheduler::new();
        scheduler.anchor(0, [(500, Beep::Ready), (1000, Beep::Set), (1500, Beep::Go)]);

        let fired = scheduler.poll(700);
        assert_eq!(fired[0].scheduled_at, 500);
        assert_eq!(fired[0].fired_at, 700);
        // The next cue is still due at anchor + 1000, not 700 + 500.
        assert_eq!(scheduler.next_due(), Some(1000));
        let fired = scheduler.poll(1000);
        assert_eq!(fired[0].cue, Beep::Set);
        assert_eq!(fired[0].fired_at, 1000);
    }

    #[test]
    fn unanchored_and_cancelled_schedulers_are_silent() {
        let mut scheduler: CueScheduler<Beep> = CueScheduler::new();
        assert!(scheduler.poll(u64::MAX).is_empty());

        scheduler.anchor(0, [(10, Beep::Go)]);
        scheduler.cancel();
        assert!(scheduler.poll(100).is_empty());
        assert_eq!(scheduler.next_due(), None);
    }

    #[test]
    fn re_anchoring_replaces_pending_cues() {
        let mut scheduler = CueScheduler::new();
        scheduler.anchor(0, [(10, Beep::Ready), (20, Beep::Set)]);
        scheduler.anchor(100, [(5, Beep::Go)]);
        let fired = scheduler.poll(105);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].cue, Beep::Go);
    }
}
