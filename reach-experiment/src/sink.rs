//! Record sinks for threshold outcomes and reach trials.
//!
//! Saves are idempotent upserts keyed by `(participant_id, trial_number)`, so a
//! retried delivery never creates a second record.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use reach_core::{ReachTrialRecord, Result, ThresholdOutcome};
use serde::{Deserialize, Serialize};

pub trait RecordSink {
    fn save_threshold_outcome(&mut self, outcome: &ThresholdOutcome) -> Result<()>;
    fn save_reach_trial(&mut self, record: &ReachTrialRecord) -> Result<()>;
    /// Deletes a participant's partial reach-trial set. Returns how many
    /// records were removed.
    fn discard_incomplete(&mut self, participant_id: &str) -> Result<usize>;
}

/// Everything stored for one participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecords {
    pub threshold: Option<ThresholdOutcome>,
    pub target_trials: BTreeMap<usize, ReachTrialRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySink {
    participants: BTreeMap<String, ParticipantRecords>,
    set_size: usize,
}

impl MemorySink {
    /// `set_size` is the number of reach records forming a complete set.
    pub fn new(set_size: usize) -> Self {
        Self {
            participants: BTreeMap::new(),
            set_size,
        }
    }

    pub fn participant(&self, participant_id: &str) -> Option<&ParticipantRecords> {
        self.participants.get(participant_id)
    }

    pub fn reach_trial_count(&self, participant_id: &str) -> usize {
        self.participant(participant_id)
            .map_or(0, |p| p.target_trials.len())
    }

    /// Reach records of a participant in trial order.
    pub fn reach_trials<'a>(&'a self, participant_id: &str) -> Vec<&'a ReachTrialRecord> {
        self.participants
            .get(participant_id)
            .map(|p| p.target_trials.values().collect())
            .unwrap_or_default()
    }

    /// A participant's reach trials may leave the device only as a complete set.
    pub fn is_upload_eligible(&self, participant_id: &str) -> bool {
        self.reach_trial_count(participant_id) == self.set_size
    }

    /// Deletes a partial reach-trial set of an abandoned session. Complete
    /// sets are kept. Returns the number of deleted records.
    fn remove_incomplete(&mut self, participant_id: &str) -> usize {
        if self.is_upload_eligible(participant_id) {
            return 0;
        }
        let Some(records) = self.participants.get_mut(participant_id) else {
            return 0;
        };
        let removed = records.target_trials.len();
        records.target_trials.clear();
        if removed > 0 {
            tracing::info!(
                participant = participant_id,
                removed,
                "discarded incomplete reach trial set"
            );
        }
        removed
    }

    pub fn participant_ids(&self) -> impl Iterator<Item = &str> {
        self.participants.keys().map(String::as_str)
    }

    pub fn set_size(&self) -> usize {
        self.set_size
    }

    fn entry(&mut self, participant_id: &str) -> &mut ParticipantRecords {
        self.participants
            .entry(participant_id.to_string())
            .or_default()
    }
}

impl RecordSink for MemorySink {
    fn save_threshold_outcome(&mut self, outcome: &ThresholdOutcome) -> Result<()> {
        self.entry(&outcome.participant_id).threshold = Some(outcome.clone());
        Ok(())
    }

    fn save_reach_trial(&mut self, record: &ReachTrialRecord) -> Result<()> {
        let replaced = self
            .entry(&record.participant_id)
            .target_trials
            .insert(record.trial_number, record.clone())
            .is_some();
        if replaced {
            tracing::debug!(
                participant = %record.participant_id,
                trial = record.trial_number,
                "reach trial re-saved, previous copy replaced"
            );
        }
        Ok(())
    }

    fn discard_incomplete(&mut self, participant_id: &str) -> Result<usize> {
        Ok(self.remove_incomplete(participant_id))
    }
}

/// Memory sink mirrored to a pretty-printed JSON file after every save.
///
/// The file is written beside its destination and renamed over it, so an
/// interrupted write leaves the previous durable copy intact.
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
    memory: MemorySink,
}

impl JsonFileSink {
    /// Opens `path`, loading previously saved records when the file exists.
    pub fn open(path: impl Into<PathBuf>, set_size: usize) -> Result<Self> {
        let path = path.into();
        let memory = if path.exists() {
            let file = std::fs::File::open(&path)?;
            let mut memory: MemorySink = serde_json::from_reader(std::io::BufReader::new(file))?;
            memory.set_size = set_size;
            tracing::info!(path = %path.display(), "loaded existing records");
            memory
        } else {
            MemorySink::new(set_size)
        };
        Ok(Self { path, memory })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &MemorySink {
        &self.memory
    }

    pub fn flush(&self) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut writer = std::io::BufWriter::new(std::fs::File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, &self.memory)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RecordSink for JsonFileSink {
    fn save_threshold_outcome(&mut self, outcome: &ThresholdOutcome) -> Result<()> {
        self.memory.save_threshold_outcome(outcome)?;
        self.flush()
    }

    fn save_reach_trial(&mut self, record: &ReachTrialRecord) -> Result<()> {
        self.memory.save_reach_trial(record)?;
        self.flush()
    }

    fn discard_incomplete(&mut self, participant_id: &str) -> Result<usize> {
        let removed = self.memory.remove_incomplete(participant_id);
        if removed > 0 {
            self.flush()?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reach_core::{
        KinematicsResult, MovementProfile, ReachTrialType, StimulusSet, Timing, TrialFlags,
    };

    fn record(participant: &str, trial_number: usize, correct: bool) -> ReachTrialRecord {
        ReachTrialRecord {
            participant_id: participant.to_string(),
            trial_number,
            trial_type: ReachTrialType::PreSupra,
            target_index: 1,
            selected_index: Some(if correct { 1 } else { 0 }),
            correct,
            initial_hue: 180.0,
            final_hue: None,
            trial_start_timestamp: 0,
            go_cue_timestamp: 2500,
            response_timestamp: 3100,
            kinematics: KinematicsResult {
                first_movement: Timing::Reached(2700),
                target_reached: Timing::Reached(3000),
                reaction_time: Timing::Reached(200),
                movement_time: Timing::Reached(300),
                total_response_time_ms: 600,
                path: Vec::new(),
                path_length: 420.0,
                average_speed: 1400.0,
            },
            profile: MovementProfile::default(),
            flags: TrialFlags::default(),
        }
    }

    fn outcome(participant: &str) -> ThresholdOutcome {
        ThresholdOutcome {
            participant_id: participant.to_string(),
            threshold: StimulusSet::standard().candidates()[3],
            trials_run: 100,
            ended_early: false,
            candidates: Vec::new(),
        }
    }

    #[test]
    fn repeated_save_is_one_logical_record() {
        let mut sink = MemorySink::new(15);
        sink.save_reach_trial(&record("p1", 4, false)).unwrap();
        sink.save_reach_trial(&record("p1", 4, true)).unwrap();
        assert_eq!(sink.reach_trial_count("p1"), 1);
        let stored = sink.reach_trials("p1");
        assert!(stored[0].correct);
    }

    #[test]
    fn upload_gate_requires_exact_complete_set() {
        let mut sink = MemorySink::new(15);
        for n in 0..14 {
            sink.save_reach_trial(&record("p1", n, true)).unwrap();
        }
        assert!(!sink.is_upload_eligible("p1"));
        sink.save_reach_trial(&record("p1", 14, true)).unwrap();
        assert!(sink.is_upload_eligible("p1"));
        // A retried save does not push the count past the set size.
        sink.save_reach_trial(&record("p1", 14, true)).unwrap();
        assert!(sink.is_upload_eligible("p1"));
        assert!(!sink.is_upload_eligible("nobody"));
    }

    #[test]
    fn abandoned_partial_set_is_discarded() {
        let mut sink = MemorySink::new(15);
        sink.save_threshold_outcome(&outcome("p2")).unwrap();
        for n in 0..6 {
            sink.save_reach_trial(&record("p2", n, true)).unwrap();
        }
        assert_eq!(sink.discard_incomplete("p2").unwrap(), 6);
        assert_eq!(sink.reach_trial_count("p2"), 0);
        // The threshold outcome is not part of the reach set.
        assert!(sink.participant("p2").unwrap().threshold.is_some());
    }

    #[test]
    fn complete_set_survives_discard() {
        let mut sink = MemorySink::new(15);
        for n in 0..15 {
            sink.save_reach_trial(&record("p3", n, true)).unwrap();
        }
        assert_eq!(sink.discard_incomplete("p3").unwrap(), 0);
        assert_eq!(sink.reach_trial_count("p3"), 15);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_write_keeps_durable_file() {
        let path = std::env::temp_dir().join(format!("reach-sink-full-{}.json", std::process::id()));
        let tmp = path.with_extension("json.tmp");
        std::fs::remove_file(&path).ok();
        std::fs::remove_file(&tmp).ok();

        let mut sink = JsonFileSink::open(&path, 15).unwrap();
        sink.save_reach_trial(&record("p5", 0, true)).unwrap();

        // Every write to the staging file now fails with ENOSPC.
        std::os::unix::fs::symlink("/dev/full", &tmp).unwrap();
        let result = sink.save_reach_trial(&record("p5", 1, true));
        std::fs::remove_file(&tmp).ok();
        assert!(result.is_err());

        let reopened = JsonFileSink::open(&path, 15).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(reopened.records().reach_trial_count("p5"), 1);
    }

    #[test]
    fn json_sink_persists_and_reloads() {
        let path = std::env::temp_dir().join(format!("reach-sink-{}.json", std::process::id()));
        std::fs::remove_file(&path).ok();

        let mut sink = JsonFileSink::open(&path, 15).unwrap();
        sink.save_threshold_outcome(&outcome("p4")).unwrap();
        sink.save_reach_trial(&record("p4", 0, true)).unwrap();
        sink.save_reach_trial(&record("p4", 0, true)).unwrap();

        let reopened = JsonFileSink::open(&path, 15).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(reopened.records(), sink.records());
        assert_eq!(reopened.records().reach_trial_count("p4"), 1);
    }
}
