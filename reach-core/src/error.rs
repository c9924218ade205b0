/// Result type alias for the trial engine
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the trial engine.
///
/// Recoverable per-trial conditions (an exhausted candidate pool, a duplicate
/// neighbour accepted by the sequencer, a click without movement) are not
/// errors; they travel as flags on the values they affect.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No candidate was ever shown before the threshold was requested.
    /// The session is unusable and the procedure must be restarted.
    #[error("threshold estimation failed: no responses recorded, procedure must restart")]
    EstimationFailure,

    #[error("Invalid stimulus set: {0}")]
    InvalidStimulusSet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
