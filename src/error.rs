use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TrackError {
    #[error("assignment failed: {0}")]
    LapjvError(String),
    #[error("invalid sensor input: {0}")]
    InvalidInput(String),
}
