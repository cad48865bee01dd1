use thiserror::Error;

use super::types::JobKey;

/// Rejections at the admission boundary.
///
/// Non-fatal: returned to the caller, never recorded as a job failure.
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("no result available to publish for {0}")]
    NoResult(JobKey),

    #[error("a publish is already in flight for {0}")]
    PublishInFlight(JobKey),
}

/// Errors surfaced by engine operations.
///
/// Collaborator failures during a run are not represented here; the runner
/// records them on the job itself and observers see them as a `Failed` event.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("publish collaborator failed: {0}")]
    Publisher(#[source] anyhow::Error),

    #[error("history store failed: {0}")]
    History(#[source] anyhow::Error),
}
