//! Caller-facing error taxonomy.
//!
//! Component errors fold into [`JobError`] so a single match covers every
//! way a card creation can end short of success.  Transient poll errors
//! never reach this type; the tracker logs and swallows them.

use greetcard_core::error::CoreError;

use crate::api::{AssetError, CardApiError};
use crate::payment::PaymentError;
use crate::submitter::SubmitError;
use crate::tracker::TrackerError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Local input check failed before any network call.
    #[error("Invalid request: {0}")]
    Validation(#[from] CoreError),

    /// The signer was cancelled or failed; nothing was submitted.
    #[error(transparent)]
    Authorization(#[from] PaymentError),

    /// The backend refused the submission or could not be reached.
    #[error(transparent)]
    Submission(SubmitError),

    /// A status poll failed. Only logged by the tracker; exposed here for
    /// callers that poll on their own.
    #[error("Status poll failed: {0}")]
    PollTransient(#[from] CardApiError),

    /// The backend reported the job failed. A new submission is required.
    #[error("Card {job_id} failed: {reason}")]
    TerminalFailure { job_id: String, reason: String },

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl From<SubmitError> for JobError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(e) => Self::Validation(e),
            other => Self::Submission(other),
        }
    }
}

impl JobError {
    /// Whether the error happened before anything reached the backend.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Authorization(_) | Self::Tracker(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn submit_validation_is_lifted_to_validation() {
        let err = JobError::from(SubmitError::Validation(CoreError::Validation("too short".into())));
        assert_matches!(err, JobError::Validation(_));
        assert!(err.is_local());
    }

    #[test]
    fn backend_rejections_stay_submission_errors() {
        let err = JobError::from(SubmitError::PaymentRejected("expired".into()));
        assert_matches!(err, JobError::Submission(SubmitError::PaymentRejected(_)));
        assert_eq!(err.to_string(), "Payment rejected: expired");
        assert!(!err.is_local());
    }

    #[test]
    fn terminal_failure_message_names_the_job() {
        let err = JobError::TerminalFailure {
            job_id: "abc123".into(),
            reason: "engine crashed".into(),
        };
        assert_eq!(err.to_string(), "Card abc123 failed: engine crashed");
    }
}
