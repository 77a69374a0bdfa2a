//! End-to-end card creation.
//!
//! [`CardFlow`] wires the pieces together in the order a creation dialog
//! drives them:
//!
//! 1. validate the request locally (no signing prompt for bad input)
//! 2. claim the tracker (`Idle -> Submitting`)
//! 3. resolve the price and ask the wallet to authorize it
//! 4. submit, persist any ancillary access grant
//! 5. hand the job to the tracker
//!
//! Any failure in steps 3-4 returns the tracker to `Idle`.

use std::sync::Arc;

use tokio::sync::broadcast;

use greetcard_core::job::{JobHandle, JobResult};
use greetcard_core::request::CreationRequest;

use crate::access::AccessGrantStore;
use crate::api::{CardApi, CardApiError};
use crate::config::ClientConfig;
use crate::error::JobError;
use crate::events::TrackerEvent;
use crate::payment::{PaymentAuthorizer, WalletSigner};
use crate::submitter::{JobSubmitter, Submission};
use crate::tracker::{JobTracker, TrackerError, TrackerPhase};

/// One creation dialog: a single tracker plus the collaborators feeding it.
pub struct CardFlow {
    api: Arc<CardApi>,
    authorizer: PaymentAuthorizer,
    submitter: JobSubmitter,
    grants: Arc<dyn AccessGrantStore>,
    tracker: JobTracker,
}

impl CardFlow {
    pub fn new(
        config: &ClientConfig,
        signer: Arc<dyn WalletSigner>,
        grants: Arc<dyn AccessGrantStore>,
    ) -> Result<Self, CardApiError> {
        let api = Arc::new(CardApi::new(config)?);
        Ok(Self::with_api(api, config, signer, grants))
    }

    pub fn with_api(
        api: Arc<CardApi>,
        config: &ClientConfig,
        signer: Arc<dyn WalletSigner>,
        grants: Arc<dyn AccessGrantStore>,
    ) -> Self {
        Self {
            authorizer: PaymentAuthorizer::new(signer),
            submitter: JobSubmitter::new(Arc::clone(&api), config),
            tracker: JobTracker::new(api.clone(), config.poll_interval),
            grants,
            api,
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut JobTracker {
        &mut self.tracker
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tracker.subscribe()
    }

    /// Authorize, submit and start tracking `request`.
    ///
    /// Returns once the job is handed to the tracker; subscribe before
    /// calling to observe the outcome (a fast-path completion is emitted
    /// before this returns).
    pub async fn create(&mut self, request: CreationRequest) -> Result<JobHandle, JobError> {
        request.validate()?;
        self.tracker.begin_submission()?;

        let submission = match self.authorize_and_submit(&request).await {
            Ok(submission) => submission,
            Err(e) => {
                self.tracker.abort_submission();
                tracing::info!(error = %e, "Card creation aborted");
                return Err(e);
            }
        };

        let Submission {
            handle,
            snapshot,
            ancillary_access,
        } = submission;

        if let Some(grant) = ancillary_access {
            match self.grants.record(handle.id(), &grant).await {
                Ok(true) => tracing::debug!(job_id = handle.id(), "Ancillary access grant stored"),
                Ok(false) => {
                    tracing::debug!(job_id = handle.id(), "Ancillary access grant already stored")
                }
                Err(e) => tracing::warn!(
                    job_id = handle.id(),
                    error = %e,
                    "Failed to persist ancillary access grant",
                ),
            }
        }

        self.tracker.track(handle.clone(), snapshot)?;
        Ok(handle)
    }

    async fn authorize_and_submit(&self, request: &CreationRequest) -> Result<Submission, JobError> {
        let price = self.submitter.resolve_price(request).await?;
        let auth = self.authorizer.authorize_amount(price).await?;
        Ok(self.submitter.submit(request, auth).await?)
    }

    /// Resume tracking a job submitted earlier.
    pub fn track_existing(&mut self, job_id: &str) -> Result<(), JobError> {
        Ok(self.tracker.track_existing(job_id)?)
    }

    /// Generate the banner image for the completed job and attach its URL
    /// to the stored result.
    pub async fn generate_banner(&self) -> Result<String, JobError> {
        let phase = self.tracker.phase();
        let job_id = match (phase, self.tracker.job_id()) {
            (TrackerPhase::Completed, Some(id)) => id,
            _ => return Err(TrackerError::NotCompleted { phase }.into()),
        };

        let asset = self.api.generate_banner(&job_id).await.map_err(|e| {
            tracing::warn!(job_id = %job_id, error = %e, "Banner generation failed");
            e
        })?;
        tracing::info!(
            job_id = %job_id,
            cached = asset.cached,
            enhanced = asset.enhanced,
            "Banner generated",
        );

        if !self.tracker.attach_banner(&job_id, asset.asset_url.clone()) {
            tracing::debug!(job_id = %job_id, "Tracker moved on before the banner arrived");
        }
        Ok(asset.asset_url)
    }

    /// Close the dialog: stop polling and forget the job.
    pub fn close(&mut self) {
        self.tracker.reset();
    }
}

/// Wait for the terminal outcome of `job_id` on `events`.
///
/// Returns `None` if the tracker is reset or dropped first.
pub async fn await_outcome(
    events: &mut broadcast::Receiver<TrackerEvent>,
    job_id: &str,
) -> Option<Result<JobResult, JobError>> {
    loop {
        match events.recv().await {
            Ok(TrackerEvent::Completed { job_id: id, result }) if id == job_id => {
                return Some(Ok(result));
            }
            Ok(TrackerEvent::Failed { job_id: id, reason }) if id == job_id => {
                return Some(Err(JobError::TerminalFailure { job_id: id, reason }));
            }
            Ok(TrackerEvent::Reset) => return None,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Tracker event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
