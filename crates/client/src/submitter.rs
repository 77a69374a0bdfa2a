//! Card submission: price resolution, request validation, and the paid
//! `POST /cards` call.

use std::sync::Arc;

use greetcard_core::error::CoreError;
use greetcard_core::job::{JobHandle, JobResult, JobSnapshot, JobStatus};
use greetcard_core::money::UsdAmount;
use greetcard_core::request::CreationRequest;

use crate::api::{CardApi, CardApiError};
use crate::config::ClientConfig;
use crate::messages::{ErrorBody, FieldError, GenerationMode, LengthMode, SubmitBody, SubmitResponse};
use crate::payment::PaymentAuthorization;

/// HTTP status the backend uses for invalid, expired or mismatched payments.
pub const PAYMENT_REQUIRED: u16 = 402;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from price resolution and submission.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Local validation failed; nothing was sent.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// The backend refused the payment authorization.
    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    /// The backend rejected one or more request fields.
    #[error("Submission rejected: {}", format_fields(.0))]
    SubmissionValidation(Vec<FieldError>),

    /// Network failure, server error, or malformed response.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No positive price could be determined for the target resource.
    #[error("No price available for resource {0}")]
    PriceUnavailable(String),
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<CardApiError> for SubmitError {
    fn from(err: CardApiError) -> Self {
        match err {
            CardApiError::ApiError { status, body } if status == PAYMENT_REQUIRED => {
                Self::PaymentRejected(ErrorBody::parse(&body).summary())
            }
            CardApiError::ApiError { status: status @ (408 | 429), body } => Self::BackendUnavailable(
                format!("HTTP {status}: {}", ErrorBody::parse(&body).summary()),
            ),
            CardApiError::ApiError { status, body } if (400..500).contains(&status) => {
                Self::SubmissionValidation(ErrorBody::parse(&body).field_errors())
            }
            CardApiError::ApiError { status, body } => Self::BackendUnavailable(format!(
                "HTTP {status}: {}",
                ErrorBody::parse(&body).summary()
            )),
            other => Self::BackendUnavailable(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Opaque secondary grant returned alongside a submission.
///
/// The submitter never looks inside; callers persist or forward it.
#[derive(Debug, Clone, PartialEq)]
pub struct AncillaryAccess(pub serde_json::Value);

/// Successful submission result.
#[derive(Debug, Clone)]
pub struct Submission {
    pub handle: JobHandle,
    /// Initial snapshot; already `Completed` on the synchronous fast path.
    pub snapshot: JobSnapshot,
    pub ancillary_access: Option<AncillaryAccess>,
}

impl Submission {
    fn from_response(response: SubmitResponse) -> Result<Self, SubmitError> {
        let job = response.job;
        if job.id.trim().is_empty() {
            return Err(SubmitError::BackendUnavailable(
                "submit response carried an empty job id".to_string(),
            ));
        }

        let snapshot = match job.status {
            JobStatus::Completed => JobSnapshot::completed(JobResult {
                preview_text: job.preview,
                word_count: job.word_count,
                banner_url: None,
            }),
            other => JobSnapshot::pending(other),
        };

        Ok(Self {
            handle: JobHandle::new(job.id, job.status),
            snapshot,
            ancillary_access: response.ancillary_access.map(AncillaryAccess),
        })
    }
}

// ---------------------------------------------------------------------------
// JobSubmitter
// ---------------------------------------------------------------------------

/// Validates and submits creation requests.
#[derive(Debug, Clone)]
pub struct JobSubmitter {
    api: Arc<CardApi>,
    length_mode: LengthMode,
    generation_mode: GenerationMode,
}

impl JobSubmitter {
    pub fn new(api: Arc<CardApi>, config: &ClientConfig) -> Self {
        Self {
            api,
            length_mode: config.length_mode,
            generation_mode: config.generation_mode,
        }
    }

    /// Determine the price to authorize for `request`.
    ///
    /// A positive caller-quoted price wins.  Otherwise the resource's
    /// metadata is fetched: its current price if positive, else its
    /// static base price.
    pub async fn resolve_price(&self, request: &CreationRequest) -> Result<UsdAmount, SubmitError> {
        if let Some(quoted) = request.known_price_usd() {
            return Ok(UsdAmount::from_usd(quoted)?);
        }

        let resource_id = request.target_resource();
        let metadata = self.api.resource_metadata(resource_id).await.map_err(|e| {
            tracing::warn!(resource_id, error = %e, "Failed to fetch resource metadata");
            SubmitError::BackendUnavailable(e.to_string())
        })?;

        let positive = |p: Option<f64>| p.and_then(|v| UsdAmount::from_usd(v).ok());
        let price = positive(metadata.current_price_usd)
            .or_else(|| positive(metadata.base_price_usd))
            .ok_or_else(|| SubmitError::PriceUnavailable(resource_id.to_string()))?;

        tracing::debug!(resource_id, price_usd = %price, "Resolved price from resource metadata");
        Ok(price)
    }

    /// Submit `request`, consuming `auth`.
    ///
    /// The request is re-validated first; a failure here returns
    /// [`SubmitError::Validation`] without touching the network.
    pub async fn submit(
        &self,
        request: &CreationRequest,
        auth: PaymentAuthorization,
    ) -> Result<Submission, SubmitError> {
        request.validate()?;

        let amount = auth.amount();
        let payment_header = auth.into_header();
        let body = SubmitBody {
            payment_header: &payment_header,
            target_resource_id: request.target_resource(),
            theme_text: request.trimmed_theme(),
            is_public: request.visibility().is_public(),
            length_mode: self.length_mode,
            generation_mode: self.generation_mode,
        };

        let response = match self.api.submit_card(&body).await {
            Ok(response) => response,
            Err(e) => {
                let err = SubmitError::from(e);
                tracing::warn!(
                    resource_id = request.target_resource(),
                    amount_usd = %amount,
                    error = %err,
                    "Card submission failed",
                );
                return Err(err);
            }
        };

        let submission = Submission::from_response(response)?;
        tracing::info!(
            job_id = submission.handle.id(),
            status = %submission.handle.status(),
            amount_usd = %amount,
            has_ancillary_access = submission.ancillary_access.is_some(),
            "Card submitted",
        );
        Ok(submission)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
