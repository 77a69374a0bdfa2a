//! Payment authorization through an external wallet signer.
//!
//! [`PaymentAuthorizer::authorize`] turns a quoted USD amount into a
//! single-use [`PaymentAuthorization`].  The signing interaction is
//! delegated to a [`WalletSigner`]; the authorizer never adds a timeout
//! around it, so the call resolves only when the human operator approves
//! or rejects.

use std::sync::Arc;

use async_trait::async_trait;

use greetcard_core::money::UsdAmount;
use greetcard_core::types::Timestamp;

// ---------------------------------------------------------------------------
// Signer seam
// ---------------------------------------------------------------------------

/// What the wallet is asked to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    /// Amount with exactly two fractional digits, e.g. `"9.99"`.
    pub amount_usd: String,
}

/// A signature produced by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayment {
    /// Opaque header value forwarded to the backend.
    pub header: String,
    /// Identity of the paying wallet.
    pub payer: String,
}

/// Ways a signing interaction can end without a signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// The operator dismissed or declined the signing prompt.
    #[error("signing was cancelled by the user")]
    Cancelled,

    #[error("signer failure: {0}")]
    Failed(String),
}

/// External wallet capable of signing a payment commitment.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn sign_payment(&self, request: &PaymentRequest) -> Result<SignedPayment, SignerError>;
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Signed, single-use payment authorization.
///
/// Not `Clone`: submitting consumes it, so the type system prevents the
/// client from replaying the same authorization.
#[derive(Debug, PartialEq, Eq)]
pub struct PaymentAuthorization {
    header: String,
    payer: String,
    amount: UsdAmount,
    authorized_at: Timestamp,
}

impl PaymentAuthorization {
    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn payer(&self) -> &str {
        &self.payer
    }

    pub fn amount(&self) -> UsdAmount {
        self.amount
    }

    pub fn authorized_at(&self) -> Timestamp {
        self.authorized_at
    }

    /// Release the header for transmission, consuming the authorization.
    pub fn into_header(self) -> String {
        self.header
    }
}

/// Errors from the authorization step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("Invalid payment amount: {0}")]
    InvalidAmount(String),

    #[error("Payment was rejected in the wallet")]
    UserRejected,

    #[error("Payment signing failed: {0}")]
    SigningFailed(String),
}

/// Obtains payment authorizations from a wallet signer.
#[derive(Clone)]
pub struct PaymentAuthorizer {
    signer: Arc<dyn WalletSigner>,
}

impl PaymentAuthorizer {
    pub fn new(signer: Arc<dyn WalletSigner>) -> Self {
        Self { signer }
    }

    /// Ask the wallet to authorize `amount_usd`.
    ///
    /// Non-positive and non-numeric amounts fail with
    /// [`PaymentError::InvalidAmount`] before the signer is contacted.
    pub async fn authorize(&self, amount_usd: f64) -> Result<PaymentAuthorization, PaymentError> {
        let amount =
            UsdAmount::from_usd(amount_usd).map_err(|e| PaymentError::InvalidAmount(e.to_string()))?;
        self.authorize_amount(amount).await
    }

    /// Same as [`authorize`](Self::authorize) for an already validated amount.
    pub async fn authorize_amount(
        &self,
        amount: UsdAmount,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let request = PaymentRequest {
            amount_usd: amount.to_string(),
        };

        tracing::info!(amount_usd = %request.amount_usd, "Requesting payment signature");

        match self.signer.sign_payment(&request).await {
            Ok(signed) => {
                tracing::info!(
                    amount_usd = %request.amount_usd,
                    payer = %signed.payer,
                    "Payment authorized",
                );
                Ok(PaymentAuthorization {
                    header: signed.header,
                    payer: signed.payer,
                    amount,
                    authorized_at: chrono::Utc::now(),
                })
            }
            Err(SignerError::Cancelled) => {
                tracing::info!(amount_usd = %request.amount_usd, "Payment signature rejected by user");
                Err(PaymentError::UserRejected)
            }
            Err(SignerError::Failed(reason)) => {
                tracing::warn!(amount_usd = %request.amount_usd, error = %reason, "Payment signing failed");
                Err(PaymentError::SigningFailed(reason))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
