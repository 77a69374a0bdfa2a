//! Local HMAC wallet signer for development and automation.
//!
//! Real deployments plug a browser or hardware wallet in behind
//! [`WalletSigner`].  [`HmacWalletSigner`] signs with a shared secret
//! instead, which is enough for backends running in development mode and
//! for the command-line binary.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::payment::{PaymentRequest, SignedPayment, SignerError, WalletSigner};

type HmacSha256 = Hmac<Sha256>;

/// Prefix identifying the header format.
pub const HEADER_VERSION: &str = "v1";

/// Signs payment requests with HMAC-SHA256 over a shared secret.
pub struct HmacWalletSigner {
    payer: String,
    secret: String,
}

impl HmacWalletSigner {
    pub fn new(payer: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            payer: payer.into(),
            secret: secret.into(),
        }
    }

    /// Build the header for `amount_usd` with an explicit nonce and
    /// timestamp. Exposed so the format can be verified deterministically.
    pub fn header_for(&self, amount_usd: &str, nonce: &str, timestamp: i64) -> Result<String, SignerError> {
        let message = format!("{}|{amount_usd}|{nonce}|{timestamp}", self.payer);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| SignerError::Failed(e.to_string()))?;
        mac.update(message.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!(
            "{HEADER_VERSION}:{}:{amount_usd}:{nonce}:{timestamp}:{signature}",
            self.payer
        ))
    }
}

#[async_trait]
impl WalletSigner for HmacWalletSigner {
    async fn sign_payment(&self, request: &PaymentRequest) -> Result<SignedPayment, SignerError> {
        if self.secret.is_empty() {
            return Err(SignerError::Failed("signing secret is empty".to_string()));
        }
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let header = self.header_for(&request.amount_usd, &nonce, timestamp)?;
        Ok(SignedPayment {
            header,
            payer: self.payer.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// hex encoding
// ---------------------------------------------------------------------------

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
