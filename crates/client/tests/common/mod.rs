use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use greetcard_client::access::MemoryAccessGrantStore;
use greetcard_client::api::CardApi;
use greetcard_client::config::ClientConfig;
use greetcard_client::flow::CardFlow;
use greetcard_client::payment::{PaymentRequest, SignedPayment, SignerError, WalletSigner};
use greetcard_core::request::{CreationRequest, Visibility};

/// Poll cadence used against mock servers; short so tests finish quickly.
pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub const PAYER: &str = "0xpayer";

pub fn test_config(api_url: String) -> ClientConfig {
    ClientConfig::new(api_url).with_poll_interval(TEST_POLL_INTERVAL)
}

/// Signer that approves or cancels every request and records the amounts
/// it was asked to sign.
pub struct RecordingSigner {
    cancel: bool,
    amounts: Mutex<Vec<String>>,
}

impl RecordingSigner {
    pub fn approving() -> Arc<Self> {
        Arc::new(Self {
            cancel: false,
            amounts: Mutex::new(Vec::new()),
        })
    }

    pub fn cancelling() -> Arc<Self> {
        Arc::new(Self {
            cancel: true,
            amounts: Mutex::new(Vec::new()),
        })
    }

    pub fn amounts(&self) -> Vec<String> {
        self.amounts.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletSigner for RecordingSigner {
    async fn sign_payment(&self, request: &PaymentRequest) -> Result<SignedPayment, SignerError> {
        self.amounts.lock().unwrap().push(request.amount_usd.clone());
        if self.cancel {
            return Err(SignerError::Cancelled);
        }
        Ok(SignedPayment {
            header: format!("test-header:{}", request.amount_usd),
            payer: PAYER.to_string(),
        })
    }
}

/// Build a flow against `server` with an in-memory grant store.
pub fn build_flow(
    server: &MockServer,
    signer: Arc<RecordingSigner>,
) -> (CardFlow, Arc<MemoryAccessGrantStore>) {
    let config = test_config(server.uri());
    let api = Arc::new(CardApi::with_client(reqwest::Client::new(), server.uri()));
    let grants = Arc::new(MemoryAccessGrantStore::new());
    let flow = CardFlow::with_api(api, &config, signer, grants.clone());
    (flow, grants)
}

pub fn greeting(quoted_price_usd: Option<f64>) -> CreationRequest {
    CreationRequest::new(
        "A warm holiday greeting",
        Visibility::Public,
        "resource-1",
        quoted_price_usd,
    )
}

pub async fn mount_submit(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path("/cards"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Answer the next `times` status polls for `job_id` with `body`.
pub async fn mount_status_times(server: &MockServer, job_id: &str, body: Value, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/cards/{job_id}/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Answer every remaining status poll for `job_id` with `body`.
pub async fn mount_status(server: &MockServer, job_id: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/cards/{job_id}/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Requests the mock server received for `verb` on `route`.
pub async fn requests_to(server: &MockServer, verb: &str, route: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .collect()
}
