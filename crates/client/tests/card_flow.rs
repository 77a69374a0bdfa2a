//! End-to-end creation flow against a mock card API.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use greetcard_client::access::AccessGrantStore;
use greetcard_client::api::AssetError;
use greetcard_client::error::JobError;
use greetcard_client::flow::await_outcome;
use greetcard_client::payment::PaymentError;
use greetcard_client::submitter::{AncillaryAccess, SubmitError};
use greetcard_client::tracker::TrackerPhase;
use greetcard_core::job::JobStatus;
use greetcard_core::request::{CreationRequest, Visibility};

use common::*;

const OUTCOME_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submitted_card_is_polled_until_completed() {
    let server = MockServer::start().await;
    mount_submit(&server, 200, json!({ "job": { "id": "abc123", "status": "generating" } })).await;
    mount_status_times(&server, "abc123", json!({ "status": "generating" }), 1).await;
    mount_status(
        &server,
        "abc123",
        json!({ "status": "completed", "word_count": 420, "preview": "Warm wishes" }),
    )
    .await;

    let signer = RecordingSigner::approving();
    let (mut flow, _) = build_flow(&server, signer.clone());
    let mut events = flow.subscribe();

    let handle = flow.create(greeting(Some(9.99))).await.unwrap();
    assert_eq!(handle.id(), "abc123");
    assert_eq!(handle.status(), JobStatus::Generating);

    let result = tokio::time::timeout(OUTCOME_TIMEOUT, await_outcome(&mut events, "abc123"))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(result.word_count, Some(420));
    assert_eq!(result.preview_text.as_deref(), Some("Warm wishes"));

    assert_eq!(signer.amounts(), vec!["9.99"]);
    assert_eq!(flow.tracker().phase(), TrackerPhase::Completed);
    assert!(!flow.tracker().is_polling());
    assert_eq!(requests_to(&server, "GET", "/cards/abc123/status").await.len(), 2);
}

#[tokio::test]
async fn submit_body_carries_header_and_options() {
    let server = MockServer::start().await;
    mount_submit(&server, 200, json!({ "job": { "id": "j1", "status": "completed" } })).await;

    let (mut flow, _) = build_flow(&server, RecordingSigner::approving());
    let request = CreationRequest::new("  Happy birthday!  ", Visibility::Private, "res-9", Some(10.0));
    flow.create(request).await.unwrap();

    let posts = requests_to(&server, "POST", "/cards").await;
    assert_eq!(posts.len(), 1);
    let body: Value = serde_json::from_slice(&posts[0].body).unwrap();
    assert_eq!(body["payment_header"], "test-header:10.00");
    assert_eq!(body["target_resource_id"], "res-9");
    assert_eq!(body["theme_text"], "Happy birthday!");
    assert_eq!(body["is_public"], false);
    assert_eq!(body["length_mode"], "standard");
    assert_eq!(body["generation_mode"], "hierarchical");
}

#[tokio::test]
async fn fast_path_completion_skips_polling_and_stores_grant() {
    let server = MockServer::start().await;
    let grant = json!({ "session_id": "sess-7", "expires_in": 3600 });
    mount_submit(
        &server,
        200,
        json!({
            "job": { "id": "fast1", "status": "completed", "word_count": 80, "preview": "Cheers" },
            "ancillary_access": grant,
        }),
    )
    .await;

    let (mut flow, grants) = build_flow(&server, RecordingSigner::approving());
    let mut events = flow.subscribe();
    flow.create(greeting(Some(9.99))).await.unwrap();

    let result = await_outcome(&mut events, "fast1").await.unwrap().unwrap();
    assert_eq!(result.word_count, Some(80));
    assert_eq!(
        grants.get("fast1").await.unwrap(),
        Some(AncillaryAccess(grant))
    );

    tokio::time::sleep(TEST_POLL_INTERVAL * 3).await;
    assert!(requests_to(&server, "GET", "/cards/fast1/status").await.is_empty());
}

// ---------------------------------------------------------------------------
// Rejections before and during submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overlong_theme_is_rejected_before_any_network_call() {
    let server = MockServer::start().await;
    let signer = RecordingSigner::approving();
    let (mut flow, _) = build_flow(&server, signer.clone());

    let request = CreationRequest::new("x".repeat(501), Visibility::Public, "resource-1", Some(9.99));
    let err = flow.create(request).await.unwrap_err();

    assert_matches!(err, JobError::Validation(_));
    assert!(signer.amounts().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(flow.tracker().phase(), TrackerPhase::Idle);
}

#[tokio::test]
async fn cancelled_signer_submits_nothing_and_leaves_tracker_idle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cards"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (mut flow, _) = build_flow(&server, RecordingSigner::cancelling());
    let err = flow.create(greeting(Some(9.99))).await.unwrap_err();

    assert_matches!(err, JobError::Authorization(PaymentError::UserRejected));
    assert_eq!(flow.tracker().phase(), TrackerPhase::Idle);
    assert!(flow.tracker().job_id().is_none());
}

#[tokio::test]
async fn payment_required_is_payment_rejected_and_retry_is_possible() {
    let server = MockServer::start().await;
    mount_submit(&server, 402, json!({ "detail": "Payment header expired" })).await;

    let (mut flow, _) = build_flow(&server, RecordingSigner::approving());
    let err = flow.create(greeting(Some(9.99))).await.unwrap_err();

    assert_matches!(
        err,
        JobError::Submission(SubmitError::PaymentRejected(msg)) if msg == "Payment header expired"
    );
    assert_eq!(flow.tracker().phase(), TrackerPhase::Idle);
    assert!(flow.tracker_mut().begin_submission().is_ok());
}

#[tokio::test]
async fn backend_field_errors_are_surfaced() {
    let server = MockServer::start().await;
    mount_submit(
        &server,
        422,
        json!({ "detail": [{ "loc": ["body", "theme_text"], "msg": "contains blocked words" }] }),
    )
    .await;

    let (mut flow, _) = build_flow(&server, RecordingSigner::approving());
    let err = flow.create(greeting(Some(9.99))).await.unwrap_err();

    assert_matches!(err, JobError::Submission(SubmitError::SubmissionValidation(fields)) => {
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field, "theme_text");
        assert_eq!(fields[0].message, "contains blocked words");
    });
}

#[tokio::test]
async fn server_error_on_submit_is_backend_unavailable() {
    let server = MockServer::start().await;
    mount_submit(&server, 503, json!({ "message": "maintenance" })).await;

    let (mut flow, _) = build_flow(&server, RecordingSigner::approving());
    let err = flow.create(greeting(Some(9.99))).await.unwrap_err();

    assert_matches!(err, JobError::Submission(SubmitError::BackendUnavailable(_)));
    assert_eq!(flow.tracker().phase(), TrackerPhase::Idle);
}

// ---------------------------------------------------------------------------
// Price resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn price_falls_back_to_base_price_from_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources/resource-1/metadata"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "current_price_usd": 0.0, "base_price_usd": 4.5 })),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_submit(&server, 200, json!({ "job": { "id": "j2", "status": "completed" } })).await;

    let signer = RecordingSigner::approving();
    let (mut flow, _) = build_flow(&server, signer.clone());
    flow.create(greeting(None)).await.unwrap();

    assert_eq!(signer.amounts(), vec!["4.50"]);
}

#[tokio::test]
async fn current_price_wins_over_base_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources/resource-1/metadata"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "current_price_usd": 7.25, "base_price_usd": 4.5 })),
        )
        .mount(&server)
        .await;
    mount_submit(&server, 200, json!({ "job": { "id": "j3", "status": "completed" } })).await;

    let signer = RecordingSigner::approving();
    let (mut flow, _) = build_flow(&server, signer.clone());
    flow.create(greeting(Some(0.0))).await.unwrap();

    assert_eq!(signer.amounts(), vec!["7.25"]);
}

#[tokio::test]
async fn missing_price_aborts_before_signing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resources/resource-1/metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let signer = RecordingSigner::approving();
    let (mut flow, _) = build_flow(&server, signer.clone());
    let err = flow.create(greeting(None)).await.unwrap_err();

    assert_matches!(err, JobError::Submission(SubmitError::PriceUnavailable(id)) if id == "resource-1");
    assert!(signer.amounts().is_empty());
    assert!(requests_to(&server, "POST", "/cards").await.is_empty());
    assert_eq!(flow.tracker().phase(), TrackerPhase::Idle);
}

// ---------------------------------------------------------------------------
// Polling outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_poll_error_does_not_abort_tracking() {
    let server = MockServer::start().await;
    mount_submit(&server, 200, json!({ "job": { "id": "j4", "status": "generating" } })).await;
    Mock::given(method("GET"))
        .and(path("/cards/j4/status"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_status(&server, "j4", json!({ "status": "completed", "word_count": 12 })).await;

    let (mut flow, _) = build_flow(&server, RecordingSigner::approving());
    let mut events = flow.subscribe();
    flow.create(greeting(Some(9.99))).await.unwrap();

    let outcome = tokio::time::timeout(OUTCOME_TIMEOUT, await_outcome(&mut events, "j4"))
        .await
        .unwrap()
        .unwrap();
    assert_matches!(outcome, Ok(result) if result.word_count == Some(12));
    assert_eq!(flow.tracker().consecutive_poll_failures(), 0);
}

#[tokio::test]
async fn failed_job_is_a_terminal_failure() {
    let server = MockServer::start().await;
    mount_submit(&server, 200, json!({ "job": { "id": "j5", "status": "generating" } })).await;
    mount_status(&server, "j5", json!({ "status": "failed", "error": "model overloaded" })).await;

    let (mut flow, _) = build_flow(&server, RecordingSigner::approving());
    let mut events = flow.subscribe();
    flow.create(greeting(Some(9.99))).await.unwrap();

    let outcome = tokio::time::timeout(OUTCOME_TIMEOUT, await_outcome(&mut events, "j5"))
        .await
        .unwrap()
        .unwrap();
    assert_matches!(
        outcome,
        Err(JobError::TerminalFailure { job_id, reason })
            if job_id == "j5" && reason == "model overloaded"
    );
    assert_eq!(flow.tracker().phase(), TrackerPhase::Failed);

    tokio::time::sleep(TEST_POLL_INTERVAL * 4).await;
    assert_eq!(requests_to(&server, "GET", "/cards/j5/status").await.len(), 1);
}

#[tokio::test]
async fn close_stops_all_polling() {
    let server = MockServer::start().await;
    mount_submit(&server, 200, json!({ "job": { "id": "j6", "status": "generating" } })).await;
    mount_status(&server, "j6", json!({ "status": "generating" })).await;

    let (mut flow, _) = build_flow(&server, RecordingSigner::approving());
    flow.create(greeting(Some(9.99))).await.unwrap();
    tokio::time::sleep(TEST_POLL_INTERVAL * 3).await;

    flow.close();
    assert_eq!(flow.tracker().phase(), TrackerPhase::Idle);
    // Let any request that was already on the wire land.
    tokio::time::sleep(TEST_POLL_INTERVAL).await;
    let polled = requests_to(&server, "GET", "/cards/j6/status").await.len();
    assert!(polled >= 1);

    tokio::time::sleep(TEST_POLL_INTERVAL * 5).await;
    assert_eq!(requests_to(&server, "GET", "/cards/j6/status").await.len(), polled);
    assert!(flow.tracker().snapshot().is_none());
}

#[tokio::test]
async fn tracking_an_existing_job() {
    let server = MockServer::start().await;
    mount_status(&server, "old1", json!({ "status": "completed", "word_count": 33 })).await;

    let (mut flow, _) = build_flow(&server, RecordingSigner::approving());
    let mut events = flow.subscribe();
    flow.track_existing("old1").unwrap();

    let result = tokio::time::timeout(OUTCOME_TIMEOUT, await_outcome(&mut events, "old1"))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(result.word_count, Some(33));
}

// ---------------------------------------------------------------------------
// Banner
// ---------------------------------------------------------------------------

async fn completed_flow(server: &MockServer, job_id: &str) -> greetcard_client::flow::CardFlow {
    mount_submit(server, 200, json!({ "job": { "id": job_id, "status": "completed" } })).await;
    let (mut flow, _) = build_flow(server, RecordingSigner::approving());
    flow.create(greeting(Some(9.99))).await.unwrap();
    flow
}

#[tokio::test]
async fn banner_url_is_attached_to_the_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cards/b1/banner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({ "asset_url": "https://cdn.example/b1.png", "cached": false, "enhanced": true }),
        ))
        .mount(&server)
        .await;
    let flow = completed_flow(&server, "b1").await;

    let url = flow.generate_banner().await.unwrap();
    assert_eq!(url, "https://cdn.example/b1.png");
    let snapshot = flow.tracker().snapshot().unwrap();
    assert_eq!(
        snapshot.result().unwrap().banner_url.as_deref(),
        Some("https://cdn.example/b1.png")
    );
}

#[tokio::test]
async fn banner_timeout_and_failure_are_distinguished() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cards/b2/banner"))
        .respond_with(ResponseTemplate::new(503).set_body_string("timed out"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cards/b2/banner"))
        .respond_with(ResponseTemplate::new(500).set_body_string("engine error"))
        .mount(&server)
        .await;
    let flow = completed_flow(&server, "b2").await;

    assert_matches!(
        flow.generate_banner().await,
        Err(JobError::Asset(AssetError::TimedOut))
    );
    assert_matches!(
        flow.generate_banner().await,
        Err(JobError::Asset(AssetError::Failed(body))) if body == "engine error"
    );
    assert!(flow.tracker().snapshot().unwrap().result().unwrap().banner_url.is_none());
}

#[tokio::test]
async fn banner_requires_a_completed_job() {
    let server = MockServer::start().await;
    let (flow, _) = build_flow(&server, RecordingSigner::approving());
    assert_matches!(flow.generate_banner().await, Err(JobError::Tracker(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
