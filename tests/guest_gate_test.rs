//! Guest one-time-code gate integration tests
//!
//! Covers the code lifecycle on the gate itself and the deferred submission
//! path through the action desk.

mod common;

use std::time::Duration;

use common::*;
use relief_sync::config::GuestConfig;
use relief_sync::model::{DeliveryType, LocalIdentity};
use relief_sync::seed::seed_centers;
use relief_sync::{ClientState, CoreError, GuestGate, GuestState, RequestForm, SubmitOutcome};

const PHONE: &str = "98765 43210";
const PHONE_DIGITS: &str = "9876543210";

fn gate(codes: &[&str]) -> GuestGate<&'static str> {
    GuestGate::new(FakeOtp::with_codes(codes), GuestConfig::default())
}

fn form() -> RequestForm {
    RequestForm {
        item_name: "Rice Meals".into(),
        quantity: 3.0,
        center: Some(seed_centers()[0].clone()),
        delivery_type: DeliveryType::Pickup,
        is_priority: true,
    }
}

// =============================================================================
// Code lifecycle
// =============================================================================

#[tokio::test]
async fn test_wrong_code_keeps_code_issued() {
    let mut gate = gate(&["4821"]);
    gate.defer("submit");
    assert_eq!(gate.state(), GuestState::Unverified);

    assert_eq!(gate.issue_code(PHONE).await.unwrap(), "4821");
    assert_eq!(gate.state(), GuestState::CodeIssued);

    let err = gate.verify_code(PHONE, "0000").unwrap_err();
    assert!(matches!(err, CoreError::Authorization(_)));
    assert_eq!(gate.state(), GuestState::CodeIssued);
    assert_eq!(gate.pending(), Some(&"submit"));

    assert_eq!(gate.verify_code(PHONE, "4821").unwrap(), Some("submit"));
    assert_eq!(gate.state(), GuestState::Verified);
    assert!(gate.pending().is_none());
}

#[tokio::test]
async fn test_reissue_invalidates_previous_code() {
    let mut gate = gate(&["1111", "2222"]);
    gate.issue_code(PHONE).await.unwrap();
    gate.issue_code(PHONE).await.unwrap();

    assert!(gate.verify_code(PHONE, "1111").is_err());
    assert!(gate.verify_code(PHONE, "2222").is_ok());
    assert_eq!(gate.state(), GuestState::Verified);
}

#[tokio::test]
async fn test_failed_reissue_leaves_no_usable_code() {
    let mut gate = gate(&["1111"]);
    gate.issue_code(PHONE).await.unwrap();

    let err = gate.issue_code(PHONE).await.unwrap_err();
    assert!(matches!(err, CoreError::TransientNetwork(_)));
    assert_eq!(gate.state(), GuestState::Unverified);
    assert!(matches!(
        gate.verify_code(PHONE, "1111").unwrap_err(),
        CoreError::Authorization(_)
    ));
}

#[tokio::test]
async fn test_short_phone_and_blank_code_are_validation_errors() {
    let otp = FakeOtp::with_codes(&["4821"]);
    let mut gate: GuestGate<()> = GuestGate::new(otp.clone(), GuestConfig::default());

    let err = gate.issue_code("12345").await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(otp.phones().is_empty());

    gate.issue_code(PHONE).await.unwrap();
    assert!(matches!(gate.verify_code(PHONE, "  ").unwrap_err(), CoreError::Validation(_)));
    assert!(matches!(gate.verify_code(PHONE, "48-21").unwrap_err(), CoreError::Validation(_)));
    // Malformed input is not counted as an attempt
    assert_eq!(gate.session().attempts, 0);
}

#[tokio::test]
async fn test_code_is_bound_to_its_phone() {
    let mut gate = gate(&["4821"]);
    gate.issue_code(PHONE).await.unwrap();

    let err = gate.verify_code("9000000001", "4821").unwrap_err();
    assert!(matches!(err, CoreError::Authorization(_)));
    assert_eq!(gate.state(), GuestState::CodeIssued);
    // Formatting differences do not matter
    assert!(gate.verify_code("(98765)-43210", "4821").is_ok());
}

#[tokio::test]
async fn test_fifth_mismatch_locks_out() {
    let mut gate = gate(&["4821"]);
    gate.issue_code(PHONE).await.unwrap();

    for attempt in 1..=4 {
        assert!(gate.verify_code(PHONE, "0000").is_err());
        assert_eq!(gate.state(), GuestState::CodeIssued, "attempt {}", attempt);
    }
    let err = gate.verify_code(PHONE, "0000").unwrap_err();
    assert!(err.to_string().contains("too many"), "{}", err);
    assert_eq!(gate.state(), GuestState::Unverified);

    // The right code no longer helps
    assert!(gate.verify_code(PHONE, "4821").is_err());
}

#[tokio::test]
async fn test_verified_session_is_bound_to_its_phone() {
    let mut gate = gate(&["4821", "5555"]);
    gate.issue_code(PHONE).await.unwrap();
    gate.verify_code(PHONE, "4821").unwrap();

    let err = gate.verify_code("1111111111", "9999").unwrap_err();
    assert!(matches!(err, CoreError::Authorization(_)));
    assert_eq!(gate.phone(), Some(PHONE_DIGITS));
    assert!(gate.verify_code(PHONE, "anything").is_ok());
}

#[tokio::test]
async fn test_verified_session_is_not_reissued() {
    let otp = FakeOtp::with_codes(&["4821", "5555"]);
    let mut gate: GuestGate<()> = GuestGate::new(otp.clone(), GuestConfig::default());
    gate.issue_code(PHONE).await.unwrap();
    gate.verify_code(PHONE, "4821").unwrap();

    let err = gate.issue_code(PHONE).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(gate.state(), GuestState::Verified);
    assert_eq!(otp.phones().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_code_expires() {
    let mut gate = gate(&["4821"]);
    gate.issue_code(PHONE).await.unwrap();

    tokio::time::advance(Duration::from_secs(301)).await;
    let err = gate.verify_code(PHONE, "4821").unwrap_err();
    assert!(err.to_string().contains("expired"), "{}", err);
    assert_eq!(gate.state(), GuestState::Unverified);
}

// =============================================================================
// Deferred submission through the desk
// =============================================================================

#[tokio::test]
async fn test_guest_submission_resumes_after_verification() {
    let directory = FakeDirectory::new();
    directory.set_echo(serde_json::json!({
        "id": 77,
        "consumer_name": "Guest User",
        "item_name": "Rice Meals",
        "quantity": 3,
        "center_id": 1,
        "status": "pending"
    }));
    let engine = engine_with(directory.clone(), ClientState::with_seed());
    engine
        .store()
        .lock()
        .await
        .store_identity(&LocalIdentity::guest())
        .unwrap();
    let otp = FakeOtp::with_codes(&["4821"]);
    let desk = desk_with(engine.clone(), FakeRouting::new(RouteReply::Fail), otp.clone());

    let outcome = desk.submit(form(), None).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::VerificationRequired));
    assert!(directory.writes().is_empty());

    assert_eq!(desk.send_guest_code(PHONE).await.unwrap(), "4821");
    assert_eq!(otp.phones(), vec![PHONE.to_string()]);

    let err = desk.verify_guest(PHONE, "0000").await.unwrap_err();
    assert!(matches!(err, CoreError::Authorization(_)));
    assert_eq!(desk.gate().lock().await.state(), GuestState::CodeIssued);
    assert!(directory.writes().is_empty());

    let resumed = desk.verify_guest(PHONE, "4821").await.unwrap();
    let Some(SubmitOutcome::Submitted { draft, route, .. }) = resumed else {
        panic!("expected the deferred submission to go through");
    };
    assert_eq!(draft.consumer_name, "Guest User");
    assert_eq!(draft.phone, PHONE_DIGITS);
    assert!(draft.is_priority);
    assert!(route.is_none());

    let writes = directory.writes();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].starts_with("submit "));
    assert!(writes[0].contains(r#""center_id":1"#));

    let requests = engine.state().requests.snapshot().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].id.as_str(), "77");

    let identity = engine.store().lock().await.load_identity().unwrap().unwrap();
    assert!(identity.phone_verified);
    assert_eq!(identity.phone.as_deref(), Some(PHONE_DIGITS));
}

#[tokio::test]
async fn test_verified_guest_submits_directly() {
    let directory = FakeDirectory::new();
    let engine = engine_with(directory.clone(), ClientState::with_seed());
    let mut guest = LocalIdentity::guest();
    guest.phone_verified = true;
    guest.phone = Some("9876543210".into());
    engine.store().lock().await.store_identity(&guest).unwrap();
    let desk = desk_with(engine, FakeRouting::new(RouteReply::Fail), FakeOtp::with_codes(&[]));

    let outcome = desk.submit(form(), None).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Submitted { .. }));
    assert_eq!(directory.writes().len(), 1);
}

#[tokio::test]
async fn test_submit_requires_identity_and_connectivity() {
    let directory = FakeDirectory::new();
    let engine = engine_with(directory.clone(), ClientState::with_seed());
    let desk = desk_with(engine.clone(), FakeRouting::new(RouteReply::Fail), FakeOtp::with_codes(&[]));

    let err = desk.submit(form(), None).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid input: You must be logged in to request food.");

    engine
        .store()
        .lock()
        .await
        .store_identity(&LocalIdentity::guest())
        .unwrap();
    engine.connectivity().set_online(false);
    let err = desk.submit(form(), None).await.unwrap_err();
    assert!(matches!(err, CoreError::Offline(_)));
    assert!(desk.gate().lock().await.pending().is_none());
    assert!(directory.writes().is_empty());
}

#[tokio::test]
async fn test_verified_phone_cannot_be_swapped() {
    let directory = FakeDirectory::new();
    let engine = engine_with(directory.clone(), ClientState::with_seed());
    engine
        .store()
        .lock()
        .await
        .store_identity(&LocalIdentity::guest())
        .unwrap();
    let desk = desk_with(engine.clone(), FakeRouting::new(RouteReply::Fail), FakeOtp::with_codes(&["4821"]));

    desk.send_guest_code(PHONE).await.unwrap();
    assert!(desk.verify_guest(PHONE, "4821").await.unwrap().is_none());

    let err = desk.verify_guest("1111111111", "9999").await.unwrap_err();
    assert!(matches!(err, CoreError::Authorization(_)));

    let identity = engine.store().lock().await.load_identity().unwrap().unwrap();
    assert!(identity.phone_verified);
    assert_eq!(identity.phone.as_deref(), Some(PHONE_DIGITS));
}

#[tokio::test]
async fn test_offline_verification_keeps_submission_for_retry() {
    let directory = FakeDirectory::new();
    let engine = engine_with(directory.clone(), ClientState::with_seed());
    engine
        .store()
        .lock()
        .await
        .store_identity(&LocalIdentity::guest())
        .unwrap();
    let desk = desk_with(engine.clone(), FakeRouting::new(RouteReply::Fail), FakeOtp::with_codes(&["4821"]));

    assert!(matches!(
        desk.submit(form(), None).await.unwrap(),
        SubmitOutcome::VerificationRequired
    ));
    desk.send_guest_code(PHONE).await.unwrap();

    engine.connectivity().set_online(false);
    let err = desk.verify_guest(PHONE, "4821").await.unwrap_err();
    assert!(matches!(err, CoreError::Offline(_)));
    assert_eq!(desk.gate().lock().await.state(), GuestState::Verified);
    assert!(desk.gate().lock().await.pending().is_some());
    assert!(directory.writes().is_empty());

    engine.connectivity().set_online(true);
    let resumed = desk.verify_guest(PHONE, "4821").await.unwrap();
    assert!(matches!(resumed, Some(SubmitOutcome::Submitted { .. })));
    assert_eq!(directory.writes().len(), 1);
    assert!(desk.gate().lock().await.pending().is_none());
}
