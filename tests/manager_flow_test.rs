mod common;

use std::sync::Arc;

use paygate_core::adapters::MemoryStateStore;
use paygate_core::{
    CallbackRequest, PaymentError, PaymentRequest, TransactionRepository, TransactionStatus,
    PARAM_STATE, PARAM_TRANSACTION_ID,
};

use common::{callback_params, manager_with, toman, MockDriver};

#[tokio::test]
async fn authorize_then_settle_then_replay() {
    let driver = Arc::new(MockDriver::new());
    let (manager, repo) = manager_with(driver.clone());
    let state = MemoryStateStore::new();

    // authorize: record created in init with a redirect target
    let authorized = manager
        .authorize("mock", &state, PaymentRequest::new(toman(100_000)))
        .await
        .unwrap();
    assert_eq!(authorized.record.status, TransactionStatus::Init);
    assert!(!authorized.record.order_id.is_empty());
    assert!(!authorized.redirect.url.is_empty());
    assert_eq!(authorized.record.token.as_deref(), Some("tok-1"));

    let params = callback_params(&driver.last_callback_url().unwrap());
    let callback = CallbackRequest::from_pairs([
        (PARAM_TRANSACTION_ID, params[PARAM_TRANSACTION_ID].as_str()),
        (PARAM_STATE, params[PARAM_STATE].as_str()),
        ("status", "0"),
    ]);

    // settle: record reaches succeeded with settlement fields and one log entry
    let settled = manager.settle(&state, &callback).await.unwrap();
    assert_eq!(settled.status, TransactionStatus::Succeeded);
    assert_eq!(settled.trace_number.as_deref(), Some("trace-1"));
    assert!(settled.paid_at.is_some());
    assert_eq!(settled.log.len(), 1);
    assert_eq!(settled.log[0].code, "succeeded");

    // replaying the identical callback is rejected and mutates nothing
    let err = manager.settle(&state, &callback).await.unwrap_err();
    assert!(matches!(err, PaymentError::Retry(_)));
    let reloaded = repo.find_by_id(settled.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TransactionStatus::Succeeded);
    assert_eq!(reloaded.log.len(), 1);
}

#[tokio::test]
async fn mismatched_state_token_is_rejected_and_single_use() {
    let driver = Arc::new(MockDriver::new());
    let (manager, repo) = manager_with(driver.clone());
    let state = MemoryStateStore::new();

    let authorized = manager
        .authorize("mock", &state, PaymentRequest::new(toman(5_000)))
        .await
        .unwrap();
    let params = callback_params(&driver.last_callback_url().unwrap());

    let tampered = CallbackRequest::from_pairs([
        (PARAM_TRANSACTION_ID, params[PARAM_TRANSACTION_ID].as_str()),
        (PARAM_STATE, "forged"),
        ("status", "0"),
    ]);
    let err = manager.settle(&state, &tampered).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidState(_)));

    let record = repo.find_by_id(authorized.record.id).await.unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Init);

    // the expected token was consumed by the failed check, so even the
    // genuine callback can no longer pass the session-based gate
    let genuine = CallbackRequest::from_pairs([
        (PARAM_TRANSACTION_ID, params[PARAM_TRANSACTION_ID].as_str()),
        (PARAM_STATE, params[PARAM_STATE].as_str()),
        ("status", "0"),
    ]);
    let err = manager.settle(&state, &genuine).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidState(_)));
}

#[tokio::test]
async fn missing_correlation_id_is_invalid_request() {
    let (manager, _repo) = manager_with(Arc::new(MockDriver::new()));
    let state = MemoryStateStore::new();
    let callback = CallbackRequest::from_pairs([("status", "0")]);
    let err = manager.settle(&state, &callback).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidRequest(_)));
}

#[tokio::test]
async fn unknown_correlation_id_is_not_found() {
    let (manager, _repo) = manager_with(Arc::new(MockDriver::new().stateless()));
    let state = MemoryStateStore::new();
    let callback =
        CallbackRequest::from_pairs([(PARAM_TRANSACTION_ID, "9999"), ("status", "0")]);
    let err = manager.settle(&state, &callback).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
}

#[tokio::test]
async fn unknown_provider_is_rejected_at_authorization() {
    let (manager, _repo) = manager_with(Arc::new(MockDriver::new()));
    let state = MemoryStateStore::new();
    let err = manager
        .authorize("no-such-gateway", &state, PaymentRequest::new(toman(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ProviderNotFound(_)));
}

#[tokio::test]
async fn stateless_driver_settles_from_caller_input_alone() {
    let driver = Arc::new(MockDriver::new().stateless());
    let (manager, _repo) = manager_with(driver.clone());
    let state = MemoryStateStore::new();

    let authorized = manager
        .authorize("mock", &state, PaymentRequest::new(toman(2_500)))
        .await
        .unwrap();

    // nothing was parked in the session for a stateless driver
    let params = callback_params(&driver.last_callback_url().unwrap());
    assert!(!params.contains_key(PARAM_STATE));

    let callback = CallbackRequest::from_pairs([
        (PARAM_TRANSACTION_ID, authorized.record.id.to_string().as_str()),
        ("status", "0"),
    ]);
    let settled = manager.settle(&state, &callback).await.unwrap();
    assert_eq!(settled.status, TransactionStatus::Succeeded);
}

#[tokio::test]
async fn lost_session_state_cannot_settle_a_stateful_flow() {
    let driver = Arc::new(MockDriver::new());
    let (manager, repo) = manager_with(driver.clone());
    let state = MemoryStateStore::new();

    let authorized = manager
        .authorize("mock", &state, PaymentRequest::new(toman(2_500)))
        .await
        .unwrap();
    let params = callback_params(&driver.last_callback_url().unwrap());

    // a fresh session has no parked correlation id or token
    let fresh = MemoryStateStore::new();
    let callback = CallbackRequest::from_pairs([
        (PARAM_TRANSACTION_ID, params[PARAM_TRANSACTION_ID].as_str()),
        (PARAM_STATE, params[PARAM_STATE].as_str()),
        ("status", "0"),
    ]);
    let err = manager.settle(&fresh, &callback).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidState(_)));

    let record = repo.find_by_id(authorized.record.id).await.unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Init);
}

#[tokio::test]
async fn gateway_rejection_marks_the_record_failed() {
    let driver = Arc::new(MockDriver::new().failing_settle("-5", "payment canceled by payer"));
    let (manager, repo) = manager_with(driver.clone());
    let state = MemoryStateStore::new();

    let authorized = manager
        .authorize("mock", &state, PaymentRequest::new(toman(1_000)))
        .await
        .unwrap();
    let params = callback_params(&driver.last_callback_url().unwrap());
    let callback = CallbackRequest::from_pairs([
        (PARAM_TRANSACTION_ID, params[PARAM_TRANSACTION_ID].as_str()),
        (PARAM_STATE, params[PARAM_STATE].as_str()),
        ("status", "0"),
    ]);

    let err = manager.settle(&state, &callback).await.unwrap_err();
    assert!(matches!(err, PaymentError::Gateway { .. }));

    let record = repo.find_by_id(authorized.record.id).await.unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(record.log.len(), 1);
    assert_eq!(record.log[0].code, "-5");
    assert_eq!(record.log[0].message, "payment canceled by payer");
}

#[tokio::test]
async fn settlement_declaring_wrong_fields_fails_the_record() {
    let driver = Arc::new(MockDriver::new().declaring_order_id("someone-elses-order"));
    let (manager, repo) = manager_with(driver.clone());
    let state = MemoryStateStore::new();

    let authorized = manager
        .authorize("mock", &state, PaymentRequest::new(toman(1_000)))
        .await
        .unwrap();
    let params = callback_params(&driver.last_callback_url().unwrap());
    let callback = CallbackRequest::from_pairs([
        (PARAM_TRANSACTION_ID, params[PARAM_TRANSACTION_ID].as_str()),
        (PARAM_STATE, params[PARAM_STATE].as_str()),
        ("status", "0"),
    ]);

    let err = manager.settle(&state, &callback).await.unwrap_err();
    assert!(
        matches!(err, PaymentError::Gateway { ref code, .. } if code == "field_mismatch"),
        "unexpected error: {err}"
    );
    let record = repo.find_by_id(authorized.record.id).await.unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn authorization_failure_marks_the_record_failed() {
    let driver = Arc::new(MockDriver::new().failing_authorize("-1", "unknown merchant"));
    let (manager, repo) = manager_with(driver.clone());
    let state = MemoryStateStore::new();

    let err = manager
        .authorize("mock", &state, PaymentRequest::new(toman(1_000)))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Gateway { .. }));

    let records = repo.list(10, 0).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TransactionStatus::Failed);
    assert_eq!(records[0].log[0].code, "-1");
}

#[tokio::test]
async fn malformed_callback_leaves_the_record_untouched() {
    let driver = Arc::new(MockDriver::new());
    let (manager, repo) = manager_with(driver.clone());
    let state = MemoryStateStore::new();

    let authorized = manager
        .authorize("mock", &state, PaymentRequest::new(toman(1_000)))
        .await
        .unwrap();
    let params = callback_params(&driver.last_callback_url().unwrap());

    // structurally incomplete: the driver requires a status parameter
    let callback = CallbackRequest::from_pairs([
        (PARAM_TRANSACTION_ID, params[PARAM_TRANSACTION_ID].as_str()),
        (PARAM_STATE, params[PARAM_STATE].as_str()),
    ]);
    let err = manager.settle(&state, &callback).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidRequest(_)));

    let record = repo.find_by_id(authorized.record.id).await.unwrap().unwrap();
    assert_eq!(record.status, TransactionStatus::Init);
    assert!(record.log.is_empty());
}
