use std::sync::Arc;
use std::time::Duration;

use dernek_domain::idempotency::{
    BeginOutcome, IdempotencyConfig, IdempotencyService, InMemoryIdempotencyStore,
};
use dernek_domain::ports::idempotency::{IdempotencyKey, IdempotencyResponse};
use serde_json::json;

const SUBMIT: &str = r#"{"action":"submit"}"#;

fn service(in_progress_ttl: Duration) -> IdempotencyService {
    IdempotencyService::new(
        Arc::new(InMemoryIdempotencyStore::new("test")),
        IdempotencyConfig {
            in_progress_ttl,
            completed_ttl: Duration::from_secs(60),
        },
    )
}

#[tokio::test]
async fn completed_transition_replays_first_response() {
    let service = service(Duration::from_secs(60));
    let key = IdempotencyKey::transition("app-1", "u-1", "req-1");
    assert_eq!(service.begin(&key, SUBMIT).await.unwrap(), BeginOutcome::Started);

    let response = IdempotencyResponse {
        status_code: 200,
        body: json!({ "stage": "submitted" }),
    };
    service
        .complete(&key, SUBMIT, response.clone())
        .await
        .unwrap();

    assert_eq!(
        service.begin(&key, SUBMIT).await.unwrap(),
        BeginOutcome::Replay(response)
    );
}

#[tokio::test]
async fn concurrent_duplicate_sees_in_progress() {
    let service = service(Duration::from_secs(60));
    let key = IdempotencyKey::transition("app-2", "u-1", "req-2");
    assert_eq!(service.begin(&key, SUBMIT).await.unwrap(), BeginOutcome::Started);
    assert_eq!(
        service.begin(&key, SUBMIT).await.unwrap(),
        BeginOutcome::InProgress
    );
}

#[tokio::test]
async fn expired_claim_allows_new_start() {
    let service = service(Duration::from_millis(10));
    let key = IdempotencyKey::transition("app-3", "u-1", "req-3");
    assert_eq!(service.begin(&key, SUBMIT).await.unwrap(), BeginOutcome::Started);

    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(service.begin(&key, SUBMIT).await.unwrap(), BeginOutcome::Started);
}

#[tokio::test]
async fn released_claim_can_be_retried() {
    let service = service(Duration::from_secs(60));
    let key = IdempotencyKey::transition("app-4", "u-1", "req-4");
    assert_eq!(service.begin(&key, SUBMIT).await.unwrap(), BeginOutcome::Started);
    service.release(&key).await.unwrap();
    assert_eq!(service.begin(&key, SUBMIT).await.unwrap(), BeginOutcome::Started);
}

#[tokio::test]
async fn keys_are_scoped_per_application() {
    let service = service(Duration::from_secs(60));
    let first = IdempotencyKey::transition("app-5", "u-1", "req-shared");
    let second = IdempotencyKey::transition("app-6", "u-1", "req-shared");
    assert_eq!(service.begin(&first, SUBMIT).await.unwrap(), BeginOutcome::Started);
    assert_eq!(service.begin(&second, SUBMIT).await.unwrap(), BeginOutcome::Started);
}

#[tokio::test]
async fn keys_are_scoped_per_user() {
    let service = service(Duration::from_secs(60));
    let clerk = IdempotencyKey::transition("app-7", "u-1", "req-shared");
    let reviewer = IdempotencyKey::transition("app-7", "u-2", "req-shared");
    service
        .complete(
            &clerk,
            r#"{"action":"approve"}"#,
            IdempotencyResponse {
                status_code: 403,
                body: json!({ "error": { "code": "FORBIDDEN" } }),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        service
            .begin(&reviewer, r#"{"action":"reject"}"#)
            .await
            .unwrap(),
        BeginOutcome::Started
    );
}

#[tokio::test]
async fn reused_key_with_other_body_is_a_mismatch() {
    let service = service(Duration::from_secs(60));
    let key = IdempotencyKey::transition("app-8", "u-1", "req-8");
    assert_eq!(service.begin(&key, SUBMIT).await.unwrap(), BeginOutcome::Started);
    assert_eq!(
        service
            .begin(&key, r#"{"action":"start_review"}"#)
            .await
            .unwrap(),
        BeginOutcome::Mismatch
    );

    service
        .complete(
            &key,
            SUBMIT,
            IdempotencyResponse {
                status_code: 200,
                body: json!({ "stage": "submitted" }),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        service
            .begin(&key, r#"{"action":"start_review"}"#)
            .await
            .unwrap(),
        BeginOutcome::Mismatch
    );
}
