use std::sync::Arc;

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;
use vouch_core::{
  Address,
  config::CoordinatorConfig,
  fact::{FactPayload, Role, RoleAssignmentValue},
  memory::{MemoryLedger, MemoryStore, TxOutcome},
  platform::Platform,
};

use crate::api_router;

const SUBJECT: &str = "0x0000000000000000000000000000000000000abc";
const ADMIN: &str = "0x00000000000000000000000000000000000000ad";

type TestPlatform = Platform<MemoryLedger, MemoryStore>;

fn platform() -> (Arc<MemoryLedger>, Arc<TestPlatform>) {
  let ledger = Arc::new(MemoryLedger::new());
  let store = Arc::new(MemoryStore::new());
  let platform =
    Platform::new(ledger.clone(), store, CoordinatorConfig::default());
  (ledger, Arc::new(platform))
}

async fn send(
  platform: &Arc<TestPlatform>,
  method: &str,
  uri: &str,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = api_router(platform.clone())
    .oneshot(builder.body(body).unwrap())
    .await
    .unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

fn document_submission(subject: &str) -> Value {
  json!({
    "subject": subject,
    "payload": {
      "type": "document_hash",
      "data": { "document_type": "passport", "sha256": "ab".repeat(32), "uri": null }
    }
  })
}

// ─── Submissions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_then_poll_until_reconciled() {
  let (_ledger, platform) = platform();

  let (status, body) =
    send(&platform, "POST", "/submissions", Some(document_submission(SUBJECT))).await;
  assert_eq!(status, StatusCode::ACCEPTED);
  assert_eq!(body["state"], "submitted");
  assert_eq!(body["fact_type"], "document_hash");

  let fact_id: Uuid = body["fact_id"].as_str().unwrap().parse().unwrap();
  platform.workflow().wait(fact_id).await.unwrap();

  let (status, body) =
    send(&platform, "GET", &format!("/submissions/{fact_id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["state"], "reconciled");

  let (status, body) =
    send(&platform, "GET", &format!("/status/{SUBJECT}/document_hash"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["effective"], "verified");
  assert_eq!(body["merged"]["resolved_status"], "verified");

  let (_, body) = send(
    &platform,
    "GET",
    &format!("/submissions?subject={SUBJECT}&fact_type=document_hash"),
    None,
  )
  .await;
  assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_address_is_bad_request() {
  let (_ledger, platform) = platform();
  let (status, body) =
    send(&platform, "POST", "/submissions", Some(document_submission("0xABC"))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("malformed address"));

  let (status, _) = send(&platform, "GET", "/status/nope/document_hash", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, _) = send(&platform, "GET", &format!("/status/{SUBJECT}/nope"), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn second_submission_while_in_flight_conflicts() {
  let (ledger, platform) = platform();
  ledger.set_outcome(TxOutcome::Stall);

  let (first, _) =
    send(&platform, "POST", "/submissions", Some(document_submission(SUBJECT))).await;
  let (second, body) =
    send(&platform, "POST", "/submissions", Some(document_submission(SUBJECT))).await;

  assert_eq!(first, StatusCode::ACCEPTED);
  assert_eq!(second, StatusCode::CONFLICT);
  assert!(body["error"].as_str().unwrap().contains("already in flight"));

  let (_, in_flight) = send(&platform, "GET", "/submissions/in-flight", None).await;
  assert_eq!(in_flight.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_submission_is_not_found() {
  let (_ledger, platform) = platform();
  let (status, _) =
    send(&platform, "GET", &format!("/submissions/{}", Uuid::new_v4()), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Roles and capabilities ──────────────────────────────────────────────────

#[tokio::test]
async fn role_assignment_requires_admin() {
  let (ledger, platform) = platform();
  let admin = Address::parse(ADMIN).unwrap();
  ledger.seed_confirmed(
    &admin,
    FactPayload::RoleAssignment(RoleAssignmentValue { role: Role::Admin }),
  );

  let (status, _) = send(
    &platform,
    "POST",
    &format!("/roles/{SUBJECT}"),
    Some(json!({ "actor": SUBJECT, "role": "admin" })),
  )
  .await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, body) = send(
    &platform,
    "POST",
    &format!("/roles/{SUBJECT}"),
    Some(json!({ "actor": ADMIN, "role": "verifier" })),
  )
  .await;
  assert_eq!(status, StatusCode::ACCEPTED);
  let fact_id: Uuid = body["fact_id"].as_str().unwrap().parse().unwrap();
  platform.workflow().wait(fact_id).await.unwrap();

  let (status, body) =
    send(&platform, "GET", &format!("/roles/{SUBJECT}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["role"], "verifier");
}

#[tokio::test]
async fn document_upload_is_hashed() {
  let (_ledger, platform) = platform();

  // "hello" in base64.
  let (status, body) = send(
    &platform,
    "POST",
    &format!("/kyc/{SUBJECT}/documents"),
    Some(json!({ "document_type": "passport", "contents": "aGVsbG8=" })),
  )
  .await;
  assert_eq!(status, StatusCode::ACCEPTED);
  let fact_id: Uuid = body["fact_id"].as_str().unwrap().parse().unwrap();
  platform.workflow().wait(fact_id).await.unwrap();

  let (_, body) = send(&platform, "GET", "/analytics/summary", None).await;
  assert_eq!(body["total"], 1);
  assert_eq!(body["by_phase"]["reconciled"], 1);

  let (status, _) = send(
    &platform,
    "POST",
    &format!("/kyc/{SUBJECT}/documents"),
    Some(json!({ "document_type": "passport", "contents": "not base64!" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn loan_decision_by_unassigned_actor_is_forbidden() {
  let (_ledger, platform) = platform();
  let (status, _) = send(
    &platform,
    "POST",
    &format!("/loans/{SUBJECT}"),
    Some(json!({ "actor": ADMIN, "loan_id": "l-1", "approved": true })),
  )
  .await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, body) = send(&platform, "GET", &format!("/loans/{SUBJECT}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["effective"], "unverified");
}

// ─── Operator tooling ────────────────────────────────────────────────────────

#[tokio::test]
async fn stuck_records_and_reconcile() {
  let (_ledger, platform) = platform();

  let (status, body) =
    send(&platform, "GET", "/records/stuck?older_than_secs=0", None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(body.as_array().unwrap().is_empty());

  let (status, _) = send(
    &platform,
    "POST",
    &format!("/records/{}/reconcile", Uuid::new_v4()),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _) =
    send(&platform, "GET", "/records/stuck?older_than_secs=-5", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = send(
    &platform,
    "GET",
    &format!("/records/stuck?older_than_secs={}", i64::MAX),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("out of range"));
}
