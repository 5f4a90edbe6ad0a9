//! Tests for domain error construction and serialisation.

use super::*;
use crate::domain::TraceId;
use rstest::{fixture, rstest};
use serde_json::json;

const TRACE_ID: &str = "00000000-0000-0000-0000-000000000000";

#[fixture]
fn expected_trace_id() -> String {
    TRACE_ID.to_owned()
}

#[rstest]
#[case(Error::invalid_request("bad"), ErrorCode::InvalidRequest)]
#[case(Error::not_found("missing"), ErrorCode::NotFound)]
#[case(Error::service_unavailable("later"), ErrorCode::ServiceUnavailable)]
#[case(Error::internal("boom"), ErrorCode::InternalError)]
fn constructors_set_code(#[case] error: Error, #[case] expected: ErrorCode) {
    assert_eq!(error.code(), expected);
}

#[rstest]
fn try_new_rejects_empty_messages() {
    let result = Error::try_new(ErrorCode::InvalidRequest, "   ");
    assert!(matches!(result, Err(ErrorValidationError::EmptyMessage)));
}

#[rstest]
fn new_returns_none_when_trace_id_out_of_scope() {
    let error = Error::internal("boom");
    assert!(error.trace_id().is_none());
}

#[rstest]
#[tokio::test]
async fn new_captures_trace_id_in_scope(expected_trace_id: String) {
    let trace_id: TraceId = expected_trace_id
        .parse()
        .expect("fixtures provide a valid UUID");
    let error = TraceId::scope(trace_id, async move { Error::internal("boom") }).await;

    assert_eq!(error.trace_id(), Some(expected_trace_id.as_str()));
}

#[rstest]
fn serialises_camel_case_and_skips_empty_fields() {
    let error = Error::invalid_request("unknown kind: tram_stop");
    let value = serde_json::to_value(&error).expect("error serialises");

    assert_eq!(
        value,
        json!({ "code": "invalid_request", "message": "unknown kind: tram_stop" })
    );
}

#[rstest]
fn deserialisation_rejects_blank_message() {
    let payload = json!({ "code": "not_found", "message": "  " });
    let result = serde_json::from_value::<Error>(payload);
    assert!(result.is_err(), "blank messages must be rejected");
}

#[rstest]
fn round_trips_details_and_trace(expected_trace_id: String) {
    let error = Error::service_unavailable("entity store offline")
        .with_trace_id(expected_trace_id.clone())
        .with_details(json!({ "store": "postgres" }));

    let value = serde_json::to_value(&error).expect("error serialises");
    let decoded: Error = serde_json::from_value(value).expect("error deserialises");

    assert_eq!(decoded.trace_id(), Some(expected_trace_id.as_str()));
    assert_eq!(decoded.details(), Some(&json!({ "store": "postgres" })));
}
