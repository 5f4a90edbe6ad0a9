//! Shared validation helpers for inbound HTTP adapters.
//!
//! Every rejection is an `invalid_request` error whose details name the
//! offending field, a stable code and, where useful, the accepted values.

use serde_json::{Value, json};

use crate::domain::{Coordinates, EntityId, EntityKind, Error};

/// Validation error codes for HTTP request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidEntityId,
    InvalidKind,
    InvalidCoordinates,
    BlankTitle,
    InvalidMetadata,
}

impl ErrorCode {
    fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidEntityId => "invalid_entity_id",
            ErrorCode::InvalidKind => "invalid_kind",
            ErrorCode::InvalidCoordinates => "invalid_coordinates",
            ErrorCode::BlankTitle => "blank_title",
            ErrorCode::InvalidMetadata => "invalid_metadata",
        }
    }
}

/// Newtype wrapper for HTTP field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldName(&'static str);

impl FieldName {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self(name)
    }

    fn as_str(self) -> &'static str {
        self.0
    }
}

fn field_error(field: FieldName, code: ErrorCode, message: String, value: Value) -> Error {
    Error::invalid_request(message).with_details(json!({
        "field": field.as_str(),
        "value": value,
        "code": code.as_str(),
    }))
}

pub(crate) fn parse_entity_id(raw: i64, field: FieldName) -> Result<EntityId, Error> {
    EntityId::new(raw).map_err(|_| {
        field_error(
            field,
            ErrorCode::InvalidEntityId,
            format!("{} must be a positive integer", field.as_str()),
            json!(raw),
        )
    })
}

/// Parse a kind name, listing the accepted names on failure.
pub(crate) fn parse_kind(raw: &str, field: FieldName) -> Result<EntityKind, Error> {
    raw.parse().map_err(|_| {
        let allowed: Vec<&str> = EntityKind::ALL.iter().map(|kind| kind.as_str()).collect();
        Error::invalid_request(format!("{} must be one of {}", field.as_str(), allowed.join(", ")))
            .with_details(json!({
                "field": field.as_str(),
                "value": raw,
                "code": ErrorCode::InvalidKind.as_str(),
                "allowed": allowed,
            }))
    })
}

pub(crate) fn parse_optional_kind(
    raw: Option<&str>,
    field: FieldName,
) -> Result<Option<EntityKind>, Error> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| parse_kind(value, field))
        .transpose()
}

pub(crate) fn parse_coordinates(lat: f64, lng: f64) -> Result<Coordinates, Error> {
    Coordinates::new(lat, lng).map_err(|err| {
        field_error(
            FieldName::new("coordinates"),
            ErrorCode::InvalidCoordinates,
            err.to_string(),
            json!({ "lat": lat, "lng": lng }),
        )
    })
}

pub(crate) fn require_title(raw: String) -> Result<String, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(field_error(
            FieldName::new("title"),
            ErrorCode::BlankTitle,
            "title must not be blank".to_owned(),
            json!(raw),
        ));
    }
    Ok(trimmed.to_owned())
}

/// Metadata must be a JSON object; `null` or absence means empty.
pub(crate) fn metadata_object(
    raw: Option<Value>,
) -> Result<serde_json::Map<String, Value>, Error> {
    match raw {
        None | Some(Value::Null) => Ok(serde_json::Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(field_error(
            FieldName::new("metadata"),
            ErrorCode::InvalidMetadata,
            "metadata must be a JSON object".to_owned(),
            other,
        )),
    }
}
