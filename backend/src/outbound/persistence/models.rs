//! Diesel row structs for the entity store.
//!
//! Rows are internal to the persistence adapter; conversions into domain
//! types validate every column so corrupt rows surface as errors.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use crate::domain::ports::StoredAttribute;
use crate::domain::{Coordinates, Entity, EntityId, EntityKind};

use super::schema::{entities, entity_attributes};

/// Entity columns read back from the database.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = entities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct EntityRow {
    pub id: i64,
    pub kind: String,
    pub lat: f64,
    pub lng: f64,
    pub title: String,
    pub metadata: Value,
}

impl TryFrom<EntityRow> for Entity {
    type Error = String;

    fn try_from(row: EntityRow) -> Result<Self, Self::Error> {
        let id = EntityId::new(row.id).map_err(|err| err.to_string())?;
        let kind: EntityKind = row
            .kind
            .parse()
            .map_err(|err| format!("entity {id}: {err}"))?;
        let coordinates =
            Coordinates::new(row.lat, row.lng).map_err(|err| format!("entity {id}: {err}"))?;
        let metadata = match row.metadata {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => return Err(format!("entity {id}: metadata must be an object, got {other}")),
        };
        Ok(Entity {
            id,
            kind,
            coordinates,
            title: row.title,
            metadata,
        })
    }
}

/// Attribute value and timestamp.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = entity_attributes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AttributeRow {
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

impl From<AttributeRow> for StoredAttribute {
    fn from(row: AttributeRow) -> Self {
        Self {
            value: row.value,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn row(kind: &str, metadata: Value) -> EntityRow {
        EntityRow {
            id: 12,
            kind: kind.to_owned(),
            lat: 52.52,
            lng: 13.405,
            title: "Alexanderplatz".to_owned(),
            metadata,
        }
    }

    #[rstest]
    fn converts_valid_rows() {
        let entity = Entity::try_from(row("poi", json!({ "icon": "museum" }))).expect("valid row");
        assert_eq!(entity.kind, EntityKind::Poi);
        assert_eq!(entity.metadata.get("icon"), Some(&json!("museum")));
    }

    #[rstest]
    fn null_metadata_becomes_empty_map() {
        let entity = Entity::try_from(row("camp_spot", Value::Null)).expect("valid row");
        assert!(entity.metadata.is_empty());
    }

    #[rstest]
    #[case::unknown_kind(row("restaurant", json!({})))]
    #[case::array_metadata(row("poi", json!([1, 2])))]
    fn rejects_corrupt_rows(#[case] row: EntityRow) {
        assert!(Entity::try_from(row).is_err());
    }
}
