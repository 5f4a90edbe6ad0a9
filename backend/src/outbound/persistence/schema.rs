//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// Geo-located entities of every kind.
    entities (id) {
        /// Primary key assigned by the owning system.
        id -> Int8,
        /// Wire name of the entity kind.
        kind -> Text,
        /// Latitude in degrees.
        lat -> Float8,
        /// Longitude in degrees.
        lng -> Float8,
        /// Display name.
        title -> Text,
        /// Free-form display metadata.
        metadata -> Jsonb,
        /// Record creation timestamp.
        created_at -> Timestamptz,
        /// Last modification timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// JSON attributes attached to an entity (nearby payloads, lock flags).
    entity_attributes (entity_id, key) {
        /// Owning entity; rows cascade on entity deletion.
        entity_id -> Int8,
        /// Attribute name.
        key -> Text,
        /// JSON value.
        value -> Jsonb,
        /// Last write timestamp, used for lock staleness.
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(entity_attributes -> entities (entity_id));
diesel::allow_tables_to_appear_in_same_query!(entities, entity_attributes);
