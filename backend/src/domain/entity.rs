//! Geo-located entities whose nearby lists the service maintains.
//!
//! Every entity kind declares which kinds it wants to see nearby; the
//! invalidation and read paths derive cache slots from that table instead of
//! branching on kind names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Stable identifier of an entity in the entity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct EntityId(i64);

impl EntityId {
    /// Validate and wrap a raw identifier.
    ///
    /// # Examples
    /// ```
    /// use nearby_backend::domain::EntityId;
    ///
    /// assert!(EntityId::new(42).is_ok());
    /// assert!(EntityId::new(0).is_err());
    /// ```
    pub fn new(raw: i64) -> Result<Self, EntityValidationError> {
        if raw <= 0 {
            return Err(EntityValidationError::NonPositiveId(raw));
        }
        Ok(Self(raw))
    }

    /// Raw numeric value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for EntityId {
    type Error = EntityValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityId> for i64 {
    fn from(value: EntityId) -> Self {
        value.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Vehicle charging station.
    ChargingPoint,
    /// Point of interest (café, museum, viewpoint...).
    Poi,
    /// Campsite or RV spot.
    CampSpot,
}

impl EntityKind {
    /// Every supported kind.
    pub const ALL: [EntityKind; 3] = [Self::ChargingPoint, Self::Poi, Self::CampSpot];

    /// Kinds listed in this kind's nearby lists.
    ///
    /// # Examples
    /// ```
    /// use nearby_backend::domain::EntityKind;
    ///
    /// assert_eq!(EntityKind::ChargingPoint.nearby_targets(), &[EntityKind::Poi]);
    /// assert_eq!(EntityKind::CampSpot.nearby_targets(), &[EntityKind::ChargingPoint]);
    /// ```
    pub fn nearby_targets(self) -> &'static [EntityKind] {
        match self {
            Self::ChargingPoint => &[Self::Poi],
            Self::Poi | Self::CampSpot => &[Self::ChargingPoint],
        }
    }

    /// Whether nearby lists of this kind can contain entities of `target`.
    pub fn lists(self, target: EntityKind) -> bool {
        self.nearby_targets().contains(&target)
    }

    /// Kinds whose nearby lists may contain an entity of this kind.
    pub fn listed_by(self) -> impl Iterator<Item = EntityKind> {
        Self::ALL.into_iter().filter(move |kind| kind.lists(self))
    }

    /// Stable wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChargingPoint => "charging_point",
            Self::Poi => "poi",
            Self::CampSpot => "camp_spot",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = EntityValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
            .ok_or_else(|| EntityValidationError::UnknownKind(value.to_owned()))
    }
}

/// WGS84 position shared by every entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Coordinates {
    /// Validate a latitude/longitude pair.
    pub fn new(lat: f64, lng: f64) -> Result<Self, EntityValidationError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(EntityValidationError::NonFiniteCoordinate);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(EntityValidationError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(EntityValidationError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }
}

/// Stored entity with display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier.
    pub id: EntityId,
    /// Category.
    pub kind: EntityKind,
    /// Position.
    pub coordinates: Coordinates,
    /// Display name.
    pub title: String,
    /// Free-form display metadata (category, icon, opening hours...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Validation failures for entity primitives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntityValidationError {
    /// Identifier was zero or negative.
    #[error("entity id must be positive, got {0}")]
    NonPositiveId(i64),
    /// Kind name is not recognised.
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
    /// A coordinate was NaN or infinite.
    #[error("coordinates must be finite")]
    NonFiniteCoordinate,
    /// Latitude outside [-90, 90].
    #[error("latitude must be within [-90, 90], got {0}")]
    LatitudeOutOfRange(f64),
    /// Longitude outside [-180, 180].
    #[error("longitude must be within [-180, 180], got {0}")]
    LongitudeOutOfRange(f64),
}
