//! Typed names for the two nearby-list directions.
//!
//! Each slot owns the attribute key its payload is stored under and the key of
//! its companion lock flag, so no call site concatenates key strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::EntityKind;

/// One cached nearby list direction, named after the target kind it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSlot {
    /// Nearby points of interest (cached on charging points).
    NearbyPois,
    /// Nearby charging points (cached on POIs and camp spots).
    NearbyChargers,
}

impl CacheSlot {
    /// Every slot.
    pub const ALL: [CacheSlot; 2] = [Self::NearbyPois, Self::NearbyChargers];

    /// Slot listing entities of `target`, if any kind lists them.
    ///
    /// # Examples
    /// ```
    /// use nearby_backend::domain::{CacheSlot, EntityKind};
    ///
    /// assert_eq!(CacheSlot::for_target(EntityKind::Poi), Some(CacheSlot::NearbyPois));
    /// assert_eq!(CacheSlot::for_target(EntityKind::CampSpot), None);
    /// ```
    pub fn for_target(target: EntityKind) -> Option<Self> {
        match target {
            EntityKind::Poi => Some(Self::NearbyPois),
            EntityKind::ChargingPoint => Some(Self::NearbyChargers),
            EntityKind::CampSpot => None,
        }
    }

    /// Slots an origin of `kind` maintains.
    pub fn for_origin(kind: EntityKind) -> impl Iterator<Item = CacheSlot> {
        kind.nearby_targets()
            .iter()
            .filter_map(|target| Self::for_target(*target))
    }

    /// Resolve the slot an origin of `origin_kind` keeps for `target`.
    ///
    /// Returns `None` when `origin_kind` does not list `target` nearby.
    pub fn resolve(origin_kind: EntityKind, target: EntityKind) -> Option<Self> {
        if origin_kind.lists(target) {
            Self::for_target(target)
        } else {
            None
        }
    }

    /// Kind of the entities held in this slot.
    pub fn target_kind(self) -> EntityKind {
        match self {
            Self::NearbyPois => EntityKind::Poi,
            Self::NearbyChargers => EntityKind::ChargingPoint,
        }
    }

    /// Attribute key of the cached payload.
    pub fn payload_key(self) -> &'static str {
        match self {
            Self::NearbyPois => "nearby_pois",
            Self::NearbyChargers => "nearby_chargers",
        }
    }

    /// Attribute key of the recompute lock flag.
    pub fn lock_key(self) -> &'static str {
        match self {
            Self::NearbyPois => "nearby_pois_lock",
            Self::NearbyChargers => "nearby_chargers_lock",
        }
    }
}

impl fmt::Display for CacheSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload_key())
    }
}
