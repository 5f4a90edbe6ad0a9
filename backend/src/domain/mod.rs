//! Domain primitives, ports and the nearby-cache orchestration.
//!
//! Purpose: keep the proximity cache rules (staleness, cooldowns,
//! single-flight recompute, invalidation) independent from HTTP, SQL and the
//! routing provider's wire format. Adapters live under `inbound` and
//! `outbound` and talk to this module through [`ports`].
//!
//! Public surface:
//! - `Error` and `ErrorCode`: transport-agnostic failure payload.
//! - `Entity`, `EntityId`, `EntityKind`, `Coordinates`: stored geo entities.
//! - `CacheSlot`: the per-direction cache key pair.
//! - `TraceId`: request correlation identifier.

pub mod cache_slot;
pub mod entity;
pub mod entity_service;
pub mod error;
pub mod nearby;
pub mod ports;
pub mod trace_id;

pub use self::cache_slot::CacheSlot;
pub use self::entity::{Coordinates, Entity, EntityId, EntityKind, EntityValidationError};
pub use self::entity_service::{EntityService, SavedEntity};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};
