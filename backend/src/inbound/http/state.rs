//! Shared HTTP adapter state.
//!
//! Handlers receive this via `actix_web::web::Data` and only talk to the
//! domain façades, so they stay testable over in-memory adapters.

use std::sync::Arc;

use crate::domain::EntityService;
use crate::domain::nearby::{NearbyService, NearbyServices};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Nearby reads, recompute triggers and operator commands.
    pub nearby: Arc<NearbyService>,
    /// Entity mutations that drive invalidation.
    pub entities: Arc<EntityService>,
}

impl HttpState {
    /// Build state from the assembled façades.
    pub fn new(services: NearbyServices) -> Self {
        let NearbyServices { nearby, entities } = services;
        Self { nearby, entities }
    }
}

impl From<NearbyServices> for HttpState {
    fn from(services: NearbyServices) -> Self {
        Self::new(services)
    }
}
