//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod entity_store;
mod recompute_metrics;
mod recompute_queue;
mod routing_provider;

#[cfg(test)]
pub use entity_store::MockEntityStore;
pub use entity_store::{EntityStore, EntityStoreError, Neighbour, RadiusQuery, StoredAttribute};
#[cfg(test)]
pub use recompute_metrics::MockRecomputeMetrics;
pub use recompute_metrics::{
    NoOpRecomputeMetrics, RecomputeJobStatus, RecomputeMetrics, RecomputeMetricsError,
};
#[cfg(test)]
pub use recompute_queue::{MockRecomputeJobHandler, MockRecomputeQueue};
pub use recompute_queue::{
    EnqueueOutcome, JobDispatchError, JobKey, JobPriority, RecomputeJob, RecomputeJobHandler,
    RecomputeQueue,
};
#[cfg(test)]
pub use routing_provider::MockRoutingProvider;
pub use routing_provider::{
    ApiKey, MatrixCell, MatrixRequest, MatrixResponse, RoutingProvider, RoutingProviderError,
};
