//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **memory**: in-process entity store for tests and database-less runs
//! - **persistence**: PostgreSQL entity store using Diesel ORM
//! - **routing**: openrouteservice matrix client over reqwest
//! - **queue**: tokio worker pool and timer backends for recompute jobs
//! - **metrics**: Prometheus-backed metrics exporters (feature-gated)
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no business logic.

pub mod memory;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod persistence;
pub mod queue;
pub mod routing;
