//! Outbound adapters for metrics exporting.
//!
//! Prometheus-backed implementations of domain metrics ports. Everything here
//! is gated behind the `metrics` feature.

mod prometheus_recompute_jobs;

pub use prometheus_recompute_jobs::PrometheusRecomputeJobMetrics;
