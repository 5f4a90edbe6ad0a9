//! Test utilities for the backend crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`).
//! Compiled for tests and when the `test-support` feature is enabled.

pub mod nearby;

pub use nearby::{
    MutableClock, NearbyHarness, RecordingQueue, ScriptedRoutingProvider, sample_entity,
};
