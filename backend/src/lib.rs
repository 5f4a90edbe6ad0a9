//! Nearby backend library modules.
//!
//! Layout follows ports and adapters: [`domain`] holds the cache rules and
//! ports, [`inbound`] the HTTP adapter, [`outbound`] storage, routing and
//! queue adapters.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::Trace;
