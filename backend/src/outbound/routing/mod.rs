//! Routing provider outbound adapters.
//!
//! Thin HTTP implementation of the
//! [`RoutingProvider`](crate::domain::ports::RoutingProvider) port against the
//! openrouteservice matrix API.

mod dto;
mod openrouteservice;

pub use openrouteservice::{DEFAULT_ENDPOINT, OpenRouteServiceMatrix};
