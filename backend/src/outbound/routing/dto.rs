//! Wire DTOs for the openrouteservice matrix endpoint.
//!
//! Requests are serialised straight from these structs; responses decode into
//! DTOs first and are then mapped to domain cells in one pass.

use serde::{Deserialize, Serialize};

use crate::domain::Coordinates;
use crate::domain::ports::{MatrixCell, MatrixResponse};

#[derive(Debug, Serialize)]
pub(super) struct MatrixRequestDto {
    /// `[lng, lat]` pairs; index 0 is the origin.
    pub(super) locations: Vec<[f64; 2]>,
    pub(super) sources: [usize; 1],
    pub(super) destinations: Vec<usize>,
    pub(super) metrics: [&'static str; 2],
    pub(super) units: &'static str,
}

impl MatrixRequestDto {
    pub(super) fn new(origin: Coordinates, destinations: &[Coordinates]) -> Self {
        let locations = std::iter::once(origin)
            .chain(destinations.iter().copied())
            .map(|point| [point.lng, point.lat])
            .collect();
        Self {
            locations,
            sources: [0],
            destinations: (1..=destinations.len()).collect(),
            metrics: ["distance", "duration"],
            units: "m",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct MatrixResponseDto {
    #[serde(default)]
    distances: Vec<Vec<Option<f64>>>,
    #[serde(default)]
    durations: Vec<Vec<Option<f64>>>,
}

impl MatrixResponseDto {
    /// Map the single source row to one cell per destination.
    pub(super) fn into_domain(self, expected: usize) -> Result<MatrixResponse, String> {
        let distances = self.distances.into_iter().next().unwrap_or_default();
        let durations = self.durations.into_iter().next().unwrap_or_default();
        if distances.len() != expected || durations.len() != expected {
            return Err(format!(
                "expected {expected} destinations, got {} distances and {} durations",
                distances.len(),
                durations.len()
            ));
        }
        let cells = distances
            .into_iter()
            .zip(durations)
            .map(|(distance_m, duration_s)| MatrixCell {
                distance_m,
                duration_s,
            })
            .collect();
        Ok(MatrixResponse { cells })
    }
}

/// Error bodies come as `{"error": {"code": 2003, "message": ".."}}` or
/// `{"error": ".."}`.
#[derive(Debug, Deserialize)]
pub(super) struct ErrorBodyDto {
    error: ErrorDetailDto,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetailDto {
    Structured { message: String },
    Plain(String),
}

impl ErrorBodyDto {
    pub(super) fn into_message(self) -> String {
        match self.error {
            ErrorDetailDto::Structured { message } | ErrorDetailDto::Plain(message) => message,
        }
    }
}
