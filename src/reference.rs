//! Read-only reference data.
//!
//! The four point collections are loaded once at startup from a JSON file and
//! shared behind an [`Arc`] by every adapter. Nothing mutates them afterwards.

use crate::error::ConfigError;
use crate::geo::{Buoy, CoastalReference, Coordinate, FishingSpot, SearchTier, TideStation};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Buoys, tide stations, fishing spots and coastal grid points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    #[serde(default)]
    pub buoys: Vec<Buoy>,
    #[serde(default)]
    pub tide_stations: Vec<TideStation>,
    #[serde(default)]
    pub fishing_spots: Vec<FishingSpot>,
    #[serde(default)]
    pub coastal_points: Vec<CoastalReference>,
}

impl ReferenceData {
    /// Read and parse a reference file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        let data = Self::from_json_str(&contents)?;
        info!(
            path = %path.as_ref().display(),
            buoys = data.buoys.len(),
            tide_stations = data.tide_stations.len(),
            fishing_spots = data.fishing_spots.len(),
            coastal_points = data.coastal_points.len(),
            "loaded reference data"
        );
        Ok(data)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Wrap for sharing across adapters.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Coastal points still in service.
    pub fn active_coastal_points(&self) -> Vec<CoastalReference> {
        self.coastal_points.iter().filter(|p| p.is_active).cloned().collect()
    }

    /// Region tag of the fishing spot closest to `point`.
    pub fn nearest_region(&self, point: &Coordinate) -> Option<&str> {
        SearchTier::Narrow(1)
            .select(point, &self.fishing_spots)
            .first()
            .and_then(|n| n.point.region.as_deref())
    }
}
