//! Ocean observation buoys (KHOA `buObsRecent`).
//!
//! Each buoy returns its recent readings, newest not necessarily first.
//! Buoys are queried in distance order and values are taken field by field
//! from whichever buoy has them, until water temperature, wave height and
//! wind speed are all known.

use super::{lenient, parse_rows, valid, wind_16, Contribution, Contributor, FetchRequest, JsonFetcher, ProviderKind, QueryContext, ServiceKey};
use crate::config::EndpointConfig;
use crate::error::FetchError;
use crate::geo::{Buoy, SearchTier};
use crate::reference::ReferenceData;
use crate::PartialRecord;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Buoys in the narrow search tier.
const NARROW_BUOYS: usize = 3;

#[derive(Debug, Clone, Default, Deserialize)]
struct Reading {
    #[serde(default, deserialize_with = "lenient::string_opt")]
    record_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    water_temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    wave_height: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    wind_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    wind_dir: Option<f64>,
}

/// Readings of one buoy, newest first.
struct Series(Vec<Reading>);

impl Series {
    fn new(mut readings: Vec<Reading>) -> Self {
        // None sorts first ascending, so last when reversed
        readings.sort_by(|a, b| b.record_time.cmp(&a.record_time));
        Self(readings)
    }

    /// Newest in-range value of a field.
    fn latest(&self, field: impl Fn(&Reading) -> Option<f64>) -> Option<f64> {
        self.0.iter().find_map(|r| valid(field(r)))
    }

    /// Newest direction within 0..=360, normalised into [0, 360).
    fn latest_direction(&self) -> Option<f64> {
        self.0
            .iter()
            .filter_map(|r| r.wind_dir)
            .find(|deg| (0.0..=360.0).contains(deg))
            .map(|deg| deg % 360.0)
    }

    fn newest_time(&self) -> Option<String> {
        self.0.iter().find_map(|r| r.record_time.clone())
    }
}

/// Buoy adapter.
pub struct BuoyProvider {
    fetcher: Arc<dyn JsonFetcher>,
    reference: Arc<ReferenceData>,
    config: EndpointConfig,
    key: ServiceKey,
}

impl BuoyProvider {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, reference: Arc<ReferenceData>, config: EndpointConfig, key: ServiceKey) -> Self {
        Self {
            fetcher,
            reference,
            config,
            key,
        }
    }

    async fn fetch_series(&self, key: &str, buoy: &Buoy) -> Result<Series, FetchError> {
        let request = FetchRequest::new("buoy", &self.config.base_url, self.config.timeout())
            .param("ServiceKey", key)
            .param("ObsCode", &buoy.station_id)
            .param("ResultType", "json");
        let body = self.fetcher.get_json(&request).await?;
        Ok(Series::new(parse_rows(body)?))
    }
}

fn complete(fields: &PartialRecord) -> bool {
    fields.water_temp.is_some() && fields.wave_height.is_some() && fields.wind_speed.is_some()
}

#[async_trait]
impl Contributor for BuoyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Buoy
    }

    #[instrument(name = "buoy", skip_all)]
    async fn fetch(&self, ctx: &QueryContext) -> Result<Contribution, FetchError> {
        let key = self.key.get()?;
        let buoys = &self.reference.buoys;
        if buoys.is_empty() {
            return Err(FetchError::NoReference("buoy"));
        }

        let mut fields = PartialRecord::default();
        let mut station: Option<String> = None;
        let mut tried: HashSet<&str> = HashSet::new();

        for tier in SearchTier::ladder(NARROW_BUOYS) {
            for candidate in tier.select(&ctx.point, buoys) {
                if complete(&fields) {
                    break;
                }
                let buoy = candidate.point;
                if !tried.insert(buoy.station_id.as_str()) {
                    continue;
                }

                let series = match self.fetch_series(key, buoy).await {
                    Ok(series) if !series.0.is_empty() => series,
                    Ok(_) => {
                        debug!(station = %buoy.station_id, "buoy returned no readings");
                        continue;
                    }
                    Err(e) => {
                        warn!(station = %buoy.station_id, error = %e, "buoy request failed");
                        continue;
                    }
                };

                let found = PartialRecord {
                    water_temp: series.latest(|r| r.water_temp),
                    wave_height: series.latest(|r| r.wave_height),
                    wind_speed: series.latest(|r| r.wind_speed),
                    ..PartialRecord::default()
                };
                let before = fields.clone();
                fields.fill_from(&found);
                let supplied = fields != before;

                if station.is_none() && supplied {
                    station = Some(buoy.name.clone());
                    fields.record_time = series.newest_time();
                }
                if fields.wind_direction_deg.is_none() {
                    if let Some(deg) = series.latest_direction() {
                        fields.wind_direction_deg = Some(deg);
                        fields.wind_direction_16 = Some(wind_16(deg).to_string());
                    }
                }
                debug!(
                    station = %buoy.station_id,
                    name = %buoy.name,
                    distance_km = candidate.distance_km,
                    supplied,
                    "buoy queried"
                );
            }

            if station.is_some() {
                break;
            }
        }

        match station {
            Some(name) => Ok(Contribution::new(Some(name), fields)),
            None => Err(FetchError::Empty),
        }
    }
}
