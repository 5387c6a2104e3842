//! KMA ultra-short-term nowcast (초단기실황).
//!
//! Observations are published per forecast grid cell, on the hour, about ten
//! minutes after the hour. Open-sea cells are often unpopulated; when every
//! value for the user's own cell is missing the request is repeated once for
//! the nearest active coastal point's cell.
//!
//! This provider is authoritative for wind, see
//! [`ProviderKind::overrides_wind`].

use super::{lenient, parse_rows, valid_observation, wind_16, Contribution, Contributor, FetchRequest, JsonFetcher, ProviderKind, QueryContext, ServiceKey};
use crate::config::EndpointConfig;
use crate::error::FetchError;
use crate::geo::SearchTier;
use crate::grid::{self, GridCell};
use crate::reference::ReferenceData;
use crate::PartialRecord;
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Timelike};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Label used as the record's location when the nowcast names it.
pub const NOWCAST_LOCATION: &str = "가까운 관측소";

/// Minutes past the hour before that hour's observations are published.
const PUBLICATION_LAG_MIN: u32 = 10;

/// `base_date` (`%Y%m%d`) and `base_time` (`%H00`) for a KST wall-clock time.
///
/// ```
/// use chrono::NaiveDate;
/// use navis_env_lib::providers::nowcast::base_datetime;
///
/// let at = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 5, 0).unwrap();
/// assert_eq!(base_datetime(at), ("20241231".to_string(), "2300".to_string()));
/// ```
pub fn base_datetime(kst: NaiveDateTime) -> (String, String) {
    let published = if kst.minute() < PUBLICATION_LAG_MIN {
        kst - Duration::hours(1)
    } else {
        kst
    };
    (
        published.format("%Y%m%d").to_string(),
        published.format("%H00").to_string(),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Observation {
    #[serde(default, deserialize_with = "lenient::string_opt")]
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    obsr_value: Option<f64>,
}

/// Values parsed from one grid cell's observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NowcastReading {
    /// Air temperature (T1H)
    pub temp: Option<f64>,
    /// Precipitation type (PTY)
    pub rain_type: Option<u8>,
    /// Wind speed (WSD)
    pub wind_speed: Option<f64>,
    /// Relative humidity (REH)
    pub humidity: Option<f64>,
    /// Wind direction in degrees (VEC)
    pub wind_direction_deg: Option<f64>,
}

impl NowcastReading {
    fn from_observations(observations: &[Observation]) -> Self {
        let mut reading = Self::default();
        for obs in observations {
            let Some(value) = obs.obsr_value.and_then(valid_observation) else {
                continue;
            };
            match obs.category.as_deref() {
                Some("T1H") => reading.temp = Some(value),
                Some("PTY") => reading.rain_type = u8::try_from(value as i64).ok(),
                Some("WSD") => reading.wind_speed = Some(value),
                Some("REH") => reading.humidity = Some(value),
                Some("VEC") => reading.wind_direction_deg = Some(value),
                _ => {}
            }
        }
        reading
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<NowcastReading> for PartialRecord {
    fn from(reading: NowcastReading) -> Self {
        PartialRecord {
            air_temp: reading.temp,
            rain_type: reading.rain_type,
            wind_speed: reading.wind_speed,
            humidity: reading.humidity,
            wind_direction_deg: reading.wind_direction_deg,
            wind_direction_16: reading.wind_direction_deg.map(|deg| wind_16(deg).to_string()),
            ..PartialRecord::default()
        }
    }
}

/// Nowcast adapter.
pub struct NowcastProvider {
    fetcher: Arc<dyn JsonFetcher>,
    reference: Arc<ReferenceData>,
    config: EndpointConfig,
    key: ServiceKey,
}

impl NowcastProvider {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, reference: Arc<ReferenceData>, config: EndpointConfig, key: ServiceKey) -> Self {
        Self {
            fetcher,
            reference,
            config,
            key,
        }
    }

    async fn fetch_cell(&self, key: &str, cell: GridCell, base: &(String, String)) -> Result<NowcastReading, FetchError> {
        let request = FetchRequest::new("nowcast", &self.config.base_url, self.config.timeout())
            .param("serviceKey", key)
            .param("pageNo", 1)
            .param("numOfRows", 100)
            .param("dataType", "JSON")
            .param("base_date", &base.0)
            .param("base_time", &base.1)
            .param("nx", cell.nx)
            .param("ny", cell.ny);
        let body = self.fetcher.get_json(&request).await?;
        let observations: Vec<Observation> = parse_rows(body)?;
        let reading = NowcastReading::from_observations(&observations);
        if reading.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(reading)
    }

    /// Cell of the nearest active coastal point.
    fn coastal_cell(&self, ctx: &QueryContext) -> Option<(String, GridCell)> {
        let active = self.reference.active_coastal_points();
        SearchTier::Narrow(1).select(&ctx.point, &active).first().map(|n| {
            let point = n.point;
            (point.name.clone(), GridCell { nx: point.nx, ny: point.ny })
        })
    }
}

#[async_trait]
impl Contributor for NowcastProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Nowcast
    }

    #[instrument(name = "nowcast", skip_all)]
    async fn fetch(&self, ctx: &QueryContext) -> Result<Contribution, FetchError> {
        let key = self.key.get()?;
        let base = base_datetime(ctx.kst());
        let user_cell = grid::project(&ctx.point);

        let first = match self.fetch_cell(key, user_cell, &base).await {
            Ok(reading) => {
                info!(nx = user_cell.nx, ny = user_cell.ny, "nowcast from user grid");
                return Ok(Contribution::new(Some(NOWCAST_LOCATION.to_string()), reading.into()));
            }
            Err(e) => e,
        };
        debug!(nx = user_cell.nx, ny = user_cell.ny, error = %first, "user grid yielded nothing");

        let Some((name, cell)) = self.coastal_cell(ctx) else {
            return Err(first);
        };
        if cell == user_cell {
            return Err(first);
        }

        match self.fetch_cell(key, cell, &base).await {
            Ok(reading) => {
                info!(coastal_point = %name, nx = cell.nx, ny = cell.ny, "nowcast from coastal grid");
                Ok(Contribution::new(Some(NOWCAST_LOCATION.to_string()), reading.into()))
            }
            Err(e) => {
                warn!(coastal_point = %name, nx = cell.nx, ny = cell.ny, error = %e, "coastal grid yielded nothing");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{CoastalReference, Coordinate};
    use crate::providers::testing::CannedFetcher;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::{json, Value};

    const URL: &str = "http://kma.test/ncst";

    fn items(pairs: &[(&str, &str)]) -> Value {
        let item: Vec<Value> = pairs
            .iter()
            .map(|(c, v)| json!({"baseDate": "20250412", "baseTime": "0900", "category": c, "nx": 0, "ny": 0, "obsrValue": v}))
            .collect();
        json!({"response": {
            "header": {"resultCode": "00", "resultMsg": "NORMAL_SERVICE"},
            "body": {"dataType": "JSON", "items": {"item": item}}
        }})
    }

    fn coastal(name: &str, lat: f64, lon: f64, nx: i32, ny: i32, active: bool) -> CoastalReference {
        CoastalReference {
            point_id: 1,
            name: name.to_string(),
            region: "서해안".to_string(),
            lat,
            lon,
            nx,
            ny,
            is_active: active,
        }
    }

    fn provider(fetcher: Arc<CannedFetcher>, points: Vec<CoastalReference>) -> NowcastProvider {
        NowcastProvider::new(
            fetcher,
            Arc::new(ReferenceData {
                coastal_points: points,
                ..ReferenceData::default()
            }),
            EndpointConfig {
                base_url: URL.to_string(),
                timeout_secs: 5,
            },
            ServiceKey::new("KMA_SERVICE_KEY", Some("k".into())),
        )
    }

    /// Offshore west of Boryeong, 2025-04-12 09:30 KST
    fn ctx() -> QueryContext {
        QueryContext::new(
            Coordinate::new(36.30, 126.20),
            Utc.with_ymd_and_hms(2025, 4, 12, 0, 30, 0).unwrap(),
            "쭈갑",
        )
    }

    #[test]
    fn base_time_rolls_back_before_publication() {
        let day = NaiveDate::from_ymd_opt(2025, 4, 12).unwrap();
        assert_eq!(
            base_datetime(day.and_hms_opt(9, 9, 59).unwrap()),
            ("20250412".into(), "0800".into())
        );
        assert_eq!(
            base_datetime(day.and_hms_opt(9, 10, 0).unwrap()),
            ("20250412".into(), "0900".into())
        );
    }

    #[tokio::test]
    async fn parses_categories_and_maps_temp_to_air_temp() {
        let user = grid::to_grid(36.30, 126.20);
        let (nx, ny) = (user.nx.to_string(), user.ny.to_string());
        let body = items(&[("T1H", "9.0"), ("PTY", "1"), ("WSD", "5.0"), ("REH", "71"), ("VEC", "90"), ("RN1", "0.5")]);
        let fetcher = Arc::new(CannedFetcher::new().on(URL, &[("nx", nx.as_str()), ("ny", ny.as_str())], body));
        let provider = provider(fetcher.clone(), Vec::new());

        let contribution = provider.fetch(&ctx()).await.unwrap();
        let f = &contribution.fields;
        assert_eq!(contribution.location_name.as_deref(), Some(NOWCAST_LOCATION));
        assert_eq!(f.air_temp, Some(9.0));
        assert_eq!(f.rain_type, Some(1));
        assert_eq!(f.wind_speed, Some(5.0));
        assert_eq!(f.humidity, Some(71.0));
        assert_eq!(f.wind_direction_deg, Some(90.0));
        assert_eq!(f.wind_direction_16.as_deref(), Some("E"));

        let call = &fetcher.calls()[0];
        assert_eq!(call.query_value("base_date"), Some("20250412"));
        assert_eq!(call.query_value("base_time"), Some("0900"));
        assert_eq!(call.query_value("dataType"), Some("JSON"));
    }

    #[tokio::test]
    async fn all_missing_retries_with_coastal_cell() {
        let user = grid::to_grid(36.30, 126.20);
        let (nx, ny) = (user.nx.to_string(), user.ny.to_string());
        let missing = items(&[("T1H", "-999"), ("WSD", "-998.9"), ("REH", "900")]);
        let coastal_body = items(&[("T1H", "11.5"), ("WSD", "2.1")]);
        let fetcher = Arc::new(
            CannedFetcher::new()
                .on(URL, &[("nx", nx.as_str()), ("ny", ny.as_str())], missing)
                .on(URL, &[("nx", "54"), ("ny", "100")], coastal_body),
        );
        let points = vec![
            coastal("폐쇄 지점", 36.30, 126.21, 1, 1, false),
            coastal("보령", 36.3333, 126.6128, 54, 100, true),
        ];
        let provider = provider(fetcher.clone(), points);

        let contribution = provider.fetch(&ctx()).await.unwrap();
        assert_eq!(contribution.fields.air_temp, Some(11.5));
        assert_eq!(contribution.fields.wind_speed, Some(2.1));
        assert_eq!(contribution.fields.humidity, None);
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn no_coastal_points_means_unavailable() {
        let user = grid::to_grid(36.30, 126.20);
        let (nx, ny) = (user.nx.to_string(), user.ny.to_string());
        let fetcher = Arc::new(CannedFetcher::new().on(URL, &[("nx", nx.as_str()), ("ny", ny.as_str())], items(&[("T1H", "-999")])));
        let provider = provider(fetcher.clone(), Vec::new());
        assert!(matches!(provider.fetch(&ctx()).await, Err(FetchError::Empty)));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[test]
    fn out_of_range_rain_code_is_dropped() {
        let obs = vec![Observation {
            category: Some("PTY".into()),
            obsr_value: Some(-1.0),
        }];
        assert_eq!(NowcastReading::from_observations(&obs).rain_type, None);
    }
}
