//! Tide predictions (KHOA `tideObsPreTab`).
//!
//! The nearest station's high/low events are fetched for the request date
//! and the day after, so an evening request still finds the next tides.

use super::{lenient, parse_rows, Contribution, Contributor, FetchRequest, JsonFetcher, ProviderKind, QueryContext, ServiceKey};
use crate::config::EndpointConfig;
use crate::error::FetchError;
use crate::geo::{SearchTier, TideStation};
use crate::reference::ReferenceData;
use crate::PartialRecord;
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const HIGH_TIDE: &str = "고조";
const LOW_TIDE: &str = "저조";

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default, deserialize_with = "lenient::string_opt")]
    tph_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    hl_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TideKind {
    High,
    Low,
}

/// One predicted high or low water.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TideEvent {
    at: NaiveDateTime,
    kind: TideKind,
}

impl TideEvent {
    fn from_raw(raw: &RawEvent) -> Option<Self> {
        let at = NaiveDateTime::parse_from_str(raw.tph_time.as_deref()?, EVENT_TIME_FORMAT).ok()?;
        let kind = match raw.hl_code.as_deref()? {
            HIGH_TIDE => TideKind::High,
            LOW_TIDE => TideKind::Low,
            _ => return None,
        };
        Some(Self { at, kind })
    }
}

/// First event of `kind` strictly after `now`, as `%H:%M`. `events` must be sorted.
fn next_event(events: &[TideEvent], kind: TideKind, now: NaiveDateTime) -> Option<String> {
    events
        .iter()
        .find(|e| e.kind == kind && e.at > now)
        .map(|e| e.at.format("%H:%M").to_string())
}

/// Tide prediction adapter.
pub struct TideStationProvider {
    fetcher: Arc<dyn JsonFetcher>,
    reference: Arc<ReferenceData>,
    config: EndpointConfig,
    key: ServiceKey,
}

impl TideStationProvider {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, reference: Arc<ReferenceData>, config: EndpointConfig, key: ServiceKey) -> Self {
        Self {
            fetcher,
            reference,
            config,
            key,
        }
    }

    async fn fetch_day(&self, key: &str, station: &TideStation, date: &str) -> Result<Vec<TideEvent>, FetchError> {
        let request = FetchRequest::new("tide_station", &self.config.base_url, self.config.timeout())
            .param("ServiceKey", key)
            .param("ObsCode", &station.station_id)
            .param("Date", date)
            .param("ResultType", "json");
        let body = self.fetcher.get_json(&request).await?;
        let raw: Vec<RawEvent> = parse_rows(body)?;
        Ok(raw.iter().filter_map(TideEvent::from_raw).collect())
    }
}

#[async_trait]
impl Contributor for TideStationProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::TideStation
    }

    #[instrument(name = "tide_station", skip_all)]
    async fn fetch(&self, ctx: &QueryContext) -> Result<Contribution, FetchError> {
        let key = self.key.get()?;
        let nearest = SearchTier::Narrow(1).select(&ctx.point, &self.reference.tide_stations);
        let Some(station) = nearest.first().map(|n| n.point) else {
            return Err(FetchError::NoReference("tide_station"));
        };

        let now = ctx.kst();
        let mut events = Vec::new();
        let mut last_error = None;
        for offset in 0..2 {
            let date = (now + Duration::days(offset)).format("%Y%m%d").to_string();
            match self.fetch_day(key, station, &date).await {
                Ok(day) => events.extend(day),
                Err(e) => {
                    warn!(station = %station.station_id, date = %date, error = %e, "tide prediction failed");
                    last_error = Some(e);
                }
            }
        }
        if events.is_empty() {
            return Err(last_error.unwrap_or(FetchError::Empty));
        }
        events.sort_by_key(|e| e.at);

        let fields = PartialRecord {
            next_high_tide: next_event(&events, TideKind::High, now),
            next_low_tide: next_event(&events, TideKind::Low, now),
            tide_station_name: Some(station.name.clone()),
            ..PartialRecord::default()
        };
        debug!(
            station = %station.name,
            events = events.len(),
            high = fields.next_high_tide.as_deref().unwrap_or("-"),
            low = fields.next_low_tide.as_deref().unwrap_or("-"),
            "tide events"
        );
        if fields.next_high_tide.is_none() && fields.next_low_tide.is_none() {
            return Err(FetchError::Empty);
        }
        Ok(Contribution::new(Some(station.name.clone()), fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::providers::testing::CannedFetcher;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    const URL: &str = "http://tide.test/pre";

    fn stations() -> Vec<TideStation> {
        vec![
            TideStation {
                station_id: "DT_0005".into(),
                name: "부산".into(),
                lat: 35.0964,
                lon: 129.0353,
            },
            TideStation {
                station_id: "DT_0004".into(),
                name: "제주".into(),
                lat: 33.5275,
                lon: 126.5431,
            },
        ]
    }

    fn provider(fetcher: Arc<CannedFetcher>, stations: Vec<TideStation>) -> TideStationProvider {
        TideStationProvider::new(
            fetcher,
            Arc::new(ReferenceData {
                tide_stations: stations,
                ..ReferenceData::default()
            }),
            EndpointConfig {
                base_url: URL.to_string(),
                timeout_secs: 10,
            },
            ServiceKey::new("OceanServiceKey", Some("k".into())),
        )
    }

    /// Near Busan at 2025-04-12 20:00 KST
    fn ctx() -> QueryContext {
        QueryContext::new(
            Coordinate::new(35.1, 129.04),
            Utc.with_ymd_and_hms(2025, 4, 12, 11, 0, 0).unwrap(),
            "쭈갑",
        )
    }

    #[tokio::test]
    async fn next_events_span_midnight() {
        let today = json!({"result": {"data": [
            {"tph_time": "2025-04-12 04:10:00", "hl_code": "고조", "tph_level": "120"},
            {"tph_time": "2025-04-12 10:30:00", "hl_code": "저조", "tph_level": "20"},
            {"tph_time": "2025-04-12 16:40:00", "hl_code": "고조", "tph_level": "118"},
            {"tph_time": "2025-04-12 22:55:00", "hl_code": "저조", "tph_level": "25"}
        ]}});
        let tomorrow = json!({"result": {"data": [
            {"tph_time": "2025-04-13 05:02:00", "hl_code": "고조"},
            {"tph_time": "2025-04-13 11:20:00", "hl_code": "저조"}
        ]}});
        let fetcher = Arc::new(
            CannedFetcher::new()
                .on(URL, &[("ObsCode", "DT_0005"), ("Date", "20250412")], today)
                .on(URL, &[("ObsCode", "DT_0005"), ("Date", "20250413")], tomorrow),
        );
        let provider = provider(fetcher, stations());

        let contribution = provider.fetch(&ctx()).await.unwrap();
        assert_eq!(contribution.location_name.as_deref(), Some("부산"));
        assert_eq!(contribution.fields.tide_station_name.as_deref(), Some("부산"));
        assert_eq!(contribution.fields.next_low_tide.as_deref(), Some("22:55"));
        assert_eq!(contribution.fields.next_high_tide.as_deref(), Some("05:02"));
    }

    #[tokio::test]
    async fn one_failed_day_is_tolerated() {
        let tomorrow = json!({"result": {"data": {"tph_time": "2025-04-13 05:02:00", "hl_code": "고조"}}});
        let fetcher = Arc::new(
            CannedFetcher::new()
                .fail(URL, &[("Date", "20250412")], 500)
                .on(URL, &[("Date", "20250413")], tomorrow),
        );
        let contribution = provider(fetcher, stations()).fetch(&ctx()).await.unwrap();
        assert_eq!(contribution.fields.next_high_tide.as_deref(), Some("05:02"));
        assert_eq!(contribution.fields.next_low_tide, None);
    }

    #[tokio::test]
    async fn upstream_error_is_unavailable() {
        let error = json!({"result": {"error": "No search data"}});
        let fetcher = Arc::new(CannedFetcher::new().on(URL, &[], error));
        let err = provider(fetcher, stations()).fetch(&ctx()).await.unwrap_err();
        assert!(matches!(err, FetchError::Upstream { .. }));
    }

    #[tokio::test]
    async fn no_stations_is_no_reference() {
        let fetcher = Arc::new(CannedFetcher::new());
        assert!(matches!(
            provider(fetcher, Vec::new()).fetch(&ctx()).await,
            Err(FetchError::NoReference("tide_station"))
        ));
    }

    #[test]
    fn malformed_events_are_skipped() {
        let bad_time = RawEvent {
            tph_time: Some("2025/04/12 10:00".into()),
            hl_code: Some("고조".into()),
        };
        let bad_code = RawEvent {
            tph_time: Some("2025-04-12 10:00:00".into()),
            hl_code: Some("중조".into()),
        };
        assert!(TideEvent::from_raw(&bad_time).is_none());
        assert!(TideEvent::from_raw(&bad_code).is_none());
    }
}
