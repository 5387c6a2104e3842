//! # Sea Fishing Index (바다낚시지수)
//!
//! Daily forecast per fishing area from the public data portal, published
//! separately for boat ("선상") and shore ("갯바위") fishing. Each upstream
//! row covers one forecast point and one half-day, with min/max ranges for
//! water temperature, wave height, wind, current and air temperature plus a
//! named index and score.
//!
//! ## Matching
//!
//! Both categories are fetched for the request date and pooled. The user's
//! closest catalogued fishing spots are then matched to their nearest
//! upstream point. Spots are tried in [`SearchTier`] order: the closest
//! three, then every remaining spot, stopping at the first tier that yields
//! any value.

use super::{avg_range, lenient, parse_rows, valid, Contribution, Contributor, FetchRequest, JsonFetcher, ProviderKind, QueryContext, ServiceKey};
use crate::config::FishingIndexConfig;
use crate::error::{FetchError, InputError};
use crate::geo::{haversine_km, Coordinate, FishingSpot, SearchTier};
use crate::reference::ReferenceData;
use crate::PartialRecord;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Species the app supports.
pub const SUPPORTED_SPECIES: [&str; 3] = ["쭈꾸미", "갑오징어", "쭈갑"];

/// Species used when the caller names none.
pub const DEFAULT_SPECIES: &str = "쭈갑";

/// Upstream categories, queried in this order.
const GUBUN: [&str; 2] = ["선상", "갯바위"];

/// Spots in the narrow search tier.
const NARROW_SPOTS: usize = 3;

/// Normalize the requested species. Blank means [`DEFAULT_SPECIES`].
pub fn normalize_species(target_fish: Option<&str>) -> Result<String, InputError> {
    match target_fish.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(DEFAULT_SPECIES.to_string()),
        Some(name) if SUPPORTED_SPECIES.contains(&name) => Ok(name.to_string()),
        Some(other) => Err(InputError::UnsupportedSpecies(other.to_string())),
    }
}

/// One forecast row.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastItem {
    #[serde(default, deserialize_with = "lenient::string_opt")]
    seafs_pstn_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    lot: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    predc_ymd: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    predc_noon_se_cd: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    min_wtem: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    max_wtem: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    min_wvhgt: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    max_wvhgt: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    min_wspd: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    max_wspd: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    min_crsp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    max_crsp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    min_artmp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    max_artmp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    total_index: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    last_scr: Option<f64>,
}

impl ForecastItem {
    fn coordinate(&self) -> Option<Coordinate> {
        Some(Coordinate::new(self.lat?, self.lot?))
    }
}

impl From<&ForecastItem> for PartialRecord {
    fn from(item: &ForecastItem) -> Self {
        let record_time = match (&item.predc_ymd, &item.predc_noon_se_cd) {
            (Some(day), Some(half)) => Some(format!("{day} {half}")),
            (Some(day), None) => Some(day.clone()),
            _ => None,
        };
        PartialRecord {
            water_temp: avg_range(item.min_wtem, item.max_wtem),
            wave_height: avg_range(item.min_wvhgt, item.max_wvhgt),
            wind_speed: avg_range(item.min_wspd, item.max_wspd),
            current_speed: avg_range(item.min_crsp, item.max_crsp),
            air_temp: avg_range(item.min_artmp, item.max_artmp),
            record_time,
            fishing_index: item.total_index.clone(),
            fishing_score: valid(item.last_scr),
            ..PartialRecord::default()
        }
    }
}

/// Fishing index adapter.
pub struct FishingIndexProvider {
    fetcher: Arc<dyn JsonFetcher>,
    reference: Arc<ReferenceData>,
    config: FishingIndexConfig,
    key: ServiceKey,
}

impl FishingIndexProvider {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        reference: Arc<ReferenceData>,
        config: FishingIndexConfig,
        key: ServiceKey,
    ) -> Self {
        Self {
            fetcher,
            reference,
            config,
            key,
        }
    }

    /// All rows for one category, paging while pages come back full.
    async fn fetch_category(&self, key: &str, req_date: &str, gubun: &str) -> Result<Vec<ForecastItem>, FetchError> {
        let rows_per_page = self.config.rows_per_page.max(1);
        let mut items = Vec::new();
        for page in 1..=self.config.max_pages.max(1) {
            let request = FetchRequest::new("fishing_index", &self.config.base_url, self.config.timeout())
                .param("serviceKey", key)
                .param("type", "json")
                .param("reqDate", req_date)
                .param("gubun", gubun)
                .param("pageNo", page)
                .param("numOfRows", rows_per_page);
            let body = self.fetcher.get_json(&request).await?;
            let rows: Vec<ForecastItem> = parse_rows(body)?;
            let full = rows.len() as u32 >= rows_per_page;
            debug!(gubun, page, rows = rows.len(), "fishing index page");
            items.extend(rows);
            if !full {
                break;
            }
        }
        Ok(items)
    }

    /// Both categories pooled. Fails only if every category failed.
    async fn fetch_pooled(&self, key: &str, req_date: &str) -> Result<Vec<ForecastItem>, FetchError> {
        let mut pooled = Vec::new();
        let mut last_error = None;
        for gubun in GUBUN {
            match self.fetch_category(key, req_date, gubun).await {
                Ok(items) => pooled.extend(items),
                Err(e) => {
                    warn!(gubun, error = %e, "fishing index category failed");
                    last_error = Some(e);
                }
            }
        }
        match (pooled.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            (true, None) => Err(FetchError::Empty),
            _ => Ok(pooled),
        }
    }
}

/// The upstream row closest to `spot`, ignoring rows without coordinates.
fn nearest_item<'a>(spot: &FishingSpot, items: &'a [ForecastItem]) -> Option<(&'a ForecastItem, f64)> {
    let origin = Coordinate::new(spot.lat, spot.lon);
    items
        .iter()
        .filter_map(|item| {
            let d = haversine_km(&origin, &item.coordinate()?);
            d.is_finite().then_some((item, d))
        })
        .fold(None, |best: Option<(&ForecastItem, f64)>, (item, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((item, d)),
        })
}

#[async_trait]
impl Contributor for FishingIndexProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::FishingIndex
    }

    #[instrument(name = "fishing_index", skip_all, fields(fish = %ctx.target_fish))]
    async fn fetch(&self, ctx: &QueryContext) -> Result<Contribution, FetchError> {
        let key = self.key.get()?;
        let spots = &self.reference.fishing_spots;
        if spots.is_empty() {
            return Err(FetchError::NoReference("fishing_spot"));
        }

        let items = self.fetch_pooled(key, &ctx.kst_date_param()).await?;
        info!(items = items.len(), "fishing index rows pooled");

        let mut tried: HashSet<u32> = HashSet::new();
        for tier in SearchTier::ladder(NARROW_SPOTS) {
            let mut fields = PartialRecord::default();
            let mut location_name = None;

            for candidate in tier.select(&ctx.point, spots) {
                let spot = candidate.point;
                if !tried.insert(spot.spot_id) {
                    continue;
                }
                let Some((item, item_km)) = nearest_item(spot, &items) else {
                    continue;
                };
                let partial = PartialRecord::from(item);
                debug!(
                    spot = %spot.name,
                    spot_km = candidate.distance_km,
                    upstream = item.seafs_pstn_nm.as_deref().unwrap_or("-"),
                    upstream_km = item_km,
                    "matched fishing spot"
                );
                if partial.is_empty() {
                    continue;
                }
                if location_name.is_none() {
                    location_name = Some(spot.name.clone());
                }
                fields.fill_from(&partial);
            }

            if !fields.is_empty() {
                return Ok(Contribution::new(location_name, fields));
            }
            debug!(?tier, "search tier yielded nothing");
        }

        Err(FetchError::Empty)
    }
}
