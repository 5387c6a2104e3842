//! Solar to lunar date conversion (KASI `getLunCalInfo`) and the mul-ttae
//! phase derived from it.

use super::{lenient, parse_rows, Contribution, Contributor, FetchRequest, JsonFetcher, ProviderKind, QueryContext, ServiceKey};
use crate::config::EndpointConfig;
use crate::error::FetchError;
use crate::lunar::{self, TideFormula};
use crate::reference::ReferenceData;
use crate::PartialRecord;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const LEAP_MONTH: &str = "윤";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LunarDate {
    #[serde(default, deserialize_with = "lenient::string_opt")]
    sol_year: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    sol_month: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    sol_day: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    lun_year: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    lun_month: Option<String>,
    #[serde(default, deserialize_with = "lenient::i64_opt")]
    lun_day: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    lun_leapmonth: Option<String>,
}

/// `YYYY-MM-DD` with month and day zero-padded.
fn iso_date(year: Option<&str>, month: Option<&str>, day: Option<&str>) -> Option<String> {
    let year: i32 = year?.parse().ok()?;
    let month: u32 = month?.parse().ok()?;
    let day: u32 = day?.parse().ok()?;
    Some(format!("{year:04}-{month:02}-{day:02}"))
}

impl LunarDate {
    fn lunar_day(&self) -> Option<u32> {
        self.lun_day.and_then(|d| u32::try_from(d).ok())
    }

    fn is_leap_month(&self) -> bool {
        self.lun_leapmonth.as_deref() == Some(LEAP_MONTH)
    }

    fn lunar_date(&self) -> Option<String> {
        let day = self.lunar_day().map(|d| d.to_string());
        let date = iso_date(self.lun_year.as_deref(), self.lun_month.as_deref(), day.as_deref())?;
        Some(if self.is_leap_month() { format!("{date} (윤)") } else { date })
    }

    fn solar_date(&self) -> Option<String> {
        iso_date(self.sol_year.as_deref(), self.sol_month.as_deref(), self.sol_day.as_deref())
    }
}

/// Lunar calendar adapter.
///
/// Always contributes `tide_formula` alongside the phase. With
/// `offline_fallback` set, a failed lookup falls back to the mean-moon
/// estimate in [`lunar::estimate_lunar_day`] instead of contributing nothing.
pub struct LunarCalendarProvider {
    fetcher: Arc<dyn JsonFetcher>,
    reference: Arc<ReferenceData>,
    config: EndpointConfig,
    key: ServiceKey,
    offline_fallback: bool,
}

impl LunarCalendarProvider {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        reference: Arc<ReferenceData>,
        config: EndpointConfig,
        key: ServiceKey,
        offline_fallback: bool,
    ) -> Self {
        Self {
            fetcher,
            reference,
            config,
            key,
            offline_fallback,
        }
    }

    async fn lookup(&self, ctx: &QueryContext) -> Result<LunarDate, FetchError> {
        let key = self.key.get()?;
        let day = ctx.kst();
        let request = FetchRequest::new("lunar_calendar", &self.config.base_url, self.config.timeout())
            .param("solYear", day.format("%Y"))
            .param("solMonth", day.format("%m"))
            .param("solDay", day.format("%d"))
            .param("serviceKey", key)
            .param("_type", "json");
        let body = self.fetcher.get_json(&request).await?;
        parse_rows::<LunarDate>(body)?.into_iter().next().ok_or(FetchError::Empty)
    }
}

#[async_trait]
impl Contributor for LunarCalendarProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LunarCalendar
    }

    #[instrument(name = "lunar_calendar", skip_all)]
    async fn fetch(&self, ctx: &QueryContext) -> Result<Contribution, FetchError> {
        let region = self.reference.nearest_region(&ctx.point);
        let formula = TideFormula::for_region(region);

        let fields = match self.lookup(ctx).await {
            Ok(date) => {
                let Some(day) = date.lunar_day() else {
                    return Err(FetchError::shape("lunar calendar item without lunDay"));
                };
                debug!(lunar_day = day, leap = date.is_leap_month(), formula = %formula, "lunar date resolved");
                PartialRecord {
                    moon_phase: Some(lunar::phase(day, formula)),
                    tide_formula: Some(formula),
                    lunar_date: date.lunar_date(),
                    solar_date: date.solar_date(),
                    ..PartialRecord::default()
                }
            }
            Err(e) if self.offline_fallback => {
                let day = lunar::estimate_lunar_day(&ctx.requested_at);
                warn!(error = %e, estimated_day = day, "lunar calendar unavailable, using estimate");
                PartialRecord {
                    moon_phase: Some(lunar::phase(day, formula)),
                    tide_formula: Some(formula),
                    solar_date: Some(ctx.kst().format("%Y-%m-%d").to_string()),
                    ..PartialRecord::default()
                }
            }
            Err(e) => return Err(e),
        };
        Ok(Contribution::new(None, fields))
    }
}
