//! # Charter Boat Schedules
//!
//! The schedule feed publishes one list of sailings per vessel per calendar
//! month. [`ScheduleResolver`] answers two questions over a date window:
//! the earliest bookable sailing with enough seats
//! ([`ScheduleResolver::nearest_available`]) and every sailing in a short
//! range for the boat detail page ([`ScheduleResolver::in_range`]).
//!
//! A window that crosses a month boundary is fetched month by month. A month
//! that fails to load contributes nothing; the rest of the window is still
//! answered.

use crate::config::ScheduleConfig;
use crate::error::{FetchError, InputError};
use crate::providers::{lenient, parse_rows, FetchRequest, JsonFetcher};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Longest window accepted by [`ScheduleResolver::nearest_available`].
pub const MAX_SEARCH_DAYS: i64 = 366;

const DAY_LABELS: [&str; 7] = ["월", "화", "수", "목", "금", "토", "일"];

/// One sailing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    /// Display status, e.g. "예약가능"
    pub status: Option<String>,
    /// Machine status; "ING" means bookable
    pub status_code: Option<String>,
    /// Seats left
    pub remaining: i64,
    /// Total seats
    pub capacity: i64,
    pub price: Option<i64>,
    pub fish_type: Option<String>,
    pub fishing_method: Option<String>,
    pub tide_water: Option<String>,
    pub schedule_no: Option<String>,
}

impl ScheduleSlot {
    /// Slot on `date` with no other details.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            start_time: None,
            end_time: None,
            status: None,
            status_code: None,
            remaining: 0,
            capacity: 0,
            price: None,
            fish_type: None,
            fishing_method: None,
            tide_water: None,
            schedule_no: None,
        }
    }

    /// Date first, then start time; untimed slots go last within their day.
    fn sort_key(&self) -> (NaiveDate, bool, Option<NaiveTime>) {
        (self.date, self.start_time.is_none(), self.start_time)
    }
}

/// A slot with its weekday label, as shown on the detail page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatedSlot {
    #[serde(flatten)]
    pub slot: ScheduleSlot,
    /// "월" through "일"
    pub day_of_week: &'static str,
}

impl From<ScheduleSlot> for DatedSlot {
    fn from(slot: ScheduleSlot) -> Self {
        let day_of_week = DAY_LABELS[slot.date.weekday().num_days_from_monday() as usize];
        Self { slot, day_of_week }
    }
}

/// Row as the feed sends it.
#[derive(Debug, Default, Deserialize)]
struct RawSlot {
    #[serde(default, deserialize_with = "lenient::string_opt")]
    sdate: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    stime: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    etime: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    status_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::i64_opt")]
    remain_embarkation_num: Option<i64>,
    #[serde(default, deserialize_with = "lenient::i64_opt")]
    embarkation_num: Option<i64>,
    #[serde(default, deserialize_with = "lenient::i64_opt")]
    price: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    fish_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    fishing_method: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    tide_water: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_opt")]
    schedule_no: Option<String>,
}

fn parse_time(raw: Option<&str>) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw?, "%H:%M:%S").ok()
}

impl RawSlot {
    /// `None` when the row has no parseable date.
    fn into_slot(self) -> Option<ScheduleSlot> {
        let date = NaiveDate::parse_from_str(self.sdate.as_deref()?, "%Y-%m-%d").ok()?;
        Some(ScheduleSlot {
            date,
            start_time: parse_time(self.stime.as_deref()),
            end_time: parse_time(self.etime.as_deref()),
            status: self.status,
            status_code: self.status_code,
            remaining: self.remain_embarkation_num.unwrap_or(0),
            capacity: self.embarkation_num.unwrap_or(0),
            price: self.price,
            fish_type: self.fish_type,
            fishing_method: self.fishing_method,
            tide_water: self.tide_water,
            schedule_no: self.schedule_no,
        })
    }
}

/// Distinct `YYYYMM` months touched by `[from, to]`, in order.
pub fn months_spanned(from: NaiveDate, to: NaiveDate) -> Vec<String> {
    let mut months = Vec::new();
    let (mut year, mut month) = (from.year(), from.month());
    while (year, month) <= (to.year(), to.month()) {
        months.push(format!("{year:04}{month:02}"));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}

/// Source of monthly sailing lists.
#[async_trait]
pub trait ScheduleFeed: Send + Sync {
    /// Every sailing of `vessel` in `year_month` (`YYYYMM`).
    async fn month(&self, vessel: u32, year_month: &str) -> Result<Vec<ScheduleSlot>, FetchError>;
}

/// The public schedule feed over HTTP.
pub struct HttpScheduleFeed {
    fetcher: Arc<dyn JsonFetcher>,
    config: ScheduleConfig,
}

impl HttpScheduleFeed {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, config: ScheduleConfig) -> Self {
        Self { fetcher, config }
    }

    fn month_url(&self, vessel: u32, year_month: &str) -> String {
        format!("{}/{vessel}/{year_month}", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ScheduleFeed for HttpScheduleFeed {
    async fn month(&self, vessel: u32, year_month: &str) -> Result<Vec<ScheduleSlot>, FetchError> {
        let request = FetchRequest::new("schedule", self.month_url(vessel, year_month), self.config.timeout())
            .param("simple", "")
            .param("possible", "")
            .param("eyyyymm", "");
        let body = self.fetcher.get_json(&request).await?;
        let rows: Vec<RawSlot> = parse_rows(body)?;
        let total = rows.len();
        let slots: Vec<ScheduleSlot> = rows.into_iter().filter_map(RawSlot::into_slot).collect();
        if slots.len() < total {
            debug!(vessel, year_month, dropped = total - slots.len(), "rows without a date");
        }
        Ok(slots)
    }
}

/// Availability search over a [`ScheduleFeed`].
pub struct ScheduleResolver {
    feed: Arc<dyn ScheduleFeed>,
    open_status: String,
    max_window_days: u32,
}

impl ScheduleResolver {
    pub fn new(feed: Arc<dyn ScheduleFeed>, open_status: impl Into<String>, max_window_days: u32) -> Self {
        Self {
            feed,
            open_status: open_status.into(),
            max_window_days: max_window_days.max(1),
        }
    }

    /// Resolver over the HTTP feed described by `config`.
    pub fn from_config(config: &ScheduleConfig, fetcher: Arc<dyn JsonFetcher>) -> Self {
        let open_status = config.open_status.clone();
        let max_window_days = config.max_window_days;
        Self::new(Arc::new(HttpScheduleFeed::new(fetcher, config.clone())), open_status, max_window_days)
    }

    /// Slots of `vessel` dated within `[from, to]`, sorted by date then start time.
    async fn collect(&self, vessel: u32, from: NaiveDate, to: NaiveDate) -> Vec<ScheduleSlot> {
        let mut slots = Vec::new();
        for year_month in months_spanned(from, to) {
            match self.feed.month(vessel, &year_month).await {
                Ok(month) => {
                    debug!(vessel, year_month = %year_month, slots = month.len(), "month loaded");
                    slots.extend(month);
                }
                Err(e) => warn!(vessel, year_month = %year_month, error = %e, "month schedule unavailable"),
            }
        }
        slots.retain(|s| s.date >= from && s.date <= to);
        slots.sort_by_key(ScheduleSlot::sort_key);
        slots
    }

    /// Earliest bookable sailing in `[from, from + window_days]` with at
    /// least `min_seats` seats left.
    #[instrument(skip(self))]
    pub async fn nearest_available(
        &self,
        vessel: u32,
        from: NaiveDate,
        window_days: i64,
        min_seats: u32,
    ) -> Result<Option<ScheduleSlot>, InputError> {
        if !(0..=MAX_SEARCH_DAYS).contains(&window_days) {
            return Err(InputError::InvalidWindow(window_days));
        }
        let to = from + Duration::days(window_days);
        let candidates = self.collect(vessel, from, to).await;
        let total = candidates.len();

        let best = candidates.into_iter().find(|s| {
            s.status_code.as_deref() == Some(self.open_status.as_str()) && s.remaining >= i64::from(min_seats)
        });
        match &best {
            Some(slot) => info!(vessel, date = %slot.date, remaining = slot.remaining, "nearest slot found"),
            None => info!(vessel, considered = total, "no slot available"),
        }
        Ok(best)
    }

    /// Every sailing in the `days` days starting at `from`, clamped to
    /// `1..=max_window_days`, with weekday labels.
    #[instrument(skip(self))]
    pub async fn in_range(&self, vessel: u32, from: NaiveDate, days: i64) -> Vec<DatedSlot> {
        let days = days.clamp(1, i64::from(self.max_window_days));
        let to = from + Duration::days(days - 1);
        let slots: Vec<DatedSlot> = self.collect(vessel, from, to).await.into_iter().map(DatedSlot::from).collect();
        info!(vessel, days, slots = slots.len(), "schedule window");
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::CannedFetcher;
    use serde_json::json;

    const BASE: &str = "http://schedule.test/ship/schedule_fleet_list";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn resolver(fetcher: Arc<CannedFetcher>) -> ScheduleResolver {
        ScheduleResolver::from_config(
            &ScheduleConfig {
                base_url: format!("{BASE}/"),
                ..ScheduleConfig::default()
            },
            fetcher,
        )
    }

    #[test]
    fn months_cross_year_boundary() {
        assert_eq!(months_spanned(date(2025, 12, 28), date(2026, 1, 4)), ["202512", "202601"]);
        assert_eq!(months_spanned(date(2025, 4, 1), date(2025, 4, 30)), ["202504"]);
        assert!(months_spanned(date(2025, 5, 1), date(2025, 4, 1)).is_empty());
    }

    #[test]
    fn raw_rows_are_lenient() {
        let row: RawSlot = serde_json::from_value(json!({
            "sdate": "2025-04-12", "stime": "05:30:00", "etime": "",
            "status_code": "ING", "remain_embarkation_num": "3", "embarkation_num": 20,
            "price": "90000", "schedule_no": 1182
        }))
        .unwrap();
        let slot = row.into_slot().unwrap();
        assert_eq!(slot.start_time, NaiveTime::from_hms_opt(5, 30, 0));
        assert_eq!(slot.end_time, None);
        assert_eq!(slot.remaining, 3);
        assert_eq!(slot.capacity, 20);
        assert_eq!(slot.price, Some(90000));
        assert_eq!(slot.schedule_no.as_deref(), Some("1182"));

        let bad: RawSlot = serde_json::from_value(json!({"sdate": "2025-04-12", "remain_embarkation_num": "many"})).unwrap();
        assert_eq!(bad.into_slot().unwrap().remaining, 0);

        let undated: RawSlot = serde_json::from_value(json!({"sdate": "04/12", "status_code": "ING"})).unwrap();
        assert!(undated.into_slot().is_none());
    }

    #[test]
    fn weekday_labels() {
        assert_eq!(DatedSlot::from(ScheduleSlot::new(date(2025, 4, 14))).day_of_week, "월");
        assert_eq!(DatedSlot::from(ScheduleSlot::new(date(2025, 4, 20))).day_of_week, "일");
    }

    #[tokio::test]
    async fn nearest_across_months_over_http() {
        let april = json!([
            {"sdate": "2025-04-29", "stime": "05:00:00", "status_code": "END", "remain_embarkation_num": 10},
            {"sdate": "2025-04-30", "stime": "05:00:00", "status_code": "ING", "remain_embarkation_num": 0}
        ]);
        let may = json!({"data": [
            {"sdate": "2025-05-02", "stime": "13:00:00", "status_code": "ING", "remain_embarkation_num": "4"},
            {"sdate": "2025-05-02", "stime": "05:00:00", "status_code": "ING", "remain_embarkation_num": "4"},
            {"sdate": "2025-05-09", "stime": "05:00:00", "status_code": "ING", "remain_embarkation_num": "20"}
        ]});
        let fetcher = Arc::new(
            CannedFetcher::new()
                .on(&format!("{BASE}/1042/202504"), &[], april)
                .on(&format!("{BASE}/1042/202505"), &[], may),
        );
        let resolver = resolver(fetcher.clone());

        let slot = resolver.nearest_available(1042, date(2025, 4, 28), 7, 2).await.unwrap().unwrap();
        assert_eq!(slot.date, date(2025, 5, 2));
        assert_eq!(slot.start_time, NaiveTime::from_hms_opt(5, 0, 0));
        assert_eq!(fetcher.call_count(), 2);
        assert_eq!(fetcher.calls()[0].query_value("eyyyymm"), Some(""));
    }

    #[tokio::test]
    async fn failed_month_contributes_nothing() {
        let may = json!({"list": [{"sdate": "2025-05-01", "status_code": "ING", "remain_embarkation_num": 5}]});
        let fetcher = Arc::new(
            CannedFetcher::new()
                .fail(&format!("{BASE}/7/202504"), &[], 502)
                .on(&format!("{BASE}/7/202505"), &[], may),
        );
        let resolver = resolver(fetcher);
        let slot = resolver.nearest_available(7, date(2025, 4, 28), 7, 1).await.unwrap();
        assert_eq!(slot.map(|s| s.date), Some(date(2025, 5, 1)));
    }

    #[tokio::test]
    async fn window_bounds_are_checked() {
        let resolver = resolver(Arc::new(CannedFetcher::new()));
        assert_eq!(
            resolver.nearest_available(7, date(2025, 4, 1), -1, 1).await,
            Err(InputError::InvalidWindow(-1))
        );
        assert_eq!(
            resolver.nearest_available(7, date(2025, 4, 1), 400, 1).await,
            Err(InputError::InvalidWindow(400))
        );
    }

    #[tokio::test]
    async fn in_range_clamps_and_labels() {
        let april = json!({"schedules": [
            {"sdate": "2025-04-20", "stime": "05:00:00", "status_code": "END"},
            {"sdate": "2025-04-14", "status_code": "ING"},
            {"sdate": "2025-04-14", "stime": "05:00:00", "status_code": "ING"},
            {"sdate": "2025-04-21", "stime": "05:00:00", "status_code": "ING"}
        ]});
        let fetcher = Arc::new(CannedFetcher::new().on(&format!("{BASE}/3/202504"), &[], april));
        let resolver = resolver(fetcher);

        let slots = resolver.in_range(3, date(2025, 4, 14), 30).await;
        let summary: Vec<_> = slots.iter().map(|s| (s.slot.date.day(), s.slot.start_time.is_some(), s.day_of_week)).collect();
        assert_eq!(summary, [(14, true, "월"), (14, false, "월"), (20, true, "일")]);

        let single = resolver.in_range(3, date(2025, 4, 14), 0).await;
        assert_eq!(single.len(), 2);
    }
}
