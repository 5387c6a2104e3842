//! # Schedule Resolution Scenarios
//!
//! Availability searches over an in-memory feed.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use navis_env_lib::error::FetchError;
use navis_env_lib::schedule::ScheduleFeed;
use navis_env_lib::{ScheduleResolver, ScheduleSlot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Monthly slot lists keyed by `YYYYMM`; a missing month is an upstream error.
#[derive(Default)]
struct InMemoryFeed {
    months: HashMap<String, Vec<ScheduleSlot>>,
    requested: Mutex<Vec<String>>,
}

impl InMemoryFeed {
    fn with_slots(slots: Vec<ScheduleSlot>) -> Self {
        let mut months: HashMap<String, Vec<ScheduleSlot>> = HashMap::new();
        for slot in slots {
            months.entry(slot.date.format("%Y%m").to_string()).or_default().push(slot);
        }
        Self {
            months,
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ScheduleFeed for InMemoryFeed {
    async fn month(&self, _vessel: u32, year_month: &str) -> Result<Vec<ScheduleSlot>, FetchError> {
        self.requested.lock().unwrap().push(year_month.to_string());
        self.months.get(year_month).cloned().ok_or(FetchError::Status(500))
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
}

fn slot(date: NaiveDate, hour: Option<u32>, status_code: &str, remaining: i64) -> ScheduleSlot {
    ScheduleSlot {
        start_time: hour.and_then(|h| NaiveTime::from_hms_opt(h, 0, 0)),
        status_code: Some(status_code.to_string()),
        remaining,
        capacity: 20,
        ..ScheduleSlot::new(date)
    }
}

fn resolver(feed: Arc<InMemoryFeed>) -> ScheduleResolver {
    ScheduleResolver::new(feed, "ING", 7)
}

/// Ten candidates: four closed, six open with varying seats.
fn ten_slots() -> Vec<ScheduleSlot> {
    vec![
        slot(day(10), Some(5), "CLOSED", 12),
        slot(day(10), Some(13), "ING", 1),
        slot(day(11), Some(5), "CLOSED", 8),
        slot(day(11), Some(13), "ING", 0),
        slot(day(12), Some(5), "CLOSED", 20),
        slot(day(12), Some(13), "ING", 2),
        slot(day(12), Some(6), "ING", 5),
        slot(day(13), Some(5), "CLOSED", 20),
        slot(day(13), Some(5), "ING", 9),
        slot(day(14), None, "ING", 15),
    ]
}

#[tokio::test]
async fn earliest_open_slot_with_enough_seats() {
    let feed = Arc::new(InMemoryFeed::with_slots(ten_slots()));
    let resolver = resolver(feed.clone());

    let best = resolver.nearest_available(1042, day(10), 7, 2).await.unwrap().unwrap();
    assert_eq!(best.date, day(12));
    assert_eq!(best.start_time, NaiveTime::from_hms_opt(6, 0, 0));
    assert_eq!(best.remaining, 5);
    assert_eq!(*feed.requested.lock().unwrap(), ["202504"]);

    // a single seat accepts the 13:00 sailing on the 10th
    let any = resolver.nearest_available(1042, day(10), 7, 1).await.unwrap().unwrap();
    assert_eq!((any.date, any.remaining), (day(10), 1));
}

#[tokio::test]
async fn result_respects_window_and_seat_bounds() {
    let feed = Arc::new(InMemoryFeed::with_slots(ten_slots()));
    let resolver = resolver(feed);

    for from in 8..=14 {
        for window in 0..=7 {
            for seats in 1..=10u32 {
                let found = resolver.nearest_available(1042, day(from), window, seats).await.unwrap();
                if let Some(s) = found {
                    assert!(s.date >= day(from) && s.date <= day(from) + chrono::Duration::days(window));
                    assert!(s.remaining >= i64::from(seats));
                    assert_eq!(s.status_code.as_deref(), Some("ING"));
                }
            }
        }
    }

    assert!(resolver.nearest_available(1042, day(10), 7, 16).await.unwrap().is_none());
    assert!(resolver.nearest_available(1042, day(20), 3, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_month_does_not_abort_the_search() {
    let may = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
    let feed = Arc::new(InMemoryFeed::with_slots(vec![slot(may, Some(5), "ING", 4)]));
    let resolver = resolver(feed.clone());

    let best = resolver.nearest_available(7, day(28), 7, 1).await.unwrap();
    assert_eq!(best.map(|s| s.date), Some(may));
    assert_eq!(*feed.requested.lock().unwrap(), ["202504", "202505"]);
}

#[tokio::test]
async fn window_lists_every_status_in_order() {
    let feed = Arc::new(InMemoryFeed::with_slots(ten_slots()));
    let resolver = resolver(feed);

    let slots = resolver.in_range(1042, day(12), 3).await;
    let listed: Vec<_> = slots
        .iter()
        .map(|s| (s.slot.date, s.slot.start_time.map(|t| t.format("%H").to_string()), s.day_of_week))
        .collect();
    assert_eq!(
        listed,
        [
            (day(12), Some("05".to_string()), "토"),
            (day(12), Some("06".to_string()), "토"),
            (day(12), Some("13".to_string()), "토"),
            (day(13), Some("05".to_string()), "일"),
            (day(13), Some("05".to_string()), "일"),
            (day(14), None, "월"),
        ]
    );
}
