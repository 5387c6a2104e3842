//! # Upstream Providers
//!
//! Five feeds contribute to an environment record. Each adapter implements
//! [`Contributor`]: it finds the reference points it needs, issues its HTTP
//! calls through a [`JsonFetcher`], normalizes the body and hands back a
//! [`Contribution`] or a [`FetchError`].
//!
//! ## Response Shapes
//!
//! The feeds disagree on where results live. [`RawProviderResponse`] names
//! every layout seen so far:
//!
//! | layout | used by |
//! |---|---|
//! | bare JSON array | schedule feed |
//! | `{"data": [...]}`, `{"list": [...]}`, `{"schedules": [...]}` | schedule feed |
//! | `{"result": {"data": ...}}` / `{"result": {"error": ...}}` | KHOA buoys, tide predictions |
//! | `{"response": {"header", "body": {"items": {"item": ...}}}}` | data.go.kr (nowcast, fishing index, lunar calendar) |
//!
//! `data` and `item` may hold a single object instead of a list. After
//! [`RawProviderResponse::into_items`] every adapter works with a flat list
//! and deserializes it into its own typed rows.
//!
//! ## Value Hygiene
//!
//! Upstream numbers arrive as JSON numbers, numeric strings, empty strings or
//! sentinels such as `-999`. The [`lenient`] deserializers turn all of that
//! into `Option<f64>`, and [`valid_observation`] drops anything outside
//! `(-900, 900)`.

use crate::error::FetchError;
use crate::geo::Coordinate;
use crate::{kst_wall_clock, PartialRecord};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod buoy;
pub mod fishing_index;
pub mod http;
pub mod lunar_calendar;
pub mod nowcast;
pub mod tide_station;

pub use buoy::BuoyProvider;
pub use fishing_index::FishingIndexProvider;
pub use http::HttpFetcher;
pub use lunar_calendar::LunarCalendarProvider;
pub use nowcast::NowcastProvider;
pub use tide_station::TideStationProvider;

/// The five upstream feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    FishingIndex,
    Buoy,
    Nowcast,
    TideStation,
    LunarCalendar,
}

impl ProviderKind {
    /// Merge order, highest priority first.
    pub const PRIORITY: [ProviderKind; 5] = [
        ProviderKind::FishingIndex,
        ProviderKind::Buoy,
        ProviderKind::Nowcast,
        ProviderKind::TideStation,
        ProviderKind::LunarCalendar,
    ];

    /// Position in [`ProviderKind::PRIORITY`].
    pub fn rank(&self) -> usize {
        match self {
            ProviderKind::FishingIndex => 0,
            ProviderKind::Buoy => 1,
            ProviderKind::Nowcast => 2,
            ProviderKind::TideStation => 3,
            ProviderKind::LunarCalendar => 4,
        }
    }

    /// Name shown as the record's `source`.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::FishingIndex => "바다낚시지수 API",
            ProviderKind::Buoy => "해양관측부이 API",
            ProviderKind::Nowcast => "기상청 API",
            ProviderKind::TideStation => "조석예보 API",
            ProviderKind::LunarCalendar => "음력변환 API",
        }
    }

    /// The nowcast is authoritative for wind and overwrites earlier values.
    pub fn overrides_wind(&self) -> bool {
        matches!(self, ProviderKind::Nowcast)
    }

    fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::FishingIndex => "fishing_index",
            ProviderKind::Buoy => "buoy",
            ProviderKind::Nowcast => "nowcast",
            ProviderKind::TideStation => "tide_station",
            ProviderKind::LunarCalendar => "lunar_calendar",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single resolution request is about.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    pub point: Coordinate,
    pub requested_at: DateTime<Utc>,
    /// Normalized species ("쭈꾸미", "갑오징어" or "쭈갑")
    pub target_fish: String,
}

impl QueryContext {
    pub fn new(point: Coordinate, requested_at: DateTime<Utc>, target_fish: impl Into<String>) -> Self {
        Self {
            point,
            requested_at,
            target_fish: target_fish.into(),
        }
    }

    /// Request time on the Korean wall clock.
    pub fn kst(&self) -> NaiveDateTime {
        kst_wall_clock(&self.requested_at)
    }

    /// Request date as `YYYYMMDD` in KST.
    pub fn kst_date_param(&self) -> String {
        self.kst().format("%Y%m%d").to_string()
    }
}

/// One provider's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contribution {
    /// Spot, station or grid label for the record's `location_name`
    pub location_name: Option<String>,
    pub fields: PartialRecord,
}

impl Contribution {
    pub fn new(location_name: Option<String>, fields: PartialRecord) -> Self {
        Self { location_name, fields }
    }
}

/// A provider the fusion engine can ask for a partial record.
#[async_trait]
pub trait Contributor: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn fetch(&self, ctx: &QueryContext) -> Result<Contribution, FetchError>;
}

/// Run `provider` and collapse failures into "no contribution".
///
/// Errors are logged here and go no further.
pub async fn contribute(provider: &dyn Contributor, ctx: &QueryContext) -> Option<Contribution> {
    let kind = provider.kind();
    match provider.fetch(ctx).await {
        Ok(contribution) if contribution.fields.is_empty() => {
            info!(provider = %kind, "provider returned no usable values");
            None
        }
        Ok(contribution) => {
            info!(
                provider = %kind,
                location = contribution.location_name.as_deref().unwrap_or("-"),
                "provider contributed"
            );
            Some(contribution)
        }
        Err(e) => {
            warn!(provider = %kind, error = %e, "provider unavailable");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// One GET request against an upstream JSON API.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Short label for logs
    pub source: &'static str,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(source: &'static str, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            source,
            url: url.into(),
            query: Vec::new(),
            timeout,
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Value of the first query parameter named `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Issues GET requests and returns the parsed JSON body.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn get_json(&self, request: &FetchRequest) -> Result<Value, FetchError>;
}

/// A service key resolved from the environment, remembered with its variable name.
#[derive(Clone, Default, PartialEq)]
pub struct ServiceKey {
    var: String,
    value: Option<String>,
}

impl ServiceKey {
    pub fn new(var: impl Into<String>, value: Option<String>) -> Self {
        Self {
            var: var.into(),
            value,
        }
    }

    /// The key, or [`FetchError::MissingCredential`] naming the variable.
    pub fn get(&self) -> Result<&str, FetchError> {
        self.value
            .as_deref()
            .ok_or_else(|| FetchError::MissingCredential(self.var.clone()))
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceKey")
            .field("var", &self.var)
            .field("set", &self.value.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Response normalization
// ---------------------------------------------------------------------------

/// Every body layout the upstream feeds use.
#[derive(Debug, Clone, PartialEq)]
pub enum RawProviderResponse {
    /// Top-level JSON array
    Bare(Vec<Value>),
    /// Array under a `data`, `list` or `schedules` key
    Keyed { key: &'static str, items: Vec<Value> },
    /// KHOA `result.data`
    ResultData(Vec<Value>),
    /// KHOA `result.error`
    ResultError(String),
    /// data.go.kr `response.header` + `response.body.items.item`
    Envelope {
        code: Option<String>,
        message: Option<String>,
        items: Vec<Value>,
    },
}

const KEYED_CONTAINERS: [&str; 3] = ["data", "list", "schedules"];

impl RawProviderResponse {
    /// Work out which layout `body` uses.
    pub fn classify(body: Value) -> Result<Self, FetchError> {
        let mut map = match body {
            Value::Array(items) => return Ok(Self::Bare(items)),
            Value::Object(map) => map,
            other => return Err(FetchError::shape(format!("expected object or array, got {other}"))),
        };

        if let Some(Value::Object(mut result)) = map.remove("result") {
            if let Some(error) = result.remove("error") {
                return Ok(Self::ResultError(text_of(&error).unwrap_or_default()));
            }
            return match result.remove("data") {
                Some(data) => Ok(Self::ResultData(one_or_many(data))),
                None => Err(FetchError::shape("result without data")),
            };
        }

        let root = match map.remove("response") {
            Some(Value::Object(inner)) => Some(inner),
            _ if map.contains_key("header") || map.contains_key("body") => Some(std::mem::take(&mut map)),
            _ => None,
        };
        if let Some(root) = root {
            return Ok(Self::envelope(root));
        }

        for key in KEYED_CONTAINERS {
            match map.remove(key) {
                None | Some(Value::Null) => continue,
                Some(value) => {
                    return Ok(Self::Keyed {
                        key,
                        items: one_or_many(value),
                    })
                }
            }
        }

        Err(FetchError::shape("no recognised result container"))
    }

    fn envelope(root: Map<String, Value>) -> Self {
        let header = root.get("header");
        let code = header.and_then(|h| h.get("resultCode")).and_then(text_of);
        let message = header.and_then(|h| h.get("resultMsg")).and_then(text_of);
        let items = root
            .get("body")
            .and_then(|b| b.get("items"))
            .and_then(|i| i.get("item"))
            .cloned()
            .map(one_or_many)
            .unwrap_or_default();
        Self::Envelope { code, message, items }
    }

    /// Flatten into rows, turning upstream error markers into [`FetchError::Upstream`].
    pub fn into_items(self) -> Result<Vec<Value>, FetchError> {
        match self {
            Self::Bare(items) | Self::Keyed { items, .. } | Self::ResultData(items) => Ok(items),
            Self::ResultError(message) => Err(FetchError::Upstream {
                code: "error".to_string(),
                message,
            }),
            Self::Envelope { code, message, items } => match code.as_deref() {
                None | Some("00") => Ok(items),
                Some(code) => Err(FetchError::Upstream {
                    code: code.to_string(),
                    message: message.unwrap_or_default(),
                }),
            },
        }
    }
}

/// Classify, flatten and deserialize in one go. Rows that do not fit `T` are skipped.
pub fn parse_rows<T: DeserializeOwned>(body: Value) -> Result<Vec<T>, FetchError> {
    let items = RawProviderResponse::classify(body)?.into_items()?;
    let total = items.len();
    let rows: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(row) => Some(row),
            Err(e) => {
                debug!(error = %e, "skipping malformed row");
                None
            }
        })
        .collect();
    if rows.len() < total {
        debug!(kept = rows.len(), total, "dropped malformed rows");
    }
    Ok(rows)
}

fn one_or_many(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Serde helpers for upstream fields of uncertain type.
pub mod lenient {
    use super::{number_of, text_of};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Number, numeric string, empty string or null into `Option<f64>`.
    pub fn f64_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(number_of))
    }

    /// Like [`f64_opt`] but truncated to an integer count.
    pub fn i64_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(f64_opt(deserializer)?.map(|v| v as i64))
    }

    /// String or number into `Option<String>`; blank becomes `None`.
    pub fn string_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(text_of))
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Keep `v` only inside the open sentinel range `(-900, 900)`.
pub fn valid_observation(v: f64) -> Option<f64> {
    (v.is_finite() && v > -900.0 && v < 900.0).then_some(v)
}

/// [`valid_observation`] over an optional value.
pub fn valid(v: Option<f64>) -> Option<f64> {
    v.and_then(valid_observation)
}

/// Round to one decimal place.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Midpoint of a published min/max pair.
///
/// Both bounds: the mean rounded to one decimal. One bound: that bound.
/// Neither: `None`.
///
/// ```
/// use navis_env_lib::providers::avg_range;
///
/// assert_eq!(avg_range(Some(12.0), Some(15.0)), Some(13.5));
/// assert_eq!(avg_range(None, Some(0.8)), Some(0.8));
/// assert_eq!(avg_range(None, None), None);
/// ```
pub fn avg_range(min: Option<f64>, max: Option<f64>) -> Option<f64> {
    match (valid(min), valid(max)) {
        (Some(a), Some(b)) => Some(round1((a + b) / 2.0)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

const COMPASS_16: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW", "NNW",
];

/// Sixteen-point compass label for a direction in degrees.
///
/// `index = floor((deg + 11.25) / 22.5) mod 16` after normalising `deg`
/// into `[0, 360)`.
pub fn wind_16(deg: f64) -> &'static str {
    let deg = deg.rem_euclid(360.0);
    let index = ((deg + 11.25) / 22.5).floor() as usize % 16;
    COMPASS_16[index]
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned transport for adapter tests.

    use super::{FetchRequest, JsonFetcher};
    use crate::error::FetchError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    enum Reply {
        Json(Value),
        Status(u16),
    }

    struct Route {
        url: String,
        params: Vec<(String, String)>,
        reply: Reply,
    }

    /// Answers requests from a route table and records every call.
    ///
    /// A route matches when the URL is equal and every listed parameter is
    /// present with that value. Unmatched requests get a 404.
    #[derive(Default)]
    pub struct CannedFetcher {
        routes: Vec<Route>,
        calls: Mutex<Vec<FetchRequest>>,
    }

    impl CannedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, url: &str, params: &[(&str, &str)], body: Value) -> Self {
            self.routes.push(Route {
                url: url.to_string(),
                params: own(params),
                reply: Reply::Json(body),
            });
            self
        }

        pub fn fail(mut self, url: &str, params: &[(&str, &str)], status: u16) -> Self {
            self.routes.push(Route {
                url: url.to_string(),
                params: own(params),
                reply: Reply::Status(status),
            });
            self
        }

        pub fn calls(&self) -> Vec<FetchRequest> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    fn own(params: &[(&str, &str)]) -> Vec<(String, String)> {
        params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[async_trait]
    impl JsonFetcher for CannedFetcher {
        async fn get_json(&self, request: &FetchRequest) -> Result<Value, FetchError> {
            self.calls.lock().unwrap().push(request.clone());
            let route = self.routes.iter().find(|route| {
                route.url == request.url
                    && route
                        .params
                        .iter()
                        .all(|(k, v)| request.query_value(k) == Some(v.as_str()))
            });
            match route.map(|r| &r.reply) {
                Some(Reply::Json(body)) => Ok(body.clone()),
                Some(Reply::Status(code)) => Err(FetchError::Status(*code)),
                None => Err(FetchError::Status(404)),
            }
        }
    }
}
