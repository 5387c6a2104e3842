//! # Navis Marine Environment Core
//!
//! This library resolves the fishing conditions around a point on the Korean
//! coast and matches charter-boat schedules against a date window. It is the
//! engine behind the app's "conditions" card and the boat detail page.
//!
//! ## Data Flow
//!
//! 1. **Reference data**: buoys, tide stations, fishing spots and coastal grid
//!    points are loaded once at startup ([`reference::ReferenceData`]) and
//!    shared read-only.
//! 2. **Providers**: five upstream feeds (fishing index, ocean buoys, KMA
//!    nowcast, tide predictions, lunar calendar) are queried concurrently. Each
//!    one either contributes a [`PartialRecord`] or is skipped.
//! 3. **Fusion**: contributions are folded into one [`EnvironmentRecord`] in a
//!    fixed priority order ([`fusion`]). The nowcast always wins for wind.
//! 4. **Schedules**: vessel availability is searched month by month
//!    ([`schedule`]).
//!
//! ## Failure Model
//!
//! Upstream failures never escape an adapter. A request in which every
//! provider failed still yields a valid, all-empty record. The only errors a
//! caller sees are invalid input ([`error::InputError`]).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod fusion;
pub mod geo;
pub mod grid;
pub mod logging;
pub mod lunar;
pub mod providers;
pub mod reference;
pub mod report;
pub mod schedule;

pub use fusion::EnvironmentFusionEngine;
pub use geo::Coordinate;
pub use lunar::TideFormula;
pub use providers::ProviderKind;
pub use schedule::{DatedSlot, ScheduleResolver, ScheduleSlot};

/// Offset of Korea Standard Time from UTC, in hours.
pub const KST_OFFSET_HOURS: i64 = 9;

/// Copy every listed field of `$src` into `$dst` where `$dst` is still `None`.
macro_rules! fill_missing {
    ($dst:expr, $src:expr, [$($field:ident),* $(,)?]) => {
        $(
            if $dst.$field.is_none() {
                if let Some(value) = &$src.$field {
                    $dst.$field = Some(value.clone());
                }
            }
        )*
    };
}

/// Wall-clock time in Korea for an instant.
///
/// Upstream feeds are keyed by KST dates and hours with no zone marker, so
/// everything that builds a query parameter goes through this.
pub fn kst_wall_clock(at: &DateTime<Utc>) -> NaiveDateTime {
    at.naive_utc() + chrono::Duration::hours(KST_OFFSET_HOURS)
}

/// Values a single provider managed to extract.
///
/// Every field is optional; a provider fills only what its feed carries.
/// The fusion engine folds these into an [`EnvironmentRecord`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialRecord {
    pub water_temp: Option<f64>,
    pub wave_height: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub wind_direction_16: Option<String>,
    pub current_speed: Option<f64>,
    pub air_temp: Option<f64>,
    pub humidity: Option<f64>,
    /// KMA precipitation type, 0 (none) to 4 (shower).
    pub rain_type: Option<u8>,
    pub record_time: Option<String>,
    pub fishing_index: Option<String>,
    pub fishing_score: Option<f64>,
    pub moon_phase: Option<String>,
    pub tide_formula: Option<TideFormula>,
    pub next_high_tide: Option<String>,
    pub next_low_tide: Option<String>,
    pub tide_station_name: Option<String>,
    pub solar_date: Option<String>,
    pub lunar_date: Option<String>,
}

impl PartialRecord {
    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        *self == PartialRecord::default()
    }

    /// Fill this record's empty fields from `other`.
    pub fn fill_from(&mut self, other: &PartialRecord) {
        fill_missing!(
            self,
            other,
            [
                water_temp,
                wave_height,
                wind_speed,
                wind_direction_deg,
                wind_direction_16,
                current_speed,
                air_temp,
                humidity,
                rain_type,
                record_time,
                fishing_index,
                fishing_score,
                moon_phase,
                tide_formula,
                next_high_tide,
                next_low_tide,
                tide_station_name,
                solar_date,
                lunar_date,
            ]
        );
    }
}

/// The fused environment for one request.
///
/// Constructed empty, filled by sequential merges in provider priority order
/// and handed back to the caller. Not persisted.
///
/// # Example
/// ```
/// use navis_env_lib::EnvironmentRecord;
///
/// let record = EnvironmentRecord::default();
/// assert!(record.source.is_none());
/// assert_eq!(record.rain_type_text(), "N/A");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    /// Display name of the first provider that contributed.
    pub source: Option<String>,
    /// Spot, station or grid label reported by that same provider.
    pub location_name: Option<String>,
    pub target_fish: Option<String>,
    pub water_temp: Option<f64>,
    pub wave_height: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub wind_direction_16: Option<String>,
    pub current_speed: Option<f64>,
    pub air_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub rain_type: Option<u8>,
    pub record_time: Option<String>,
    pub fishing_index: Option<String>,
    pub fishing_score: Option<f64>,
    /// Mul-ttae label ("1".."14", "조금", "무시").
    pub moon_phase: Option<String>,
    pub tide_formula: Option<TideFormula>,
    pub next_high_tide: Option<String>,
    pub next_low_tide: Option<String>,
    pub tide_station_name: Option<String>,
    pub solar_date: Option<String>,
    pub lunar_date: Option<String>,
    /// Providers that contributed, in priority order.
    #[serde(default)]
    pub contributors: Vec<ProviderKind>,
}

impl EnvironmentRecord {
    /// Empty record for a request targeting `target_fish`.
    pub fn for_target(target_fish: impl Into<String>) -> Self {
        Self {
            target_fish: Some(target_fish.into()),
            ..Self::default()
        }
    }

    /// Korean label for the KMA precipitation code.
    pub fn rain_type_text(&self) -> &'static str {
        match self.rain_type {
            None => "N/A",
            Some(0) => "맑음",
            Some(1) => "비",
            Some(2) => "비/눈",
            Some(3) => "눈",
            Some(4) => "소나기",
            Some(_) => "알 수 없음",
        }
    }

    /// True when no provider contributed anything.
    pub fn is_unavailable(&self) -> bool {
        self.contributors.is_empty()
    }

    /// Fold one provider's contribution into the record.
    ///
    /// Only empty fields are filled, except that a wind-authoritative
    /// provider overwrites the wind fields it carries. The first contributor
    /// names `source` and `location_name`. Empty contributions are ignored.
    pub fn merge(&mut self, kind: ProviderKind, contribution: &providers::Contribution) {
        let fields = &contribution.fields;
        if fields.is_empty() {
            return;
        }

        if self.source.is_none() {
            self.source = Some(kind.display_name().to_string());
            self.location_name = contribution.location_name.clone();
        }

        if kind.overrides_wind() {
            if let Some(speed) = fields.wind_speed {
                self.wind_speed = Some(speed);
            }
            if let Some(deg) = fields.wind_direction_deg {
                self.wind_direction_deg = Some(deg);
            }
            if let Some(label) = &fields.wind_direction_16 {
                self.wind_direction_16 = Some(label.clone());
            }
        }

        fill_missing!(
            self,
            fields,
            [
                water_temp,
                wave_height,
                wind_speed,
                wind_direction_deg,
                wind_direction_16,
                current_speed,
                air_temp,
                humidity,
                rain_type,
                record_time,
                fishing_index,
                fishing_score,
                moon_phase,
                tide_formula,
                next_high_tide,
                next_low_tide,
                tide_station_name,
                solar_date,
                lunar_date,
            ]
        );

        if !self.contributors.contains(&kind) {
            self.contributors.push(kind);
        }
    }
}
