//! Mul-ttae (물때) tide phase from the lunar calendar day.
//!
//! Korean anglers count the tide cycle in lunar days. Two conventions are in
//! use: the west coast counts seven-day ("7물때식") and includes a "무시" day
//! after each neap, the rest of the coast counts eight-day ("8물때식").
//! Both put "조금" (neap) on lunar days 8 and 23.
//!
//! The lunar day itself comes from the lunar-calendar provider. When that
//! feed is down, [`estimate_lunar_day`] gives a mean-moon estimate
//! (±1 day), good enough for an offline hint.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used when the lunar day or region cannot be resolved.
pub const UNKNOWN_PHASE: &str = "정보 없음";

/// Which lookup table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TideFormula {
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
}

impl TideFormula {
    pub fn as_str(&self) -> &'static str {
        match self {
            TideFormula::Seven => "7",
            TideFormula::Eight => "8",
        }
    }

    /// West-coast regions ("서해안") count seven-day, everything else eight-day.
    pub fn for_region(region: Option<&str>) -> TideFormula {
        match region {
            Some(r) if r.contains("서해안") => TideFormula::Seven,
            _ => TideFormula::Eight,
        }
    }
}

impl fmt::Display for TideFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a mul-ttae table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulTtae {
    /// Numbered phase, 1 to 14.
    Number(u8),
    /// 조금, neap.
    Jogeum,
    /// 무시, the day after neap on the seven-day count.
    Musi,
}

impl fmt::Display for MulTtae {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MulTtae::Number(n) => write!(f, "{n}"),
            MulTtae::Jogeum => f.write_str("조금"),
            MulTtae::Musi => f.write_str("무시"),
        }
    }
}

use MulTtae::{Jogeum as J, Musi as M, Number as N};

/// Eight-day count, indexed by lunar day - 1.
const TIDE_8: [MulTtae; 30] = [
    N(8), N(9), N(10), N(11), N(12), N(13), N(14), J, N(1), N(2),
    N(3), N(4), N(5), N(6), N(7), N(8), N(9), N(10), N(11), N(12),
    N(13), N(14), J, N(1), N(2), N(3), N(4), N(5), N(6), N(7),
];

/// Seven-day count, indexed by lunar day - 1.
const TIDE_7: [MulTtae; 30] = [
    N(7), N(8), N(9), N(10), N(11), N(12), N(13), J, M, N(1),
    N(2), N(3), N(4), N(5), N(6), N(7), N(8), N(9), N(10), N(11),
    N(12), N(13), J, M, N(1), N(2), N(3), N(4), N(5), N(6),
];

/// Table entry for `lunar_day` (1..=30), or `None` when out of range.
pub fn mul_ttae(lunar_day: u32, formula: TideFormula) -> Option<MulTtae> {
    let table = match formula {
        TideFormula::Seven => &TIDE_7,
        TideFormula::Eight => &TIDE_8,
    };
    let index = usize::try_from(lunar_day).ok()?.checked_sub(1)?;
    table.get(index).copied()
}

/// Phase label for `lunar_day`; [`UNKNOWN_PHASE`] outside 1..=30.
///
/// ```
/// use navis_env_lib::lunar::{phase, TideFormula};
///
/// assert_eq!(phase(8, TideFormula::Eight), "조금");
/// assert_eq!(phase(9, TideFormula::Seven), "무시");
/// assert_eq!(phase(9, TideFormula::Eight), "1");
/// ```
pub fn phase(lunar_day: u32, formula: TideFormula) -> String {
    mul_ttae(lunar_day, formula)
        .map(|m| m.to_string())
        .unwrap_or_else(|| UNKNOWN_PHASE.to_string())
}

/// Mean synodic month in days.
const SYNODIC_MONTH: f64 = 29.530_588_853;

/// Moon age in days since the most recent mean new moon.
///
/// Reckoned from the new moon of 2000-01-06 18:14 UTC, so the error is the
/// difference between mean and true lunation, under a day.
pub fn moon_age_days(at: &DateTime<Utc>) -> f64 {
    let Some(epoch) = Utc.with_ymd_and_hms(2000, 1, 6, 18, 14, 0).single() else {
        return 0.0;
    };
    let days = (*at - epoch).num_seconds() as f64 / 86_400.0;
    days.rem_euclid(SYNODIC_MONTH)
}

/// Estimated lunar calendar day (1..=30) for an instant.
///
/// Day 1 is the day holding the new moon; a moon age that rounds to a full
/// month wraps back to day 1.
pub fn estimate_lunar_day(at: &DateTime<Utc>) -> u32 {
    let age = moon_age_days(at).round() as u32;
    (age % 30) + 1
}
