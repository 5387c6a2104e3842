//! # Plain-Text Reports
//!
//! Terminal summaries of a fused environment record and of schedule queries,
//! used by the command-line front end. Missing values print as "-".

use crate::schedule::{DatedSlot, ScheduleSlot};
use crate::EnvironmentRecord;
use std::fmt::Write;

const MISSING: &str = "-";
const LABEL_WIDTH: usize = 10;

/// Whole numbers without decimals, everything else to one decimal.
fn format_measure(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

fn measure(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{}{unit}", format_measure(v)),
        None => MISSING.to_string(),
    }
}

fn text(value: Option<&str>) -> &str {
    value.unwrap_or(MISSING)
}

fn line(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "  {label:<LABEL_WIDTH$} {value}");
}

/// Multi-line summary of an environment record.
pub fn render_environment(record: &EnvironmentRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({})",
        text(record.location_name.as_deref()),
        text(record.source.as_deref())
    );
    if record.is_unavailable() {
        out.push_str("  ⚠ no provider available\n");
        return out;
    }

    let wind = match (record.wind_speed, record.wind_direction_16.as_deref()) {
        (Some(speed), Some(dir)) => format!("{} {dir}", measure(Some(speed), "m/s")),
        (speed, _) => measure(speed, "m/s"),
    };
    let tide = format!(
        "high {} / low {}",
        text(record.next_high_tide.as_deref()),
        text(record.next_low_tide.as_deref())
    );
    let phase = match (record.moon_phase.as_deref(), record.tide_formula) {
        (Some(phase), Some(formula)) => format!("{phase} ({formula}물때식)"),
        (phase, _) => text(phase).to_string(),
    };
    let index = match (record.fishing_index.as_deref(), record.fishing_score) {
        (Some(index), Some(score)) => format!("{index} ({})", format_measure(score)),
        (index, _) => text(index).to_string(),
    };

    line(&mut out, "target", text(record.target_fish.as_deref()));
    line(&mut out, "water", &measure(record.water_temp, "°C"));
    line(&mut out, "air", &measure(record.air_temp, "°C"));
    line(&mut out, "waves", &measure(record.wave_height, "m"));
    line(&mut out, "wind", &wind);
    line(&mut out, "current", &measure(record.current_speed, "m/s"));
    line(&mut out, "humidity", &measure(record.humidity, "%"));
    line(&mut out, "rain", record.rain_type_text());
    line(&mut out, "index", &index);
    line(&mut out, "tide", &tide);
    line(&mut out, "station", text(record.tide_station_name.as_deref()));
    line(&mut out, "mul-ttae", &phase);
    line(&mut out, "lunar", text(record.lunar_date.as_deref()));
    line(&mut out, "observed", text(record.record_time.as_deref()));
    let contributors: Vec<String> = record.contributors.iter().map(|k| k.to_string()).collect();
    line(&mut out, "providers", &contributors.join(", "));
    out
}

fn slot_line(slot: &ScheduleSlot, day_of_week: Option<&str>) -> String {
    let start = slot.start_time.map(|t| t.format("%H:%M").to_string());
    let day = day_of_week.map(|d| format!("({d}) ")).unwrap_or_default();
    let price = slot.price.map(|p| format!("{p}원"));
    format!(
        "{} {day}{:<5} {:<4} {:>2}/{:<2} {:<8} {}",
        slot.date.format("%Y-%m-%d"),
        text(start.as_deref()),
        text(slot.status_code.as_deref()),
        slot.remaining,
        slot.capacity,
        text(price.as_deref()),
        text(slot.fish_type.as_deref()),
    )
}

/// One line for the nearest-slot query.
pub fn render_nearest(slot: Option<&ScheduleSlot>) -> String {
    match slot {
        Some(slot) => slot_line(slot, None),
        None => "no available sailing in window".to_string(),
    }
}

/// One line per slot of a schedule window.
pub fn render_schedule(slots: &[DatedSlot]) -> String {
    if slots.is_empty() {
        return "no sailings in window\n".to_string();
    }
    let mut out = String::new();
    for dated in slots {
        let _ = writeln!(out, "{}", slot_line(&dated.slot, Some(dated.day_of_week)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProviderKind, TideFormula};
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn measures_drop_trailing_zero() {
        assert_eq!(format_measure(14.0), "14");
        assert_eq!(format_measure(13.45), "13.4");
        assert_eq!(measure(None, "m"), "-");
    }

    #[test]
    fn environment_summary() {
        let record = EnvironmentRecord {
            source: Some("해양관측부이 API".into()),
            location_name: Some("해운대해수욕장".into()),
            target_fish: Some("쭈갑".into()),
            water_temp: Some(14.0),
            wind_speed: Some(5.0),
            wind_direction_16: Some("E".into()),
            moon_phase: Some("무시".into()),
            tide_formula: Some(TideFormula::Seven),
            contributors: vec![ProviderKind::Buoy, ProviderKind::Nowcast],
            ..EnvironmentRecord::default()
        };
        let text = render_environment(&record);
        assert!(text.starts_with("해운대해수욕장 (해양관측부이 API)\n"));
        assert!(text.contains("water      14°C"));
        assert!(text.contains("wind       5m/s E"));
        assert!(text.contains("무시 (7물때식)"));
        assert!(text.contains("buoy, nowcast"));
        assert!(text.contains("waves      -"));
    }

    #[test]
    fn unavailable_record_is_flagged() {
        let text = render_environment(&EnvironmentRecord::for_target("쭈갑"));
        assert!(text.contains("no provider available"));
    }

    #[test]
    fn schedule_lines() {
        let slot = ScheduleSlot {
            start_time: NaiveTime::from_hms_opt(5, 30, 0),
            status_code: Some("ING".into()),
            remaining: 3,
            capacity: 20,
            price: Some(90000),
            ..ScheduleSlot::new(NaiveDate::from_ymd_opt(2025, 4, 14).unwrap())
        };
        let rendered = render_schedule(&[DatedSlot::from(slot.clone())]);
        assert!(rendered.starts_with("2025-04-14 (월) 05:30 ING   3/20 90000원"));
        assert!(render_nearest(Some(&slot)).starts_with("2025-04-14 05:30"));
        assert_eq!(render_nearest(None), "no available sailing in window");
        assert_eq!(render_schedule(&[]), "no sailings in window\n");
    }
}
