//! # KMA Forecast Grid Projection
//!
//! Converts WGS84 coordinates to the (nx, ny) cell of the Korea
//! Meteorological Administration's 5 km forecast grid using the published
//! Lambert Conformal Conic parameters:
//!
//! | parameter | value |
//! |---|---|
//! | Earth radius | 6371.00877 km |
//! | grid spacing | 5.0 km |
//! | standard parallels | 30.0°N, 60.0°N |
//! | reference point | 126.0°E, 38.0°N |
//! | reference cell | (43, 136) |
//!
//! A wrong constant here still yields a plausible cell a few kilometres
//! away, so the known-answer tests below are the only guard.

use crate::geo::Coordinate;
use core::f64::consts::PI;

const EARTH_RADIUS_KM: f64 = 6371.00877;
const GRID_KM: f64 = 5.0;
const STANDARD_PARALLEL_1: f64 = 30.0;
const STANDARD_PARALLEL_2: f64 = 60.0;
const ORIGIN_LON: f64 = 126.0;
const ORIGIN_LAT: f64 = 38.0;
const ORIGIN_X: f64 = 43.0;
const ORIGIN_Y: f64 = 136.0;

/// A KMA grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub nx: i32,
    pub ny: i32,
}

impl std::fmt::Display for GridCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.nx, self.ny)
    }
}

/// Project a coordinate onto the KMA grid.
///
/// ```
/// use navis_env_lib::grid::to_grid;
///
/// let cell = to_grid(37.5665, 126.9780); // Seoul City Hall
/// assert_eq!((cell.nx, cell.ny), (60, 127));
/// ```
pub fn to_grid(lat: f64, lon: f64) -> GridCell {
    let rad = PI / 180.0;
    let re = EARTH_RADIUS_KM / GRID_KM;
    let slat1 = STANDARD_PARALLEL_1 * rad;
    let slat2 = STANDARD_PARALLEL_2 * rad;
    let olon = ORIGIN_LON * rad;
    let olat = ORIGIN_LAT * rad;

    // Cone constant
    let sn = ((PI * 0.25 + slat2 * 0.5).tan() / (PI * 0.25 + slat1 * 0.5).tan()).ln();
    let sn = (slat1.cos() / slat2.cos()).ln() / sn;

    let sf = (PI * 0.25 + slat1 * 0.5).tan().powf(sn) * slat1.cos() / sn;
    let ro = re * sf / (PI * 0.25 + olat * 0.5).tan().powf(sn);

    let ra = re * sf / (PI * 0.25 + lat * rad * 0.5).tan().powf(sn);
    let mut theta = lon * rad - olon;
    if theta > PI {
        theta -= 2.0 * PI;
    }
    if theta < -PI {
        theta += 2.0 * PI;
    }
    theta *= sn;

    let x = ra * theta.sin() + ORIGIN_X;
    let y = ro - ra * theta.cos() + ORIGIN_Y;

    GridCell {
        nx: (x + 0.5).floor() as i32,
        ny: (y + 0.5).floor() as i32,
    }
}

/// [`to_grid`] for a [`Coordinate`].
pub fn project(point: &Coordinate) -> GridCell {
    to_grid(point.latitude, point.longitude)
}
