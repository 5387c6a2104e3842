//! # Geo Points and Nearest-Neighbour Search
//!
//! The four reference collections (buoys, tide stations, fishing spots and
//! coastal grid points) share one lookup: rank candidates by great-circle
//! distance from the user and keep the closest `k`.
//!
//! Collections hold at most a few thousand points, so a linear scan plus a
//! stable sort is all that is needed. Ties keep input order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Earth's mean radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True for finite values inside the latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self::new(lat, lon)
    }
}

/// Great-circle distance in kilometers (haversine, R = 6371 km).
///
/// ```
/// use navis_env_lib::geo::{haversine_km, Coordinate};
///
/// let busan = Coordinate::new(35.1796, 129.0756);
/// let jeju = Coordinate::new(33.4996, 126.5312);
/// let d = haversine_km(&busan, &jeju);
/// assert!((d - 299.0).abs() < 5.0);
/// ```
pub fn haversine_km(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Anything with a position on the map.
pub trait Located {
    fn coordinate(&self) -> Coordinate;
}

impl Located for Coordinate {
    fn coordinate(&self) -> Coordinate {
        *self
    }
}

/// A candidate together with its distance from the query point.
#[derive(Debug, Clone, Copy)]
pub struct Nearest<'a, T> {
    pub point: &'a T,
    pub distance_km: f64,
}

/// The `k` candidates closest to `query`, ascending by distance.
///
/// Equal distances keep their input order. Candidates whose coordinates are
/// not finite are skipped. An empty candidate slice yields an empty result.
pub fn nearest<'a, T: Located>(query: &Coordinate, candidates: &'a [T], k: usize) -> Vec<Nearest<'a, T>> {
    let mut ranked: Vec<Nearest<'a, T>> = candidates
        .iter()
        .filter_map(|point| {
            let distance_km = haversine_km(query, &point.coordinate());
            distance_km.is_finite().then_some(Nearest { point, distance_km })
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| a.distance_km.partial_cmp(&b.distance_km).unwrap_or(Ordering::Equal));
    ranked.truncate(k);
    ranked
}

/// How wide a reference search should reach.
///
/// Adapters try [`SearchTier::Narrow`] first and only fall back to
/// [`SearchTier::Broad`] when the closest points yielded nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTier {
    /// The `n` closest points.
    Narrow(usize),
    /// Every point in the collection, closest first.
    Broad,
}

impl SearchTier {
    /// Narrow(n) then Broad.
    pub fn ladder(n: usize) -> [SearchTier; 2] {
        [SearchTier::Narrow(n), SearchTier::Broad]
    }

    /// Candidates this tier admits out of `total`.
    pub fn limit(&self, total: usize) -> usize {
        match self {
            SearchTier::Narrow(n) => (*n).min(total),
            SearchTier::Broad => total,
        }
    }

    /// Rank `candidates` and keep what this tier admits.
    pub fn select<'a, T: Located>(&self, query: &Coordinate, candidates: &'a [T]) -> Vec<Nearest<'a, T>> {
        nearest(query, candidates, self.limit(candidates.len()))
    }
}

// ---------------------------------------------------------------------------
// Reference point variants
// ---------------------------------------------------------------------------

/// Ocean observation buoy (KHOA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buoy {
    pub station_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Tide prediction station (KHOA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TideStation {
    pub station_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Catalogued fishing spot. `region` is the sea area, e.g. "서해안".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FishingSpot {
    pub spot_id: u32,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub region: Option<String>,
    /// "선상" (boat) or "갯바위" (shore).
    #[serde(default)]
    pub method: Option<String>,
}

/// On-land coastal point with its precomputed KMA grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoastalReference {
    pub point_id: u32,
    pub name: String,
    pub region: String,
    pub lat: f64,
    pub lon: f64,
    pub nx: i32,
    pub ny: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

macro_rules! located_by_lat_lon {
    ($($ty:ty),*) => {
        $(impl Located for $ty {
            fn coordinate(&self) -> Coordinate {
                Coordinate::new(self.lat, self.lon)
            }
        })*
    };
}

located_by_lat_lon!(Buoy, TideStation, FishingSpot, CoastalReference);

/// Any one of the reference point kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoPoint {
    Buoy(Buoy),
    TideStation(TideStation),
    FishingSpot(FishingSpot),
    CoastalReference(CoastalReference),
}

impl GeoPoint {
    /// Stable identifier within the point's own collection.
    pub fn id(&self) -> String {
        match self {
            GeoPoint::Buoy(b) => b.station_id.clone(),
            GeoPoint::TideStation(t) => t.station_id.clone(),
            GeoPoint::FishingSpot(s) => s.spot_id.to_string(),
            GeoPoint::CoastalReference(c) => c.point_id.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GeoPoint::Buoy(b) => &b.name,
            GeoPoint::TideStation(t) => &t.name,
            GeoPoint::FishingSpot(s) => &s.name,
            GeoPoint::CoastalReference(c) => &c.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GeoPoint::Buoy(_) => "buoy",
            GeoPoint::TideStation(_) => "tide_station",
            GeoPoint::FishingSpot(_) => "fishing_spot",
            GeoPoint::CoastalReference(_) => "coastal_point",
        }
    }
}

impl Located for GeoPoint {
    fn coordinate(&self) -> Coordinate {
        match self {
            GeoPoint::Buoy(b) => b.coordinate(),
            GeoPoint::TideStation(t) => t.coordinate(),
            GeoPoint::FishingSpot(s) => s.coordinate(),
            GeoPoint::CoastalReference(c) => c.coordinate(),
        }
    }
}
