//! Geohash math for the geographic index: base32 encoding, cell bounds,
//! neighbor expansion, and great-circle distance.
//!
//! A location query picks the coarsest precision whose cell still covers the
//! search radius, takes the center cell plus its 8 neighbors, and prefix-scans
//! the geo index with those cells. Candidates are then filtered by exact
//! haversine distance.

use plaza_types::Location;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub const MAX_PRECISION: usize = 12;

/// Minimum cell dimension in meters per geohash precision, at the equator.
/// (Cells shrink toward the poles, which only makes the cover more generous.)
const CELL_MIN_DIM_M: [f64; MAX_PRECISION] = [
    4_992_600.0,
    624_100.0,
    156_000.0,
    19_500.0,
    4_890.0,
    610.0,
    153.0,
    19.1,
    4.77,
    0.596,
    0.149,
    0.0186,
];

pub fn encode(loc: Location, precision: usize) -> String {
    let precision = precision.clamp(1, MAX_PRECISION);
    let (mut min_lat, mut max_lat) = (-90.0_f64, 90.0_f64);
    let (mut min_lon, mut max_lon) = (-180.0_f64, 180.0_f64);

    let mut hash = String::with_capacity(precision);
    let mut ch = 0usize;
    let mut bits = 0u8;
    let mut even = true;

    while hash.len() < precision {
        if even {
            let mid = (min_lon + max_lon) / 2.0;
            if loc.longitude >= mid {
                ch = (ch << 1) | 1;
                min_lon = mid;
            } else {
                ch <<= 1;
                max_lon = mid;
            }
        } else {
            let mid = (min_lat + max_lat) / 2.0;
            if loc.latitude >= mid {
                ch = (ch << 1) | 1;
                min_lat = mid;
            } else {
                ch <<= 1;
                max_lat = mid;
            }
        }
        even = !even;
        bits += 1;
        if bits == 5 {
            hash.push(BASE32[ch] as char);
            ch = 0;
            bits = 0;
        }
    }

    hash
}

#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Bounds {
    pub fn center(&self) -> Location {
        Location {
            longitude: (self.min_lon + self.max_lon) / 2.0,
            latitude: (self.min_lat + self.max_lat) / 2.0,
        }
    }

    fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

/// Cell bounds of a geohash. Characters outside the base32 alphabet are
/// skipped; hashes here only ever come from [`encode`].
pub fn bounds(hash: &str) -> Bounds {
    let mut b = Bounds {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };
    let mut even = true;

    for idx in hash
        .bytes()
        .filter_map(|c| BASE32.iter().position(|&b32| b32 == c))
    {
        for shift in (0..5).rev() {
            let bit = (idx >> shift) & 1 == 1;
            if even {
                let mid = (b.min_lon + b.max_lon) / 2.0;
                if bit {
                    b.min_lon = mid;
                } else {
                    b.max_lon = mid;
                }
            } else {
                let mid = (b.min_lat + b.max_lat) / 2.0;
                if bit {
                    b.min_lat = mid;
                } else {
                    b.max_lat = mid;
                }
            }
            even = !even;
        }
    }

    b
}

/// The up-to-8 cells surrounding `hash` at the same precision. Cells pushed
/// past a pole are dropped; longitudes wrap.
pub fn neighbors(hash: &str) -> Vec<String> {
    let b = bounds(hash);
    let center = b.center();
    let mut out = Vec::with_capacity(8);

    for dlat in [-1.0, 0.0, 1.0] {
        for dlon in [-1.0, 0.0, 1.0] {
            if dlat == 0.0 && dlon == 0.0 {
                continue;
            }
            let lat = center.latitude + dlat * b.height();
            if !(-90.0..=90.0).contains(&lat) {
                continue;
            }
            let lon = (center.longitude + dlon * b.width() + 180.0).rem_euclid(360.0) - 180.0;
            let neighbor = encode(
                Location {
                    longitude: lon,
                    latitude: lat,
                },
                hash.len(),
            );
            if neighbor != hash && !out.contains(&neighbor) {
                out.push(neighbor);
            }
        }
    }

    out
}

/// Coarsest precision whose cell dimension still covers `radius_m`, so a
/// 3x3 block of cells around any point covers the whole search circle.
pub fn precision_for(radius_m: f64) -> usize {
    let mut precision = 1;
    for (i, dim) in CELL_MIN_DIM_M.iter().enumerate() {
        if *dim >= radius_m {
            precision = i + 1;
        } else {
            break;
        }
    }
    precision
}

/// Candidate index prefixes for a radius query: the center cell plus its
/// neighbors at the chosen precision, capped at the index bucket precision.
pub fn cover(center: Location, radius_m: f64, max_precision: usize) -> Vec<String> {
    let precision = precision_for(radius_m).min(max_precision).max(1);
    let cell = encode(center, precision);
    let mut cells = vec![cell.clone()];
    cells.extend(neighbors(&cell));
    cells
}

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_m(a: Location, b: Location) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
