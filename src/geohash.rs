//! Base-32 geohash codec.
//!
//! Standard bit interleaving, longitude bit first. Each output symbol
//! carries five bits; a key of length `p` names a cell obtained by
//! bisecting the longitude range on even bits and the latitude range on
//! odd bits. Keys sharing a prefix are usually (not always, near cell
//! edges) spatially close.

use crate::geo::{self, BoundingBox, GeoPoint, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};
use serde::Serialize;
use thiserror::Error;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Longest key we will produce. Twelve symbols resolve to a few centimetres.
pub const MAX_PRECISION: usize = 12;

/// Precision used when the caller doesn't name one (metre-scale cells).
pub const DEFAULT_PRECISION: usize = 9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeohashError {
    #[error("invalid geohash character '{ch}' at position {position}")]
    InvalidCharacter { ch: char, position: usize },
    #[error("invalid coordinate: lat {lat}, lon {lon} (lat -90..90, lon -180..180)")]
    InvalidCoordinate { lat: f64, lon: f64 },
    #[error("invalid precision {0} (expected 1..=12)")]
    InvalidPrecision(usize),
}

/// The rectangle covered by a geohash key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Cell {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Cell {
    fn world() -> Self {
        Self { lat_min: MIN_LAT, lat_max: MAX_LAT, lon_min: MIN_LON, lon_max: MAX_LON }
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.lat_min + self.lat_max) / 2.0,
            lon: (self.lon_min + self.lon_max) / 2.0,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.lat_min..=self.lat_max).contains(&point.lat)
            && (self.lon_min..=self.lon_max).contains(&point.lon)
    }

    pub fn to_bbox(&self) -> BoundingBox {
        BoundingBox::new(self.lat_min, self.lon_min, self.lat_max, self.lon_max)
    }
}

/// Encode a coordinate into a geohash of `precision` symbols.
///
/// Fails before doing any work if the coordinate is out of range (NaN
/// included) or the precision is outside `1..=MAX_PRECISION`.
pub fn encode(lat: f64, lon: f64, precision: usize) -> Result<String, GeohashError> {
    if !geo::is_valid(lat, lon) {
        return Err(GeohashError::InvalidCoordinate { lat, lon });
    }
    if precision == 0 || precision > MAX_PRECISION {
        return Err(GeohashError::InvalidPrecision(precision));
    }

    let mut cell = Cell::world();
    let mut out = String::with_capacity(precision);
    let mut even = true;
    let mut bit = 0;
    let mut ch = 0usize;

    while out.len() < precision {
        if even {
            let mid = (cell.lon_min + cell.lon_max) / 2.0;
            if lon >= mid {
                ch |= 1 << (4 - bit);
                cell.lon_min = mid;
            } else {
                cell.lon_max = mid;
            }
        } else {
            let mid = (cell.lat_min + cell.lat_max) / 2.0;
            if lat >= mid {
                ch |= 1 << (4 - bit);
                cell.lat_min = mid;
            } else {
                cell.lat_max = mid;
            }
        }
        even = !even;

        if bit < 4 {
            bit += 1;
        } else {
            out.push(BASE32[ch] as char);
            bit = 0;
            ch = 0;
        }
    }

    Ok(out)
}

/// Encode a `GeoPoint`. Out-of-range points fail like [`encode`].
pub fn encode_point(point: GeoPoint, precision: usize) -> Result<String, GeohashError> {
    encode(point.lat, point.lon, precision)
}

/// Decode a key into the cell it names. The empty key names the whole world.
pub fn decode_bounds(key: &str) -> Result<Cell, GeohashError> {
    let mut cell = Cell::world();
    let mut even = true;

    for (position, ch) in key.chars().enumerate() {
        let bits = symbol_value(ch).ok_or(GeohashError::InvalidCharacter { ch, position })?;
        for shift in (0..5).rev() {
            let set = bits & (1 << shift) != 0;
            if even {
                let mid = (cell.lon_min + cell.lon_max) / 2.0;
                if set {
                    cell.lon_min = mid;
                } else {
                    cell.lon_max = mid;
                }
            } else {
                let mid = (cell.lat_min + cell.lat_max) / 2.0;
                if set {
                    cell.lat_min = mid;
                } else {
                    cell.lat_max = mid;
                }
            }
            even = !even;
        }
    }

    Ok(cell)
}

/// Decode a key to the midpoint of its cell.
pub fn decode(key: &str) -> Result<GeoPoint, GeohashError> {
    decode_bounds(key).map(|cell| cell.center())
}

fn symbol_value(ch: char) -> Option<usize> {
    if !ch.is_ascii() {
        return None;
    }
    BASE32.iter().position(|&b| b == ch as u8)
}

/// Key length to request for a map zoom level.
///
/// Coarse keys at low zoom keep the number of distinct prefixes small while
/// panning; fine keys at high zoom keep each fetch small.
pub fn precision_for_zoom(zoom: u8) -> usize {
    match zoom {
        0..=13 => 4,
        14..=15 => 5,
        16..=17 => 6,
        _ => 7,
    }
}

/// True if one key is a string prefix of the other.
pub fn prefix_related(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_known_vector() {
        assert_eq!(encode(57.64911, 10.40744, 11).unwrap(), "u4pruydqqvj");
        assert_eq!(encode(35.6812, 139.7671, 7).unwrap(), "xn76urx");
    }

    #[test]
    fn test_extremes() {
        assert_eq!(encode(0.0, 0.0, 5).unwrap(), "s0000");
        assert_eq!(encode(-90.0, -180.0, 4).unwrap(), "0000");
        assert_eq!(encode(90.0, 180.0, 4).unwrap(), "zzzz");
    }

    #[test]
    fn test_invalid_coordinate() {
        assert_eq!(
            encode(91.0, 0.0, 5),
            Err(GeohashError::InvalidCoordinate { lat: 91.0, lon: 0.0 })
        );
        assert!(matches!(encode(0.0, 180.5, 5), Err(GeohashError::InvalidCoordinate { .. })));
        assert!(matches!(encode(f64::NAN, 0.0, 5), Err(GeohashError::InvalidCoordinate { .. })));
        assert!(matches!(
            encode_point(GeoPoint { lat: -90.5, lon: 10.0 }, 5),
            Err(GeohashError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_invalid_precision() {
        assert_eq!(encode(0.0, 0.0, 0), Err(GeohashError::InvalidPrecision(0)));
        assert_eq!(encode(0.0, 0.0, 13), Err(GeohashError::InvalidPrecision(13)));
    }

    #[test]
    fn test_decode_bounds() {
        let cell = decode_bounds("xn77").unwrap();
        assert_abs_diff_eq!(cell.lat_min, 35.68359375);
        assert_abs_diff_eq!(cell.lat_max, 35.859375);
        assert_abs_diff_eq!(cell.lon_min, 139.5703125);
        assert_abs_diff_eq!(cell.lon_max, 139.921875);
    }

    #[test]
    fn test_decode_midpoint() {
        let p = decode("xn77").unwrap();
        assert_abs_diff_eq!(p.lat, (35.68359375 + 35.859375) / 2.0);
        assert_abs_diff_eq!(p.lon, (139.5703125 + 139.921875) / 2.0);
    }

    #[test]
    fn test_decode_empty_is_world_center() {
        let p = decode("").unwrap();
        assert_eq!(p, GeoPoint { lat: 0.0, lon: 0.0 });
    }

    #[test]
    fn test_decode_invalid_character() {
        assert_eq!(
            decode("xn7a"),
            Err(GeohashError::InvalidCharacter { ch: 'a', position: 3 })
        );
        assert!(matches!(decode("東京"), Err(GeohashError::InvalidCharacter { ch: '東', position: 0 })));
        // Alphabet is lowercase only.
        assert!(decode("XN77").is_err());
    }

    #[test]
    fn test_round_trip_within_cell() {
        let points = [
            (35.6895, 139.6917),
            (-33.8688, 151.2093),
            (64.1466, -21.9426),
            (-89.9, 179.9),
            (0.0, 0.0),
            (12.3456, -98.7654),
        ];
        for &(lat, lon) in &points {
            for precision in 1..=9 {
                let key = encode(lat, lon, precision).unwrap();
                let cell = decode_bounds(&key).unwrap();
                let p = GeoPoint { lat, lon };
                assert!(cell.contains(p), "{key} does not contain {lat},{lon}");
                assert!(cell.contains(decode(&key).unwrap()));
            }
        }
    }

    #[test]
    fn test_reencode_is_stable() {
        let key = encode(35.0116, 135.7681, 6).unwrap();
        let p = decode(&key).unwrap();
        assert_eq!(encode(p.lat, p.lon, 6).unwrap(), key);
    }

    #[test]
    fn test_prefix_monotonic() {
        let points = [(35.6895, 139.6917), (-45.0, -120.5), (89.0, -179.0)];
        for &(lat, lon) in &points {
            for p in 1..MAX_PRECISION {
                let short = encode(lat, lon, p).unwrap();
                let long = encode(lat, lon, p + 1).unwrap();
                assert!(long.starts_with(&short), "{short} !< {long}");
            }
        }
    }

    #[test]
    fn test_precision_for_zoom() {
        assert_eq!(precision_for_zoom(3), 4);
        assert_eq!(precision_for_zoom(13), 4);
        assert_eq!(precision_for_zoom(14), 5);
        assert_eq!(precision_for_zoom(15), 5);
        assert_eq!(precision_for_zoom(16), 6);
        assert_eq!(precision_for_zoom(17), 6);
        assert_eq!(precision_for_zoom(18), 7);
        assert_eq!(precision_for_zoom(22), 7);
    }

    #[test]
    fn test_prefix_related() {
        assert!(prefix_related("xn77", "xn77u"));
        assert!(prefix_related("xn77u", "xn77"));
        assert!(prefix_related("xn77", "xn77"));
        assert!(!prefix_related("xn77u", "xn77v"));
    }
}
