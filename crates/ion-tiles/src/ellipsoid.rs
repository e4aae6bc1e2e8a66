//! WGS84 ellipsoid conversions.
//!
//! Hosted tilesets are georeferenced in ECEF (Earth-Centered, Earth-Fixed)
//! meters, so geographic positions and regions need the same ellipsoid the
//! tiles were produced with.

use glam::{DMat3, DVec3};

/// WGS84 semi-major axis in meters.
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 semi-minor axis in meters.
pub const WGS84_B: f64 = 6_356_752.314_245_179;

const E2: f64 = 1.0 - (WGS84_B * WGS84_B) / (WGS84_A * WGS84_A);

/// Convert geodetic longitude, latitude (radians) and ellipsoidal height (meters) to ECEF.
#[must_use]
pub fn geodetic_radians_to_ecef(lon: f64, lat: f64, height: f64) -> DVec3 {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    // Prime vertical radius of curvature.
    let n = WGS84_A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    DVec3::new(
        (n + height) * cos_lat * cos_lon,
        (n + height) * cos_lat * sin_lon,
        (n * (1.0 - E2) + height) * sin_lat,
    )
}

/// Convert geodetic longitude, latitude (degrees) and ellipsoidal height (meters) to ECEF.
#[must_use]
pub fn geodetic_to_ecef(lon_deg: f64, lat_deg: f64, height: f64) -> DVec3 {
    geodetic_radians_to_ecef(lon_deg.to_radians(), lat_deg.to_radians(), height)
}

/// Convert ECEF to geodetic `(lon_deg, lat_deg, height)`.
///
/// Uses Bowring's single iteration, accurate to millimeters near the surface.
#[must_use]
pub fn ecef_to_geodetic(position: DVec3) -> (f64, f64, f64) {
    let p = position.x.hypot(position.y);
    if p < 1e-9 {
        let lat = if position.z >= 0.0 { 90.0 } else { -90.0 };
        return (0.0, lat, position.z.abs() - WGS84_B);
    }

    let ep2 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
    let theta = (position.z * WGS84_A).atan2(p * WGS84_B);
    let (sin_t, cos_t) = theta.sin_cos();
    let lat = (position.z + ep2 * WGS84_B * sin_t.powi(3)).atan2(p - E2 * WGS84_A * cos_t.powi(3));
    let lon = position.y.atan2(position.x);

    let sin_lat = lat.sin();
    let n = WGS84_A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let height = p / lat.cos() - n;

    (lon.to_degrees(), lat.to_degrees(), height)
}

/// Local east-north-up basis at an ECEF position, as matrix columns.
#[must_use]
pub fn east_north_up(position: DVec3) -> DMat3 {
    let (lon_deg, lat_deg, _) = ecef_to_geodetic(position);
    let (sin_lat, cos_lat) = lat_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = lon_deg.to_radians().sin_cos();

    let east = DVec3::new(-sin_lon, cos_lon, 0.0);
    let north = DVec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
    let up = DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);
    DMat3::from_cols(east, north, up)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equator_prime_meridian() {
        let p = geodetic_to_ecef(0.0, 0.0, 0.0);
        assert!((p.x - WGS84_A).abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
        assert!(p.z.abs() < 1e-6);
    }

    #[test]
    fn test_north_pole() {
        let p = geodetic_to_ecef(0.0, 90.0, 0.0);
        assert!((p.z - WGS84_B).abs() < 1e-3);
    }

    #[test]
    fn test_geodetic_roundtrip_near_aachen() {
        let p = geodetic_to_ecef(6.060_358_1, 50.779_734_4, 600.0);
        let (lon, lat, h) = ecef_to_geodetic(p);
        assert!((lon - 6.060_358_1).abs() < 1e-7);
        assert!((lat - 50.779_734_4).abs() < 1e-7);
        assert!((h - 600.0).abs() < 1e-2);
    }

    #[test]
    fn test_enu_up_points_away_from_center() {
        let p = geodetic_to_ecef(6.06, 50.78, 0.0);
        let enu = east_north_up(p);
        let up = enu.z_axis;
        assert!(up.dot(p.normalize()) > 0.99);
        assert!(enu.x_axis.dot(enu.y_axis).abs() < 1e-12);
        // North points towards the pole.
        assert!(enu.y_axis.z > 0.0);
    }
}
