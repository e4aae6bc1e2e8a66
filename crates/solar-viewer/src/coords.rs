//! Coordinate conversion utilities and the fixed building anchor.
//!
//! Positions are ECEF (Earth-Centered, Earth-Fixed) meters on the WGS84
//! ellipsoid, the frame the hosted tilesets are georeferenced in.

use glam::DVec3;
use ion_tiles::ellipsoid::{east_north_up, ecef_to_geodetic, geodetic_to_ecef};

/// A fixed geographic point the camera can focus on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoAnchor {
    /// Longitude in degrees.
    pub lon_deg: f64,
    /// Latitude in degrees.
    pub lat_deg: f64,
    /// Height above the ellipsoid for the fly-to destination and look-at target.
    pub height: f64,
    /// Camera offset from the target in the target's east-north-up frame.
    pub look_offset_enu: DVec3,
}

/// The building the datasets describe.
pub const BUILDING_ANCHOR: GeoAnchor = GeoAnchor {
    lon_deg: 6.060_358_1,
    lat_deg: 50.779_734_4,
    height: 600.0,
    look_offset_enu: DVec3::new(-60.0, -120.0, 70.0),
};

impl GeoAnchor {
    /// ECEF position of the anchor at its height.
    #[must_use]
    pub fn position(&self) -> DVec3 {
        geodetic_to_ecef(self.lon_deg, self.lat_deg, self.height)
    }
}

/// Convert an east-north-up offset at `origin` into an ECEF offset.
#[must_use]
pub fn enu_to_ecef_offset(origin: DVec3, offset: DVec3) -> DVec3 {
    east_north_up(origin) * offset
}

/// Ellipsoidal height of an ECEF position.
#[must_use]
pub fn height_above_ellipsoid(position: DVec3) -> f64 {
    ecef_to_geodetic(position).2
}

/// Convert ECEF coordinates to latitude and longitude (degrees).
#[must_use]
pub fn ecef_to_lat_lon(position: DVec3) -> (f64, f64) {
    let (lon, lat, _) = ecef_to_geodetic(position);
    (lat, lon)
}

/// Local up (ellipsoid normal) at an ECEF position.
#[must_use]
pub fn local_up(position: DVec3) -> DVec3 {
    east_north_up(position).z_axis
}

/// Local north at an ECEF position.
#[must_use]
pub fn local_north(position: DVec3) -> DVec3 {
    east_north_up(position).y_axis
}
