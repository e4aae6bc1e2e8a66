//! High-level types for hosted assets and 3D Tiles tileset documents.

use std::fmt;

use glam::{DMat4, DVec3};
use serde::Deserialize;

use crate::ellipsoid::geodetic_radians_to_ecef;

/// Numeric identifier of a hosted asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A credit line that must be displayed while the asset is visible.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attribution {
    /// HTML snippet as provided by the service.
    pub html: String,
    /// Whether the credit may be collapsed into a "data attribution" list.
    #[serde(default)]
    pub collapsible: bool,
}

impl Attribution {
    /// The credit with markup stripped, for plain-text display.
    #[must_use]
    pub fn plain_text(&self) -> String {
        let mut text = String::with_capacity(self.html.len());
        let mut in_tag = false;
        for c in self.html.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => text.push(c),
                _ => {}
            }
        }
        text.replace("&amp;", "&")
            .replace("&copy;", "©")
            .trim()
            .to_string()
    }
}

/// Options for assets hosted by a third party.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalOptions {
    /// URL of the external root tileset.
    pub url: String,
}

/// Response of the asset endpoint request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Asset type, `3DTILES` for tilesets.
    #[serde(rename = "type")]
    pub asset_type: String,
    /// Resource URL for assets hosted by the service itself.
    #[serde(default)]
    pub url: Option<String>,
    /// Short-lived token for fetching the resource.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Set when the asset is a proxy for a third-party service.
    #[serde(default)]
    pub external_type: Option<String>,
    /// Connection options for third-party assets.
    #[serde(default)]
    pub options: Option<ExternalOptions>,
    /// Credits to display.
    #[serde(default)]
    pub attributions: Vec<Attribution>,
}

impl Endpoint {
    /// Whether the endpoint describes a 3D Tiles tileset.
    #[must_use]
    pub fn is_tileset(&self) -> bool {
        let asset_type = self.external_type.as_deref().unwrap_or(&self.asset_type);
        asset_type == "3DTILES"
    }
}

/// A resolved, fetchable tileset source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResource {
    /// The hosted asset this resource was resolved from, if any.
    pub asset_id: Option<AssetId>,
    /// URL of the root tileset document.
    pub url: String,
    /// Bearer token to attach to requests, if the host requires one.
    pub access_token: Option<String>,
    /// Credits to display while the tileset is visible.
    pub attributions: Vec<Attribution>,
}

impl AssetResource {
    /// Build a resource from an endpoint response.
    ///
    /// Third-party assets are fetched from their own URL without the bearer
    /// token; hosted assets use the endpoint's short-lived token.
    pub fn from_endpoint(asset_id: AssetId, endpoint: Endpoint) -> Option<Self> {
        if endpoint.external_type.is_some() {
            let options = endpoint.options?;
            return Some(Self {
                asset_id: Some(asset_id),
                url: options.url,
                access_token: None,
                attributions: endpoint.attributions,
            });
        }

        Some(Self {
            asset_id: Some(asset_id),
            url: endpoint.url?,
            access_token: endpoint.access_token,
            attributions: endpoint.attributions,
        })
    }

    /// A resource pointing directly at an unauthenticated tileset URL.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            asset_id: None,
            url: url.into(),
            access_token: None,
            attributions: Vec::new(),
        }
    }
}

/// A fetched root tileset together with the resource it came from.
#[derive(Debug, Clone)]
pub struct LoadedTileset {
    /// The resource the tileset was fetched from.
    pub resource: AssetResource,
    /// The parsed root tileset document.
    pub tileset: Tileset,
}

/// The root document of a 3D Tiles tileset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tileset {
    /// Version metadata.
    pub asset: TilesetAsset,
    /// Error, in meters, introduced if the tileset is not rendered.
    #[serde(default)]
    pub geometric_error: f64,
    /// The root tile.
    pub root: Tile,
}

impl Tileset {
    /// Total number of tiles described inline in this document.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.root.count()
    }

    /// ECEF bounding sphere `(center, radius)` of the root tile.
    #[must_use]
    pub fn bounding_sphere(&self) -> (DVec3, f64) {
        self.root.bounding_sphere()
    }
}

/// Version metadata of a tileset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TilesetAsset {
    /// 3D Tiles format version.
    pub version: String,
    /// Application-specific tileset version.
    #[serde(default)]
    pub tileset_version: Option<String>,
}

/// Refinement strategy for a tile's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Refine {
    /// Children are rendered in addition to the parent.
    Add,
    /// Children replace the parent.
    Replace,
}

/// Content referenced by a tile.
#[derive(Debug, Clone, Deserialize)]
pub struct TileContent {
    /// Relative or absolute URI of the content; older tilesets name it `url`.
    #[serde(alias = "url")]
    pub uri: String,
}

/// A tile in the tileset hierarchy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    /// Volume enclosing the tile and its descendants.
    pub bounding_volume: BoundingVolume,
    /// Error, in meters, introduced if this tile is rendered and its children are not.
    #[serde(default)]
    pub geometric_error: f64,
    /// Refinement strategy, inherited from the parent when absent.
    #[serde(default)]
    pub refine: Option<Refine>,
    /// Column-major local-to-parent transform.
    #[serde(default)]
    pub transform: Option<[f64; 16]>,
    /// Renderable content.
    #[serde(default)]
    pub content: Option<TileContent>,
    /// Child tiles.
    #[serde(default)]
    pub children: Vec<Tile>,
}

impl Tile {
    fn count(&self) -> usize {
        1 + self.children.iter().map(Tile::count).sum::<usize>()
    }

    /// ECEF bounding sphere `(center, radius)` of this tile.
    #[must_use]
    pub fn bounding_sphere(&self) -> (DVec3, f64) {
        let (center, radius) = self.bounding_volume.local_sphere();

        // Regions are always expressed in ECEF and ignore the tile transform.
        if matches!(self.bounding_volume, BoundingVolume::Region { .. }) {
            return (center, radius);
        }

        match self.transform {
            Some(cols) => {
                let transform = DMat4::from_cols_array(&cols);
                let scale = transform
                    .x_axis
                    .truncate()
                    .length()
                    .max(transform.y_axis.truncate().length())
                    .max(transform.z_axis.truncate().length());
                (transform.transform_point3(center), radius * scale)
            }
            None => (center, radius),
        }
    }
}

/// Raw bounding volume as it appears in JSON.
#[doc(hidden)]
#[derive(Debug, Clone, Deserialize)]
pub struct RawBoundingVolume {
    #[serde(rename = "box", default)]
    oriented_box: Option<[f64; 12]>,
    #[serde(default)]
    region: Option<[f64; 6]>,
    #[serde(default)]
    sphere: Option<[f64; 4]>,
}

/// A tile bounding volume.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawBoundingVolume")]
pub enum BoundingVolume {
    /// An oriented box in the tile's local frame.
    Box {
        /// Box center.
        center: DVec3,
        /// Half-length vectors along the box axes.
        half_axes: [DVec3; 3],
    },
    /// A geographic region, angles in radians and heights in meters.
    Region {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        min_height: f64,
        max_height: f64,
    },
    /// A sphere in the tile's local frame.
    Sphere {
        /// Sphere center.
        center: DVec3,
        /// Sphere radius.
        radius: f64,
    },
}

impl TryFrom<RawBoundingVolume> for BoundingVolume {
    type Error = String;

    fn try_from(raw: RawBoundingVolume) -> Result<Self, Self::Error> {
        if let Some(b) = raw.oriented_box {
            return Ok(BoundingVolume::Box {
                center: DVec3::new(b[0], b[1], b[2]),
                half_axes: [
                    DVec3::new(b[3], b[4], b[5]),
                    DVec3::new(b[6], b[7], b[8]),
                    DVec3::new(b[9], b[10], b[11]),
                ],
            });
        }
        if let Some(r) = raw.region {
            return Ok(BoundingVolume::Region {
                west: r[0],
                south: r[1],
                east: r[2],
                north: r[3],
                min_height: r[4],
                max_height: r[5],
            });
        }
        if let Some(s) = raw.sphere {
            return Ok(BoundingVolume::Sphere {
                center: DVec3::new(s[0], s[1], s[2]),
                radius: s[3],
            });
        }
        Err("bounding volume has none of box, region or sphere".to_string())
    }
}

impl BoundingVolume {
    /// Bounding sphere before any tile transform is applied.
    fn local_sphere(&self) -> (DVec3, f64) {
        match *self {
            BoundingVolume::Box { center, half_axes } => {
                let radius = half_axes
                    .iter()
                    .map(|axis| axis.length_squared())
                    .sum::<f64>()
                    .sqrt();
                (center, radius)
            }
            BoundingVolume::Sphere { center, radius } => (center, radius),
            BoundingVolume::Region {
                west,
                south,
                east,
                north,
                min_height,
                max_height,
            } => {
                // Regions may cross the antimeridian, in which case east < west.
                let east = if east < west {
                    east + std::f64::consts::TAU
                } else {
                    east
                };
                let mid_lon = 0.5 * (west + east);
                let mid_lat = 0.5 * (south + north);
                let mid_height = 0.5 * (min_height + max_height);
                let center = geodetic_radians_to_ecef(mid_lon, mid_lat, mid_height);

                let mut radius: f64 = 0.0;
                for lon in [west, mid_lon, east] {
                    for lat in [south, mid_lat, north] {
                        for height in [min_height, max_height] {
                            let corner = geodetic_radians_to_ecef(lon, lat, height);
                            radius = radius.max(corner.distance(center));
                        }
                    }
                }
                (center, radius)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ION_ENDPOINT: &str = r#"{
        "type": "3DTILES",
        "url": "https://assets.example.com/2437470/tileset.json?v=2",
        "accessToken": "short-lived",
        "attributions": [
            {"html": "<span>&copy; Example Data</span>", "collapsible": true}
        ]
    }"#;

    const EXTERNAL_ENDPOINT: &str = r#"{
        "type": "3DTILES",
        "externalType": "3DTILES",
        "options": {"url": "https://tile.googleapis.com/v1/3dtiles/root.json?key=abc"},
        "attributions": []
    }"#;

    #[test]
    fn test_hosted_endpoint_resource() {
        let endpoint: Endpoint = serde_json::from_str(ION_ENDPOINT).unwrap();
        assert!(endpoint.is_tileset());

        let resource = AssetResource::from_endpoint(AssetId(2_437_470), endpoint).unwrap();
        assert_eq!(resource.asset_id, Some(AssetId(2_437_470)));
        assert_eq!(resource.access_token.as_deref(), Some("short-lived"));
        assert!(resource.url.ends_with("tileset.json?v=2"));
        assert_eq!(resource.attributions[0].plain_text(), "© Example Data");
    }

    #[test]
    fn test_external_endpoint_drops_bearer() {
        let endpoint: Endpoint = serde_json::from_str(EXTERNAL_ENDPOINT).unwrap();
        let resource = AssetResource::from_endpoint(AssetId(2_275_207), endpoint).unwrap();
        assert!(resource.access_token.is_none());
        assert!(resource.url.starts_with("https://tile.googleapis.com/"));
    }

    #[test]
    fn test_imagery_endpoint_is_not_tileset() {
        let endpoint: Endpoint =
            serde_json::from_str(r#"{"type": "IMAGERY", "url": "https://x"}"#).unwrap();
        assert!(!endpoint.is_tileset());
    }

    #[test]
    fn test_parse_tileset_with_box_and_transform() {
        let json = r#"{
            "asset": {"version": "1.0"},
            "geometricError": 500,
            "root": {
                "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 4000000,500000,4900000,1],
                "boundingVolume": {"box": [0,0,10, 30,0,0, 0,40,0, 0,0,10]},
                "geometricError": 100,
                "refine": "ADD",
                "content": {"uri": "root.b3dm"},
                "children": [
                    {"boundingVolume": {"sphere": [0,0,0,5]}, "geometricError": 0, "content": {"url": "a.b3dm"}},
                    {"boundingVolume": {"sphere": [0,0,0,5]}, "geometricError": 0}
                ]
            }
        }"#;
        let tileset: Tileset = serde_json::from_str(json).unwrap();
        assert_eq!(tileset.tile_count(), 3);
        assert_eq!(tileset.root.refine, Some(Refine::Add));
        assert_eq!(tileset.root.children[0].content.as_ref().unwrap().uri, "a.b3dm");

        let (center, radius) = tileset.bounding_sphere();
        assert!((center - DVec3::new(4_000_000.0, 500_000.0, 4_900_010.0)).length() < 1e-6);
        assert!((radius - (30.0_f64.powi(2) + 40.0_f64.powi(2) + 10.0_f64.powi(2)).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_parse_region_volume() {
        let json = r#"{
            "asset": {"version": "1.1"},
            "root": {
                "boundingVolume": {"region": [0.1057, 0.8862, 0.1058, 0.8863, 150, 220]},
                "geometricError": 10
            }
        }"#;
        let tileset: Tileset = serde_json::from_str(json).unwrap();
        let (center, radius) = tileset.bounding_sphere();
        assert!(center.length() > 6_300_000.0);
        assert!(radius > 35.0 && radius < 2_000.0);
    }

    #[test]
    fn test_missing_bounding_volume_kind_is_rejected() {
        let json = r#"{"asset": {"version": "1.0"}, "root": {"boundingVolume": {}}}"#;
        assert!(serde_json::from_str::<Tileset>(json).is_err());
    }
}
