//! Async client for hosted 3D Tiles assets.
//!
//! Resolves numeric asset identifiers into tileset resources through the
//! hosting service's REST API and fetches their root tileset documents,
//! along with caching abstractions and geodetic helpers for placing the
//! result on the globe.
//!
//! # Design principles
//!
//! - **Web-compatible**: Works on desktop and WASM via reqwest
//! - **Runtime-agnostic**: Returns `impl Future`, works with any executor
//! - **Credential-free caching**: Cache keys never contain access tokens
//!
//! # Example
//!
//! ```ignore
//! use ion_tiles::{AssetId, Client};
//!
//! let client = Client::new(access_token);
//! let loaded = client.load(AssetId(2_442_486)).await?;
//! let (center, radius) = loaded.tileset.bounding_sphere();
//! ```

pub mod cache;
mod client;
pub mod ellipsoid;
mod error;
pub mod types;

pub use cache::{Cache, MemoryCache, NoCache};
pub use client::{Client, DEFAULT_API_URL, GOOGLE_PHOTOREALISTIC_ASSET};
pub use error::{Error, Result};
pub use types::{
    AssetId, AssetResource, Attribution, BoundingVolume, Endpoint, LoadedTileset, Refine, Tile,
    Tileset,
};
