//! HTTP client for resolving hosted assets and fetching tileset documents.
//!
//! This module provides the main `Client` type. A tileset is loaded in two
//! steps: the asset endpoint is requested with the long-lived access token,
//! which yields a resource URL and a short-lived token; the root tileset
//! document is then fetched from that resource.

use std::sync::Arc;

use crate::cache::{Cache, NoCache, cache_key};
use crate::error::{Error, Result};
use crate::types::{AssetId, AssetResource, Attribution, Endpoint, LoadedTileset, Tileset};

/// Base URL of the asset hosting REST API.
pub const DEFAULT_API_URL: &str = "https://api.cesium.com/";

/// Hosted proxy asset for Google's photorealistic 3D tiles.
pub const GOOGLE_PHOTOREALISTIC_ASSET: AssetId = AssetId(2_275_207);

/// Root tileset of Google's photorealistic 3D tiles API.
const GOOGLE_TILES_ROOT: &str = "https://tile.googleapis.com/v1/3dtiles/root.json";

/// HTTP client for hosted 3D Tiles assets.
///
/// The client handles endpoint resolution, bearer authentication, caching and
/// JSON decoding. It is runtime-agnostic and works with any async executor.
///
/// # Example
///
/// ```ignore
/// let client = Client::new("my-access-token");
/// let loaded = client.load(AssetId(2_442_486)).await?;
/// println!("{} tiles", loaded.tileset.tile_count());
/// ```
pub struct Client<C: Cache = NoCache> {
    http: reqwest::Client,
    cache: Arc<C>,
    api_url: String,
    access_token: String,
}

impl Client<NoCache> {
    /// Create a new client with default settings and no caching.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_cache(access_token, NoCache)
    }
}

impl<C: Cache> Client<C> {
    /// Create a new client with a custom cache.
    #[must_use]
    pub fn with_cache(access_token: impl Into<String>, cache: C) -> Self {
        Self {
            http: reqwest::Client::new(),
            cache: Arc::new(cache),
            api_url: DEFAULT_API_URL.to_string(),
            access_token: access_token.into(),
        }
    }

    /// Use a different API server, e.g. a self-hosted one.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        let mut api_url = api_url.into();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }
        self.api_url = api_url;
        self
    }

    /// The cache backing this client.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Request the endpoint description of an asset.
    ///
    /// Endpoint responses carry short-lived tokens and are never cached.
    pub async fn fetch_endpoint(&self, asset_id: AssetId) -> Result<Endpoint> {
        let url = endpoint_url(&self.api_url, asset_id);
        tracing::debug!(%asset_id, "resolving asset endpoint");

        let data = self.request(&url, Some(&self.access_token)).await?;
        serde_json::from_slice(&data).map_err(|e| Error::Json {
            context: "asset endpoint",
            message: e.to_string(),
        })
    }

    /// Resolve an asset into a fetchable tileset resource.
    pub async fn resolve(&self, asset_id: AssetId) -> Result<AssetResource> {
        let endpoint = self.fetch_endpoint(asset_id).await?;

        if !endpoint.is_tileset() {
            return Err(Error::UnsupportedAsset {
                asset_id: asset_id.0,
                asset_type: endpoint.asset_type,
            });
        }

        AssetResource::from_endpoint(asset_id, endpoint).ok_or_else(|| Error::InvalidData {
            context: "asset endpoint",
            detail: format!("asset {asset_id} endpoint has no resource url"),
        })
    }

    /// Fetch and parse the root tileset document of a resource.
    pub async fn fetch_tileset(&self, resource: &AssetResource) -> Result<Tileset> {
        let data = self
            .fetch_bytes(&resource.url, resource.access_token.as_deref())
            .await?;

        serde_json::from_slice(&data).map_err(|e| Error::Json {
            context: "tileset",
            message: e.to_string(),
        })
    }

    /// Resolve an asset and fetch its root tileset.
    ///
    /// If the short-lived resource token has expired between resolution and
    /// fetch, the endpoint is resolved once more before giving up.
    pub async fn load(&self, asset_id: AssetId) -> Result<LoadedTileset> {
        with_token_refresh(
            move || self.resolve(asset_id),
            move |resource: AssetResource| async move {
                let tileset = self.fetch_tileset(&resource).await?;
                Ok(LoadedTileset { resource, tileset })
            },
        )
        .await
    }

    /// Load Google's photorealistic 3D tiles.
    ///
    /// With an API key the tiles are fetched from Google directly; otherwise
    /// the hosted proxy asset is used.
    pub async fn load_google_photorealistic(&self, api_key: Option<&str>) -> Result<LoadedTileset> {
        let Some(api_key) = api_key else {
            return self.load(GOOGLE_PHOTOREALISTIC_ASSET).await;
        };

        let mut resource = AssetResource::from_url(format!(
            "{GOOGLE_TILES_ROOT}?key={}",
            urlencoding::encode(api_key)
        ));
        resource.attributions.push(Attribution {
            html: "Google".to_string(),
            collapsible: false,
        });

        let tileset = self.fetch_tileset(&resource).await?;
        Ok(LoadedTileset { resource, tileset })
    }

    /// Fetch bytes, using the cache if available.
    async fn fetch_bytes(&self, url: &str, bearer: Option<&str>) -> Result<Vec<u8>> {
        let key = cache_key(url);

        if let Some(data) = self.cache.get(&key)? {
            tracing::debug!(url = %key, "cache hit");
            return Ok(data);
        }

        let data = self.request(url, bearer).await?;
        self.cache.put(&key, data.clone())?;
        Ok(data)
    }

    /// Perform a GET request, attaching the bearer token if given.
    async fn request(&self, url: &str, bearer: Option<&str>) -> Result<Vec<u8>> {
        tracing::debug!(url = %cache_key(url), "fetching");

        let mut request = self.http.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| Error::Http {
            url: cache_key(url),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: cache_key(url),
                status: status.as_u16(),
            });
        }

        let data = response.bytes().await.map_err(|e| Error::Http {
            url: cache_key(url),
            message: e.to_string(),
        })?;
        Ok(data.to_vec())
    }
}

/// Resolve, then fetch; on 401 resolve once more and fetch again.
///
/// Any other error, or a second 401, is returned as is.
async fn with_token_refresh<R, T, RF, FF>(
    mut resolve: impl FnMut() -> RF,
    mut fetch: impl FnMut(R) -> FF,
) -> Result<T>
where
    RF: Future<Output = Result<R>>,
    FF: Future<Output = Result<T>>,
{
    let resource = resolve().await?;
    match fetch(resource).await {
        Err(e) if e.is_unauthorized() => {
            tracing::debug!("resource token rejected, refreshing endpoint");
            let resource = resolve().await?;
            fetch(resource).await
        }
        result => result,
    }
}

/// URL of the endpoint description for an asset.
fn endpoint_url(api_url: &str, asset_id: AssetId) -> String {
    format!("{api_url}v1/assets/{asset_id}/endpoint")
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url(DEFAULT_API_URL, AssetId(2_442_486)),
            "https://api.cesium.com/v1/assets/2442486/endpoint"
        );
    }

    #[test]
    fn test_api_url_gets_trailing_slash() {
        let client = Client::new("token").with_api_url("http://localhost:8080");
        assert_eq!(client.api_url, "http://localhost:8080/");
        assert_eq!(
            endpoint_url(&client.api_url, AssetId(1)),
            "http://localhost:8080/v1/assets/1/endpoint"
        );
    }

    #[test]
    fn test_client_default() {
        let client = Client::new("token");
        assert!(client.api_url.starts_with("https://"));
        assert_eq!(client.access_token, "token");
    }

    fn status(status: u16) -> Error {
        Error::HttpStatus {
            url: "https://assets.example.com/tileset.json".to_string(),
            status,
        }
    }

    /// Runs the refresh logic against a scripted sequence of fetch outcomes.
    /// Returns the result and how many times the endpoint was resolved.
    async fn run_refresh(outcomes: Vec<Result<&'static str>>) -> (Result<&'static str>, usize) {
        let resolves = Cell::new(0);
        let outcomes = RefCell::new(outcomes.into_iter());
        let result = with_token_refresh(
            || {
                resolves.set(resolves.get() + 1);
                async { Ok(()) }
            },
            |()| {
                let next = outcomes.borrow_mut().next().expect("unexpected fetch");
                async move { next }
            },
        )
        .await;
        (result, resolves.get())
    }

    #[tokio::test]
    async fn test_unauthorized_fetch_is_retried_after_refresh() {
        let (result, resolves) = run_refresh(vec![Err(status(401)), Ok("tileset")]).await;
        assert_eq!(result.unwrap(), "tileset");
        assert_eq!(resolves, 2);
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_returned() {
        let (result, resolves) = run_refresh(vec![Err(status(401)), Err(status(401))]).await;
        assert!(result.unwrap_err().is_unauthorized());
        assert_eq!(resolves, 2);
    }

    #[tokio::test]
    async fn test_other_statuses_are_not_retried() {
        let (result, resolves) = run_refresh(vec![Err(status(404))]).await;
        assert!(matches!(
            result,
            Err(Error::HttpStatus { status: 404, .. })
        ));
        assert_eq!(resolves, 1);
    }

    #[tokio::test]
    async fn test_resolve_failure_skips_fetch() {
        let fetches = Cell::new(0);
        let result: Result<()> = with_token_refresh(
            || async { Err::<(), _>(status(403)) },
            |()| {
                fetches.set(fetches.get() + 1);
                async { Ok(()) }
            },
        )
        .await;
        assert!(matches!(result, Err(Error::HttpStatus { status: 403, .. })));
        assert_eq!(fetches.get(), 0);
    }

    #[test]
    fn test_client_shares_cache() {
        let cache = MemoryCache::new();
        let client = Client::with_cache("token", cache.clone());
        client.cache().put("k", vec![1]).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
