//! Async tileset loading for the viewer shell.
//!
//! Fetch requests queued by the shell are spawned as background tasks; their
//! results come back over an `async_channel` tagged with the request token,
//! and the shell decides whether they are still wanted.

use std::sync::Arc;

use bevy::prelude::*;
use ion_tiles::{Client, LoadedTileset, MemoryCache};

use crate::async_runtime::TaskSpawner;
use crate::launch_params::LaunchParams;
use crate::shell::{RequestToken, ViewerShell};

/// Plugin for loading the building and monthly tilesets.
pub struct DatasetLoaderPlugin;

impl Plugin for DatasetLoaderPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<IonClient>()
            .init_resource::<LoaderChannels>()
            .add_systems(Update, (dispatch_fetches, poll_fetch_results).chain());
    }
}

/// The shared client for the asset hosting service.
#[derive(Resource, Clone)]
pub struct IonClient {
    pub client: Arc<Client<MemoryCache>>,
    /// Google Maps key for the photorealistic overlay, if configured.
    pub google_maps_key: Option<String>,
}

impl FromWorld for IonClient {
    fn from_world(world: &mut World) -> Self {
        let params = world
            .get_resource::<LaunchParams>()
            .cloned()
            .unwrap_or_default();

        if params.ion_token.is_empty() {
            tracing::warn!("No access token configured; hosted tilesets will fail to load");
        }

        let client = Client::with_cache(params.ion_token, MemoryCache::with_max_size(params.cache_bytes))
            .with_api_url(params.ion_api_url);

        Self {
            client: Arc::new(client),
            google_maps_key: params.google_maps_key,
        }
    }
}

type FetchResult = (RequestToken, Result<LoadedTileset, ion_tiles::Error>);

/// Channels for receiving fetched tilesets from background tasks.
#[derive(Resource)]
pub struct LoaderChannels {
    result_rx: async_channel::Receiver<FetchResult>,
    result_tx: async_channel::Sender<FetchResult>,
}

impl Default for LoaderChannels {
    fn default() -> Self {
        let (result_tx, result_rx) = async_channel::unbounded();
        Self {
            result_rx,
            result_tx,
        }
    }
}

/// Spawn a task for every fetch the shell queued.
#[allow(clippy::needless_pass_by_value)]
fn dispatch_fetches(
    mut shell: ResMut<ViewerShell>,
    client: Res<IonClient>,
    channels: Res<LoaderChannels>,
    spawner: TaskSpawner,
) {
    for request in shell.take_requests() {
        let client = Arc::clone(&client.client);
        let tx = channels.result_tx.clone();

        spawner.spawn(async move {
            let result = client.load(request.asset_id).await;
            let _ = tx.send((request.token, result)).await;
        });

        tracing::info!(asset_id = %request.asset_id, "Started loading tileset");
    }
}

/// Hand finished fetches to the shell.
#[allow(clippy::needless_pass_by_value)]
fn poll_fetch_results(mut shell: ResMut<ViewerShell>, channels: Res<LoaderChannels>) {
    while let Ok((token, result)) = channels.result_rx.try_recv() {
        let outcome = match &result {
            Ok(loaded) => Ok((loaded.resource.asset_id, loaded.tileset.tile_count())),
            Err(e) => Err(e.to_string()),
        };

        if !shell.accept(token, result) {
            tracing::debug!(?token, "Discarding result of superseded request");
            continue;
        }

        match outcome {
            Ok((asset_id, tiles)) => {
                tracing::info!(?asset_id, tiles, "Loaded tileset");
            }
            Err(e) => {
                tracing::error!("Failed to load tileset: {e}");
            }
        }
    }
}
