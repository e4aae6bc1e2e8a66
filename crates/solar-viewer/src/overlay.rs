//! The global photorealistic overlay.
//!
//! Loaded once on startup and attached under the scene root. A failure is
//! logged once and leaves the scene without overlay. The load is cancelled
//! when the scene root goes away or the app exits, and a cancelled load
//! never attaches.

use std::sync::Arc;

use bevy::ecs::message::MessageReader;
use bevy::prelude::*;
use glam::DVec3;
use ion_tiles::LoadedTileset;
use ion_tiles::ellipsoid::{WGS84_A, WGS84_B};

use crate::async_runtime::{CancelToken, TaskSpawner};
use crate::floating_origin::WorldPosition;
use crate::layers::ViewerScene;
use crate::loader::IonClient;
use crate::ui::{BaseLayer, ViewportOptions};

/// Plugin for loading and attaching the photorealistic overlay.
pub struct OverlayPlugin;

impl Plugin for OverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<OverlayLoader>()
            .add_systems(PostStartup, start_overlay_load)
            .add_systems(
                Update,
                (
                    cancel_on_scene_teardown,
                    poll_overlay,
                    build_overlay_globe,
                    apply_base_layer,
                )
                    .chain(),
            )
            .add_systems(Last, cancel_on_exit);
    }
}

/// The attached overlay tileset.
#[derive(Component, Debug, Clone)]
pub struct OverlayTileset {
    pub content: Arc<LoadedTileset>,
}

/// Progress of the overlay load.
#[derive(Debug, Clone, Default)]
pub enum OverlayState {
    /// Not started.
    #[default]
    Idle,
    /// The fetch is in flight for `scene`.
    Loading { cancel: CancelToken, scene: Entity },
    /// The overlay has been attached.
    Attached,
    /// The fetch failed.
    Failed,
    /// The scene went away before the fetch finished.
    Cancelled,
}

type OverlayResult = Result<LoadedTileset, ion_tiles::Error>;

/// Owner of the overlay background task.
#[derive(Resource)]
pub struct OverlayLoader {
    state: OverlayState,
    result_rx: async_channel::Receiver<OverlayResult>,
    result_tx: async_channel::Sender<OverlayResult>,
}

impl Default for OverlayLoader {
    fn default() -> Self {
        let (result_tx, result_rx) = async_channel::bounded(1);
        Self {
            state: OverlayState::default(),
            result_rx,
            result_tx,
        }
    }
}

impl OverlayLoader {
    #[must_use]
    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    /// Begin loading for `scene`. Returns the task's cancel token, or `None`
    /// if a load was already started.
    pub fn start(&mut self, scene: Entity) -> Option<CancelToken> {
        if !matches!(self.state, OverlayState::Idle) {
            return None;
        }
        let cancel = CancelToken::new();
        self.state = OverlayState::Loading {
            cancel: cancel.clone(),
            scene,
        };
        Some(cancel)
    }

    /// Cancel a pending load.
    pub fn cancel(&mut self) {
        if let OverlayState::Loading { cancel, .. } = &self.state {
            cancel.cancel();
            self.state = OverlayState::Cancelled;
            tracing::debug!("Cancelled photorealistic overlay load");
        }
    }

    /// The scene a pending load is for.
    #[must_use]
    pub fn pending_scene(&self) -> Option<Entity> {
        match &self.state {
            OverlayState::Loading { scene, .. } => Some(*scene),
            _ => None,
        }
    }

    /// Consume the task result. Returns the scene and tileset to attach, at
    /// most once.
    pub fn settle(&mut self, result: OverlayResult) -> Option<(Entity, LoadedTileset)> {
        let OverlayState::Loading { cancel, scene } = &self.state else {
            return None;
        };
        if cancel.is_cancelled() {
            self.state = OverlayState::Cancelled;
            return None;
        }
        let scene = *scene;

        match result {
            Ok(loaded) => {
                self.state = OverlayState::Attached;
                Some((scene, loaded))
            }
            Err(e) => {
                tracing::error!("Failed to load photorealistic overlay: {e}");
                self.state = OverlayState::Failed;
                None
            }
        }
    }
}

/// Spawn the overlay fetch for the scene root.
#[allow(clippy::needless_pass_by_value)]
fn start_overlay_load(
    mut loader: ResMut<OverlayLoader>,
    client: Res<IonClient>,
    spawner: TaskSpawner,
    scene: Query<Entity, With<ViewerScene>>,
) {
    let Ok(scene) = scene.single() else {
        tracing::warn!("No scene root; skipping photorealistic overlay");
        return;
    };
    let Some(cancel) = loader.start(scene) else {
        return;
    };

    let ion = Arc::clone(&client.client);
    let google_maps_key = client.google_maps_key.clone();
    let tx = loader.result_tx.clone();

    spawner.spawn(async move {
        let result = ion
            .load_google_photorealistic(google_maps_key.as_deref())
            .await;
        if cancel.is_cancelled() {
            return;
        }
        let _ = tx.send(result).await;
    });

    tracing::info!("Started loading photorealistic overlay");
}

/// Cancel the load when its scene root is despawned.
fn cancel_on_scene_teardown(
    mut loader: ResMut<OverlayLoader>,
    mut removed: RemovedComponents<ViewerScene>,
) {
    let Some(scene) = loader.pending_scene() else {
        removed.clear();
        return;
    };
    if removed.read().any(|entity| entity == scene) {
        loader.cancel();
    }
}

fn cancel_on_exit(mut loader: ResMut<OverlayLoader>, mut exits: MessageReader<AppExit>) {
    if exits.read().next().is_some() {
        loader.cancel();
    }
}

/// Attach the overlay once its fetch completes.
#[allow(clippy::cast_possible_truncation)]
fn poll_overlay(
    mut commands: Commands,
    mut loader: ResMut<OverlayLoader>,
    scenes: Query<(), With<ViewerScene>>,
) {
    while let Ok(result) = loader.result_rx.try_recv() {
        let Some((scene, loaded)) = loader.settle(result) else {
            continue;
        };
        if !scenes.contains(scene) {
            tracing::debug!("Scene root is gone; not attaching overlay");
            continue;
        }

        tracing::info!(url = %loaded.resource.url, "Attached photorealistic overlay");
        commands.spawn((
            Name::new("Photorealistic overlay"),
            OverlayTileset {
                content: Arc::new(loaded),
            },
            WorldPosition(DVec3::ZERO),
            // Polar axis is ECEF z.
            Transform::from_scale(Vec3::new(1.0, 1.0, (WGS84_B / WGS84_A) as f32)),
            Visibility::default(),
            ChildOf(scene),
        ));
    }
}

/// Give a newly attached overlay its globe mesh.
#[allow(clippy::cast_possible_truncation)]
fn build_overlay_globe(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    added: Query<Entity, Added<OverlayTileset>>,
) {
    for entity in &added {
        let mesh = Sphere::new(WGS84_A as f32).mesh().uv(256, 128);
        let material = StandardMaterial {
            base_color: Color::srgb(0.32, 0.4, 0.3),
            perceptual_roughness: 0.95,
            ..default()
        };
        commands.entity(entity).insert((
            Mesh3d(meshes.add(mesh)),
            MeshMaterial3d(materials.add(material)),
        ));
    }
}

/// Show the overlay only when it is the chosen base layer.
#[allow(clippy::needless_pass_by_value)]
fn apply_base_layer(
    options: Res<ViewportOptions>,
    mut overlay: Query<&mut Visibility, With<OverlayTileset>>,
) {
    let visibility = match options.base_layer {
        BaseLayer::Photorealistic => Visibility::Inherited,
        BaseLayer::None => Visibility::Hidden,
    };
    for mut current in &mut overlay {
        current.set_if_neq(visibility);
    }
}
