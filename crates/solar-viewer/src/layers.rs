//! Mounting fetched tilesets into the scene.
//!
//! Each frame the desired layers from the shell are compared against the
//! mounted ones. Layers are keyed, so a layer is never mounted twice and a
//! new monthly selection replaces the previous monthly mount.

use std::sync::Arc;

use bevy::prelude::*;
use bevy_egui::EguiContexts;
use glam::DVec3;
use ion_tiles::LoadedTileset;

use crate::floating_origin::{FloatingOrigin, FloatingOriginCamera, WorldPosition};
use crate::shell::{LayerKey, ViewerShell};
use crate::ui::ViewportOptions;

/// Plugin for mounting, drawing and picking tileset layers.
pub struct LayerPlugin;

impl Plugin for LayerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SelectedLayer>()
            .add_systems(Update, (reconcile_layers, pick_layer).chain())
            .add_systems(PostUpdate, draw_layer_bounds);
    }
}

/// Root entity of the 3D scene. Mounted layers and the overlay hang below it.
#[derive(Component, Debug, Default)]
pub struct ViewerScene;

/// A tileset mounted in the scene.
#[derive(Component, Debug, Clone)]
pub struct MountedTileset {
    pub key: LayerKey,
    pub content: Arc<LoadedTileset>,
}

/// The mounted layer last clicked in the viewport.
#[derive(Resource, Debug, Default)]
pub struct SelectedLayer(pub Option<Entity>);

/// Changes needed to bring the mounted layers in line with the desired ones.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MountPlan {
    pub unmount: Vec<Entity>,
    pub mount: Vec<LayerKey>,
}

/// Diff mounted layers against desired ones.
///
/// Mounts that are no longer desired, and duplicates of a key, are unmounted.
#[must_use]
pub fn plan_mounts(mounted: &[(Entity, LayerKey)], desired: &[LayerKey]) -> MountPlan {
    let mut plan = MountPlan::default();
    let mut kept: Vec<LayerKey> = Vec::with_capacity(mounted.len());

    for &(entity, key) in mounted {
        if desired.contains(&key) && !kept.contains(&key) {
            kept.push(key);
        } else {
            plan.unmount.push(entity);
        }
    }

    plan.mount = desired
        .iter()
        .copied()
        .filter(|key| !kept.contains(key))
        .collect();
    plan.mount.dedup();
    plan
}

/// Mount and unmount layers to match the shell.
#[allow(clippy::needless_pass_by_value)]
fn reconcile_layers(
    mut commands: Commands,
    shell: Res<ViewerShell>,
    mut selected: ResMut<SelectedLayer>,
    mounted: Query<(Entity, &MountedTileset)>,
    scene: Query<Entity, With<ViewerScene>>,
) {
    // Only layers whose tileset has resolved can be shown.
    let desired: Vec<LayerKey> = shell
        .desired_layers()
        .into_iter()
        .filter(|key| shell.content_for(*key).is_some())
        .collect();
    let current: Vec<(Entity, LayerKey)> = mounted
        .iter()
        .map(|(entity, mount)| (entity, mount.key))
        .collect();

    let plan = plan_mounts(&current, &desired);

    for entity in plan.unmount {
        if selected.0 == Some(entity) {
            selected.0 = None;
        }
        commands.entity(entity).despawn();
        tracing::debug!(?entity, "Unmounted layer");
    }

    for key in plan.mount {
        let Some(content) = shell.content_for(key) else {
            continue;
        };
        let (center, _) = content.tileset.bounding_sphere();
        let mut entity = commands.spawn((
            Name::new(layer_name(key)),
            MountedTileset {
                key,
                content: Arc::clone(content),
            },
            WorldPosition(center),
            Transform::default(),
            Visibility::default(),
        ));
        if let Ok(scene) = scene.single() {
            entity.insert(ChildOf(scene));
        }
        tracing::info!(?key, "Mounted layer");
    }
}

fn layer_name(key: LayerKey) -> String {
    match key {
        LayerKey::Buildings => "Buildings".to_string(),
        LayerKey::SolarRadiation(asset_id) => format!("Solar radiation {asset_id}"),
    }
}

/// Distance along a ray to its first intersection with a sphere.
///
/// `direction` must be normalized. Returns `None` when the sphere is missed or
/// lies entirely behind the ray origin.
#[must_use]
pub fn ray_sphere_distance(origin: DVec3, direction: DVec3, center: DVec3, radius: f64) -> Option<f64> {
    let to_center = center - origin;
    let along = to_center.dot(direction);
    let closest_sq = to_center.length_squared() - along * along;
    let radius_sq = radius * radius;
    if closest_sq > radius_sq {
        return None;
    }
    let half_chord = (radius_sq - closest_sq).sqrt();
    let near = along - half_chord;
    let far = along + half_chord;
    if far < 0.0 {
        None
    } else if near < 0.0 {
        // Inside the sphere.
        Some(0.0)
    } else {
        Some(near)
    }
}

/// Select the nearest mounted layer under the cursor on left click.
#[allow(clippy::needless_pass_by_value)]
fn pick_layer(
    mouse: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window>,
    mut contexts: EguiContexts,
    camera: Query<(&Camera, &GlobalTransform, &FloatingOriginCamera)>,
    mounted: Query<(Entity, &MountedTileset)>,
    mut selected: ResMut<SelectedLayer>,
) {
    if !mouse.just_pressed(MouseButton::Left) {
        return;
    }
    let over_ui = contexts
        .ctx_mut()
        .ok()
        .is_some_and(|ctx| ctx.is_pointer_over_area());
    if over_ui {
        return;
    }
    let Some(cursor) = windows.iter().find_map(Window::cursor_position) else {
        return;
    };
    let Ok((camera, camera_transform, origin_camera)) = camera.single() else {
        return;
    };
    let Ok(ray) = camera.viewport_to_world(camera_transform, cursor) else {
        return;
    };

    let origin = origin_camera.position + ray.origin.as_dvec3();
    let direction = ray.direction.as_vec3().as_dvec3().normalize();

    selected.0 = mounted
        .iter()
        .filter_map(|(entity, mount)| {
            let (center, radius) = mount.content.tileset.bounding_sphere();
            ray_sphere_distance(origin, direction, center, radius).map(|d| (entity, d))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(entity, _)| entity);

    if let Some(entity) = selected.0 {
        tracing::debug!(?entity, "Selected layer");
    }
}

/// Render-space center and radius of a tileset's root bounds, seen from a
/// camera at `camera_position`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
fn render_bounds(camera_position: DVec3, content: &LoadedTileset) -> (Vec3, f32) {
    let (center, radius) = content.tileset.bounding_sphere();
    let origin = FloatingOrigin {
        position: camera_position,
    };
    (origin.to_render(center), radius as f32)
}

/// Draw the bounding volume of every mounted layer.
///
/// Positions come from the camera itself, so bounds drawn this frame match
/// wherever the camera systems moved it in `Update`.
#[allow(clippy::needless_pass_by_value)]
fn draw_layer_bounds(
    mut gizmos: Gizmos,
    camera: Query<&FloatingOriginCamera>,
    options: Res<ViewportOptions>,
    selected: Res<SelectedLayer>,
    mounted: Query<(Entity, &MountedTileset)>,
) {
    let Ok(camera) = camera.single() else {
        return;
    };
    for (entity, mount) in &mounted {
        let (position, radius) = render_bounds(camera.position, &mount.content);
        let color = match mount.key {
            LayerKey::Buildings => Color::srgb(0.85, 0.85, 0.9),
            LayerKey::SolarRadiation(_) => Color::srgb(1.0, 0.55, 0.1),
        };
        gizmos.sphere(Isometry3d::from_translation(position), radius, color);

        if options.selection_indicator && selected.0 == Some(entity) {
            gizmos.sphere(
                Isometry3d::from_translation(position),
                radius * 1.05,
                Color::srgb(0.2, 1.0, 0.3),
            );
        }
    }
}
