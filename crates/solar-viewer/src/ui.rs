//! Control panel and viewport widgets.
//!
//! The left side panel drives the [`ViewerShell`]; the 3D viewport fills the
//! remaining window area and carries the scene mode and base layer pickers,
//! the info box and the credits.

use bevy::camera::{ScalingMode, Viewport};
use bevy::prelude::*;
use bevy_egui::{EguiContexts, EguiPlugin, EguiPrimaryContextPass, egui};

use crate::camera::{CameraRig, FocusRequest};
use crate::catalog::MONTH_COUNT;
use crate::coords::{BUILDING_ANCHOR, ecef_to_lat_lon, height_above_ellipsoid};
use crate::floating_origin::FloatingOriginCamera;
use crate::layers::{MountedTileset, SelectedLayer};
use crate::overlay::OverlayTileset;
use crate::shell::{ResourceSlot, Toggle, ViewerShell};

/// Share of the window width the control panel may take.
const PANEL_WIDTH_RANGE: (f32, f32) = (0.2, 0.3);

/// Plugin for the control panel and viewport widgets.
pub struct ViewerUiPlugin;

impl Plugin for ViewerUiPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(EguiPlugin::default())
            .init_resource::<ViewportOptions>()
            .add_systems(
                EguiPrimaryContextPass,
                (control_panel, viewport_widgets).chain(),
            )
            .add_systems(Update, apply_scene_mode);
    }
}

/// How the viewport projects the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SceneMode {
    /// 3D perspective view.
    #[default]
    Perspective,
    /// Orthographic view.
    TopDown,
}

/// Imagery under the mounted layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaseLayer {
    /// The global photorealistic overlay.
    #[default]
    Photorealistic,
    /// Bare scene.
    None,
}

/// Viewport widget settings.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct ViewportOptions {
    pub scene_mode: SceneMode,
    pub base_layer: BaseLayer,
    /// Sun shadows.
    pub shadows: bool,
    /// Details of the selected layer.
    pub info_box: bool,
    /// Highlight of the selected layer's bounds.
    pub selection_indicator: bool,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            scene_mode: SceneMode::default(),
            base_layer: BaseLayer::default(),
            shadows: true,
            info_box: true,
            selection_indicator: true,
        }
    }
}

/// Clamp a panel width to its allowed share of the window.
#[must_use]
pub fn clamp_panel_width(width: f32, window_width: f32) -> f32 {
    let (min, max) = PANEL_WIDTH_RANGE;
    width.clamp(window_width * min, window_width * max)
}

/// Render the side panel and fit the camera viewport next to it.
#[allow(clippy::needless_pass_by_value)]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn control_panel(
    mut contexts: EguiContexts,
    mut shell: ResMut<ViewerShell>,
    mut focus: MessageWriter<FocusRequest>,
    windows: Query<&Window>,
    mut cameras: Query<&mut Camera, With<FloatingOriginCamera>>,
) -> Result {
    let ctx = contexts.ctx_mut()?;
    let Ok(window) = windows.single() else {
        return Ok(());
    };
    let window_width = window.width();
    let (min, max) = PANEL_WIDTH_RANGE;

    let panel = egui::SidePanel::left("control_panel")
        .resizable(true)
        .default_width(window_width * 0.25)
        .width_range(window_width * min..=window_width * max)
        .show(ctx, |ui| {
            ui.heading("Solar radiation");
            ui.separator();

            ui.label(format!("Building ID: {}", shell.selection.asset_id));
            ui.label(format!("Month: {}", shell.month_name().unwrap_or("-")));
            match &shell.selection.resource {
                ResourceSlot::Pending(_) => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading dataset");
                    });
                }
                ResourceSlot::Failed(message) => {
                    ui.colored_label(egui::Color32::LIGHT_RED, format!("Failed: {message}"));
                }
                ResourceSlot::Empty | ResourceSlot::Ready(_) => {}
            }
            ui.separator();

            let mut building = shell.toggles.building;
            if ui.checkbox(&mut building, "Building").changed() {
                shell.set_toggle(Toggle::Building, building);
            }
            let mut solar = shell.toggles.solar_radiation;
            if ui.checkbox(&mut solar, "Solar Radiation").changed() {
                shell.set_toggle(Toggle::SolarRadiation, solar);
            }
            ui.separator();

            ui.label("Change month:");
            let mut index = shell.month_index();
            let slider = egui::Slider::new(&mut index, 0..=MONTH_COUNT - 1).show_value(false);
            if ui.add(slider).changed() {
                if let Err(e) = shell.select_month(index) {
                    tracing::warn!("{e}");
                }
            }
            ui.separator();

            if ui.button("Focus on building").clicked() {
                focus.write(FocusRequest {
                    anchor: BUILDING_ANCHOR,
                });
            }
        });

    // Keep the 3D view to the right of the panel.
    let panel_width = clamp_panel_width(panel.response.rect.width(), window_width);
    let offset = (panel_width * window.scale_factor()) as u32;
    let physical = window.physical_size();
    if offset < physical.x {
        for mut camera in &mut cameras {
            camera.viewport = Some(Viewport {
                physical_position: UVec2::new(offset, 0),
                physical_size: UVec2::new(physical.x - offset, physical.y),
                ..default()
            });
        }
    }

    Ok(())
}

/// Render the pickers, the info box and the credits over the viewport.
#[allow(clippy::needless_pass_by_value)]
fn viewport_widgets(
    mut contexts: EguiContexts,
    mut options: ResMut<ViewportOptions>,
    selected: Res<SelectedLayer>,
    mounted: Query<&MountedTileset>,
    overlay: Query<&OverlayTileset>,
) -> Result {
    let ctx = contexts.ctx_mut()?;

    egui::Area::new(egui::Id::new("viewport_toolbar"))
        .anchor(egui::Align2::RIGHT_TOP, [-10.0, 10.0])
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    egui::ComboBox::from_id_salt("scene_mode")
                        .selected_text(match options.scene_mode {
                            SceneMode::Perspective => "3D",
                            SceneMode::TopDown => "Top-down",
                        })
                        .show_ui(ui, |ui| {
                            ui.selectable_value(&mut options.scene_mode, SceneMode::Perspective, "3D");
                            ui.selectable_value(&mut options.scene_mode, SceneMode::TopDown, "Top-down");
                        });
                    egui::ComboBox::from_id_salt("base_layer")
                        .selected_text(match options.base_layer {
                            BaseLayer::Photorealistic => "Photorealistic",
                            BaseLayer::None => "No base layer",
                        })
                        .show_ui(ui, |ui| {
                            ui.selectable_value(
                                &mut options.base_layer,
                                BaseLayer::Photorealistic,
                                "Photorealistic",
                            );
                            ui.selectable_value(&mut options.base_layer, BaseLayer::None, "No base layer");
                        });
                });
                ui.checkbox(&mut options.shadows, "Shadows");
                ui.checkbox(&mut options.info_box, "Info box");
                ui.checkbox(&mut options.selection_indicator, "Selection indicator");
            });
        });

    if options.info_box {
        if let Some(mount) = selected.0.and_then(|entity| mounted.get(entity).ok()) {
            info_box(ctx, mount);
        }
    }

    let credits = collect_credits(
        mounted
            .iter()
            .map(|m| m.content.as_ref())
            .chain(overlay.iter().map(|o| o.content.as_ref())),
    );
    if !credits.is_empty() {
        egui::Area::new(egui::Id::new("credits"))
            .anchor(egui::Align2::RIGHT_BOTTOM, [-10.0, -10.0])
            .interactable(false)
            .show(ctx, |ui| {
                ui.small(credits.join(" • "));
            });
    }

    Ok(())
}

fn info_box(ctx: &egui::Context, mount: &MountedTileset) {
    let loaded = &mount.content;
    let (center, radius) = loaded.tileset.bounding_sphere();
    let (lat, lon) = ecef_to_lat_lon(center);

    egui::Window::new("Info")
        .anchor(egui::Align2::RIGHT_TOP, [-10.0, 140.0])
        .resizable(false)
        .show(ctx, |ui| {
            if let Some(asset_id) = loaded.resource.asset_id {
                ui.label(format!("Asset: {asset_id}"));
            }
            ui.label(format!("Tileset version: {}", loaded.tileset.asset.version));
            ui.label(format!("Tiles: {}", loaded.tileset.tile_count()));
            ui.label(format!("Geometric error: {:.1}", loaded.tileset.geometric_error));
            ui.label(format!("Center: {lat:.5}°, {lon:.5}°"));
            ui.label(format!("Height: {:.0} m", height_above_ellipsoid(center)));
            ui.label(format!("Radius: {radius:.0} m"));
        });
}

/// Plain-text attributions of the given tilesets, without duplicates.
fn collect_credits<'a>(tilesets: impl Iterator<Item = &'a ion_tiles::LoadedTileset>) -> Vec<String> {
    let mut credits: Vec<String> = Vec::new();
    for text in tilesets
        .flat_map(|loaded| loaded.resource.attributions.iter())
        .map(ion_tiles::Attribution::plain_text)
    {
        if !text.is_empty() && !credits.contains(&text) {
            credits.push(text);
        }
    }
    credits
}

/// Switch the camera projection when the scene mode changes.
///
/// The orthographic extent follows the camera altitude; the projection is
/// only written when the extent actually moves. Entering top-down points the
/// camera at the ground.
#[allow(clippy::needless_pass_by_value, clippy::cast_possible_truncation)]
fn apply_scene_mode(
    options: Res<ViewportOptions>,
    mut cameras: Query<(&FloatingOriginCamera, &mut Projection, &mut CameraRig)>,
) {
    for (camera, mut projection, mut rig) in &mut cameras {
        match options.scene_mode {
            SceneMode::Perspective => {
                if !matches!(*projection, Projection::Perspective(_)) {
                    *projection = perspective();
                }
            }
            SceneMode::TopDown => {
                let extent = (height_above_ellipsoid(camera.position) * 2.0).max(200.0) as f32;
                let current = match &*projection {
                    Projection::Orthographic(ortho) => match ortho.scaling_mode {
                        ScalingMode::FixedVertical { viewport_height } => Some(viewport_height),
                        _ => None,
                    },
                    _ => None,
                };
                match current {
                    Some(height) if (height - extent).abs() <= extent * 1e-3 => {}
                    Some(_) => *projection = top_down(extent),
                    None => {
                        *projection = top_down(extent);
                        rig.look_down(camera.position);
                    }
                }
            }
        }
    }
}

/// Orthographic projection showing `extent` meters vertically.
fn top_down(extent: f32) -> Projection {
    Projection::Orthographic(OrthographicProjection {
        scaling_mode: ScalingMode::FixedVertical {
            viewport_height: extent,
        },
        near: -100_000.0,
        far: 100_000_000.0,
        ..OrthographicProjection::default_3d()
    })
}

/// The default viewport projection.
#[must_use]
pub fn perspective() -> Projection {
    Projection::Perspective(PerspectiveProjection {
        fov: std::f32::consts::FRAC_PI_4,
        near: 1.0,
        far: 100_000_000.0, // 100,000 km to see the whole Earth.
        ..default()
    })
}

#[cfg(test)]
mod tests {
    use ion_tiles::Attribution;

    use super::*;
    use crate::coords::local_up;
    use crate::shell::tests::loaded;

    #[test]
    fn test_defaults_enable_builtins() {
        let options = ViewportOptions::default();
        assert_eq!(options.scene_mode, SceneMode::Perspective);
        assert_eq!(options.base_layer, BaseLayer::Photorealistic);
        assert!(options.shadows && options.info_box && options.selection_indicator);
    }

    #[test]
    fn test_panel_width_range() {
        assert!((clamp_panel_width(10.0, 1000.0) - 200.0).abs() < f32::EPSILON);
        assert!((clamp_panel_width(250.0, 1000.0) - 250.0).abs() < f32::EPSILON);
        assert!((clamp_panel_width(900.0, 1000.0) - 300.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_credits_are_deduplicated() {
        let mut first = loaded(ion_tiles::AssetId(1));
        first.resource.attributions = vec![Attribution {
            html: "<span>Data © Example</span>".to_string(),
            collapsible: false,
        }];
        let mut second = first.clone();
        second.resource.attributions.push(Attribution {
            html: "Google".to_string(),
            collapsible: true,
        });

        let credits = collect_credits([&first, &second].into_iter());
        assert_eq!(credits, vec!["Data © Example".to_string(), "Google".to_string()]);
    }

    #[test]
    fn test_top_down_switches_projection() {
        let mut app = App::new();
        app.init_resource::<ViewportOptions>()
            .add_systems(Update, apply_scene_mode);
        let position = BUILDING_ANCHOR.position();
        let camera = app
            .world_mut()
            .spawn((
                FloatingOriginCamera::new(position),
                perspective(),
                CameraRig::free_at(position),
            ))
            .id();

        app.world_mut().resource_mut::<ViewportOptions>().scene_mode = SceneMode::TopDown;
        app.update();
        assert!(matches!(
            app.world().get::<Projection>(camera),
            Some(Projection::Orthographic(_))
        ));
        let rig = app.world().get::<CameraRig>(camera).unwrap();
        assert!(rig.direction.dot(-local_up(position)) > 0.99);

        app.world_mut().resource_mut::<ViewportOptions>().scene_mode = SceneMode::Perspective;
        app.update();
        assert!(matches!(
            app.world().get::<Projection>(camera),
            Some(Projection::Perspective(_))
        ));
    }

    #[derive(Resource, Default)]
    struct ProjectionWrites(usize);

    fn count_projection_writes(
        mut writes: ResMut<ProjectionWrites>,
        projections: Query<Ref<Projection>>,
    ) {
        for projection in &projections {
            if projection.is_changed() {
                writes.0 += 1;
            }
        }
    }

    #[test]
    fn test_top_down_writes_projection_only_on_extent_change() {
        let mut app = App::new();
        app.init_resource::<ViewportOptions>()
            .init_resource::<ProjectionWrites>()
            .add_systems(Update, (apply_scene_mode, count_projection_writes).chain());
        let position = BUILDING_ANCHOR.position();
        let camera = app
            .world_mut()
            .spawn((
                FloatingOriginCamera::new(position),
                perspective(),
                CameraRig::free_at(position),
            ))
            .id();

        // Spawning counts as the first write.
        app.update();
        assert_eq!(app.world().resource::<ProjectionWrites>().0, 1);

        app.world_mut().resource_mut::<ViewportOptions>().scene_mode = SceneMode::TopDown;
        app.update();
        app.update();
        app.update();
        assert_eq!(app.world().resource::<ProjectionWrites>().0, 2);

        // Climbing changes the extent.
        app.world_mut()
            .get_mut::<FloatingOriginCamera>(camera)
            .unwrap()
            .position = position + local_up(position) * 5_000.0;
        app.update();
        app.update();
        assert_eq!(app.world().resource::<ProjectionWrites>().0, 3);
    }
}
