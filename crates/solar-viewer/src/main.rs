//! Monthly solar radiation viewer for a single building.
//!
//! A control panel selects one of twelve monthly radiation datasets and
//! toggles the building and radiation layers; the 3D viewport shows them on
//! the globe under a photorealistic overlay.

mod async_runtime;
mod camera;
mod catalog;
mod clock;
mod coords;
mod floating_origin;
mod layers;
mod launch_params;
mod loader;
mod overlay;
mod shell;
mod ui;

use async_runtime::AsyncRuntimePlugin;
use bevy::prelude::*;
use camera::{CameraControllerPlugin, CameraRig};
use clock::{ClockPlugin, Sun, UtcTime, ViewerClock};
use coords::BUILDING_ANCHOR;
use floating_origin::{FloatingOriginCamera, FloatingOriginPlugin};
use ion_tiles::ellipsoid::geodetic_to_ecef;
use layers::{LayerPlugin, ViewerScene};
use loader::DatasetLoaderPlugin;
use overlay::OverlayPlugin;
use shell::ViewerShell;
use ui::ViewerUiPlugin;

/// Altitude the camera starts at before flying to the building.
const START_ALTITUDE: f64 = 3_000_000.0;

/// Plugin for the main application.
pub struct AppPlugin;

impl Plugin for AppPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ViewerShell>()
            .add_plugins((
                AsyncRuntimePlugin,
                FloatingOriginPlugin,
                CameraControllerPlugin,
                ClockPlugin,
                DatasetLoaderPlugin,
                LayerPlugin,
                OverlayPlugin,
                ViewerUiPlugin,
            ))
            .add_systems(Startup, setup_scene);
    }
}

/// Spawn the viewport camera, the sun and the scene root.
fn setup_scene(mut commands: Commands) {
    let start_position = geodetic_to_ecef(
        BUILDING_ANCHOR.lon_deg,
        BUILDING_ANCHOR.lat_deg,
        START_ALTITUDE,
    );
    let rig = CameraRig::free_at(start_position);

    let clock = ViewerClock::solstice().unwrap_or_else(|e| {
        tracing::error!("Invalid clock bounds: {e}");
        ViewerClock::new(UtcTime(0.0), UtcTime(0.0), UtcTime(0.0))
    });

    // The camera's Transform is always at origin; everything else is rendered relative to it.
    commands.spawn((
        Camera3d::default(),
        Camera {
            clear_color: bevy::camera::ClearColorConfig::Custom(Color::BLACK),
            ..default()
        },
        Transform::from_translation(Vec3::ZERO)
            .looking_to(rig.direction.as_vec3(), rig.up.as_vec3()),
        ui::perspective(),
        FloatingOriginCamera::new(start_position),
        rig,
        clock,
    ));

    commands.spawn((
        Name::new("Sun"),
        Sun,
        DirectionalLight {
            illuminance: light_consts::lux::FULL_DAYLIGHT,
            shadows_enabled: true,
            ..default()
        },
        Transform::default(),
    ));

    commands.spawn((
        Name::new("Scene"),
        ViewerScene,
        Transform::default(),
        Visibility::default(),
    ));

    tracing::info!("Scene setup complete - flying to the building");
}

fn main() {
    // Initialize tracing for native platforms.
    #[cfg(not(target_family = "wasm"))]
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Initialize tracing for WASM (logs to browser console).
    #[cfg(target_family = "wasm")]
    {
        console_error_panic_hook::set_once();
        tracing_wasm::set_as_global_default();
    }

    let params = launch_params::parse();

    let mut app = App::new();

    #[allow(unused_mut)]
    let mut window = Window {
        title: "solar-viewer".to_string(),
        resolution: (1280, 720).into(),
        ..Default::default()
    };

    // WASM: Fit canvas to parent element and prevent browser event handling.
    #[cfg(target_family = "wasm")]
    {
        window.fit_canvas_to_parent = true;
        window.prevent_default_event_handling = true;
    }

    app.add_plugins(DefaultPlugins.set(WindowPlugin {
        primary_window: Some(window),
        ..Default::default()
    }));

    // Launch parameters must exist before the plugins that read them.
    app.insert_resource(params).add_plugins(AppPlugin).run();
}
