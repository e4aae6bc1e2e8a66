//! Floating origin system for rendering the globe with f32 precision.
//!
//! ECEF coordinates are millions of meters, which causes f32 precision issues.
//! Positions are stored in f64 and everything is rendered relative to the
//! camera, which always sits at the render-space origin.

use bevy::prelude::*;
use glam::DVec3;

/// Plugin for floating origin coordinate system.
pub struct FloatingOriginPlugin;

impl Plugin for FloatingOriginPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FloatingOrigin>()
            .add_systems(PostUpdate, (sync_origin, place_relative_to_origin).chain());
    }
}

/// The floating origin position in ECEF coordinates.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct FloatingOrigin {
    /// Current origin position in ECEF meters.
    pub position: DVec3,
}

impl FloatingOrigin {
    /// Render-space translation of an ECEF position.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_render(&self, position: DVec3) -> Vec3 {
        (position - self.position).as_vec3()
    }
}

/// High-precision ECEF position of a scene entity.
#[derive(Component, Clone, Copy, Debug)]
pub struct WorldPosition(pub DVec3);

/// The camera whose position defines the floating origin.
#[derive(Component, Debug)]
pub struct FloatingOriginCamera {
    /// Camera position in ECEF meters.
    pub position: DVec3,
}

impl FloatingOriginCamera {
    /// Create a new floating origin camera at the given position.
    pub fn new(position: DVec3) -> Self {
        Self { position }
    }
}

/// Move the origin to the camera.
fn sync_origin(mut origin: ResMut<FloatingOrigin>, camera: Query<&FloatingOriginCamera>) {
    if let Ok(camera) = camera.single() {
        origin.position = camera.position;
    }
}

/// Update entity translations to be relative to the floating origin.
#[allow(clippy::needless_pass_by_value)]
fn place_relative_to_origin(
    origin: Res<FloatingOrigin>,
    mut query: Query<(&WorldPosition, &mut Transform), Without<FloatingOriginCamera>>,
) {
    for (world, mut transform) in &mut query {
        transform.translation = origin.to_render(world.0);
    }
}
