//! Viewport camera: fly-to / look-at sequencing plus manual control.
//!
//! The camera is in one of three motions:
//! - **Free**: WASD flight with right-drag mouse look.
//! - **Flying**: an animated flight to a destination, optionally followed by
//!   a look-at once it completes.
//! - **Locked**: positioned at a fixed east-north-up offset from a target;
//!   right-drag orbits the target and the wheel zooms.
//!
//! Works with the floating origin system for high-precision positioning.

use std::f64::consts::{FRAC_PI_2, PI};

use bevy::ecs::message::{Message, MessageReader};
use bevy::input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy_egui::EguiContexts;
use bevy_egui::input::egui_wants_any_keyboard_input;
use glam::DVec3;

use crate::coords::{
    BUILDING_ANCHOR, GeoAnchor, enu_to_ecef_offset, height_above_ellipsoid, local_north, local_up,
};
use crate::floating_origin::FloatingOriginCamera;

/// Minimum base speed in meters per second.
pub const MIN_SPEED: f32 = 10.0;
/// Maximum base speed in meters per second.
pub const MAX_SPEED: f32 = 25_000.0;

/// Closest and farthest look-at range in meters.
const LOOK_AT_RANGE: (f64, f64) = (10.0, 50_000.0);

/// Plugin for the viewport camera.
pub struct CameraControllerPlugin;

impl Plugin for CameraControllerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CameraSettings>()
            .add_message::<FocusRequest>()
            .add_systems(Startup, focus_on_startup)
            .add_systems(
                Update,
                (
                    handle_focus_requests,
                    pointer_control,
                    free_flight.run_if(not(egui_wants_any_keyboard_input)),
                    advance_motion,
                )
                    .chain(),
            );
    }
}

/// Ask the viewport camera to fly to an anchor and then look at it.
#[derive(Message, Debug, Clone, Copy)]
pub struct FocusRequest {
    pub anchor: GeoAnchor,
}

/// Settings for manual camera control.
#[derive(Resource)]
pub struct CameraSettings {
    /// Base movement speed in meters per second.
    pub base_speed: f32,
    /// Speed multiplier when boost key is held.
    pub boost_multiplier: f32,
    /// Mouse sensitivity for look and orbit rotation.
    pub mouse_sensitivity: f32,
    /// Range factor per wheel notch while locked.
    pub zoom_factor: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            base_speed: 200.0,
            boost_multiplier: 5.0,
            mouse_sensitivity: 0.003,
            zoom_factor: 0.9,
        }
    }
}

/// A camera pinned at an east-north-up offset from a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAt {
    /// Target position in ECEF meters.
    pub target: DVec3,
    /// Camera offset from the target in the target's east-north-up frame.
    pub offset_enu: DVec3,
}

impl LookAt {
    /// Camera position in ECEF meters.
    #[must_use]
    pub fn camera_position(&self) -> DVec3 {
        self.target + enu_to_ecef_offset(self.target, self.offset_enu)
    }

    /// Camera `(direction, up)`, facing the target.
    #[must_use]
    pub fn orientation(&self) -> (DVec3, DVec3) {
        let direction = (self.target - self.camera_position()).normalize();
        (direction, local_up(self.target))
    }

    /// Rotate the offset around the target.
    pub fn orbit(&mut self, delta_heading: f64, delta_pitch: f64) {
        let range = self.offset_enu.length();
        if range < f64::EPSILON {
            return;
        }
        let heading = self.offset_enu.x.atan2(self.offset_enu.y) + delta_heading;
        let pitch = ((self.offset_enu.z / range).asin() + delta_pitch).clamp(0.05, FRAC_PI_2 - 0.01);

        self.offset_enu = DVec3::new(
            range * pitch.cos() * heading.sin(),
            range * pitch.cos() * heading.cos(),
            range * pitch.sin(),
        );
    }

    /// Scale the distance to the target.
    pub fn zoom(&mut self, factor: f64) {
        let range = self.offset_enu.length();
        let (min, max) = LOOK_AT_RANGE;
        let new_range = (range * factor).clamp(min, max);
        self.offset_enu *= new_range / range.max(f64::EPSILON);
    }
}

/// An animated flight between two camera poses.
#[derive(Debug, Clone)]
pub struct FlyTo {
    from: DVec3,
    to: DVec3,
    from_direction: DVec3,
    to_direction: DVec3,
    from_up: DVec3,
    to_up: DVec3,
    elapsed: f64,
    duration: f64,
    /// Look-at to switch to once the flight completes.
    pub then: Option<LookAt>,
}

impl FlyTo {
    /// Fly from the current pose to `to`, arriving looking straight down with north up.
    #[must_use]
    pub fn new(from: DVec3, from_direction: DVec3, from_up: DVec3, to: DVec3) -> Self {
        Self {
            from,
            to,
            from_direction,
            to_direction: -local_up(to),
            from_up,
            to_up: local_north(to),
            elapsed: 0.0,
            duration: flight_duration(from.distance(to)),
            then: None,
        }
    }

    /// Chain a look-at to run when the flight completes.
    #[must_use]
    pub fn then_look_at(mut self, look_at: LookAt) -> Self {
        self.then = Some(look_at);
        self
    }

    /// Flight duration in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Advance the flight; returns true once it has completed.
    pub fn step(&mut self, dt: f64) -> bool {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        self.elapsed >= self.duration
    }

    /// Pose `(position, direction, up)` at the current progress.
    #[must_use]
    pub fn pose(&self) -> (DVec3, DVec3, DVec3) {
        let t = if self.duration > 0.0 {
            self.elapsed / self.duration
        } else {
            1.0
        };
        let s = cubic_in_out(t);

        // Travel along the great circle, interpolating the radius and
        // climbing over long distances.
        let r0 = self.from.length();
        let r1 = self.to.length();
        let hop = (self.from.distance(self.to) * 0.25).min(2_000_000.0) * (PI * s).sin();
        let along = slerp(self.from.normalize(), self.to.normalize(), s);
        let position = along * (r0 + (r1 - r0) * s + hop);

        let direction = slerp(self.from_direction, self.to_direction, s);
        let up = slerp(self.from_up, self.to_up, s);
        (position, direction, up)
    }
}

/// Flight time in seconds for a distance in meters.
fn flight_duration(distance: f64) -> f64 {
    ((distance / 1_000_000.0).ceil() + 2.0).min(3.0)
}

fn cubic_in_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Spherical interpolation between unit vectors.
fn slerp(a: DVec3, b: DVec3, t: f64) -> DVec3 {
    let angle = a.angle_between(b);
    if angle < 1e-9 {
        return b;
    }
    let sin = angle.sin();
    if sin.abs() < 1e-9 {
        // Antiparallel: no unique arc, snap at the midpoint.
        return if t < 0.5 { a } else { b };
    }
    (a * ((1.0 - t) * angle).sin() / sin + b * (t * angle).sin() / sin)
        .try_normalize()
        .unwrap_or(b)
}

/// What the camera is currently doing.
#[derive(Debug, Clone)]
pub enum CameraMotion {
    Free,
    Flying(FlyTo),
    Locked(LookAt),
}

/// Orientation and motion state of the viewport camera.
#[derive(Component, Debug, Clone)]
pub struct CameraRig {
    /// View direction (unit, ECEF).
    pub direction: DVec3,
    /// Up vector (unit, ECEF).
    pub up: DVec3,
    pub motion: CameraMotion,
}

impl CameraRig {
    /// A free camera at `position` looking at the horizon towards north.
    #[must_use]
    pub fn free_at(position: DVec3) -> Self {
        Self {
            direction: local_north(position),
            up: local_up(position),
            motion: CameraMotion::Free,
        }
    }

    /// Start flying to the anchor, then look at it from its offset.
    pub fn focus(&mut self, position: DVec3, anchor: &GeoAnchor) {
        let target = anchor.position();
        let flight = FlyTo::new(position, self.direction, self.up, target).then_look_at(LookAt {
            target,
            offset_enu: anchor.look_offset_enu,
        });
        self.motion = CameraMotion::Flying(flight);
    }

    /// Point the camera straight down at the ground below `position`, north up.
    ///
    /// A locked camera is orbited to its steepest pitch over the target; a
    /// flight keeps its path and ends at that pitch.
    pub fn look_down(&mut self, position: DVec3) {
        match &mut self.motion {
            CameraMotion::Free => {
                self.direction = -local_up(position);
                self.up = local_north(position);
            }
            CameraMotion::Flying(flight) => {
                if let Some(look_at) = &mut flight.then {
                    look_at.orbit(0.0, FRAC_PI_2);
                }
            }
            CameraMotion::Locked(look_at) => {
                look_at.orbit(0.0, FRAC_PI_2);
                let (direction, up) = look_at.orientation();
                self.direction = direction;
                self.up = up;
            }
        }
    }

    /// Advance the motion by `dt` seconds and return the new position, if it changed.
    pub fn advance(&mut self, dt: f64) -> Option<DVec3> {
        match &mut self.motion {
            CameraMotion::Free => None,
            CameraMotion::Flying(flight) => {
                let finished = flight.step(dt);
                let (position, direction, up) = flight.pose();
                self.direction = direction;
                self.up = up;
                if finished {
                    self.motion = match flight.then {
                        Some(look_at) => CameraMotion::Locked(look_at),
                        None => CameraMotion::Free,
                    };
                    return self.advance(0.0).or(Some(position));
                }
                Some(position)
            }
            CameraMotion::Locked(look_at) => {
                let (direction, up) = look_at.orientation();
                self.direction = direction;
                self.up = up;
                Some(look_at.camera_position())
            }
        }
    }
}

/// Apply a focus request to the camera, if there is one.
///
/// Returns `false` when no camera exists; the request is then dropped.
pub fn apply_focus(
    camera: Option<(&FloatingOriginCamera, &mut CameraRig)>,
    anchor: &GeoAnchor,
) -> bool {
    let Some((origin_camera, rig)) = camera else {
        return false;
    };
    rig.focus(origin_camera.position, anchor);
    true
}

/// Fly to the building once on startup.
fn focus_on_startup(mut requests: MessageWriter<FocusRequest>) {
    requests.write(FocusRequest {
        anchor: BUILDING_ANCHOR,
    });
}

fn handle_focus_requests(
    mut requests: MessageReader<FocusRequest>,
    mut query: Query<(&FloatingOriginCamera, &mut CameraRig)>,
) {
    for request in requests.read() {
        let camera = query.single_mut().ok();
        let camera = camera.map(|(origin, rig)| (origin, rig.into_inner()));
        if !apply_focus(camera, &request.anchor) {
            tracing::debug!("No viewport camera, ignoring focus request");
        }
    }
}

/// Move the camera along its current motion and update its transform.
#[allow(clippy::needless_pass_by_value)]
fn advance_motion(
    time: Res<Time>,
    mut query: Query<(&mut FloatingOriginCamera, &mut CameraRig, &mut Transform)>,
) {
    for (mut origin_camera, mut rig, mut transform) in &mut query {
        if let Some(position) = rig.advance(f64::from(time.delta_secs())) {
            origin_camera.position = position;
        }
        transform.look_to(rig.direction.as_vec3(), rig.up.as_vec3());
    }
}

/// Mouse look / orbit with the right button, speed or zoom with the wheel.
#[allow(clippy::needless_pass_by_value)]
fn pointer_control(
    mouse: Res<ButtonInput<MouseButton>>,
    mut mouse_motion: MessageReader<MouseMotion>,
    mut scroll_events: MessageReader<MouseWheel>,
    mut settings: ResMut<CameraSettings>,
    mut contexts: EguiContexts,
    mut query: Query<(&FloatingOriginCamera, &mut CameraRig)>,
) {
    let delta: Vec2 = mouse_motion.read().map(|event| event.delta).sum();
    let scroll: f32 = scroll_events
        .read()
        .map(|event| match event.unit {
            // Normalize scroll value: web reports pixels, native reports lines.
            MouseScrollUnit::Line => event.y,
            MouseScrollUnit::Pixel => event.y / 120.0,
        })
        .sum();

    let over_ui = contexts
        .ctx_mut()
        .ok()
        .is_some_and(|ctx| ctx.is_pointer_over_area());
    if over_ui {
        return;
    }

    let Ok((origin_camera, rig)) = query.single_mut() else {
        return;
    };
    let rig = rig.into_inner();
    let dragging = mouse.pressed(MouseButton::Right) && delta != Vec2::ZERO;
    let yaw = -f64::from(delta.x * settings.mouse_sensitivity);
    let pitch = -f64::from(delta.y * settings.mouse_sensitivity);

    match &mut rig.motion {
        CameraMotion::Locked(look_at) => {
            if dragging {
                look_at.orbit(yaw, -pitch);
            }
            if scroll != 0.0 {
                look_at.zoom(settings.zoom_factor.powf(f64::from(scroll)));
            }
        }
        CameraMotion::Free => {
            if scroll != 0.0 {
                // Adjust speed logarithmically for smooth scaling.
                let factor = 1.1_f32.powf(scroll);
                settings.base_speed = (settings.base_speed * factor).clamp(MIN_SPEED, MAX_SPEED);
            }
            if dragging {
                let up = local_up(origin_camera.position);
                let right = rig.direction.cross(up);
                if right.length_squared() < 1e-12 {
                    return;
                }
                let right = right.normalize();

                // Avoid flipping over when looking straight up or down.
                let current_pitch = rig.direction.dot(-up);
                let pitch = if (current_pitch > 0.99 && pitch < 0.0)
                    || (current_pitch < -0.99 && pitch > 0.0)
                {
                    0.0
                } else {
                    pitch
                };

                let rotation = glam::DQuat::from_axis_angle(up, yaw)
                    * glam::DQuat::from_axis_angle(right, pitch);
                rig.direction = (rotation * rig.direction).normalize();
                rig.up = up;
            }
        }
        CameraMotion::Flying(_) => {}
    }
}

/// WASD + Space/Ctrl movement with shift boost. Any movement key breaks a
/// running flight or look-at lock.
#[allow(clippy::needless_pass_by_value)]
fn free_flight(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    settings: Res<CameraSettings>,
    mut query: Query<(&mut FloatingOriginCamera, &mut CameraRig)>,
) {
    let Ok((mut origin_camera, mut rig)) = query.single_mut() else {
        return;
    };

    let forward = rig.direction;
    let old_up = local_up(origin_camera.position);
    let Some(right) = forward.cross(old_up).try_normalize() else {
        return;
    };
    let camera_up = right.cross(forward).normalize();

    let bindings = [
        (KeyCode::KeyW, forward),
        (KeyCode::KeyS, -forward),
        (KeyCode::KeyA, -right),
        (KeyCode::KeyD, right),
        (KeyCode::Space, camera_up),
        (KeyCode::ControlLeft, -camera_up),
    ];
    let movement: DVec3 = bindings
        .iter()
        .filter(|(key, _)| keyboard.pressed(*key))
        .map(|(_, direction)| *direction)
        .sum();

    if movement == DVec3::ZERO {
        return;
    }
    rig.motion = CameraMotion::Free;

    // Speed scales with altitude: faster when high, slower near the ground.
    let altitude = height_above_ellipsoid(origin_camera.position).max(0.0);
    let speed_factor = ((altitude / 10_000.0).max(1.0) + 1.0).powf(1.337) / 3.0;
    let mut speed = f64::from(settings.base_speed) * speed_factor.min(2600.0);
    if keyboard.pressed(KeyCode::ShiftLeft) || keyboard.pressed(KeyCode::ShiftRight) {
        speed *= f64::from(settings.boost_multiplier);
    }

    let new_position =
        origin_camera.position + movement.normalize() * speed * f64::from(time.delta_secs());
    origin_camera.position = new_position;

    // Parallel transport keeps the view steady relative to the surface.
    let new_up = local_up(new_position);
    let rotation = glam::DQuat::from_rotation_arc(old_up, new_up);
    rig.direction = (rotation * rig.direction).normalize();
    rig.up = new_up;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_position() -> DVec3 {
        ion_tiles::ellipsoid::geodetic_to_ecef(6.0, 50.0, 20_000.0)
    }

    #[test]
    fn test_focus_without_camera_is_noop() {
        assert!(!apply_focus(None, &BUILDING_ANCHOR));
    }

    #[test]
    fn test_focus_flies_then_looks_at_anchor() {
        let origin_camera = FloatingOriginCamera::new(start_position());
        let mut rig = CameraRig::free_at(origin_camera.position);
        assert!(apply_focus(Some((&origin_camera, &mut rig)), &BUILDING_ANCHOR));

        let CameraMotion::Flying(flight) = &rig.motion else {
            panic!("expected a flight");
        };
        let duration = flight.duration();
        assert!((2.0..=3.0).contains(&duration));

        // Mid-flight the camera is between start and anchor.
        let mid = rig.advance(duration / 2.0).unwrap();
        assert!(matches!(rig.motion, CameraMotion::Flying(_)));
        assert!(mid.distance(BUILDING_ANCHOR.position()) > 1.0);

        // Completion switches to the look-at.
        let end = rig.advance(duration).unwrap();
        let CameraMotion::Locked(look_at) = rig.motion else {
            panic!("expected a look-at lock");
        };
        assert_eq!(look_at.target, BUILDING_ANCHOR.position());
        assert!((end - look_at.camera_position()).length() < 1e-6);
        assert!((end.distance(look_at.target) - BUILDING_ANCHOR.look_offset_enu.length()).abs() < 1e-6);
        assert!(rig.direction.dot((look_at.target - end).normalize()) > 0.999_999);
    }

    #[test]
    fn test_flight_ends_exactly_at_destination() {
        let to = BUILDING_ANCHOR.position();
        let from = start_position();
        let mut flight = FlyTo::new(from, local_north(from), local_up(from), to);
        assert!(!flight.step(0.5));
        assert!(flight.step(10.0));
        let (position, direction, _) = flight.pose();
        assert!(position.distance(to) < 1e-6);
        assert!(direction.dot(-local_up(to)) > 0.999_999);
    }

    #[test]
    fn test_orbit_keeps_range_and_stays_above_target() {
        let mut look_at = LookAt {
            target: BUILDING_ANCHOR.position(),
            offset_enu: BUILDING_ANCHOR.look_offset_enu,
        };
        let range = look_at.offset_enu.length();
        look_at.orbit(1.0, -3.0);
        assert!((look_at.offset_enu.length() - range).abs() < 1e-9);
        assert!(look_at.offset_enu.z > 0.0);
    }

    #[test]
    fn test_look_down_from_lock_and_free() {
        let target = BUILDING_ANCHOR.position();
        let look_at = LookAt {
            target,
            offset_enu: BUILDING_ANCHOR.look_offset_enu,
        };
        let mut rig = CameraRig {
            direction: look_at.orientation().0,
            up: local_up(target),
            motion: CameraMotion::Locked(look_at),
        };
        rig.look_down(look_at.camera_position());
        assert!(rig.direction.dot(-local_up(target)) > 0.999);
        let CameraMotion::Locked(locked) = rig.motion else {
            panic!("expected the lock to be kept");
        };
        assert!((locked.offset_enu.length() - look_at.offset_enu.length()).abs() < 1e-9);

        let position = start_position();
        let mut rig = CameraRig::free_at(position);
        rig.look_down(position);
        assert!(rig.direction.dot(-local_up(position)) > 0.999_999);
        assert!(rig.direction.cross(rig.up).length() > 0.999);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut look_at = LookAt {
            target: BUILDING_ANCHOR.position(),
            offset_enu: BUILDING_ANCHOR.look_offset_enu,
        };
        look_at.zoom(1e-6);
        assert!((look_at.offset_enu.length() - LOOK_AT_RANGE.0).abs() < 1e-9);
        look_at.zoom(1e9);
        assert!((look_at.offset_enu.length() - LOOK_AT_RANGE.1).abs() < 1e-6);
    }

    #[test]
    fn test_focus_request_without_camera_entity() {
        let mut app = App::new();
        app.add_message::<FocusRequest>()
            .add_systems(Update, handle_focus_requests);
        app.world_mut().write_message(FocusRequest {
            anchor: BUILDING_ANCHOR,
        });
        // No camera spawned: the request is dropped without panicking.
        app.update();
    }
}
