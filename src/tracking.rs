//! Camera pose tracking: feeding poses from an external estimator into the scene, reacting to
//! tracking loss, and placing the target on the ground.
//!
//! The pose estimator is not part of this crate. Send a [`TrackingUpdate`] event every frame it
//! produces a pose, and [`TrackingUpdate::Lost`] whenever it cannot.

use bevy_ecs::prelude::*;
use bevy_log::prelude::*;
use bevy_math::prelude::*;
use bevy_reflect::prelude::*;
use bevy_render::view::Visibility;
use bevy_transform::prelude::*;

use crate::controller::component::{ArManipulator, ManipulationTarget};

/// A world space camera pose.
#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect)]
pub struct CameraPose {
    /// Camera orientation in the world.
    pub rotation: Quat,
    /// Camera position in the world.
    pub translation: Vec3,
}

impl CameraPose {
    /// Extract the pose from a camera-to-world matrix. Any scale in the matrix is discarded.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (_, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            rotation,
            translation,
        }
    }
}

/// Anything a pose estimator produces that can be written into a camera transform.
pub trait PoseAdapter {
    /// Overwrite the camera's rotation and translation with this pose.
    fn apply_pose(&self, rotation: &mut Quat, translation: &mut Vec3);
}

impl PoseAdapter for CameraPose {
    fn apply_pose(&self, rotation: &mut Quat, translation: &mut Vec3) {
        *rotation = self.rotation;
        *translation = self.translation;
    }
}

impl PoseAdapter for Mat4 {
    fn apply_pose(&self, rotation: &mut Quat, translation: &mut Vec3) {
        CameraPose::from_matrix(*self).apply_pose(rotation, translation);
    }
}

/// Something that follows the tracked camera.
pub trait PoseConsumer {
    /// The camera moved to `camera`.
    fn update_camera_pose(&mut self, camera: &Transform);
    /// The pose estimator lost tracking.
    fn lost_camera(&mut self);
}

impl PoseConsumer for ArManipulator {
    fn update_camera_pose(&mut self, _camera: &Transform) {
        self.set_tracking(true);
    }

    fn lost_camera(&mut self) {
        self.set_tracking(false);
    }
}

/// Output of the external pose estimator for one camera.
///
/// Updates are applied in the order they were sent, so a pose and a loss sent in the same frame
/// resolve to whichever came last.
#[derive(Debug, Clone, Copy, PartialEq, Event)]
pub enum TrackingUpdate {
    /// The camera has a new world space pose.
    Pose {
        /// The AR camera, with an [`ArManipulator`].
        camera: Entity,
        /// The new pose.
        pose: CameraPose,
    },
    /// The estimator cannot currently locate the camera.
    Lost {
        /// The AR camera, with an [`ArManipulator`].
        camera: Entity,
    },
}

impl TrackingUpdate {
    /// The camera this update is for.
    pub fn camera(&self) -> Entity {
        match self {
            Self::Pose { camera, .. } | Self::Lost { camera } => *camera,
        }
    }
}

/// Sent when a camera starts or stops being tracked, so the host can update its UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Event)]
pub struct TrackingChanged {
    /// The AR camera.
    pub camera: Entity,
    /// Is the camera now tracked?
    pub tracking: bool,
}

/// Move the target onto the camera's [`GroundPlacement`] marker. Ignored while no marker is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Event)]
pub struct PlaceAtMarker {
    /// The AR camera.
    pub camera: Entity,
}

/// What disappears when tracking is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum TrackingLossPolicy {
    /// Only the manipulation target is hidden.
    #[default]
    HideTarget,
    /// The target and every [`ArSceneMember`] are hidden, for views whose whole scene is anchored
    /// to the tracked camera.
    HideScene,
}

/// Marks an entity that belongs to the AR scene, and is hidden with it under
/// [`TrackingLossPolicy::HideScene`].
#[derive(Debug, Clone, Copy, Default, Component, Reflect)]
#[require(Visibility)]
pub struct ArSceneMember;

/// Playback state of the video shown on the target. Add it to the target entity and drive the
/// actual video from its change detection.
///
/// Starts paused. The first pose starts playback, and tracking loss leaves it playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Component, Reflect)]
pub struct VideoPlayback {
    paused: bool,
}

impl Default for VideoPlayback {
    fn default() -> Self {
        Self { paused: true }
    }
}

impl VideoPlayback {
    /// Resume playback.
    pub fn play(&mut self) {
        self.paused = false;
    }

    /// Pause playback.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Flip between playing and paused.
    pub fn toggle(&mut self) {
        self.paused = !self.paused;
    }

    /// Is the video paused?
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

/// Shows a marker where the camera looks at the ground, so the target can be placed there with
/// [`PlaceAtMarker`]. Add it to the AR camera.
///
/// The ground is a horizontal disc at [`GroundPlacement::ground_height`], centered below the camera
/// so it follows the camera as it moves.
#[derive(Debug, Clone, PartialEq, Component, Reflect)]
pub struct GroundPlacement {
    /// World space height of the ground plane.
    pub ground_height: f32,
    /// Radius of the ground disc.
    pub ground_radius: f32,
    marker: Option<Vec3>,
}

impl Default for GroundPlacement {
    fn default() -> Self {
        Self {
            ground_height: -10.0,
            ground_radius: 1000.0,
            marker: None,
        }
    }
}

impl GroundPlacement {
    /// Where the camera is looking at the ground, if it is.
    pub fn marker(&self) -> Option<Vec3> {
        self.marker
    }

    /// Cast the camera's forward ray against the ground disc and move the marker to the hit.
    pub fn update_marker(&mut self, camera: &Transform) -> Option<Vec3> {
        let ray = Ray3d::new(camera.translation, camera.forward());
        let center = Vec3::new(
            camera.translation.x,
            self.ground_height,
            camera.translation.z,
        );
        self.marker = ray
            .intersect_plane(center, InfinitePlane3d { normal: Dir3::Y })
            .map(|distance| ray.get_point(distance))
            .filter(|hit| hit.distance(center) <= self.ground_radius);
        self.marker
    }
}

impl PoseConsumer for GroundPlacement {
    fn update_camera_pose(&mut self, camera: &Transform) {
        self.update_marker(camera);
    }

    fn lost_camera(&mut self) {
        self.marker = None;
    }
}

/// Apply [`TrackingUpdate`]s: move the camera, then show or hide the target and scene.
pub fn apply_tracking_updates(
    mut updates: EventReader<TrackingUpdate>,
    mut cameras: Query<(&mut ArManipulator, &mut Transform, Option<&mut GroundPlacement>)>,
    mut targets: Query<
        (&mut Visibility, Option<&mut VideoPlayback>),
        (With<ManipulationTarget>, Without<ArManipulator>),
    >,
    mut scene: Query<
        &mut Visibility,
        (
            With<ArSceneMember>,
            Without<ManipulationTarget>,
            Without<ArManipulator>,
        ),
    >,
    mut changes: EventWriter<TrackingChanged>,
) {
    for update in updates.read() {
        let Ok((mut manipulator, mut camera_transform, ground)) =
            cameras.get_mut(update.camera())
        else {
            warn_once!("Tracking update for {} which has no ArManipulator", update.camera());
            continue;
        };
        let was_tracking = manipulator.is_tracking();
        let target = manipulator.target();
        let policy = manipulator.settings().tracking_loss;

        let visibility = match update {
            TrackingUpdate::Pose { pose, .. } => {
                let camera_transform = &mut *camera_transform;
                pose.apply_pose(
                    &mut camera_transform.rotation,
                    &mut camera_transform.translation,
                );
                manipulator.update_camera_pose(camera_transform);
                if let Some(mut ground) = ground {
                    ground.update_camera_pose(camera_transform);
                }
                if let Ok((_, Some(mut video))) = targets.get_mut(target) {
                    if video.is_paused() {
                        debug!("Tracking started, resuming video");
                        video.play();
                    }
                }
                Visibility::Inherited
            }
            TrackingUpdate::Lost { .. } => {
                manipulator.lost_camera();
                if let Some(mut ground) = ground {
                    ground.lost_camera();
                }
                Visibility::Hidden
            }
        };

        if let Ok((mut target_visibility, _)) = targets.get_mut(target) {
            target_visibility.set_if_neq(visibility);
        }
        if policy == TrackingLossPolicy::HideScene {
            for mut member in scene.iter_mut() {
                member.set_if_neq(visibility);
            }
        }

        if was_tracking != manipulator.is_tracking() {
            debug!(
                "Camera {} tracking: {}",
                update.camera(),
                manipulator.is_tracking()
            );
            changes.write(TrackingChanged {
                camera: update.camera(),
                tracking: manipulator.is_tracking(),
            });
        }
    }
}

/// Handle [`PlaceAtMarker`] requests.
pub fn place_at_marker(
    mut requests: EventReader<PlaceAtMarker>,
    cameras: Query<(&ArManipulator, &GroundPlacement)>,
    mut targets: Query<
        (&mut Transform, &mut Visibility),
        (With<ManipulationTarget>, Without<ArManipulator>),
    >,
) {
    for request in requests.read() {
        let Ok((manipulator, ground)) = cameras.get(request.camera) else {
            continue;
        };
        let Some(marker) = ground.marker() else {
            trace!("No ground marker to place at");
            continue;
        };
        let Ok((mut transform, mut visibility)) = targets.get_mut(manipulator.target()) else {
            continue;
        };
        transform.translation = marker;
        visibility.set_if_neq(Visibility::Inherited);
    }
}
