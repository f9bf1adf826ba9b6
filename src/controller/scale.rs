//! Provides [`ScaleLimits`], the scale & visibility policy, and the per-frame scale pass.

use bevy_ecs::prelude::*;
use bevy_log::prelude::*;
use bevy_math::prelude::*;
use bevy_reflect::Reflect;
use bevy_render::{
    camera::{Camera, Projection},
    view::Visibility,
};
use bevy_transform::prelude::*;

use super::component::{ArManipulator, ManipulationTarget};

/// The distance compensation multiplier never drops below this, so a target close to the camera
/// shrinks to at most half of the user's scale.
pub const MIN_DISTANCE_COMPENSATION: f32 = 0.5;

/// Bound the target's scale, and configure the corrections that keep it visible.
///
/// There are two sets of bounds. `pinch_min`/`pinch_max` bound what a gesture may *request*,
/// while `absolute_min`/`absolute_max` bound what may ever be *applied*. If the absolute bounds are
/// narrower than the gesture bounds, the absolute bound silently wins.
#[derive(Debug, Clone, PartialEq, Reflect)]
pub struct ScaleLimits {
    /// The smallest scale a pinch, wheel, or [`ArManipulator::set_scale`] call may request.
    pub pinch_min: f32,
    /// The largest scale a pinch, wheel, or [`ArManipulator::set_scale`] call may request.
    pub pinch_max: f32,
    /// The smallest scale that will ever be applied to the target, except by
    /// [`ArManipulator::reset_scale`].
    pub absolute_min: f32,
    /// The largest scale that will ever be applied to the target, except by
    /// [`ArManipulator::reset_scale`].
    pub absolute_max: f32,
    /// When set, the per-frame scale pass grows the target until its projected size on screen is at
    /// least this many physical pixels.
    pub min_visible_pixels: Option<f32>,
    /// Enables the per-frame scale pass, which grows the target as it recedes from the camera and
    /// applies the [`min_visible_pixels`](Self::min_visible_pixels) floor.
    pub compensate_distance: bool,
    /// The camera distance at which distance compensation leaves the user's scale unchanged.
    pub base_distance: f32,
    /// How strongly distance compensation counteracts perspective shrinkage, from `0.0` (not at
    /// all) to `1.0` (scale grows linearly with distance).
    pub compensation_factor: f32,
}

impl Default for ScaleLimits {
    fn default() -> Self {
        Self {
            pinch_min: 0.3,
            pinch_max: 5.0,
            absolute_min: 0.1,
            absolute_max: 10.0,
            min_visible_pixels: Some(100.0),
            compensate_distance: false,
            base_distance: 10.0,
            compensation_factor: 0.5,
        }
    }
}

impl ScaleLimits {
    /// Clamp a requested scale to the gesture bounds. The lower bound wins if the bounds are
    /// inverted.
    pub fn clamp_request(&self, requested: f32) -> f32 {
        requested.min(self.pinch_max).max(self.pinch_min)
    }

    /// Clamp a candidate scale to the hard bounds. The lower bound wins if the bounds are inverted.
    pub fn enforce_scale_limits(&self, candidate: f32) -> f32 {
        candidate.min(self.absolute_max).max(self.absolute_min)
    }

    /// The multiplier applied to the user's scale at `distance` from the camera.
    pub fn distance_compensation(&self, distance: f32) -> f32 {
        if self.base_distance <= 0.0 || !distance.is_finite() {
            return 1.0;
        }
        let compensation = 1.0 + (distance / self.base_distance - 1.0) * self.compensation_factor;
        compensation.max(MIN_DISTANCE_COMPENSATION)
    }

    /// The effective scale for this frame, computed fresh from `user_scale`.
    ///
    /// Distance compensation runs first, then the visible pixel floor reads its output. Both are
    /// clamped to the hard bounds. Because nothing here reads the previously applied scale, calling
    /// this repeatedly with the same inputs always produces the same result.
    pub fn frame_scale(
        &self,
        user_scale: f32,
        distance: f32,
        base_extent: f32,
        view: &ViewMetrics,
    ) -> f32 {
        let mut scale = if self.compensate_distance {
            self.enforce_scale_limits(user_scale * self.distance_compensation(distance))
        } else {
            self.enforce_scale_limits(user_scale)
        };

        if let Some(floor) = self.min_visible_pixels {
            let projected = view.projected_size(base_extent * scale, distance);
            if let Some(projected) = projected.filter(|p| *p > 0.0 && *p < floor) {
                scale = self.enforce_scale_limits(scale * floor / projected);
            }
        }
        scale
    }
}

/// The camera parameters needed to estimate how large the target appears on screen.
///
/// Kept in sync with the camera's perspective [`Projection`] and physical viewport by
/// [`ViewMetrics::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Component, Reflect)]
pub struct ViewMetrics {
    /// Vertical field of view, in radians.
    pub fov: f32,
    /// Height of the render surface, in physical pixels. Zero until known.
    pub viewport_height: f32,
}

impl Default for ViewMetrics {
    fn default() -> Self {
        Self {
            fov: 75f32.to_radians(),
            viewport_height: 0.0,
        }
    }
}

impl ViewMetrics {
    /// Pixels covered by one world unit facing the camera at `distance`.
    pub fn pixels_per_unit_at(&self, distance: f32) -> Option<f32> {
        let focal = self.viewport_height / (2.0 * (self.fov / 2.0).tan());
        let pixels = focal / distance;
        (self.viewport_height > 0.0 && distance > f32::EPSILON && pixels.is_finite())
            .then_some(pixels)
    }

    /// Approximate on-screen size, in pixels, of an object `world_size` units across at
    /// `distance` from the camera.
    pub fn projected_size(&self, world_size: f32, distance: f32) -> Option<f32> {
        self.pixels_per_unit_at(distance).map(|ppu| world_size * ppu)
    }

    /// Copy the field of view and viewport height of each camera into its [`ViewMetrics`].
    pub fn sync(mut cameras: Query<(&Camera, &Projection, &mut ViewMetrics)>) {
        for (camera, projection, mut metrics) in cameras.iter_mut() {
            let Projection::Perspective(perspective) = projection else {
                warn_once!("The visible pixel floor requires a perspective projection.");
                continue;
            };
            let Some(size) = camera.physical_viewport_size() else {
                continue;
            };
            metrics.set_if_neq(ViewMetrics {
                fov: perspective.fov,
                viewport_height: size.y as f32,
            });
        }
    }
}

/// Run the per-frame scale pass on every visible target whose controller has distance compensation
/// enabled.
pub fn enforce_visibility(
    cameras: Query<(&ArManipulator, &Transform, &ViewMetrics)>,
    mut targets: Query<(&ManipulationTarget, &mut Transform, &Visibility), Without<ArManipulator>>,
) {
    for (manipulator, camera_transform, metrics) in cameras.iter() {
        let limits = &manipulator.settings().scale;
        if !limits.compensate_distance {
            continue;
        }
        let Ok((target, mut transform, visibility)) = targets.get_mut(manipulator.target()) else {
            continue;
        };
        if *visibility == Visibility::Hidden {
            continue;
        }
        let distance = camera_transform.translation.distance(transform.translation);
        let scale = limits.frame_scale(
            target.user_scale(),
            distance,
            target.base_extent(),
            metrics,
        );
        if transform.scale != Vec3::splat(scale) {
            trace!("Frame scale {scale} at distance {distance}");
            transform.scale = Vec3::splat(scale);
        }
    }
}
