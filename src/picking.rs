//! Hit testing used to decide whether a pointer press lands on the manipulation target.
//!
//! The gesture recognizer only needs a yes/no answer for a point in normalized device coordinates,
//! so any picking backend can stand in by implementing [`HitTest`] and adding it to the AR camera
//! as a [`TargetHitTest`]. Without one, [`QuadRaycast`] is used: it casts the camera ray through the
//! point against the target's quad.

use bevy_derive::Deref;
use bevy_ecs::prelude::*;
use bevy_math::prelude::*;
use bevy_render::camera::Camera;
use bevy_transform::prelude::*;

/// Answers "is the manipulation target under this point?"
pub trait HitTest {
    /// `ndc` is in normalized device coordinates of the render surface, y up.
    fn raycast_hit(&self, ndc: Vec2) -> bool;
}

impl<F: Fn(Vec2) -> bool> HitTest for F {
    fn raycast_hit(&self, ndc: Vec2) -> bool {
        self(ndc)
    }
}

/// Replaces the built-in [`QuadRaycast`] for the [`ArManipulator`] on the same camera entity.
///
/// [`ArManipulator`]: crate::controller::component::ArManipulator
#[derive(Component, Deref)]
pub struct TargetHitTest(pub Box<dyn HitTest + Send + Sync>);

impl TargetHitTest {
    /// Wrap a hit test backend.
    pub fn new(hit_test: impl HitTest + Send + Sync + 'static) -> Self {
        Self(Box::new(hit_test))
    }
}

/// Raycasts a flat quad of `size` world units, centered on the target's origin in its local XY
/// plane.
#[derive(Debug, Clone, Copy)]
pub struct QuadRaycast<'a> {
    /// The camera that rendered the surface.
    pub camera: &'a Camera,
    /// The camera's world transform.
    pub camera_transform: &'a GlobalTransform,
    /// The target's world transform, including its scale.
    pub target_transform: &'a GlobalTransform,
    /// Unscaled quad size.
    pub size: Vec2,
}

impl HitTest for QuadRaycast<'_> {
    fn raycast_hit(&self, ndc: Vec2) -> bool {
        ndc_ray(self.camera, self.camera_transform, ndc)
            .is_some_and(|ray| ray_hits_quad(ray, self.target_transform, self.size))
    }
}

/// Build the world space ray passing through `ndc`, starting at the near plane.
pub fn ndc_ray(camera: &Camera, camera_transform: &GlobalTransform, ndc: Vec2) -> Option<Ray3d> {
    let near = camera.ndc_to_world(camera_transform, ndc.extend(1.0))?;
    // Using EPSILON because an NDC with Z = 0 returns NaNs.
    let far = camera.ndc_to_world(camera_transform, ndc.extend(f32::EPSILON))?;
    let direction = Dir3::new(far - near).ok()?;
    Some(Ray3d {
        origin: near,
        direction,
    })
}

/// Does `ray` cross the quad? Both faces count as hits.
pub fn ray_hits_quad(ray: Ray3d, quad: &GlobalTransform, size: Vec2) -> bool {
    let plane = InfinitePlane3d {
        normal: quad.back(),
    };
    let Some(distance) = ray.intersect_plane(quad.translation(), plane) else {
        return false;
    };
    let local = quad
        .affine()
        .inverse()
        .transform_point3(ray.get_point(distance));
    let half = size / 2.0;
    local.x.abs() <= half.x && local.y.abs() <= half.y
}
