//! Keeps the manipulation target facing the camera.
//!
//! The target is a flat quad whose front is its local +Z axis, the same as bevy's `Rectangle`
//! mesh. Billboarding turns that axis toward the camera.

use std::str::FromStr;

use bevy_ecs::prelude::*;
use bevy_math::prelude::*;
use bevy_reflect::prelude::*;
use bevy_render::view::Visibility;
use bevy_transform::prelude::*;

use super::component::{ArManipulator, ManipulationTarget};

/// How the target is turned toward the camera each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum BillboardMode {
    /// Track the camera on all axes, so the target always faces the viewer head on.
    #[default]
    Spherical,
    /// Rotate only about the vertical axis, so the target stays upright when the camera tilts.
    Cylindrical,
    /// Leave the orientation alone.
    None,
}

/// Returned when parsing an unknown [`BillboardMode`] name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown billboard mode `{0}`, expected `spherical`, `cylindrical`, or `none`")]
pub struct ParseBillboardModeError(pub String);

impl FromStr for BillboardMode {
    type Err = ParseBillboardModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spherical" => Ok(Self::Spherical),
            "cylindrical" => Ok(Self::Cylindrical),
            "none" => Ok(Self::None),
            _ => Err(ParseBillboardModeError(s.to_owned())),
        }
    }
}

impl BillboardMode {
    /// Turn `target` toward `camera_position`. Orientation is left unchanged when the direction to
    /// the camera is degenerate.
    pub fn orient(self, target: &mut Transform, camera_position: Vec3) {
        let focus = match self {
            Self::Spherical => camera_position,
            Self::Cylindrical => Vec3::new(
                camera_position.x,
                target.translation.y,
                camera_position.z,
            ),
            Self::None => return,
        };
        let to_focus = focus - target.translation;
        if to_focus.length_squared() <= f32::EPSILON {
            return;
        }
        // Forward is -Z, so looking away from the camera puts the front face toward it.
        target.look_to(-to_focus, Vec3::Y);
    }
}

/// Billboarding settings. Can be changed at any time, and take effect on the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct BillboardConfig {
    /// Is billboarding running?
    pub enabled: bool,
    /// The billboarding mode.
    pub mode: BillboardMode,
}

impl Default for BillboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: BillboardMode::Spherical,
        }
    }
}

impl BillboardConfig {
    /// Switch modes. [`BillboardMode::None`] disables billboarding, any other mode enables it.
    pub fn set_mode(&mut self, mode: BillboardMode) {
        self.mode = mode;
        self.enabled = mode != BillboardMode::None;
    }

    /// Will the target be reoriented this frame?
    pub fn is_active(&self) -> bool {
        self.enabled && self.mode != BillboardMode::None
    }
}

/// Reorient every visible target toward its controller's camera.
pub fn orient_targets(
    cameras: Query<(&ArManipulator, &Transform)>,
    mut targets: Query<(&mut Transform, &Visibility), (With<ManipulationTarget>, Without<ArManipulator>)>,
) {
    for (manipulator, camera_transform) in cameras.iter() {
        if !manipulator.billboard.is_active() {
            continue;
        }
        let Ok((mut transform, visibility)) = targets.get_mut(manipulator.target()) else {
            continue;
        };
        if *visibility == Visibility::Hidden {
            continue;
        }
        manipulator
            .billboard
            .mode
            .orient(&mut transform, camera_transform.translation);
    }
}
