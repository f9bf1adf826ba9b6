//! A `bevy_ar_manipulator` extension that outlines the target while it is being dragged or pinched,
//! and draws the [`GroundPlacement`] marker. This makes it obvious to users which object their
//! gesture is acting on, and where a placement will land.

use std::f32::consts::FRAC_PI_2;

use bevy_app::prelude::*;
use bevy_color::Color;
use bevy_ecs::prelude::*;
use bevy_gizmos::prelude::*;
use bevy_math::prelude::*;
use bevy_reflect::prelude::*;
use bevy_render::view::Visibility;
use bevy_transform::prelude::*;

use crate::prelude::*;

/// See the [module](self) docs.
pub struct TargetIndicatorPlugin;

impl Plugin for TargetIndicatorPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            PostUpdate,
            draw_indicators.after(bevy_transform::TransformSystem::TransformPropagate),
        )
        .register_type::<TargetIndicator>();
    }
}

/// Optional. Configures whether or not an [`ArManipulator`] should draw indicators. The indicators
/// are enabled if this component is not present.
#[derive(Debug, Component, Reflect)]
pub struct TargetIndicator {
    /// Should the indicators be visible on this camera?
    pub enabled: bool,
}

impl Default for TargetIndicator {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Use gizmos to draw the target outline and the ground marker in world space.
pub fn draw_indicators(
    cameras: Query<(
        &ArManipulator,
        Option<&GroundPlacement>,
        Option<&TargetIndicator>,
    )>,
    targets: Query<(&ManipulationTarget, &GlobalTransform, &Visibility)>,
    mut gizmos: Gizmos,
) {
    for (manipulator, ground, _) in cameras
        .iter()
        .filter(|(.., indicator)| indicator.map(|i| i.enabled).unwrap_or(true))
    {
        if let Some(marker) = ground.and_then(GroundPlacement::marker) {
            let flat = Isometry3d::new(marker, Quat::from_rotation_x(FRAC_PI_2));
            gizmos.circle(flat, 1.0, Color::srgb_u8(0, 0xff, 0x88));
        }

        let manipulating = matches!(
            manipulator.gesture_state(),
            GestureState::Dragging { .. } | GestureState::Pinching { .. }
        );
        if !manipulating {
            continue;
        }
        let Ok((target, transform, visibility)) = targets.get(manipulator.target()) else {
            continue;
        };
        if *visibility == Visibility::Hidden {
            continue;
        }
        let (scale, rotation, translation) = transform.to_scale_rotation_translation();
        gizmos.rect(
            Isometry3d::new(translation, rotation),
            target.base_size * scale.truncate(),
            Color::WHITE,
        );
    }
}
