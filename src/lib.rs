//! A bevy plugin for manipulating a pose-tracked virtual object in an augmented reality view.
//!
//! The object is typically a chroma-keyed video plane composited over a live camera feed. This
//! crate does not render it. It owns the object's transform: touch and mouse gestures move and
//! scale it, it is turned to face the camera every frame, and its scale is reconciled against hard
//! bounds and a minimum on-screen size.
//!
//! ## Getting started
//!
//! 1. Add [`DefaultArManipulatorPlugins`] to your app.
//! 2. Spawn the object with a [`ManipulationTarget`](crate::controller::component::ManipulationTarget)
//!    component. It stays hidden until tracking starts.
//! 3. Add an [`ArManipulator`](crate::controller::component::ArManipulator) pointing at the target
//!    to your AR camera.
//! 4. Every frame, send the pose from your estimator as a
//!    [`TrackingUpdate`](crate::tracking::TrackingUpdate).
//!
//! ## Gestures
//!
//! - **Touch**: press and hold the object for the long-press duration, then drag to move it in the
//!   camera's view plane. Two fingers pinch to scale.
//! - **Mouse**: press on the object and drag to move it immediately. The wheel scales it.
//!
//! Dragging and pinching are mutually exclusive: a second finger always cancels a pending or active
//! drag and starts a pinch.
//!
//! ## Scale
//!
//! Gestures request a scale, which is clamped to [`ScaleLimits::pinch_min`] and
//! [`ScaleLimits::pinch_max`] and remembered as the user's scale. The scale actually applied is
//! derived from it, clamped to the absolute bounds, and optionally grown with distance or to stay
//! above a minimum on-screen size. See [`ScaleLimits`].
//!
//! [`ScaleLimits`]: crate::controller::scale::ScaleLimits
//! [`ScaleLimits::pinch_min`]: crate::controller::scale::ScaleLimits::pinch_min
//! [`ScaleLimits::pinch_max`]: crate::controller::scale::ScaleLimits::pinch_max

pub mod controller;
pub mod extensions;
pub mod input;
pub mod mirror;
pub mod picking;
pub mod tracking;

use bevy_app::{prelude::*, PluginGroupBuilder};
use bevy_ecs::prelude::*;
use bevy_input::InputSystem;
use bevy_time::{Real, Time};
use bevy_transform::TransformSystem;
use bevy_window::WindowEvent;

use controller::{
    billboard::orient_targets,
    component::{ArManipulator, ManipulationTarget},
    gesture::{HapticPulse, ManipulationEvent},
    scale::{enforce_visibility, ViewMetrics},
};
use input::{normalize_pointer_input, PointerInput, WheelInput};
use mirror::Mirror;
use tracking::{
    apply_tracking_updates, place_at_marker, ArSceneMember, GroundPlacement, PlaceAtMarker,
    TrackingChanged, TrackingUpdate, VideoPlayback,
};

/// Common imports.
pub mod prelude {
    pub use crate::{
        controller::{
            billboard::{BillboardConfig, BillboardMode},
            component::{ArManipulator, ManipulationTarget, ManipulatorSettings},
            gesture::{
                GestureSettings, GestureState, HapticPulse, ManipulationEvent, ManipulationIntent,
            },
            scale::{ScaleLimits, ViewMetrics},
        },
        mirror::Mirror,
        picking::{HitTest, TargetHitTest},
        tracking::{
            ArSceneMember, CameraPose, GroundPlacement, PlaceAtMarker, PoseAdapter, PoseConsumer,
            TrackingChanged, TrackingLossPolicy, TrackingUpdate, VideoPlayback,
        },
        ArManipulatorPlugin, ArSystems, DefaultArManipulatorPlugins,
    };
}

/// Adds [`ArManipulatorPlugin`] and all enabled extensions.
pub struct DefaultArManipulatorPlugins;

impl PluginGroup for DefaultArManipulatorPlugins {
    fn build(self) -> PluginGroupBuilder {
        let group = PluginGroupBuilder::start::<Self>().add(ArManipulatorPlugin);

        #[cfg(feature = "extension_target_indicator")]
        let group = group.add(extensions::target_indicator::TargetIndicatorPlugin);

        group
    }
}

/// The ordered stages of an AR frame.
///
/// Input is handled in [`PreUpdate`], so gestures see this frame's input. The pose, billboard, and
/// scale passes run in [`PostUpdate`], before transform propagation, so the renderer sees the
/// committed transform in the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SystemSet)]
pub enum ArSystems {
    /// Raw input is normalized into pointer events.
    Input,
    /// Gestures are recognized and applied to targets.
    Gesture,
    /// Camera poses and tracking loss are applied.
    Pose,
    /// Targets are turned toward their camera.
    Billboard,
    /// The per-frame scale pass runs.
    Visibility,
    /// Mirrors copy their sources.
    Mirror,
}

/// Adds the AR manipulation systems and events.
pub struct ArManipulatorPlugin;

impl Plugin for ArManipulatorPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<WindowEvent>()
            .add_event::<PointerInput>()
            .add_event::<WheelInput>()
            .add_event::<ManipulationEvent>()
            .add_event::<HapticPulse>()
            .add_event::<TrackingUpdate>()
            .add_event::<TrackingChanged>()
            .add_event::<PlaceAtMarker>()
            .init_resource::<Time<Real>>()
            .configure_sets(
                PreUpdate,
                (ArSystems::Input, ArSystems::Gesture)
                    .chain()
                    .after(InputSystem),
            )
            .configure_sets(
                PostUpdate,
                (
                    ArSystems::Pose,
                    ArSystems::Billboard,
                    ArSystems::Visibility,
                    ArSystems::Mirror,
                )
                    .chain()
                    .before(TransformSystem::TransformPropagate),
            )
            .add_systems(
                PreUpdate,
                (
                    normalize_pointer_input.in_set(ArSystems::Input),
                    ArManipulator::recognize_gestures.in_set(ArSystems::Gesture),
                ),
            )
            .add_systems(
                PostUpdate,
                (
                    (
                        ManipulationTarget::hide_until_tracked,
                        apply_tracking_updates,
                        place_at_marker,
                        ViewMetrics::sync,
                    )
                        .chain()
                        .in_set(ArSystems::Pose),
                    orient_targets.in_set(ArSystems::Billboard),
                    enforce_visibility.in_set(ArSystems::Visibility),
                    Mirror::sync.in_set(ArSystems::Mirror),
                ),
            )
            .register_type::<ArManipulator>()
            .register_type::<ManipulationTarget>()
            .register_type::<ViewMetrics>()
            .register_type::<ArSceneMember>()
            .register_type::<VideoPlayback>()
            .register_type::<GroundPlacement>()
            .register_type::<Mirror>();
    }
}
