//! The primary [`Component`]s of the controller, [`ArManipulator`] and [`ManipulationTarget`].

use bevy_ecs::prelude::*;
use bevy_log::prelude::*;
use bevy_math::prelude::*;
use bevy_reflect::prelude::*;
use bevy_render::{camera::Camera, view::Visibility};
use bevy_time::{Real, Time};
use bevy_transform::prelude::*;

use super::{
    billboard::{BillboardConfig, BillboardMode},
    gesture::{
        wheel_scale_request, GestureRecognizer, GestureSettings, GestureState, HapticPulse,
        ManipulationEvent, ManipulationIntent,
    },
    scale::{ScaleLimits, ViewMetrics},
};
use crate::{
    input::{screen_to_ndc, PointerInput, PointerPhase, PointerSample, PointerTracker, WheelInput},
    picking::{HitTest, QuadRaycast, TargetHitTest},
    tracking::TrackingLossPolicy,
};

/// Immutable tunables of an [`ArManipulator`], fixed at construction.
#[derive(Debug, Clone, PartialEq, Default, Reflect)]
pub struct ManipulatorSettings {
    /// Long-press timing, haptics, and drag speed.
    pub gesture: GestureSettings,
    /// Scale bounds and visibility corrections.
    pub scale: ScaleLimits,
    /// What is hidden when camera tracking is lost.
    pub tracking_loss: TrackingLossPolicy,
}

/// The single object the user can manipulate.
///
/// Its position is the entity's [`Transform::translation`], its effective scale is the uniform
/// [`Transform::scale`], and its visibility is the entity's [`Visibility`]. The target is hidden
/// until its controller receives the first camera pose.
#[derive(Debug, Clone, PartialEq, Component, Reflect)]
#[require(Transform, Visibility)]
pub struct ManipulationTarget {
    user_scale: f32,
    /// Size of the unscaled quad in world units.
    pub base_size: Vec2,
}

impl Default for ManipulationTarget {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ManipulationTarget {
    /// A 3 by 2 unit quad the user intends to see at `user_scale`.
    pub fn new(user_scale: f32) -> Self {
        Self {
            user_scale,
            base_size: Vec2::new(3.0, 2.0),
        }
    }

    /// Use a different quad size.
    pub fn with_base_size(self, base_size: Vec2) -> Self {
        Self { base_size, ..self }
    }

    /// The scale the user last explicitly asked for. The applied scale may differ because of
    /// clamping or visibility corrections.
    pub fn user_scale(&self) -> f32 {
        self.user_scale
    }

    /// The largest side of the unscaled quad, used to estimate on-screen size.
    pub fn base_extent(&self) -> f32 {
        self.base_size.max_element()
    }

    /// Hide newly spawned targets until tracking starts.
    pub fn hide_until_tracked(mut targets: Query<&mut Visibility, Added<ManipulationTarget>>) {
        for mut visibility in targets.iter_mut() {
            *visibility = Visibility::Hidden;
        }
    }
}

/// Tracks all state of an AR view's object controller: its settings, gesture state, billboarding,
/// and whether the camera is currently tracked.
///
/// Add this to the AR camera entity. The camera's [`Transform`] is driven by
/// [`TrackingUpdate`](crate::tracking::TrackingUpdate) events, and pointer input on the camera's
/// viewport manipulates [`ArManipulator::target`].
///
/// # Manipulating the target manually
///
/// The plugin wires touch, mouse, and wheel input automatically. Presses are hit-tested against the
/// target's quad, or against a [`TargetHitTest`] on the same entity when there is one. To move the
/// target from code, use [`ArManipulator::apply_drag`], [`ArManipulator::set_scale`], and
/// [`ArManipulator::reset_scale`] with the target's components.
#[derive(Debug, Clone, Reflect, Component)]
#[require(Transform, ViewMetrics, PointerTracker)]
pub struct ArManipulator {
    /// How the target is turned toward the camera. May be changed at any time.
    pub billboard: BillboardConfig,
    target: Entity,
    settings: ManipulatorSettings,
    gestures: GestureRecognizer,
    tracking: bool,
}

impl ArManipulator {
    /// Create a controller for `target`.
    pub fn new(target: Entity, settings: ManipulatorSettings) -> Self {
        Self {
            billboard: BillboardConfig::default(),
            gestures: GestureRecognizer::new(settings.gesture.long_press),
            target,
            settings,
            tracking: false,
        }
    }

    /// Start with a billboard mode other than the default spherical mode.
    pub fn with_billboard_mode(mut self, mode: BillboardMode) -> Self {
        self.billboard.set_mode(mode);
        self
    }

    /// The manipulated entity.
    pub fn target(&self) -> Entity {
        self.target
    }

    /// The settings this controller was built with.
    pub fn settings(&self) -> &ManipulatorSettings {
        &self.settings
    }

    /// The current gesture.
    pub fn gesture_state(&self) -> GestureState {
        self.gestures.state()
    }

    /// The gesture recognizer, for feeding pointer input manually.
    pub fn gestures_mut(&mut self) -> &mut GestureRecognizer {
        &mut self.gestures
    }

    /// Is a camera pose currently being tracked?
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub(crate) fn set_tracking(&mut self, tracking: bool) {
        self.tracking = tracking;
    }

    /// Switch the billboard mode. Takes effect on the next frame.
    pub fn set_billboard_mode(&mut self, mode: BillboardMode) {
        self.billboard.set_mode(mode);
    }

    /// Switch the billboard mode by name (`spherical`, `cylindrical`, or `none`). Unknown names are
    /// ignored and the current mode is kept. Returns whether the mode was accepted.
    pub fn set_billboard_mode_named(&mut self, name: &str) -> bool {
        match name.parse() {
            Ok(mode) => {
                self.set_billboard_mode(mode);
                true
            }
            Err(error) => {
                warn!("{error}");
                false
            }
        }
    }

    /// Move the target in the camera's view plane by a screen space delta.
    ///
    /// The delta is scaled by the target's depth in front of the camera, so on-screen drag speed
    /// stays consistent regardless of how far away the target is. Position is never clamped.
    pub fn apply_drag(&self, delta: Vec2, camera: &Transform, target: &mut Transform) {
        let view_depth = (target.translation - camera.translation).dot(*camera.forward());
        let depth = view_depth * self.settings.gesture.move_sensitivity;
        target.translation +=
            *camera.right() * delta.x * depth - *camera.up() * delta.y * depth;
    }

    /// Apply a gesture's scale request: clamp it to the gesture bounds, store it as the user's
    /// scale, then commit it through the hard bounds. Non-finite requests are ignored.
    pub fn apply_scale_request(
        &self,
        requested: f32,
        target: &mut ManipulationTarget,
        transform: &mut Transform,
    ) {
        if !requested.is_finite() {
            trace!("Ignoring non-finite scale request");
            return;
        }
        let limits = &self.settings.scale;
        target.user_scale = limits.clamp_request(requested);
        transform.scale = Vec3::splat(limits.enforce_scale_limits(target.user_scale));
    }

    /// Set the user's scale from code. Goes through the same bounds as a pinch.
    pub fn set_scale(&self, value: f32, target: &mut ManipulationTarget, transform: &mut Transform) {
        self.apply_scale_request(value, target, transform);
    }

    /// Reset to scale `1.0`.
    ///
    /// Unlike [`ArManipulator::set_scale`], this applies exactly `1.0` without consulting the hard
    /// bounds, even when `1.0` lies outside them.
    pub fn reset_scale(&self, target: &mut ManipulationTarget, transform: &mut Transform) {
        target.user_scale = 1.0;
        transform.scale = Vec3::ONE;
    }

    /// Apply a recognized intent to the target.
    pub fn apply_intent(
        &self,
        intent: ManipulationIntent,
        camera: &Transform,
        target: &mut ManipulationTarget,
        transform: &mut Transform,
    ) {
        match intent {
            ManipulationIntent::DragDelta(delta) => self.apply_drag(delta, camera, transform),
            ManipulationIntent::PinchScale(requested) | ManipulationIntent::WheelScale(requested) => {
                self.apply_scale_request(requested, target, transform)
            }
            _ => (),
        }
    }

    /// Feed pointer and wheel input through each controller's gesture recognizer, and apply the
    /// resulting intents to its target. Also fires long-presses whose deadline has passed.
    pub fn recognize_gestures(
        mut pointer_inputs: EventReader<PointerInput>,
        mut wheel_inputs: EventReader<WheelInput>,
        mut cameras: Query<(
            Entity,
            &mut ArManipulator,
            Option<&Camera>,
            Option<&TargetHitTest>,
            &Transform,
            &GlobalTransform,
        )>,
        mut targets: Query<
            (&mut ManipulationTarget, &mut Transform, &GlobalTransform),
            Without<ArManipulator>,
        >,
        mut intents: EventWriter<ManipulationEvent>,
        mut haptics: EventWriter<HapticPulse>,
        time: Res<Time<Real>>,
    ) {
        let mut out = Vec::new();

        for input in pointer_inputs.read() {
            let Ok((_, mut manipulator, camera, hit_test, camera_transform, camera_global)) =
                cameras.get_mut(input.camera)
            else {
                continue;
            };
            let Ok((mut target, mut transform, target_global)) =
                targets.get_mut(manipulator.target)
            else {
                warn_once!("ArManipulator target {} does not exist", manipulator.target);
                continue;
            };

            // Deadlines that passed before this input fire first.
            manipulator.gestures.poll(input.timestamp, &mut out);
            let current_scale = transform.scale.x;
            let base_size = target.base_size;
            let gestures = &mut manipulator.gestures;
            match input.phase {
                PointerPhase::Down => {
                    let on_target = |sample: &PointerSample| {
                        let Some(ndc) = screen_to_ndc(sample.position, input.surface) else {
                            return false;
                        };
                        match (hit_test, camera) {
                            (Some(hit_test), _) => hit_test.raycast_hit(ndc),
                            (None, Some(camera)) => QuadRaycast {
                                camera,
                                camera_transform: camera_global,
                                target_transform: target_global,
                                size: base_size,
                            }
                            .raycast_hit(ndc),
                            (None, None) => false,
                        }
                    };
                    gestures.pointer_down(&input.contacts, on_target, current_scale, &mut out);
                }
                PointerPhase::Move => gestures.pointer_move(input.device, &input.contacts, &mut out),
                PointerPhase::Up => gestures.pointer_up(input.device, &input.contacts, &mut out),
            }

            manipulator.dispatch(
                input.camera,
                &mut out,
                camera_transform,
                &mut target,
                &mut transform,
                &mut intents,
                &mut haptics,
            );
        }

        for wheel in wheel_inputs.read() {
            let Ok((_, manipulator, _, _, camera_transform, _)) = cameras.get_mut(wheel.camera)
            else {
                continue;
            };
            let Ok((mut target, mut transform, _)) = targets.get_mut(manipulator.target) else {
                continue;
            };
            let requested = wheel_scale_request(transform.scale.x, wheel.delta_y);
            out.push(ManipulationIntent::WheelScale(requested));
            manipulator.dispatch(
                wheel.camera,
                &mut out,
                camera_transform,
                &mut target,
                &mut transform,
                &mut intents,
                &mut haptics,
            );
        }

        let now = time.elapsed();
        for (camera_entity, mut manipulator, _, _, camera_transform, _) in cameras.iter_mut() {
            if !manipulator.gestures.is_long_press_armed() {
                continue;
            }
            manipulator.gestures.poll(now, &mut out);
            if out.is_empty() {
                continue;
            }
            let Ok((mut target, mut transform, _)) = targets.get_mut(manipulator.target) else {
                out.clear();
                continue;
            };
            manipulator.dispatch(
                camera_entity,
                &mut out,
                camera_transform,
                &mut target,
                &mut transform,
                &mut intents,
                &mut haptics,
            );
        }
    }

    fn dispatch(
        &self,
        camera_entity: Entity,
        out: &mut Vec<ManipulationIntent>,
        camera: &Transform,
        target: &mut ManipulationTarget,
        transform: &mut Transform,
        intents: &mut EventWriter<ManipulationEvent>,
        haptics: &mut EventWriter<HapticPulse>,
    ) {
        for intent in out.drain(..) {
            trace!("{intent:?}");
            self.apply_intent(intent, camera, target, transform);
            if intent == ManipulationIntent::LongPress {
                haptics.write(HapticPulse {
                    duration: self.settings.gesture.haptic_pulse,
                });
            }
            intents.write(ManipulationEvent {
                camera: camera_entity,
                intent,
            });
        }
    }
}
