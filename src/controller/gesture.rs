//! The gesture state machine that turns normalized pointer samples into [`ManipulationIntent`]s.
//!
//! | State        | Input                      | Emits                     | Next         |
//! |--------------|----------------------------|---------------------------|--------------|
//! | `Idle`       | touch down(1) on target    | arms long-press           | `PendingTap` |
//! | `Idle`       | mouse down on target       | `BeginDrag`               | `Dragging`   |
//! | `PendingTap` | long-press deadline passes | `LongPress`, `BeginDrag`  | `Dragging`   |
//! | `PendingTap` | move(1)                    | nothing                   | `PendingTap` |
//! | any          | down(2)                    | (`EndDrag`), `BeginPinch` | `Pinching`   |
//! | `PendingTap` | up(all)                    | nothing                   | `Idle`       |
//! | `Dragging`   | move(1)                    | `DragDelta`               | `Dragging`   |
//! | `Dragging`   | up(all)                    | `EndDrag`                 | `Idle`       |
//! | `Pinching`   | move(2)                    | `PinchScale`              | `Pinching`   |
//! | `Pinching`   | up(<2)                     | `EndPinch`                | `Idle`       |
//!
//! Moves and releases only count when they come from the device that owns the gesture: the mouse
//! for a mouse drag, touch for everything else.
//!
//! Wheel input does not pass through the state machine, see [`wheel_scale_request`].

use std::time::Duration;

use bevy_ecs::prelude::*;
use bevy_log::prelude::*;
use bevy_math::prelude::*;
use bevy_reflect::prelude::*;

use crate::input::{PointerDevice, PointerSample};

/// Scale multiplier for one wheel tick scrolling toward the user.
pub const WHEEL_SHRINK: f32 = 0.9;
/// Scale multiplier for one wheel tick scrolling away from the user.
pub const WHEEL_GROW: f32 = 1.1;

/// Tunables for gesture recognition and dragging.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct GestureSettings {
    /// Drag speed. Screen space deltas are multiplied by this and by the target's view depth.
    pub move_sensitivity: f32,
    /// How long a finger must rest on the target before a drag begins.
    pub long_press: Duration,
    /// Duration of the [`HapticPulse`] requested when a long-press fires.
    pub haptic_pulse: Duration,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            move_sensitivity: 0.0017,
            long_press: Duration::from_millis(300),
            haptic_pulse: Duration::from_millis(50),
        }
    }
}

/// The current state of the gesture recognizer. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Reflect)]
pub enum GestureState {
    /// No gesture in progress.
    #[default]
    Idle,
    /// A single finger is resting on the target, waiting for the long-press deadline.
    PendingTap {
        /// Where the finger went down.
        start: Vec2,
    },
    /// The target follows a single pointer.
    Dragging {
        /// The position drag deltas are measured from.
        last: Vec2,
        /// The device whose pointer is being followed.
        device: PointerDevice,
    },
    /// Two fingers are scaling the target.
    Pinching {
        /// Finger separation when the pinch began, in logical pixels.
        initial_distance: f32,
        /// The target's effective scale when the pinch began.
        initial_scale: f32,
    },
}

/// A discrete manipulation produced by the gesture recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub enum ManipulationIntent {
    /// The long-press deadline passed while a finger rested on the target.
    LongPress,
    /// The target starts following a single pointer.
    BeginDrag,
    /// The pointer moved by this many logical pixels since the last drag sample.
    DragDelta(Vec2),
    /// The drag ended.
    EndDrag,
    /// A two finger pinch started.
    BeginPinch {
        /// Finger separation, in logical pixels.
        initial_distance: f32,
        /// The target's effective scale.
        initial_scale: f32,
    },
    /// The pinch requests this scale, before any clamping.
    PinchScale(f32),
    /// The pinch ended.
    EndPinch,
    /// A wheel tick requests this scale, before any clamping.
    WheelScale(f32),
}

impl ManipulationIntent {
    /// The scale this intent requests, if it is a scale request.
    pub fn requested_scale(&self) -> Option<f32> {
        match self {
            Self::PinchScale(scale) | Self::WheelScale(scale) => Some(*scale),
            _ => None,
        }
    }
}

/// Sent for every [`ManipulationIntent`] the recognizer produces, after the controller has applied
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Event)]
pub struct ManipulationEvent {
    /// The camera whose controller recognized the gesture.
    pub camera: Entity,
    /// What was recognized.
    pub intent: ManipulationIntent,
}

/// Sent when a long-press fires, for hosts that can vibrate the device.
#[derive(Debug, Clone, Copy, PartialEq, Event)]
pub struct HapticPulse {
    /// How long to vibrate.
    pub duration: Duration,
}

/// Disambiguates pointer input into a single manipulation at a time.
///
/// The long-press timer is a deadline polled with [`GestureRecognizer::poll`]. It is cleared
/// whenever a competing event arrives, so a stale long-press can never fire.
#[derive(Debug, Clone, Default, Reflect)]
pub struct GestureRecognizer {
    state: GestureState,
    long_press_deadline: Option<Duration>,
    long_press: Duration,
}

impl GestureRecognizer {
    /// Create an idle recognizer that arms long-presses for `long_press`.
    pub fn new(long_press: Duration) -> Self {
        Self {
            long_press,
            ..Default::default()
        }
    }

    /// The current state.
    pub fn state(&self) -> GestureState {
        self.state
    }

    /// Is a long-press waiting to fire?
    pub fn is_long_press_armed(&self) -> bool {
        self.long_press_deadline.is_some()
    }

    /// Drop a pending long-press.
    pub fn cancel_long_press(&mut self) {
        if self.long_press_deadline.take().is_some() {
            trace!("Long-press cancelled");
        }
    }

    /// Fire the long-press if its deadline is at or before `now`.
    pub fn poll(&mut self, now: Duration, out: &mut Vec<ManipulationIntent>) {
        let GestureState::PendingTap { start } = self.state else {
            return;
        };
        if self.long_press_deadline.is_some_and(|deadline| now >= deadline) {
            self.long_press_deadline = None;
            self.state = GestureState::Dragging {
                last: start,
                device: PointerDevice::Touch,
            };
            debug!("Long-press fired, dragging");
            out.extend([ManipulationIntent::LongPress, ManipulationIntent::BeginDrag]);
        }
    }

    /// A pointer went down. `contacts` are all active contacts after the change. `on_target` is
    /// only called when a press could start a drag.
    pub fn pointer_down(
        &mut self,
        contacts: &[PointerSample],
        on_target: impl FnOnce(&PointerSample) -> bool,
        current_scale: f32,
        out: &mut Vec<ManipulationIntent>,
    ) {
        match contacts {
            [first] if self.state == GestureState::Idle => {
                if !on_target(first) {
                    return;
                }
                match first.device {
                    PointerDevice::Mouse => {
                        self.state = GestureState::Dragging {
                            last: first.position,
                            device: PointerDevice::Mouse,
                        };
                        debug!("Mouse drag started");
                        out.push(ManipulationIntent::BeginDrag);
                    }
                    PointerDevice::Touch => {
                        self.state = GestureState::PendingTap {
                            start: first.position,
                        };
                        self.long_press_deadline = Some(first.timestamp + self.long_press);
                        trace!("Long-press armed");
                    }
                }
            }
            [first, second] => {
                self.cancel_long_press();
                if let GestureState::Dragging { .. } = self.state {
                    out.push(ManipulationIntent::EndDrag);
                }
                let initial_distance = first.position.distance(second.position);
                self.state = GestureState::Pinching {
                    initial_distance,
                    initial_scale: current_scale,
                };
                debug!("Pinch started at {initial_distance}px, scale {current_scale}");
                out.push(ManipulationIntent::BeginPinch {
                    initial_distance,
                    initial_scale: current_scale,
                });
            }
            _ => (),
        }
    }

    /// The device driving the current gesture, if any. Touch owns pending taps and pinches.
    pub fn owner(&self) -> Option<PointerDevice> {
        match self.state {
            GestureState::Idle => None,
            GestureState::PendingTap { .. } | GestureState::Pinching { .. } => {
                Some(PointerDevice::Touch)
            }
            GestureState::Dragging { device, .. } => Some(device),
        }
    }

    /// A pointer of `device` moved. `contacts` are all active contacts of that device. Movement of
    /// a device that does not own the current gesture is ignored.
    pub fn pointer_move(
        &mut self,
        device: PointerDevice,
        contacts: &[PointerSample],
        out: &mut Vec<ManipulationIntent>,
    ) {
        if self.owner() != Some(device) {
            return;
        }
        match (self.state, contacts) {
            (GestureState::Dragging { last, device }, [pointer]) => {
                let delta = pointer.position - last;
                self.state = GestureState::Dragging {
                    last: pointer.position,
                    device,
                };
                if delta != Vec2::ZERO {
                    out.push(ManipulationIntent::DragDelta(delta));
                }
            }
            (
                GestureState::Pinching {
                    initial_distance,
                    initial_scale,
                },
                [first, second],
            ) => {
                if initial_distance < f32::EPSILON {
                    return;
                }
                let distance = first.position.distance(second.position);
                out.push(ManipulationIntent::PinchScale(
                    initial_scale * distance / initial_distance,
                ));
            }
            // Movement while waiting for the long-press neither cancels it nor moves the drag
            // origin.
            _ => (),
        }
    }

    /// A pointer of `device` went up. `remaining` are the contacts of that device still active.
    /// Releases of a device that does not own the current gesture are ignored.
    pub fn pointer_up(
        &mut self,
        device: PointerDevice,
        remaining: &[PointerSample],
        out: &mut Vec<ManipulationIntent>,
    ) {
        if self.owner() != Some(device) {
            return;
        }
        self.cancel_long_press();
        match self.state {
            GestureState::PendingTap { .. } if remaining.is_empty() => {
                self.state = GestureState::Idle;
            }
            GestureState::Dragging { .. } if remaining.is_empty() => {
                self.state = GestureState::Idle;
                debug!("Drag ended");
                out.push(ManipulationIntent::EndDrag);
            }
            GestureState::Pinching { .. } if remaining.len() < 2 => {
                self.state = GestureState::Idle;
                debug!("Pinch ended");
                out.push(ManipulationIntent::EndPinch);
            }
            _ => (),
        }
    }
}

/// The scale requested by a single wheel tick. Positive `delta_y` (scrolling toward the user)
/// shrinks, anything else grows.
pub fn wheel_scale_request(current_scale: f32, delta_y: f32) -> f32 {
    current_scale * if delta_y > 0.0 { WHEEL_SHRINK } else { WHEEL_GROW }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_PRESS: Duration = Duration::from_millis(300);

    fn touch(id: u64, x: f32, y: f32, ms: u64) -> PointerSample {
        PointerSample {
            id,
            position: Vec2::new(x, y),
            timestamp: Duration::from_millis(ms),
            device: PointerDevice::Touch,
        }
    }

    fn mouse(x: f32, y: f32) -> PointerSample {
        PointerSample {
            device: PointerDevice::Mouse,
            ..touch(0, x, y, 0)
        }
    }

    fn hit(_: &PointerSample) -> bool {
        true
    }

    fn miss(_: &PointerSample) -> bool {
        false
    }

    fn pending() -> GestureRecognizer {
        let mut recognizer = GestureRecognizer::new(LONG_PRESS);
        let mut out = Vec::new();
        recognizer.pointer_down(&[touch(1, 10.0, 10.0, 0)], hit, 1.0, &mut out);
        assert!(out.is_empty());
        recognizer
    }

    fn dragging() -> GestureRecognizer {
        let mut recognizer = pending();
        recognizer.poll(Duration::from_millis(300), &mut Vec::new());
        recognizer
    }

    #[test]
    fn touch_down_on_target_arms_long_press() {
        let recognizer = pending();
        assert_eq!(
            recognizer.state(),
            GestureState::PendingTap {
                start: Vec2::new(10.0, 10.0)
            }
        );
        assert!(recognizer.is_long_press_armed());
    }

    #[test]
    fn touch_down_off_target_stays_idle() {
        let mut recognizer = GestureRecognizer::new(LONG_PRESS);
        let mut out = Vec::new();
        recognizer.pointer_down(&[touch(1, 10.0, 10.0, 0)], miss, 1.0, &mut out);
        assert_eq!(recognizer.state(), GestureState::Idle);
        assert!(!recognizer.is_long_press_armed());
    }

    #[test]
    fn long_press_fires_only_after_its_duration() {
        let mut recognizer = pending();
        let mut out = Vec::new();
        recognizer.poll(Duration::from_millis(299), &mut out);
        assert!(out.is_empty());
        recognizer.poll(Duration::from_millis(300), &mut out);
        assert_eq!(
            out,
            vec![ManipulationIntent::LongPress, ManipulationIntent::BeginDrag]
        );
        assert!(matches!(recognizer.state(), GestureState::Dragging { .. }));
        out.clear();
        recognizer.poll(Duration::from_millis(900), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn second_finger_cancels_pending_long_press() {
        let mut recognizer = pending();
        let mut out = Vec::new();
        recognizer.pointer_down(
            &[touch(1, 10.0, 10.0, 0), touch(2, 110.0, 10.0, 100)],
            hit,
            1.0,
            &mut out,
        );
        assert!(!recognizer.is_long_press_armed());
        for ms in [150, 300, 1000, 10_000] {
            recognizer.poll(Duration::from_millis(ms), &mut out);
        }
        assert!(!out.contains(&ManipulationIntent::BeginDrag));
        assert_eq!(
            out,
            vec![ManipulationIntent::BeginPinch {
                initial_distance: 100.0,
                initial_scale: 1.0
            }]
        );
    }

    #[test]
    fn lifting_the_finger_cancels_pending_long_press() {
        let mut recognizer = pending();
        let mut out = Vec::new();
        recognizer.pointer_up(PointerDevice::Touch, &[], &mut out);
        recognizer.poll(Duration::from_millis(1000), &mut out);
        assert!(out.is_empty());
        assert_eq!(recognizer.state(), GestureState::Idle);
    }

    #[test]
    fn movement_while_pending_is_ignored() {
        let mut recognizer = pending();
        let mut out = Vec::new();
        recognizer.pointer_move(PointerDevice::Touch, &[touch(1, 50.0, 80.0, 100)], &mut out);
        assert!(out.is_empty());
        assert!(recognizer.is_long_press_armed());
        assert_eq!(
            recognizer.state(),
            GestureState::PendingTap {
                start: Vec2::new(10.0, 10.0)
            }
        );
    }

    #[test]
    fn first_drag_delta_is_measured_from_the_press() {
        let mut recognizer = dragging();
        let mut out = Vec::new();
        recognizer.pointer_move(PointerDevice::Touch, &[touch(1, 15.0, 30.0, 400)], &mut out);
        recognizer.pointer_move(PointerDevice::Touch, &[touch(1, 16.0, 29.0, 416)], &mut out);
        assert_eq!(
            out,
            vec![
                ManipulationIntent::DragDelta(Vec2::new(5.0, 20.0)),
                ManipulationIntent::DragDelta(Vec2::new(1.0, -1.0)),
            ]
        );
    }

    #[test]
    fn drag_ends_when_all_pointers_lift() {
        let mut recognizer = dragging();
        let mut out = Vec::new();
        recognizer.pointer_up(PointerDevice::Touch, &[], &mut out);
        assert_eq!(out, vec![ManipulationIntent::EndDrag]);
        assert_eq!(recognizer.state(), GestureState::Idle);
    }

    #[test]
    fn second_finger_turns_a_drag_into_a_pinch() {
        let mut recognizer = dragging();
        let mut out = Vec::new();
        recognizer.pointer_down(
            &[touch(1, 0.0, 0.0, 500), touch(2, 0.0, 50.0, 500)],
            miss,
            2.0,
            &mut out,
        );
        assert_eq!(
            out,
            vec![
                ManipulationIntent::EndDrag,
                ManipulationIntent::BeginPinch {
                    initial_distance: 50.0,
                    initial_scale: 2.0
                },
            ]
        );
    }

    #[test]
    fn pinch_requests_scale_relative_to_initial_distance() {
        let mut recognizer = GestureRecognizer::new(LONG_PRESS);
        let mut out = Vec::new();
        recognizer.pointer_down(
            &[touch(1, 0.0, 0.0, 0), touch(2, 100.0, 0.0, 0)],
            miss,
            1.0,
            &mut out,
        );
        out.clear();
        recognizer.pointer_move(PointerDevice::Touch, &[touch(1, 0.0, 0.0, 16), touch(2, 1000.0, 0.0, 16)], &mut out);
        assert_eq!(out, vec![ManipulationIntent::PinchScale(10.0)]);
    }

    #[test]
    fn pinch_ends_when_a_finger_lifts() {
        let mut recognizer = GestureRecognizer::new(LONG_PRESS);
        let mut out = Vec::new();
        recognizer.pointer_down(
            &[touch(1, 0.0, 0.0, 0), touch(2, 100.0, 0.0, 0)],
            miss,
            1.0,
            &mut out,
        );
        out.clear();
        recognizer.pointer_up(PointerDevice::Touch, &[touch(1, 0.0, 0.0, 20)], &mut out);
        assert_eq!(out, vec![ManipulationIntent::EndPinch]);
        recognizer.pointer_move(PointerDevice::Touch, &[touch(1, 40.0, 0.0, 30)], &mut out);
        assert_eq!(out, vec![ManipulationIntent::EndPinch]);
    }

    #[test]
    fn coincident_fingers_do_not_request_a_scale() {
        let mut recognizer = GestureRecognizer::new(LONG_PRESS);
        let mut out = Vec::new();
        recognizer.pointer_down(
            &[touch(1, 5.0, 5.0, 0), touch(2, 5.0, 5.0, 0)],
            miss,
            1.0,
            &mut out,
        );
        out.clear();
        recognizer.pointer_move(PointerDevice::Touch, &[touch(1, 0.0, 0.0, 16), touch(2, 50.0, 0.0, 16)], &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn mouse_drags_without_long_press() {
        let mut recognizer = GestureRecognizer::new(LONG_PRESS);
        let mut out = Vec::new();
        recognizer.pointer_down(&[mouse(10.0, 10.0)], hit, 1.0, &mut out);
        assert_eq!(out, vec![ManipulationIntent::BeginDrag]);
        assert!(!recognizer.is_long_press_armed());
        out.clear();
        recognizer.pointer_move(PointerDevice::Mouse, &[mouse(20.0, 5.0)], &mut out);
        recognizer.pointer_up(PointerDevice::Mouse, &[], &mut out);
        assert_eq!(
            out,
            vec![
                ManipulationIntent::DragDelta(Vec2::new(10.0, -5.0)),
                ManipulationIntent::EndDrag
            ]
        );
    }

    #[test]
    fn hit_test_only_runs_when_a_drag_could_start() {
        let mut recognizer = dragging();
        let mut out = Vec::new();
        recognizer.pointer_down(
            &[touch(3, 0.0, 0.0, 0)],
            |_| panic!("no hit test while dragging"),
            1.0,
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn empty_contact_lists_are_no_ops() {
        let mut recognizer = GestureRecognizer::new(LONG_PRESS);
        let mut out = Vec::new();
        recognizer.pointer_down(&[], hit, 1.0, &mut out);
        recognizer.pointer_move(PointerDevice::Touch, &[], &mut out);
        recognizer.pointer_up(PointerDevice::Touch, &[], &mut out);
        assert!(out.is_empty());
        assert_eq!(recognizer.state(), GestureState::Idle);
    }

    #[test]
    fn touches_during_a_mouse_drag_are_ignored() {
        let mut recognizer = GestureRecognizer::new(LONG_PRESS);
        let mut out = Vec::new();
        recognizer.pointer_down(&[mouse(10.0, 10.0)], hit, 1.0, &mut out);
        let finger = touch(1, 500.0, 400.0, 10);
        recognizer.pointer_down(&[finger], hit, 1.0, &mut out);
        recognizer.pointer_move(PointerDevice::Touch, &[touch(1, 501.0, 400.0, 20)], &mut out);
        recognizer.pointer_up(PointerDevice::Touch, &[], &mut out);
        assert_eq!(out, vec![ManipulationIntent::BeginDrag]);
        assert_eq!(recognizer.owner(), Some(PointerDevice::Mouse));

        recognizer.pointer_move(PointerDevice::Mouse, &[mouse(12.0, 10.0)], &mut out);
        assert_eq!(out[1], ManipulationIntent::DragDelta(Vec2::new(2.0, 0.0)));
    }

    #[test]
    fn mouse_release_does_not_cancel_a_touch_long_press() {
        let mut recognizer = pending();
        let mut out = Vec::new();
        recognizer.pointer_move(PointerDevice::Mouse, &[mouse(300.0, 300.0)], &mut out);
        recognizer.pointer_up(PointerDevice::Mouse, &[], &mut out);
        assert!(recognizer.is_long_press_armed());
        recognizer.poll(LONG_PRESS, &mut out);
        assert_eq!(
            out,
            vec![ManipulationIntent::LongPress, ManipulationIntent::BeginDrag]
        );
        assert_eq!(recognizer.owner(), Some(PointerDevice::Touch));
    }

    #[test]
    fn mouse_release_does_not_end_a_pinch() {
        let mut recognizer = GestureRecognizer::new(LONG_PRESS);
        let mut out = Vec::new();
        recognizer.pointer_down(
            &[touch(1, 0.0, 0.0, 0), touch(2, 100.0, 0.0, 0)],
            miss,
            1.0,
            &mut out,
        );
        out.clear();
        recognizer.pointer_up(PointerDevice::Mouse, &[], &mut out);
        assert!(out.is_empty());
        assert!(matches!(recognizer.state(), GestureState::Pinching { .. }));
    }

    #[test]
    fn wheel_scales_by_fixed_factors() {
        assert!((wheel_scale_request(2.0, 1.0) - 1.8).abs() < 1e-6);
        assert!((wheel_scale_request(2.0, -1.0) - 2.2).abs() < 1e-6);
    }
}
