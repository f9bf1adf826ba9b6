//! Normalizes raw `bevy_input` touch and mouse events into [`PointerInput`] and [`WheelInput`]
//! events, which drive the gesture recognizer.
//!
//! Only pointers that start inside a camera's render surface (its logical viewport) are tracked.
//! Once tracked, a touch keeps reporting until it ends, even if it leaves the surface, the same way
//! a browser's `targetTouches` list behaves.
//!
//! Raw events are read from the single ordered [`WindowEvent`] stream, so a press followed by a
//! move in the same frame is seen in that order.

use std::time::Duration;

use bevy_ecs::prelude::*;
use bevy_input::{
    mouse::{MouseButton, MouseWheel},
    touch::TouchPhase,
};
use bevy_log::prelude::*;
use bevy_math::prelude::*;
use bevy_reflect::prelude::*;
use bevy_render::camera::{Camera, NormalizedRenderTarget};
use bevy_time::{Real, Time};
use bevy_window::{PrimaryWindow, WindowEvent};

/// The pointer id reported for the mouse, which only ever has a single contact.
pub const MOUSE_POINTER_ID: u64 = u64::MAX;

/// The kind of device a [`PointerSample`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum PointerDevice {
    /// A finger on a touch screen.
    Touch,
    /// The primary mouse button.
    Mouse,
}

/// A single normalized pointer contact. Produced per raw input event and consumed immediately.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct PointerSample {
    /// Device-assigned contact id. Touch ids are unique while the finger is down.
    pub id: u64,
    /// Logical window position, origin top left.
    pub position: Vec2,
    /// Time the sample was taken, relative to app startup.
    pub timestamp: Duration,
    /// The device the contact belongs to.
    pub device: PointerDevice,
}

/// What happened to the set of active contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum PointerPhase {
    /// A contact was added.
    Down,
    /// A contact moved.
    Move,
    /// A contact was removed.
    Up,
}

/// A normalized pointer event for a single camera's render surface.
#[derive(Debug, Clone, PartialEq, Event)]
pub struct PointerInput {
    /// The camera whose render surface received the input.
    pub camera: Entity,
    /// The change that caused this event.
    pub phase: PointerPhase,
    /// The device that changed.
    pub device: PointerDevice,
    /// All contacts of `device` that are still active after the change, in device order. The
    /// length of this list is the contact count the gesture recognizer transitions on.
    pub contacts: Vec<PointerSample>,
    /// The camera's logical viewport when the input happened, used to hit-test contacts.
    pub surface: Rect,
    /// Time of the change.
    pub timestamp: Duration,
}

/// A normalized scroll wheel tick over a camera's render surface.
#[derive(Debug, Clone, Copy, PartialEq, Event)]
pub struct WheelInput {
    /// The camera whose render surface received the input.
    pub camera: Entity,
    /// Vertical scroll amount, positive when scrolling toward the user (content moves up). This is
    /// the sign convention of DOM `WheelEvent.deltaY`, which is the opposite of [`MouseWheel::y`].
    pub delta_y: f32,
    /// Time of the tick.
    pub timestamp: Duration,
}

/// Convert a logical window position to normalized device coordinates of `surface`, where x and y
/// span `[-1, 1]` and y points up. Returns `None` for a zero-sized surface.
pub fn screen_to_ndc(position: Vec2, surface: Rect) -> Option<Vec2> {
    let size = surface.size();
    if size.x <= 0.0 || size.y <= 0.0 || !position.is_finite() {
        return None;
    }
    let relative = (position - surface.min) / size;
    Some(Vec2::new(relative.x * 2.0 - 1.0, -relative.y * 2.0 + 1.0))
}

/// Converts a [`MouseWheel`] vertical amount into the DOM sign convention used by
/// [`WheelInput::delta_y`]. Ticks without a vertical component are dropped.
pub fn wheel_delta_y(wheel: &MouseWheel) -> Option<f32> {
    (wheel.y != 0.0 && wheel.y.is_finite()).then_some(-wheel.y)
}

/// What a single raw window event amounts to for one surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackedInput {
    /// The contacts of `device` changed.
    Pointer(PointerPhase, PointerDevice),
    /// A wheel tick, in [`WheelInput::delta_y`] sign.
    Wheel(f32),
}

/// Tracks active contacts for one camera's render surface across raw input events.
#[derive(Debug, Clone, Default, Component)]
pub struct PointerTracker {
    /// Touches currently down on the surface, ordered by id.
    touches: Vec<PointerSample>,
    mouse_down: bool,
    cursor: Option<Vec2>,
}

impl PointerTracker {
    /// Apply a raw touch event. Returns the normalized phase to report, or `None` when the event
    /// is irrelevant to this surface or malformed.
    pub fn track_touch(
        &mut self,
        id: u64,
        phase: TouchPhase,
        position: Vec2,
        surface: Rect,
        timestamp: Duration,
    ) -> Option<PointerPhase> {
        if !position.is_finite() {
            return None;
        }
        match phase {
            TouchPhase::Started => {
                if !surface.contains(position) || self.touches.iter().any(|t| t.id == id) {
                    return None;
                }
                self.touches.push(PointerSample {
                    id,
                    position,
                    timestamp,
                    device: PointerDevice::Touch,
                });
                self.touches.sort_by_key(|t| t.id);
                Some(PointerPhase::Down)
            }
            TouchPhase::Moved => {
                let touch = self.touches.iter_mut().find(|t| t.id == id)?;
                touch.position = position;
                touch.timestamp = timestamp;
                Some(PointerPhase::Move)
            }
            TouchPhase::Ended | TouchPhase::Canceled => {
                let index = self.touches.iter().position(|t| t.id == id)?;
                self.touches.remove(index);
                Some(PointerPhase::Up)
            }
        }
    }

    /// Apply a primary mouse button press or release.
    pub fn track_mouse_button(&mut self, pressed: bool, surface: Rect) -> Option<PointerPhase> {
        match (pressed, self.mouse_down) {
            (true, false) => {
                let cursor = self.cursor?;
                surface.contains(cursor).then(|| {
                    self.mouse_down = true;
                    PointerPhase::Down
                })
            }
            (false, true) => {
                self.mouse_down = false;
                Some(PointerPhase::Up)
            }
            _ => None,
        }
    }

    /// Apply a cursor movement. Only reported while the mouse button is held.
    pub fn track_cursor(&mut self, position: Vec2) -> Option<PointerPhase> {
        if !position.is_finite() {
            return None;
        }
        self.cursor = Some(position);
        self.mouse_down.then_some(PointerPhase::Move)
    }

    /// Is the cursor over `surface`? An unknown cursor position counts as inside.
    pub fn cursor_over(&self, surface: Rect) -> bool {
        self.cursor.map_or(true, |cursor| surface.contains(cursor))
    }

    /// Apply one raw event received by `window`. Events from other windows, buttons other than the
    /// left mouse button, and wheel ticks while the cursor is elsewhere are ignored.
    pub fn track_window_event(
        &mut self,
        event: &WindowEvent,
        window: Entity,
        surface: Rect,
        timestamp: Duration,
    ) -> Option<TrackedInput> {
        match event {
            WindowEvent::TouchInput(touch) if touch.window == window => self
                .track_touch(touch.id, touch.phase, touch.position, surface, timestamp)
                .map(|phase| TrackedInput::Pointer(phase, PointerDevice::Touch)),
            WindowEvent::CursorMoved(moved) if moved.window == window => self
                .track_cursor(moved.position)
                .map(|phase| TrackedInput::Pointer(phase, PointerDevice::Mouse)),
            WindowEvent::MouseButtonInput(button)
                if button.window == window && button.button == MouseButton::Left =>
            {
                self.track_mouse_button(button.state.is_pressed(), surface)
                    .map(|phase| TrackedInput::Pointer(phase, PointerDevice::Mouse))
            }
            WindowEvent::MouseWheel(wheel) if wheel.window == window => {
                let delta_y = wheel_delta_y(wheel)?;
                self.cursor_over(surface).then_some(TrackedInput::Wheel(delta_y))
            }
            _ => None,
        }
    }

    /// Active touch contacts, in device order.
    pub fn touches(&self) -> &[PointerSample] {
        &self.touches
    }

    /// Active contacts of `device`, in device order.
    pub fn contacts(&self, device: PointerDevice, timestamp: Duration) -> Vec<PointerSample> {
        match device {
            PointerDevice::Touch => self.touches.to_vec(),
            PointerDevice::Mouse => match (self.mouse_down, self.cursor) {
                (true, Some(position)) => vec![PointerSample {
                    id: MOUSE_POINTER_ID,
                    position,
                    timestamp,
                    device: PointerDevice::Mouse,
                }],
                _ => Vec::new(),
            },
        }
    }
}

/// Read raw input from the ordered [`WindowEvent`] stream and emit [`PointerInput`] and
/// [`WheelInput`] events for every camera with a [`PointerTracker`].
///
/// Each camera only sees input from the window it renders to. Cameras rendering to images receive
/// no pointer input.
pub fn normalize_pointer_input(
    mut window_events: EventReader<WindowEvent>,
    primary_window: Query<Entity, With<PrimaryWindow>>,
    mut cameras: Query<(Entity, &Camera, &mut PointerTracker)>,
    mut pointer_out: EventWriter<PointerInput>,
    mut wheel_out: EventWriter<WheelInput>,
    time: Res<Time<Real>>,
) {
    let events: Vec<&WindowEvent> = window_events
        .read()
        .filter(|event| {
            matches!(
                event,
                WindowEvent::TouchInput(_)
                    | WindowEvent::CursorMoved(_)
                    | WindowEvent::MouseButtonInput(_)
                    | WindowEvent::MouseWheel(_)
            )
        })
        .collect();
    if events.is_empty() {
        return;
    }
    let now = time.elapsed();
    let primary_window = primary_window.single().ok();

    for (camera_entity, camera, mut tracker) in cameras.iter_mut() {
        let Some(NormalizedRenderTarget::Window(window)) = camera.target.normalize(primary_window)
        else {
            continue;
        };
        let window = window.entity();
        let Some(surface) = camera.logical_viewport_rect() else {
            continue;
        };
        let mut report = |tracker: &PointerTracker, phase, device| {
            let contacts = tracker.contacts(device, now);
            trace!("{device:?} {phase:?} with {} contact(s)", contacts.len());
            pointer_out.write(PointerInput {
                camera: camera_entity,
                phase,
                device,
                contacts,
                surface,
                timestamp: now,
            });
        };

        for event in &events {
            match tracker.track_window_event(event, window, surface, now) {
                Some(TrackedInput::Pointer(phase, device)) => report(&*tracker, phase, device),
                Some(TrackedInput::Wheel(delta_y)) => {
                    wheel_out.write(WheelInput {
                        camera: camera_entity,
                        delta_y,
                        timestamp: now,
                    });
                }
                None => (),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bevy_input::{
        mouse::{MouseButtonInput, MouseScrollUnit},
        touch::TouchInput,
        ButtonState,
    };
    use bevy_window::CursorMoved;

    use super::*;

    fn surface() -> Rect {
        Rect::new(0.0, 0.0, 800.0, 600.0)
    }

    #[test]
    fn ndc_corners_and_center() {
        let s = surface();
        assert_eq!(screen_to_ndc(Vec2::new(0.0, 0.0), s), Some(Vec2::new(-1.0, 1.0)));
        assert_eq!(screen_to_ndc(Vec2::new(800.0, 600.0), s), Some(Vec2::new(1.0, -1.0)));
        assert_eq!(screen_to_ndc(Vec2::new(400.0, 300.0), s), Some(Vec2::ZERO));
    }

    #[test]
    fn ndc_respects_surface_offset() {
        let s = Rect::new(100.0, 50.0, 300.0, 250.0);
        assert_eq!(screen_to_ndc(Vec2::new(200.0, 150.0), s), Some(Vec2::ZERO));
    }

    #[test]
    fn ndc_of_empty_surface_is_none() {
        let s = Rect::new(10.0, 10.0, 10.0, 10.0);
        assert_eq!(screen_to_ndc(Vec2::new(10.0, 10.0), s), None);
    }

    #[test]
    fn touches_are_reported_in_id_order() {
        let mut tracker = PointerTracker::default();
        let t = Duration::ZERO;
        tracker.track_touch(7, TouchPhase::Started, Vec2::new(10.0, 10.0), surface(), t);
        tracker.track_touch(3, TouchPhase::Started, Vec2::new(20.0, 20.0), surface(), t);
        let ids: Vec<u64> = tracker.touches().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 7]);
    }

    #[test]
    fn touches_starting_off_surface_are_ignored() {
        let mut tracker = PointerTracker::default();
        let t = Duration::ZERO;
        let outside = Vec2::new(900.0, 10.0);
        assert_eq!(
            tracker.track_touch(1, TouchPhase::Started, outside, surface(), t),
            None
        );
        assert_eq!(
            tracker.track_touch(1, TouchPhase::Moved, Vec2::new(5.0, 5.0), surface(), t),
            None
        );
        assert!(tracker.touches().is_empty());
    }

    #[test]
    fn tracked_touch_keeps_reporting_off_surface() {
        let mut tracker = PointerTracker::default();
        let t = Duration::ZERO;
        tracker.track_touch(1, TouchPhase::Started, Vec2::new(5.0, 5.0), surface(), t);
        let phase = tracker.track_touch(1, TouchPhase::Moved, Vec2::new(-50.0, 5.0), surface(), t);
        assert_eq!(phase, Some(PointerPhase::Move));
        assert_eq!(tracker.touches()[0].position, Vec2::new(-50.0, 5.0));
    }

    #[test]
    fn malformed_touch_positions_are_dropped() {
        let mut tracker = PointerTracker::default();
        let nan = Vec2::new(f32::NAN, 1.0);
        let phase = tracker.track_touch(1, TouchPhase::Started, nan, surface(), Duration::ZERO);
        assert_eq!(phase, None);
        assert!(tracker.touches().is_empty());
    }

    #[test]
    fn cancel_removes_touch() {
        let mut tracker = PointerTracker::default();
        let t = Duration::ZERO;
        tracker.track_touch(1, TouchPhase::Started, Vec2::new(5.0, 5.0), surface(), t);
        let phase = tracker.track_touch(1, TouchPhase::Canceled, Vec2::new(5.0, 5.0), surface(), t);
        assert_eq!(phase, Some(PointerPhase::Up));
        assert!(tracker.touches().is_empty());
    }

    #[test]
    fn mouse_moves_report_only_while_pressed() {
        let mut tracker = PointerTracker::default();
        assert_eq!(tracker.track_cursor(Vec2::new(10.0, 10.0)), None);
        assert_eq!(
            tracker.track_mouse_button(true, surface()),
            Some(PointerPhase::Down)
        );
        assert_eq!(
            tracker.track_cursor(Vec2::new(12.0, 10.0)),
            Some(PointerPhase::Move)
        );
        let contacts = tracker.contacts(PointerDevice::Mouse, Duration::ZERO);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].id, MOUSE_POINTER_ID);
        assert_eq!(tracker.track_mouse_button(false, surface()), Some(PointerPhase::Up));
        assert!(tracker.contacts(PointerDevice::Mouse, Duration::ZERO).is_empty());
    }

    #[test]
    fn mouse_press_off_surface_is_ignored() {
        let mut tracker = PointerTracker::default();
        tracker.track_cursor(Vec2::new(1000.0, 10.0));
        assert_eq!(tracker.track_mouse_button(true, surface()), None);
        assert_eq!(tracker.track_mouse_button(false, surface()), None);
    }

    #[test]
    fn wheel_uses_dom_sign_and_drops_horizontal_ticks() {
        let wheel = |x, y| MouseWheel {
            unit: MouseScrollUnit::Line,
            x,
            y,
            window: Entity::PLACEHOLDER,
        };
        assert_eq!(wheel_delta_y(&wheel(0.0, 1.0)), Some(-1.0));
        assert_eq!(wheel_delta_y(&wheel(0.0, -3.0)), Some(3.0));
        assert_eq!(wheel_delta_y(&wheel(2.0, 0.0)), None);
    }

    fn cursor(window: Entity, x: f32, y: f32) -> WindowEvent {
        WindowEvent::CursorMoved(CursorMoved {
            window,
            position: Vec2::new(x, y),
            delta: None,
        })
    }

    fn left(window: Entity, state: ButtonState) -> WindowEvent {
        WindowEvent::MouseButtonInput(MouseButtonInput {
            button: MouseButton::Left,
            state,
            window,
        })
    }

    #[test]
    fn same_frame_events_apply_in_arrival_order() {
        let window = Entity::from_raw(1);
        let mut tracker = PointerTracker::default();
        let mut track = |event: WindowEvent| {
            let input = tracker.track_window_event(&event, window, surface(), Duration::ZERO);
            let contacts = tracker.contacts(PointerDevice::Mouse, Duration::ZERO);
            (input, contacts.first().map(|contact| contact.position))
        };
        let mouse = |phase| Some(TrackedInput::Pointer(phase, PointerDevice::Mouse));

        assert_eq!(track(cursor(window, 10.0, 10.0)), (None, None));
        // The press lands where the cursor was before the later move.
        assert_eq!(
            track(left(window, ButtonState::Pressed)),
            (mouse(PointerPhase::Down), Some(Vec2::new(10.0, 10.0)))
        );
        assert_eq!(
            track(cursor(window, 30.0, 10.0)),
            (mouse(PointerPhase::Move), Some(Vec2::new(30.0, 10.0)))
        );
        assert_eq!(
            track(left(window, ButtonState::Released)),
            (mouse(PointerPhase::Up), None)
        );
        // Moves after the release are no longer reported.
        assert_eq!(track(cursor(window, 50.0, 10.0)), (None, None));
    }

    #[test]
    fn events_from_other_windows_are_ignored() {
        let window = Entity::from_raw(1);
        let other = Entity::from_raw(2);
        let mut tracker = PointerTracker::default();
        let t = Duration::ZERO;

        tracker.track_window_event(&cursor(window, 10.0, 10.0), window, surface(), t);
        assert_eq!(
            tracker.track_window_event(&cursor(other, 700.0, 500.0), window, surface(), t),
            None
        );
        assert_eq!(
            tracker.track_window_event(&left(other, ButtonState::Pressed), window, surface(), t),
            None
        );
        let touch = WindowEvent::TouchInput(TouchInput {
            phase: TouchPhase::Started,
            position: Vec2::new(20.0, 20.0),
            window: other,
            force: None,
            id: 4,
        });
        assert_eq!(tracker.track_window_event(&touch, window, surface(), t), None);
        assert!(tracker.touches().is_empty());

        // The cursor from the other window did not move this surface's cursor.
        tracker.track_window_event(&left(window, ButtonState::Pressed), window, surface(), t);
        let contacts = tracker.contacts(PointerDevice::Mouse, t);
        assert_eq!(contacts[0].position, Vec2::new(10.0, 10.0));
    }

    #[test]
    fn only_the_left_button_drags() {
        let window = Entity::from_raw(1);
        let mut tracker = PointerTracker::default();
        let t = Duration::ZERO;
        tracker.track_window_event(&cursor(window, 10.0, 10.0), window, surface(), t);
        let right = WindowEvent::MouseButtonInput(MouseButtonInput {
            button: MouseButton::Right,
            state: ButtonState::Pressed,
            window,
        });
        assert_eq!(tracker.track_window_event(&right, window, surface(), t), None);
    }

    #[test]
    fn wheel_ticks_need_the_cursor_over_the_surface() {
        let window = Entity::from_raw(1);
        let mut tracker = PointerTracker::default();
        let t = Duration::ZERO;
        let tick = WindowEvent::MouseWheel(MouseWheel {
            unit: MouseScrollUnit::Line,
            x: 0.0,
            y: 1.0,
            window,
        });
        assert_eq!(
            tracker.track_window_event(&tick, window, surface(), t),
            Some(TrackedInput::Wheel(-1.0))
        );
        tracker.track_window_event(&cursor(window, 900.0, 10.0), window, surface(), t);
        assert_eq!(tracker.track_window_event(&tick, window, surface(), t), None);
    }
}
