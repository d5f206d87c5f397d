//! Keyboard and mouse state over winit events.
//!
//! Tracks both instantaneous events (button pressed this frame) and
//! continuous state (key held, modifiers). The app reads it once per frame
//! to drive camera orbit, zoom and cloth grabbing, then calls
//! [`Input::begin_frame`].

use glam::Vec2;
use std::collections::HashSet;
use winit::event::{ElementState, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode as WinitKeyCode, ModifiersState, PhysicalKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn from_winit(btn: WinitMouseButton) -> Option<Self> {
        match btn {
            WinitMouseButton::Left => Some(MouseButton::Left),
            WinitMouseButton::Right => Some(MouseButton::Right),
            WinitMouseButton::Middle => Some(MouseButton::Middle),
            _ => None,
        }
    }
}

/// Keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    W,
    A,
    S,
    D,
    Up,
    Down,
    Left,
    Right,
    Space,
    R,
}

impl KeyCode {
    fn from_winit(key: WinitKeyCode) -> Option<Self> {
        Some(match key {
            WinitKeyCode::KeyW => KeyCode::W,
            WinitKeyCode::KeyA => KeyCode::A,
            WinitKeyCode::KeyS => KeyCode::S,
            WinitKeyCode::KeyD => KeyCode::D,
            WinitKeyCode::ArrowUp => KeyCode::Up,
            WinitKeyCode::ArrowDown => KeyCode::Down,
            WinitKeyCode::ArrowLeft => KeyCode::Left,
            WinitKeyCode::ArrowRight => KeyCode::Right,
            WinitKeyCode::Space => KeyCode::Space,
            WinitKeyCode::KeyR => KeyCode::R,
            _ => return None,
        })
    }
}

#[derive(Debug, Default)]
pub struct Input {
    keys_held: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,

    mouse_held: HashSet<MouseButton>,
    mouse_pressed: HashSet<MouseButton>,
    mouse_released: HashSet<MouseButton>,

    modifiers: ModifiersState,

    mouse_position: Vec2,
    mouse_delta: Vec2,
    scroll_delta: f32,

    window_size: (u32, u32),
}

impl Input {
    pub fn new() -> Self {
        Self {
            window_size: (800, 600),
            ..Default::default()
        }
    }

    /// Key went down this frame (auto-repeat ignored).
    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    pub fn mouse_pressed(&self, button: MouseButton) -> bool {
        self.mouse_pressed.contains(&button)
    }

    pub fn mouse_held(&self, button: MouseButton) -> bool {
        self.mouse_held.contains(&button)
    }

    pub fn mouse_released(&self, button: MouseButton) -> bool {
        self.mouse_released.contains(&button)
    }

    /// Pin modifier.
    pub fn shift(&self) -> bool {
        self.modifiers.shift_key()
    }

    /// Camera-orbit modifier.
    pub fn alt(&self) -> bool {
        self.modifiers.alt_key()
    }

    /// Cursor position in window pixels.
    pub fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }

    /// Cursor position in normalized device coordinates, y up.
    pub fn mouse_ndc(&self) -> Vec2 {
        let (w, h) = self.window_size;
        if w == 0 || h == 0 {
            return Vec2::ZERO;
        }
        Vec2::new(
            self.mouse_position.x / w as f32 * 2.0 - 1.0,
            1.0 - self.mouse_position.y / h as f32 * 2.0,
        )
    }

    /// Cursor movement since the last frame in pixels.
    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    /// Scroll this frame; positive is away from the user.
    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }

    /// Yaw and pitch steps from W/A/S/D and the arrow keys, each in -1..=1.
    pub fn orbit_keys(&self) -> Vec2 {
        let axis = |neg: [KeyCode; 2], pos: [KeyCode; 2]| {
            let held = |keys: [KeyCode; 2]| keys.iter().any(|k| self.key_held(*k));
            (held(pos) as i32 - held(neg) as i32) as f32
        };
        Vec2::new(
            axis([KeyCode::A, KeyCode::Left], [KeyCode::D, KeyCode::Right]),
            axis([KeyCode::S, KeyCode::Down], [KeyCode::W, KeyCode::Up]),
        )
    }

    /// Clear per-frame state.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.mouse_pressed.clear();
        self.mouse_released.clear();
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }

    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else { return };
                let Some(key) = KeyCode::from_winit(code) else { return };
                match event.state {
                    ElementState::Pressed => {
                        if self.keys_held.insert(key) {
                            self.keys_pressed.insert(key);
                        }
                    }
                    ElementState::Released => {
                        self.keys_held.remove(&key);
                    }
                }
            }

            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
            }

            WindowEvent::MouseInput { state, button, .. } => {
                let Some(btn) = MouseButton::from_winit(*button) else { return };
                self.set_button(btn, *state == ElementState::Pressed);
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.move_cursor(Vec2::new(position.x as f32, position.y as f32));
            }

            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
            }

            WindowEvent::Focused(false) => {
                self.keys_held.clear();
                self.mouse_held.clear();
                self.modifiers = ModifiersState::empty();
            }

            _ => {}
        }
    }

    fn set_button(&mut self, button: MouseButton, pressed: bool) {
        if pressed {
            self.mouse_pressed.insert(button);
            self.mouse_held.insert(button);
        } else {
            self.mouse_held.remove(&button);
            self.mouse_released.insert(button);
        }
    }

    fn move_cursor(&mut self, position: Vec2) {
        self.mouse_delta += position - self.mouse_position;
        self.mouse_position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut input = Input::new();
        assert!(!input.key_held(KeyCode::W));

        input.keys_pressed.insert(KeyCode::W);
        input.keys_held.insert(KeyCode::W);
        assert!(input.key_pressed(KeyCode::W));

        input.begin_frame();
        assert!(input.key_held(KeyCode::W));
        assert!(!input.key_pressed(KeyCode::W));
    }

    #[test]
    fn test_mouse_ndc() {
        let mut input = Input::new();
        input.set_window_size(800, 600);
        input.move_cursor(Vec2::new(400.0, 300.0));
        assert!(input.mouse_ndc().length() < 1e-6);

        input.move_cursor(Vec2::new(0.0, 0.0));
        assert_eq!(input.mouse_ndc(), Vec2::new(-1.0, 1.0));
    }

    #[test]
    fn test_mouse_delta_accumulates() {
        let mut input = Input::new();
        input.move_cursor(Vec2::new(10.0, 10.0));
        input.begin_frame();
        input.move_cursor(Vec2::new(13.0, 10.0));
        input.move_cursor(Vec2::new(15.0, 8.0));
        assert_eq!(input.mouse_delta(), Vec2::new(5.0, -2.0));
    }

    #[test]
    fn test_orbit_keys() {
        let mut input = Input::new();
        input.keys_held.insert(KeyCode::D);
        input.keys_held.insert(KeyCode::Up);
        assert_eq!(input.orbit_keys(), Vec2::new(1.0, 1.0));

        // Opposite keys cancel.
        input.keys_held.insert(KeyCode::Left);
        assert_eq!(input.orbit_keys().x, 0.0);
    }

    #[test]
    fn test_button_press_release() {
        let mut input = Input::new();
        input.set_button(MouseButton::Left, true);
        assert!(input.mouse_pressed(MouseButton::Left));
        assert!(input.mouse_held(MouseButton::Left));

        input.begin_frame();
        input.set_button(MouseButton::Left, false);
        assert!(!input.mouse_held(MouseButton::Left));
        assert!(input.mouse_released(MouseButton::Left));
    }
}
