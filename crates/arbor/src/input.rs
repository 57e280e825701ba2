//! Input events and keyboard/mouse state.
//!
//! Backends translate platform events into [`InputEvent`]s. The root folds
//! each one into the tree's [`InputState`] and then pulses it through the
//! tree, so event hooks can either react to the event itself or query held
//! keys.

use std::collections::HashSet;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::math::Vec2;

/// Keys the engine knows by name. Everything else arrives as `Char` (for
/// printable keys) or `Other` (a backend-specific scancode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Space,
    Enter,
    Escape,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
    Char(char),
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// One platform event, already translated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    MouseMove { x: f32, y: f32 },
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    Resized { width: u32, height: u32 },
    /// Window close request. The root stops after the current frame.
    Quit,
}

/// Tracks the state of a set of inputs (keys or mouse buttons).
///
/// - `pressed`: currently held down
/// - `just_pressed`: pressed this frame (not held last frame)
/// - `just_released`: released this frame
#[derive(Debug)]
pub struct Input<T: Eq + Hash + Copy> {
    pressed: HashSet<T>,
    just_pressed: HashSet<T>,
    just_released: HashSet<T>,
}

impl<T: Eq + Hash + Copy> Input<T> {
    pub fn new() -> Self {
        Self {
            pressed: HashSet::new(),
            just_pressed: HashSet::new(),
            just_released: HashSet::new(),
        }
    }

    pub fn pressed(&self, input: T) -> bool {
        self.pressed.contains(&input)
    }

    pub fn just_pressed(&self, input: T) -> bool {
        self.just_pressed.contains(&input)
    }

    pub fn just_released(&self, input: T) -> bool {
        self.just_released.contains(&input)
    }

    /// Key-repeat presses of an already held input are not "just" pressed.
    fn press(&mut self, input: T) {
        if self.pressed.insert(input) {
            self.just_pressed.insert(input);
        }
    }

    fn release(&mut self, input: T) {
        if self.pressed.remove(&input) {
            self.just_released.insert(input);
        }
    }

    fn clear_just(&mut self) {
        self.just_pressed.clear();
        self.just_released.clear();
    }
}

impl<T: Eq + Hash + Copy> Default for Input<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyboard, mouse and cursor state visible to every hook.
#[derive(Debug, Default)]
pub struct InputState {
    pub keys: Input<Key>,
    pub mouse: Input<MouseButton>,
    pub cursor: Vec2,
}

impl InputState {
    /// Fold one event into the state.
    pub fn apply(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::KeyDown(k) => self.keys.press(k),
            InputEvent::KeyUp(k) => self.keys.release(k),
            InputEvent::MouseDown(b) => self.mouse.press(b),
            InputEvent::MouseUp(b) => self.mouse.release(b),
            InputEvent::MouseMove { x, y } => self.cursor = Vec2::new(x, y),
            InputEvent::Resized { .. } | InputEvent::Quit => {}
        }
    }

    /// Clear per-frame state. Called by the root at the end of each frame.
    pub fn end_frame(&mut self) {
        self.keys.clear_just();
        self.mouse.clear_just();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_then_release_across_frames() {
        let mut input = InputState::default();
        input.apply(&InputEvent::KeyDown(Key::Space));
        assert!(input.keys.pressed(Key::Space));
        assert!(input.keys.just_pressed(Key::Space));

        input.end_frame();
        input.apply(&InputEvent::KeyDown(Key::Space));
        assert!(input.keys.pressed(Key::Space));
        assert!(!input.keys.just_pressed(Key::Space));

        input.apply(&InputEvent::KeyUp(Key::Space));
        assert!(!input.keys.pressed(Key::Space));
        assert!(input.keys.just_released(Key::Space));
    }

    #[test]
    fn cursor_and_mouse() {
        let mut input = InputState::default();
        input.apply(&InputEvent::MouseMove { x: 3.0, y: 4.0 });
        input.apply(&InputEvent::MouseDown(MouseButton::Left));
        assert_eq!(input.cursor, Vec2::new(3.0, 4.0));
        assert!(input.mouse.just_pressed(MouseButton::Left));
        input.end_frame();
        assert!(!input.mouse.just_pressed(MouseButton::Left));
        assert!(input.mouse.pressed(MouseButton::Left));
    }
}
