//! Keyboard state and pointer-lock bookkeeping for the fly camera.

use std::collections::HashSet;

use corelib::camera::Camera;
use winit::{event::ElementState, keyboard::KeyCode};

/// Held keys plus whether the pointer is currently captured.
#[derive(Default)]
pub struct InputState {
    held: HashSet<KeyCode>,
    pointer_locked: bool,
}

impl InputState {
    pub fn key(&mut self, code: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.held.insert(code);
            }
            ElementState::Released => {
                self.held.remove(&code);
            }
        }
    }

    pub fn is_down(&self, code: KeyCode) -> bool {
        self.held.contains(&code)
    }

    pub fn pointer_locked(&self) -> bool {
        self.pointer_locked
    }

    pub fn set_pointer_locked(&mut self, locked: bool) {
        self.pointer_locked = locked;
        if !locked {
            self.held.clear();
        }
    }

    /// Mouse motion turns the camera only while the pointer is locked.
    pub fn mouse_moved(&self, camera: &mut Camera, dx: f64, dy: f64) {
        if self.pointer_locked {
            camera.pan(dx as f32);
            camera.tilt(dy as f32);
        }
    }

    /// Per-frame WASD movement, only while the pointer is locked.
    pub fn apply_movement(&self, camera: &mut Camera) {
        if !self.pointer_locked {
            return;
        }
        if self.is_down(KeyCode::KeyA) {
            camera.move_right(-1.0);
        }
        if self.is_down(KeyCode::KeyD) {
            camera.move_right(1.0);
        }
        if self.is_down(KeyCode::KeyS) {
            camera.move_forward(-1.0);
        }
        if self.is_down(KeyCode::KeyW) {
            camera.move_forward(1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::Vec3;

    #[test]
    fn movement_requires_pointer_lock() {
        let mut input = InputState::default();
        let mut cam = Camera::new(Vec3::ZERO);
        input.key(KeyCode::KeyW, ElementState::Pressed);
        input.apply_movement(&mut cam);
        assert_eq!(cam.position, Vec3::ZERO);

        input.set_pointer_locked(true);
        input.key(KeyCode::KeyW, ElementState::Pressed);
        input.apply_movement(&mut cam);
        assert!(cam.position.z < 0.0);
    }

    #[test]
    fn release_stops_movement() {
        let mut input = InputState::default();
        input.set_pointer_locked(true);
        input.key(KeyCode::KeyD, ElementState::Pressed);
        input.key(KeyCode::KeyD, ElementState::Released);
        let mut cam = Camera::new(Vec3::ZERO);
        input.apply_movement(&mut cam);
        assert_eq!(cam.position, Vec3::ZERO);
    }

    #[test]
    fn mouse_ignored_when_unlocked() {
        let input = InputState::default();
        let mut cam = Camera::new(Vec3::ZERO);
        input.mouse_moved(&mut cam, 100.0, 50.0);
        assert_eq!((cam.yaw, cam.pitch), (0.0, 0.0));
    }

    #[test]
    fn unlocking_clears_held_keys() {
        let mut input = InputState::default();
        input.set_pointer_locked(true);
        input.key(KeyCode::KeyA, ElementState::Pressed);
        input.set_pointer_locked(false);
        assert!(!input.is_down(KeyCode::KeyA));
    }
}
