//! Client input management with sequencing and edge detection

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{get_timestamp, InputState};
use std::f32::consts::TAU;

/// Held control state sampled once per fixed step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawControls {
    pub move_x: f32,
    pub move_y: f32,
    pub jump: bool,
    pub attack: bool,
    pub camera_yaw: f32,
}

/// Anything that can drive a player: a device, a replay, a bot
pub trait ControlSource {
    fn sample(&mut self) -> RawControls;
}

/// Turns held controls into sequenced, edge-triggered input snapshots
pub struct InputManager {
    next_sequence: u32,
    prev_jump: bool,
    prev_attack: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            prev_jump: false,
            prev_attack: false,
        }
    }

    /// Builds the snapshot for one fixed step
    ///
    /// `jump` and `attack` are true only on the step the control went down.
    pub fn update(&mut self, controls: RawControls) -> InputState {
        let input = InputState {
            sequence: self.next_sequence,
            timestamp: get_timestamp(),
            move_x: controls.move_x,
            move_y: controls.move_y,
            jump: controls.jump && !self.prev_jump,
            attack: controls.attack && !self.prev_attack,
            camera_yaw: controls.camera_yaw,
        };

        self.prev_jump = controls.jump;
        self.prev_attack = controls.attack;
        self.next_sequence += 1;

        input
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Randomized but reproducible bot controls for the headless client
pub struct ScriptedControls {
    rng: StdRng,
    current: RawControls,
    frames_left: u32,
}

impl ScriptedControls {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            current: RawControls::default(),
            frames_left: 0,
        }
    }
}

impl ControlSource for ScriptedControls {
    fn sample(&mut self) -> RawControls {
        if self.frames_left == 0 {
            self.frames_left = self.rng.gen_range(20..90);

            let angle = self.rng.gen_range(0.0..TAU);
            let walking = self.rng.gen_bool(0.7);
            self.current.move_x = if walking { angle.sin() } else { 0.0 };
            self.current.move_y = if walking { angle.cos() } else { 0.0 };
            self.current.camera_yaw = self.rng.gen_range(-0.5..0.5);
        }
        self.frames_left -= 1;

        // Short presses so the edge detector sees distinct presses
        self.current.jump = self.rng.gen_bool(0.01);
        self.current.attack = self.rng.gen_bool(0.03);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(jump: bool, attack: bool) -> RawControls {
        RawControls {
            jump,
            attack,
            ..RawControls::default()
        }
    }

    #[test]
    fn test_input_manager_creation() {
        let mut input_manager = InputManager::new();
        assert_eq!(input_manager.next_sequence, 1);
        assert_eq!(input_manager.update(RawControls::default()).sequence, 1);
    }

    #[test]
    fn test_sequences_increase() {
        let mut manager = InputManager::new();
        let sequences: Vec<u32> = (0..4)
            .map(|_| manager.update(RawControls::default()).sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_buttons_are_edge_triggered() {
        let mut manager = InputManager::new();

        let first = manager.update(held(true, true));
        assert!(first.jump);
        assert!(first.attack);

        // Still held
        let second = manager.update(held(true, true));
        assert!(!second.jump);
        assert!(!second.attack);

        manager.update(held(false, false));
        let again = manager.update(held(false, true));
        assert!(!again.jump);
        assert!(again.attack);
    }

    #[test]
    fn test_axes_pass_through() {
        let mut manager = InputManager::new();
        let input = manager.update(RawControls {
            move_x: 0.5,
            move_y: -1.0,
            camera_yaw: 1.0,
            ..RawControls::default()
        });
        assert_eq!(input.move_x, 0.5);
        assert_eq!(input.move_y, -1.0);
        assert_eq!(input.camera_yaw, 1.0);
        assert!(input.timestamp > 0);
    }

    #[test]
    fn test_scripted_controls_reproducible() {
        let mut a = ScriptedControls::new(42);
        let mut b = ScriptedControls::new(42);
        for _ in 0..200 {
            assert_eq!(a.sample(), b.sample());
        }
    }

    #[test]
    fn test_scripted_controls_within_bounds() {
        let mut bot = ScriptedControls::new(7);
        for _ in 0..500 {
            let controls = bot.sample();
            let length = (controls.move_x.powi(2) + controls.move_y.powi(2)).sqrt();
            assert!(length <= 1.0 + 1e-5);
        }
    }
}
