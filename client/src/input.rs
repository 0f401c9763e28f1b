//! Control forces sent to the server on every send interval

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::ControlInput;

/// Largest change of the steering force between two wander steps
const WANDER_STEP: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    /// The same forces every time
    Constant,
    /// Random-walk steering around the configured rotational force
    Wander,
}

/// Produces the control input for each outgoing `VehicleUpdate`
pub struct InputManager {
    mode: InputMode,
    current_input: ControlInput,
    rng: StdRng,
}

impl InputManager {
    pub fn new(mode: InputMode, rotational_force: f32, translational_force: f32) -> Self {
        Self::with_rng(
            mode,
            rotational_force,
            translational_force,
            StdRng::from_entropy(),
        )
    }

    /// Same as [`new`](Self::new) with a reproducible wander sequence
    pub fn seeded(
        mode: InputMode,
        rotational_force: f32,
        translational_force: f32,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            mode,
            rotational_force,
            translational_force,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        mode: InputMode,
        rotational_force: f32,
        translational_force: f32,
        rng: StdRng,
    ) -> Self {
        Self {
            mode,
            current_input: ControlInput::new(rotational_force, translational_force),
            rng,
        }
    }

    /// Returns the current input state
    pub fn get_current_input(&self) -> ControlInput {
        self.current_input
    }

    /// Advances the input source by one send interval
    pub fn next_input(&mut self) -> ControlInput {
        if self.mode == InputMode::Wander {
            let delta = self.rng.gen_range(-WANDER_STEP..=WANDER_STEP);
            self.current_input = ControlInput::new(
                self.current_input.rotational_force + delta,
                self.current_input.translational_force,
            );
        }
        self.current_input
    }
}
