use crate::image::Image;
use crate::packet::VehicleState;
use crate::{
    MAX_ROTATIONAL_SPEED, MAX_TRANSLATIONAL_SPEED, ROTATIONAL_ACCEL, ROTATIONAL_DAMPING,
    TRANSLATIONAL_ACCEL, TRANSLATIONAL_DAMPING,
};
use std::f32::consts::{PI, TAU};
use std::sync::Arc;

/// Latest control forces received for a vehicle, each within `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlInput {
    pub rotational_force: f32,
    pub translational_force: f32,
}

impl ControlInput {
    pub fn new(rotational_force: f32, translational_force: f32) -> Self {
        Self {
            rotational_force: sanitize_force(rotational_force),
            translational_force: sanitize_force(translational_force),
        }
    }
}

fn sanitize_force(force: f32) -> f32 {
    if force.is_finite() {
        force.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub translational_velocity: f32,
    pub rotational_velocity: f32,
    pub texture: Arc<Image>,
    pub input: ControlInput,
}

impl Vehicle {
    pub fn new(id: u32, x: f32, y: f32, texture: Arc<Image>) -> Self {
        Self {
            id,
            x,
            y,
            heading: 0.0,
            translational_velocity: 0.0,
            rotational_velocity: 0.0,
            texture,
            input: ControlInput::default(),
        }
    }

    pub fn state(&self) -> VehicleState {
        VehicleState {
            id: self.id,
            x: self.x,
            y: self.y,
            heading: self.heading,
        }
    }

    /// Overwrites the pose with an authoritative one.
    pub fn set_state(&mut self, state: &VehicleState) {
        self.x = state.x;
        self.y = state.y;
        self.heading = state.heading;
    }

    /// Advances the vehicle by `dt` seconds, keeping it inside `[0, width] x [0, height]`.
    pub fn integrate(&mut self, dt: f32, width: f32, height: f32) {
        let rotational_accel = self.input.rotational_force * ROTATIONAL_ACCEL
            - ROTATIONAL_DAMPING * self.rotational_velocity;
        self.rotational_velocity = (self.rotational_velocity + rotational_accel * dt)
            .clamp(-MAX_ROTATIONAL_SPEED, MAX_ROTATIONAL_SPEED);

        let translational_accel = self.input.translational_force * TRANSLATIONAL_ACCEL
            - TRANSLATIONAL_DAMPING * self.translational_velocity;
        self.translational_velocity = (self.translational_velocity + translational_accel * dt)
            .clamp(-MAX_TRANSLATIONAL_SPEED, MAX_TRANSLATIONAL_SPEED);

        self.heading = wrap_angle(self.heading + self.rotational_velocity * dt);

        self.x += self.heading.cos() * self.translational_velocity * dt;
        self.y += self.heading.sin() * self.translational_velocity * dt;

        self.x = self.x.clamp(0.0, width.max(0.0));
        self.y = self.y.clamp(0.0, height.max(0.0));
    }
}

/// Wraps an angle into `(-PI, PI]`.
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn vehicle_at(x: f32, y: f32) -> Vehicle {
        Vehicle::new(1, x, y, Arc::new(Image::filled(1, 1, [0, 0, 0])))
    }

    #[test]
    fn test_vehicle_creation() {
        let vehicle = vehicle_at(10.0, 20.0);
        assert_eq!(vehicle.id, 1);
        assert_eq!(vehicle.x, 10.0);
        assert_eq!(vehicle.y, 20.0);
        assert_eq!(vehicle.heading, 0.0);
        assert_eq!(vehicle.input, ControlInput::default());
    }

    #[test]
    fn test_control_input_is_clamped() {
        let input = ControlInput::new(3.0, -7.5);
        assert_eq!(input.rotational_force, 1.0);
        assert_eq!(input.translational_force, -1.0);

        let input = ControlInput::new(f32::NAN, f32::INFINITY);
        assert_eq!(input, ControlInput::default());
    }

    #[test]
    fn test_idle_vehicle_stays_put() {
        let mut vehicle = vehicle_at(5.0, 5.0);
        for _ in 0..10 {
            vehicle.integrate(1.0 / 60.0, 100.0, 100.0);
        }
        assert_eq!(vehicle.x, 5.0);
        assert_eq!(vehicle.y, 5.0);
        assert_eq!(vehicle.heading, 0.0);
    }

    #[test]
    fn test_single_step_integration() {
        let mut vehicle = vehicle_at(50.0, 50.0);
        vehicle.input = ControlInput::new(0.2, 1.0);
        let dt = 0.1;

        vehicle.integrate(dt, 100.0, 100.0);

        let rotational_velocity = 0.2 * ROTATIONAL_ACCEL * dt;
        let translational_velocity = TRANSLATIONAL_ACCEL * dt;
        let heading = rotational_velocity * dt;

        assert_approx_eq!(vehicle.rotational_velocity, rotational_velocity, 1e-6);
        assert_approx_eq!(vehicle.translational_velocity, translational_velocity, 1e-6);
        assert_approx_eq!(vehicle.heading, heading, 1e-6);
        assert_approx_eq!(
            vehicle.x,
            50.0 + heading.cos() * translational_velocity * dt,
            1e-5
        );
        assert_approx_eq!(
            vehicle.y,
            50.0 + heading.sin() * translational_velocity * dt,
            1e-5
        );
    }

    #[test]
    fn test_speed_is_capped() {
        let mut vehicle = vehicle_at(0.0, 0.0);
        vehicle.input = ControlInput::new(1.0, 1.0);
        for _ in 0..1000 {
            vehicle.integrate(0.05, 1.0e6, 1.0e6);
        }
        assert!(vehicle.translational_velocity <= MAX_TRANSLATIONAL_SPEED);
        assert!(vehicle.rotational_velocity.abs() <= MAX_ROTATIONAL_SPEED);
    }

    #[test]
    fn test_position_clamped_to_bounds() {
        let mut vehicle = vehicle_at(9.9, 5.0);
        vehicle.translational_velocity = MAX_TRANSLATIONAL_SPEED;
        vehicle.input = ControlInput::new(0.0, 1.0);

        vehicle.integrate(1.0, 10.0, 10.0);
        assert_eq!(vehicle.x, 10.0);

        let mut vehicle = vehicle_at(0.1, 5.0);
        vehicle.heading = PI;
        vehicle.translational_velocity = MAX_TRANSLATIONAL_SPEED;
        vehicle.integrate(1.0, 10.0, 10.0);
        assert_eq!(vehicle.x, 0.0);
    }

    #[test]
    fn test_wrap_angle() {
        assert_approx_eq!(wrap_angle(0.0), 0.0, 1e-6);
        assert_approx_eq!(wrap_angle(PI), PI, 1e-5);
        assert_approx_eq!(wrap_angle(-PI), PI, 1e-5);
        assert_approx_eq!(wrap_angle(3.0 * PI / 2.0), -PI / 2.0, 1e-5);
        assert_approx_eq!(wrap_angle(TAU + 0.5), 0.5, 1e-5);
    }

    #[test]
    fn test_set_state_overwrites_pose() {
        let mut vehicle = vehicle_at(0.0, 0.0);
        vehicle.set_state(&VehicleState {
            id: 1,
            x: 3.0,
            y: 4.0,
            heading: 1.0,
        });
        assert_eq!(vehicle.state(), VehicleState { id: 1, x: 3.0, y: 4.0, heading: 1.0 });
    }
}
