//! The shared world: a static surface and the vehicles driving on it.
//!
//! The server owns the authoritative instance; every client rebuilds a shadow
//! copy from snapshots. The world itself does no locking, callers that share
//! it across tasks must serialize access.

use crate::error::WorldError;
use crate::image::Image;
use crate::packet::{VehicleState, WorldUpdate};
use crate::vehicle::{ControlInput, Vehicle};
use crate::{SURFACE_X_STEP, SURFACE_Y_STEP};
use std::collections::HashMap;
use std::sync::Arc;

/// Terrain the vehicles drive on. Set once, never modified afterwards.
#[derive(Debug, Clone)]
pub struct Surface {
    pub elevation: Arc<Image>,
    pub texture: Arc<Image>,
    pub x_step: f32,
    pub y_step: f32,
}

impl Surface {
    pub fn new(elevation: Arc<Image>, texture: Arc<Image>) -> Self {
        Self {
            elevation,
            texture,
            x_step: SURFACE_X_STEP,
            y_step: SURFACE_Y_STEP,
        }
    }

    pub fn width(&self) -> f32 {
        self.elevation.width as f32 * self.x_step
    }

    pub fn height(&self) -> f32 {
        self.elevation.height as f32 * self.y_step
    }
}

#[derive(Debug, Clone)]
pub struct World {
    surface: Surface,
    vehicles: HashMap<u32, Vehicle>,
}

impl World {
    pub fn new(surface: Surface) -> Self {
        Self {
            surface,
            vehicles: HashMap::new(),
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Where freshly joined vehicles are placed: the centre of the surface.
    pub fn spawn_position(&self) -> (f32, f32) {
        (self.surface.width() / 2.0, self.surface.height() / 2.0)
    }

    pub fn add_vehicle(&mut self, vehicle: Vehicle) -> Result<(), WorldError> {
        if self.vehicles.contains_key(&vehicle.id) {
            return Err(WorldError::DuplicateId(vehicle.id));
        }
        self.vehicles.insert(vehicle.id, vehicle);
        Ok(())
    }

    /// Removes a vehicle, handing it back to the caller. Absent ids are a no-op.
    pub fn remove_vehicle(&mut self, id: u32) -> Option<Vehicle> {
        self.vehicles.remove(&id)
    }

    pub fn get_vehicle(&self, id: u32) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn get_vehicle_mut(&mut self, id: u32) -> Option<&mut Vehicle> {
        self.vehicles.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.vehicles.contains_key(&id)
    }

    pub fn vehicle_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.vehicles.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Stores the input used by the following ticks.
    pub fn apply_control_input(
        &mut self,
        id: u32,
        rotational_force: f32,
        translational_force: f32,
    ) -> Result<(), WorldError> {
        let vehicle = self
            .vehicles
            .get_mut(&id)
            .ok_or(WorldError::UnknownVehicle(id))?;
        vehicle.input = ControlInput::new(rotational_force, translational_force);
        Ok(())
    }

    /// Advances every vehicle by `dt` seconds. Never adds or removes vehicles.
    pub fn tick(&mut self, dt: f32) {
        let width = self.surface.width();
        let height = self.surface.height();
        for vehicle in self.vehicles.values_mut() {
            vehicle.integrate(dt, width, height);
        }
    }

    /// Full snapshot of every vehicle's pose, ordered by id.
    pub fn snapshot(&self) -> WorldUpdate {
        let mut updates: Vec<VehicleState> = self.vehicles.values().map(Vehicle::state).collect();
        updates.sort_by_key(|state| state.id);
        WorldUpdate { updates }
    }
}
