//! Serialized access to the authoritative world
//!
//! Connection handlers and the realtime loop all run concurrently against the
//! same world. [`SharedWorld`] is the only way they reach it: each operation
//! takes a single exclusive lock for its whole duration, so adds, removals,
//! inputs and ticks never interleave.

use log::{debug, info};
use shared::{ControlInput, Image, Surface, Vehicle, World, WorldError, WorldUpdate};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct SharedWorld {
    inner: Arc<Mutex<World>>,
}

impl SharedWorld {
    pub fn new(surface: Surface) -> Self {
        Self {
            inner: Arc::new(Mutex::new(World::new(surface))),
        }
    }

    /// Places a new vehicle at the spawn position
    pub async fn spawn_vehicle(&self, id: u32, texture: Arc<Image>) -> Result<(), WorldError> {
        let mut world = self.inner.lock().await;
        let (x, y) = world.spawn_position();
        world.add_vehicle(Vehicle::new(id, x, y, texture))?;
        info!("Added vehicle {} at ({}, {})", id, x, y);
        Ok(())
    }

    /// Removes a vehicle; removing an absent id is a no-op
    pub async fn remove_vehicle(&self, id: u32) -> bool {
        let removed = self.inner.lock().await.remove_vehicle(id).is_some();
        if removed {
            info!("Removed vehicle {}", id);
        }
        removed
    }

    /// Checks whether a vehicle with this id is in the world
    ///
    /// The answer may be stale as soon as the lock is released; callers that
    /// need to act on it should use an operation that checks under the lock.
    pub async fn contains(&self, id: u32) -> bool {
        self.inner.lock().await.contains(id)
    }

    /// Number of vehicles currently in the world
    ///
    /// Read under the world lock, so it never observes a half-applied add or
    /// removal.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Position and heading of one vehicle, if present
    pub async fn vehicle_state(&self, id: u32) -> Option<shared::VehicleState> {
        self.inner.lock().await.get_vehicle(id).map(Vehicle::state)
    }

    /// Texture a vehicle was spawned with
    ///
    /// Shared with the world rather than copied, so serving it to many
    /// clients costs one reference count each.
    pub async fn vehicle_texture(&self, id: u32) -> Option<Arc<Image>> {
        self.inner
            .lock()
            .await
            .get_vehicle(id)
            .map(|vehicle| Arc::clone(&vehicle.texture))
    }

    /// Replaces the control forces of one vehicle
    ///
    /// The forces are sanitized by the world and stay in effect on later
    /// ticks. Unknown ids are an error.
    pub async fn apply_control_input(
        &self,
        id: u32,
        rotational_force: f32,
        translational_force: f32,
    ) -> Result<(), WorldError> {
        self.inner
            .lock()
            .await
            .apply_control_input(id, rotational_force, translational_force)
    }

    /// Advances every vehicle by `dt` seconds
    ///
    /// Vehicles move under their latest control input. The whole world is
    /// integrated under one lock, so no input or removal lands mid-tick.
    pub async fn tick(&self, dt: f32) {
        self.inner.lock().await.tick(dt);
    }

    /// Current state of every vehicle, ordered by id
    pub async fn snapshot(&self) -> WorldUpdate {
        self.inner.lock().await.snapshot()
    }

    /// Applies one vehicle's input, advances the world and snapshots it, all
    /// under one lock so the snapshot reflects exactly this tick
    pub async fn step(
        &self,
        id: u32,
        input: ControlInput,
        dt: f32,
    ) -> Result<WorldUpdate, WorldError> {
        let mut world = self.inner.lock().await;
        world.apply_control_input(id, input.rotational_force, input.translational_force)?;
        world.tick(dt);
        debug!("Tick of {:.4}s for {} vehicles", dt, world.len());
        Ok(world.snapshot())
    }
}
