//! Client-side shadow of the server world and snapshot reconciliation

use log::{debug, info};
use shared::{Image, Surface, Vehicle, VehicleState, World, WorldUpdate};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What a snapshot changes relative to the local world
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SnapshotDiff {
    /// In the snapshot but not known locally
    pub joined: Vec<VehicleState>,
    /// Known locally but missing from the snapshot
    pub departed: Vec<u32>,
    /// Present on both sides
    pub updated: Vec<VehicleState>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.departed.is_empty() && self.updated.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    pub joined: Vec<u32>,
    pub departed: Vec<u32>,
    pub updated: usize,
}

/// The client's copy of the world. Snapshots are authoritative, so nothing
/// here ever integrates physics.
pub struct ClientGameState {
    world: World,
    own_id: u32,
    /// Used for joined vehicles whose texture could not be fetched
    placeholder_texture: Arc<Image>,
}

impl ClientGameState {
    /// Builds the local world from the handshake assets and places the
    /// client's own vehicle at the spawn position
    pub fn new(surface: Surface, own_id: u32, own_texture: Arc<Image>) -> Self {
        let mut world = World::new(surface);
        let (x, y) = world.spawn_position();
        let placeholder_texture = Arc::clone(&own_texture);
        // A fresh world cannot already hold this id.
        let _ = world.add_vehicle(Vehicle::new(own_id, x, y, own_texture));

        Self {
            world,
            own_id,
            placeholder_texture,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn own_id(&self) -> u32 {
        self.own_id
    }

    pub fn own_vehicle(&self) -> Option<&Vehicle> {
        self.world.get_vehicle(self.own_id)
    }

    /// Compares a snapshot against the local vehicles using set membership
    ///
    /// Runs in O(n + m) and does not depend on the order of the snapshot.
    /// Repeated ids in a snapshot are counted once.
    pub fn diff(&self, snapshot: &WorldUpdate) -> SnapshotDiff {
        let mut seen = HashSet::with_capacity(snapshot.vehicle_count());
        let mut diff = SnapshotDiff::default();

        for state in &snapshot.updates {
            if !seen.insert(state.id) {
                continue;
            }
            if self.world.contains(state.id) {
                diff.updated.push(*state);
            } else {
                diff.joined.push(*state);
            }
        }

        diff.departed = self
            .world
            .vehicle_ids()
            .filter(|id| !seen.contains(id))
            .collect();

        diff
    }

    /// Applies a diff. `textures` holds the textures fetched for the joined
    /// vehicles; any that are missing get the placeholder.
    pub fn apply(
        &mut self,
        diff: SnapshotDiff,
        mut textures: HashMap<u32, Arc<Image>>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for id in diff.departed {
            if self.world.remove_vehicle(id).is_some() {
                info!("Vehicle {} left the world", id);
                report.departed.push(id);
            }
        }

        for state in diff.joined {
            let texture = textures
                .remove(&state.id)
                .unwrap_or_else(|| Arc::clone(&self.placeholder_texture));
            let mut vehicle = Vehicle::new(state.id, state.x, state.y, texture);
            vehicle.set_state(&state);
            if self.world.add_vehicle(vehicle).is_ok() {
                info!("Vehicle {} joined the world", state.id);
                report.joined.push(state.id);
            }
        }

        for state in diff.updated {
            if let Some(vehicle) = self.world.get_vehicle_mut(state.id) {
                vehicle.set_state(&state);
                report.updated += 1;
            }
        }

        debug!(
            "Reconciled snapshot: {} joined, {} departed, {} updated",
            report.joined.len(),
            report.departed.len(),
            report.updated
        );
        report
    }

    /// Diff and apply in one go, for callers that have no textures to fetch
    pub fn reconcile(&mut self, snapshot: &WorldUpdate) -> ReconcileReport {
        let diff = self.diff(snapshot);
        self.apply(diff, HashMap::new())
    }
}
