use super::kinematics::{DirectionalRates, Kinematics};
use crate::capture_core::types::Timestamp;
use crate::store::PersistedMovement;
use serde::{Deserialize, Serialize};

/// Derived kinematics for one stored movement
///
/// `movement_id` is the source reference; the store keeps at most one row per id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub movement_id: i64,
    pub movement_timestamp: Timestamp,
    pub elapsed_secs: f64,
    pub velocity: DirectionalRates,
    pub acceleration: DirectionalRates,
    pub computed_at: Timestamp,
}

impl AnalysisRecord {
    pub fn new(movement: &PersistedMovement, kinematics: Kinematics, computed_at: Timestamp) -> Self {
        Self {
            movement_id: movement.id,
            movement_timestamp: movement.timestamp,
            elapsed_secs: kinematics.elapsed_secs,
            velocity: kinematics.velocity,
            acceleration: kinematics.acceleration,
            computed_at,
        }
    }
}
