//! Square-root vote dampening.

use charter_types::GovernanceParams;
use serde::{Deserialize, Serialize};

/// Converts effective stake into vote power: `sqrt(w)` clamped to
/// `[floor, ceiling]`. Every eligible voter gets at least `floor`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuadraticWeighting {
    floor: f64,
    ceiling: f64,
}

impl QuadraticWeighting {
    /// A floor above the ceiling is lowered to the ceiling.
    pub fn new(floor: f64, ceiling: f64) -> Self {
        Self {
            floor: floor.min(ceiling),
            ceiling,
        }
    }

    pub fn from_params(params: &GovernanceParams) -> Self {
        Self::new(params.quadratic_floor, params.quadratic_ceiling)
    }

    pub fn power(&self, weight: f64) -> f64 {
        if !weight.is_finite() || weight <= 0.0 {
            return self.floor;
        }
        weight.sqrt().clamp(self.floor, self.ceiling)
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }
}

impl Default for QuadraticWeighting {
    fn default() -> Self {
        Self::from_params(&GovernanceParams::default())
    }
}
