//! Pair-connectivity MRF over the intersection graph, solved with ICM.
//!
//! Each node is a detection. An edge of the model is an admissible pair from
//! [`IntersectionGraph`](crate::IntersectionGraph); the hidden state is
//! whether that pair observes the same object. ICM toggles one edge at a
//! time and keeps the toggle when the energy of its two endpoints does not
//! increase.

mod connectivity;
mod energy;
mod solver;

use serde::{Deserialize, Serialize};

pub use connectivity::Connectivity;
pub use energy::node_energy;
pub use solver::{IcmOutcome, IcmSolver, IcmStats, Proposal};

/// Energy weights and sweep budget.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MrfParams {
    /// Sweeps of `N` proposals each.
    pub icm_iterations: usize,
    pub depth_weight: f64,
    pub object_multiview: f64,
    /// Energy of a node without active edges.
    pub standalone_price: f64,
}
