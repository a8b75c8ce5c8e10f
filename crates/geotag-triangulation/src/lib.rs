//! Multi-view bearing triangulation.
//!
//! Pipeline stages, in order:
//! - pairwise ray intersection with admissibility checks: [`IntersectionGraph`],
//! - pair-connectivity MRF solved with ICM: [`IcmSolver`],
//! - per-detection averaging and hierarchical clustering: [`cluster_candidates`],
//! - projection of cluster centroids to latitude/longitude: [`export_locations`].
//!
//! [`Triangulator`] runs all of them on a detection list.

mod cancel;
mod cluster;
mod error;
mod export;
mod intersection;
pub mod mrf;
mod params;
mod pipeline;
mod spatial;

pub use cancel::CancelToken;
pub use cluster::{
    averaged_estimates, cluster_candidates, CandidatePoint, Linkage, ObjectCluster,
};
pub use error::TriangulationError;
pub use export::{export_locations, write_csv, ObjectLocation};
pub use intersection::{IntersectionGraph, PairParams, PairStats, PairStatus, RayPair};
pub use mrf::{node_energy, Connectivity, IcmOutcome, IcmSolver, IcmStats, MrfParams, Proposal};
pub use params::{ParamsError, TriangulationParams};
pub use pipeline::{PlanarSolution, TriangulationOutput, Triangulator};
