//! End-to-end driver: detections in, object locations out.

use std::time::{SystemTime, UNIX_EPOCH};

use geotag_core::{
    load_detections, CameraLookup, DetectionInput, DetectionRecord, PlanarProjection,
};
use log::{info, warn};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::cancel::CancelToken;
use crate::cluster::{averaged_estimates, cluster_candidates, CandidatePoint, ObjectCluster};
use crate::error::TriangulationError;
use crate::export::{export_locations, ObjectLocation};
use crate::intersection::{IntersectionGraph, PairStats};
use crate::mrf::{Connectivity, IcmSolver, IcmStats};
use crate::params::TriangulationParams;

/// Everything the planar stages produced, before projection.
#[derive(Clone, Debug)]
pub struct PlanarSolution {
    pub graph: IntersectionGraph,
    pub connectivity: Connectivity,
    pub icm: IcmStats,
    pub candidates: Vec<CandidatePoint>,
    pub clusters: Vec<ObjectCluster>,
    /// Seed the ICM walk ran with.
    pub seed: u64,
}

/// Result of a full run.
#[derive(Clone, Debug, Serialize)]
pub struct TriangulationOutput {
    pub locations: Vec<ObjectLocation>,
    /// Planar clusters, aligned with `locations`.
    pub clusters: Vec<ObjectCluster>,
    pub detections: usize,
    pub pairs: PairStats,
    pub icm: IcmStats,
    pub candidates: usize,
    pub seed: u64,
}

/// Configured triangulation run.
#[derive(Clone, Debug)]
pub struct Triangulator {
    params: TriangulationParams,
    cancel: CancelToken,
}

impl Triangulator {
    pub fn new(params: TriangulationParams) -> Result<Self, TriangulationError> {
        params.validate()?;
        Ok(Self {
            params,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn params(&self) -> &TriangulationParams {
        &self.params
    }

    /// Handle that stops this run between ICM proposals.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Load, triangulate and project.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(detections = inputs.len()))
    )]
    pub fn run<L, P>(
        &self,
        inputs: &[DetectionInput],
        lookup: &L,
        projection: &P,
    ) -> Result<TriangulationOutput, TriangulationError>
    where
        L: CameraLookup + ?Sized,
        P: PlanarProjection + ?Sized,
    {
        let records = load_detections(inputs, lookup, &self.params.loader_params())?;
        self.run_records(&records, projection)
    }

    /// Triangulate already-loaded records and project the result.
    pub fn run_records<P: PlanarProjection + ?Sized>(
        &self,
        records: &[DetectionRecord],
        projection: &P,
    ) -> Result<TriangulationOutput, TriangulationError> {
        let solution = self.solve_planar(records)?;
        let locations = export_locations(&solution.clusters, projection)?;
        Ok(TriangulationOutput {
            locations,
            detections: records.len(),
            pairs: *solution.graph.stats(),
            candidates: solution.candidates.len(),
            icm: solution.icm,
            clusters: solution.clusters,
            seed: solution.seed,
        })
    }

    /// Intersection, ICM and clustering in the planar frame.
    pub fn solve_planar(
        &self,
        records: &[DetectionRecord],
    ) -> Result<PlanarSolution, TriangulationError> {
        if records.is_empty() {
            warn!("no detections to triangulate");
        }

        let graph = IntersectionGraph::build(records, self.params.pair_params());

        let seed = self.params.seed.unwrap_or_else(clock_seed);
        info!("ICM seed: {seed}");
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let outcome = IcmSolver::new(&graph, records, self.params.mrf_params())
            .run(&mut rng, &self.cancel)?;

        let candidates = averaged_estimates(&graph, &outcome.connectivity);
        let clusters = cluster_candidates(
            &candidates,
            self.params.cluster_cutoff(),
            self.params.linkage,
        );

        Ok(PlanarSolution {
            graph,
            connectivity: outcome.connectivity,
            icm: outcome.stats,
            candidates,
            clusters,
            seed,
        })
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
