use geotag_core::DetectionRecord;
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::cancel::CancelToken;
use crate::error::TriangulationError;
use crate::intersection::IntersectionGraph;

use super::{node_energy, Connectivity, MrfParams};

/// One evaluated edge toggle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Proposal {
    pub a: usize,
    pub b: usize,
    /// `energy(a) + energy(b)` before the toggle.
    pub energy_old: f64,
    /// `energy(a) + energy(b)` with the toggle applied.
    pub energy_new: f64,
    /// `energy_new <= energy_old`; rejected toggles are reverted.
    pub accepted: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmStats {
    pub proposals: usize,
    pub accepted: usize,
    /// Accepted toggles per sweep of `N` proposals.
    pub accepted_per_sweep: Vec<usize>,
    /// Linked pairs at the end of the run.
    pub links: usize,
}

#[derive(Clone, Debug)]
pub struct IcmOutcome {
    pub connectivity: Connectivity,
    pub stats: IcmStats,
}

/// Iterated conditional modes over the pair-connectivity MRF.
pub struct IcmSolver<'g> {
    graph: &'g IntersectionGraph,
    depths: Vec<f64>,
    /// Nodes with at least one admissible pair, ascending.
    candidates: Vec<usize>,
    params: MrfParams,
    connectivity: Connectivity,
}

impl<'g> IcmSolver<'g> {
    /// Start from the all-unlinked state.
    ///
    /// `records` must be the detections `graph` was built from.
    pub fn new(
        graph: &'g IntersectionGraph,
        records: &[DetectionRecord],
        params: MrfParams,
    ) -> Self {
        debug_assert_eq!(graph.len(), records.len());
        let candidates = (0..graph.len())
            .filter(|&i| graph.viable_degree(i) > 0)
            .collect();
        Self {
            graph,
            depths: records.iter().map(|r| r.depth_estimate).collect(),
            candidates,
            params,
            connectivity: Connectivity::new(graph),
        }
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn graph(&self) -> &'g IntersectionGraph {
        self.graph
    }

    /// Local energy of `node` in the current state.
    pub fn energy(&self, node: usize) -> f64 {
        node_energy(
            self.graph,
            &self.connectivity,
            self.depths[node],
            node,
            &self.params,
        )
    }

    /// Draw a node uniformly among those with admissible pairs, then one of
    /// its admissible neighbours uniformly. Returns `(node, slot)`, or `None`
    /// when no node has an admissible pair.
    pub fn propose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(usize, usize)> {
        if self.candidates.is_empty() {
            return None;
        }
        let a = self.candidates[rng.gen_range(0..self.candidates.len())];
        let slot = rng.gen_range(0..self.graph.viable_degree(a));
        Some((a, slot))
    }

    /// Toggle the pair at `slot` of `a` and keep it when the two-node energy
    /// does not increase.
    pub fn evaluate(&mut self, a: usize, slot: usize) -> Proposal {
        let b = self.graph.neighbors(a)[slot].neighbor;

        let energy_old = self.energy(a) + self.energy(b);
        self.connectivity.toggle(self.graph, a, slot);
        let energy_new = self.energy(a) + self.energy(b);

        let accepted = energy_new <= energy_old;
        if !accepted {
            self.connectivity.toggle(self.graph, a, slot);
        }
        Proposal {
            a,
            b,
            energy_old,
            energy_new,
            accepted,
        }
    }

    /// Draw and evaluate one proposal.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Proposal> {
        let (a, slot) = self.propose(rng)?;
        Some(self.evaluate(a, slot))
    }

    /// Spend the full budget of `icm_iterations * N` proposals.
    ///
    /// `cancel` is polled between proposals.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(nodes = self.graph.len()))
    )]
    pub fn run<R: Rng + ?Sized>(
        mut self,
        rng: &mut R,
        cancel: &CancelToken,
    ) -> Result<IcmOutcome, TriangulationError> {
        let n = self.graph.len();
        let mut stats = IcmStats::default();

        if self.candidates.is_empty() {
            info!("no admissible pairs; every detection stays standalone");
            return Ok(IcmOutcome {
                connectivity: self.connectivity,
                stats,
            });
        }

        let mut accepted_in_sweep = 0usize;
        for proposal in 0..self.params.icm_iterations * n {
            if cancel.is_cancelled() {
                return Err(TriangulationError::Cancelled {
                    proposals: proposal,
                });
            }
            if let Some(p) = self.step(rng) {
                if p.accepted {
                    accepted_in_sweep += 1;
                }
            }
            stats.proposals += 1;

            if (proposal + 1) % n == 0 {
                let sweep = stats.accepted_per_sweep.len() + 1;
                info!("iteration #{sweep}: accepted {accepted_in_sweep} changes");
                stats.accepted += accepted_in_sweep;
                stats.accepted_per_sweep.push(accepted_in_sweep);
                accepted_in_sweep = 0;
            }
        }

        stats.links = self.connectivity.total_links();
        debug!("icm finished with {} linked pairs", stats.links);
        Ok(IcmOutcome {
            connectivity: self.connectivity,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intersection::PairParams;
    use approx::assert_abs_diff_eq;
    use geotag_core::{bearing_towards, LoaderParams};
    use nalgebra::Point2;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn params() -> MrfParams {
        MrfParams {
            icm_iterations: 15,
            depth_weight: 0.2,
            object_multiview: 0.2,
            standalone_price: 0.6,
        }
    }

    fn scene() -> (Vec<DetectionRecord>, IntersectionGraph) {
        let targets = [Point2::new(0.0, 0.0), Point2::new(6.0, 9.0)];
        let cams = [
            Point2::new(0.0, 12.5),
            Point2::new(3.0, 12.0),
            Point2::new(-1.8, 12.2),
            Point2::new(10.0, 4.0),
            Point2::new(-4.0, 3.0),
        ];
        let mut records = Vec::new();
        for &c in &cams {
            for &t in &targets {
                records.push(DetectionRecord::from_bearing(
                    "icm",
                    c,
                    bearing_towards(c, t),
                    5.0,
                    &LoaderParams::default(),
                ));
            }
        }
        let graph = IntersectionGraph::build(
            &records,
            PairParams {
                max_dst_cam_object: 15.0,
                min_camera_separation: 0.5,
                max_camera_separation: 22.5,
            },
        );
        (records, graph)
    }

    #[test]
    fn accepted_steps_never_raise_energy_and_rejections_restore_state() {
        let (records, graph) = scene();
        let mut solver = IcmSolver::new(&graph, &records, params());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);

        for _ in 0..500 {
            let before = solver.connectivity().clone();
            let Some(p) = solver.step(&mut rng) else {
                panic!("scene has admissible pairs");
            };
            if p.accepted {
                assert!(p.energy_new <= p.energy_old);
                assert_abs_diff_eq!(solver.energy(p.a) + solver.energy(p.b), p.energy_new);
            } else {
                assert!(p.energy_new > p.energy_old);
                assert_eq!(solver.connectivity(), &before);
            }

            let dense = solver.connectivity().to_dense(&graph);
            for i in 0..dense.len() {
                assert_eq!(dense[i][i], 0);
                for j in 0..dense.len() {
                    assert_eq!(dense[i][j], dense[j][i]);
                    if dense[i][j] == 1 {
                        assert!(graph.object_dst(i, j) > 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn same_seed_gives_the_same_connectivity() {
        let (records, graph) = scene();
        let run = |seed| {
            let solver = IcmSolver::new(&graph, &records, params());
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            solver
                .run(&mut rng, &CancelToken::new())
                .expect("not cancelled")
        };
        let a = run(3);
        let b = run(3);
        assert_eq!(a.connectivity, b.connectivity);
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.stats.proposals, 15 * records.len());
        assert_eq!(a.stats.accepted_per_sweep.len(), 15);
        assert_eq!(a.stats.links, a.connectivity.total_links());
    }

    #[test]
    fn isolated_nodes_are_never_proposed() {
        let records = vec![DetectionRecord::from_bearing(
            "alone",
            Point2::new(0.0, 0.0),
            0.0,
            5.0,
            &LoaderParams::default(),
        )];
        let graph = IntersectionGraph::build(
            &records,
            PairParams {
                max_dst_cam_object: 15.0,
                min_camera_separation: 0.5,
                max_camera_separation: 22.5,
            },
        );
        let solver = IcmSolver::new(&graph, &records, params());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        assert!(solver.propose(&mut rng).is_none());
        let out = solver.run(&mut rng, &CancelToken::new()).unwrap();
        assert_eq!(out.stats.proposals, 0);
        assert_eq!(out.connectivity.total_links(), 0);
    }

    #[test]
    fn cancelled_token_stops_before_the_first_proposal() {
        let (records, graph) = scene();
        let solver = IcmSolver::new(&graph, &records, params());
        let token = CancelToken::new();
        token.cancel();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let err = solver.run(&mut rng, &token).unwrap_err();
        assert!(matches!(err, TriangulationError::Cancelled { proposals: 0 }));
    }
}
