//! Pairwise bearing-ray intersections.
//!
//! Only geometrically plausible pairs are stored: each detection keeps the
//! list of detections whose rays cross its own in front of both cameras and
//! within range. Every other pair carries one of the [`PairStatus`] rejection
//! reasons, which is recomputed on demand rather than stored, so the graph
//! stays sparse while [`IntersectionGraph::object_dst`] still answers for
//! any pair.

use geotag_core::{planar_distance, DetectionRecord};
use log::{debug, info};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::spatial::SiteIndex;

/// Geometric admissibility limits.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairParams {
    /// Max along-ray parameter on either ray.
    pub max_dst_cam_object: f64,
    pub min_camera_separation: f64,
    pub max_camera_separation: f64,
}

/// Outcome of intersecting two detection rays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PairStatus {
    SameDetection,
    /// Cameras too close together or too far apart.
    CameraSeparation,
    Parallel,
    /// The crossing lies behind at least one camera.
    BehindCamera,
    /// The crossing lies further than the max object distance along at
    /// least one ray.
    BeyondRange,
    Admissible {
        along_ray: f64,
        point: Point2<f64>,
    },
}

impl PairStatus {
    pub const SAME_DETECTION: f64 = -5.0;
    pub const CAMERA_SEPARATION: f64 = -4.0;
    pub const BEYOND_RANGE: f64 = -3.0;
    pub const BEHIND_CAMERA: f64 = -2.0;
    pub const PARALLEL: f64 = -1.0;

    /// Along-ray distance for admissible pairs, otherwise the negative
    /// sentinel of the rejection reason.
    pub fn object_dst(&self) -> f64 {
        match *self {
            PairStatus::SameDetection => Self::SAME_DETECTION,
            PairStatus::CameraSeparation => Self::CAMERA_SEPARATION,
            PairStatus::BeyondRange => Self::BEYOND_RANGE,
            PairStatus::BehindCamera => Self::BEHIND_CAMERA,
            PairStatus::Parallel => Self::PARALLEL,
            PairStatus::Admissible { along_ray, .. } => along_ray,
        }
    }

    pub fn is_admissible(&self) -> bool {
        matches!(self, PairStatus::Admissible { .. })
    }
}

/// An admissible neighbour of a detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayPair {
    pub neighbor: usize,
    /// Along-ray parameter of the owning detection's ray at the crossing.
    pub along_ray: f64,
    pub point: Point2<f64>,
    /// Slot of the owning detection in `neighbor`'s list.
    pub(crate) mirror: usize,
}

/// Pair counts by outcome over all `n (n - 1) / 2` unordered pairs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairStats {
    pub total_pairs: usize,
    pub admissible: usize,
    pub camera_separation: usize,
    pub parallel: usize,
    pub behind_camera: usize,
    pub beyond_range: usize,
}

#[derive(Clone, Copy, Debug)]
struct Ray {
    origin: Point2<f64>,
    direction: Vector2<f64>,
}

impl Ray {
    fn from_record(record: &DetectionRecord) -> Self {
        Self {
            origin: record.camera_position,
            direction: record.direction,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Crossing {
    t_first: f64,
    t_second: f64,
    point: Point2<f64>,
}

/// Intersect `first + t1 * d1` with `second + t2 * d2`.
///
/// The lower detection index is always passed as `first` so both orderings
/// of a pair come from the same arithmetic.
fn classify(first: &Ray, second: &Ray, params: &PairParams) -> Result<Crossing, PairStatus> {
    let separation = planar_distance(first.origin, second.origin);
    if !(separation >= params.min_camera_separation
        && separation <= params.max_camera_separation)
    {
        return Err(PairStatus::CameraSeparation);
    }

    let d1 = first.direction;
    let d2 = second.direction;
    let c = second.origin - first.origin;

    // Cramer's rule on [d1, -d2] [t1, t2]^T = c.
    let det = d2.x * d1.y - d1.x * d2.y;
    if det == 0.0 {
        return Err(PairStatus::Parallel);
    }
    let t1 = (d2.x * c.y - c.x * d2.y) / det;
    let t2 = (d1.x * c.y - d1.y * c.x) / det;

    if !(t1 > 0.0 && t2 > 0.0) {
        return Err(PairStatus::BehindCamera);
    }
    if t1 > params.max_dst_cam_object || t2 > params.max_dst_cam_object {
        return Err(PairStatus::BeyondRange);
    }

    Ok(Crossing {
        t_first: t1,
        t_second: t2,
        point: first.origin + d1 * t1,
    })
}

/// Sparse graph of admissible detection pairs.
#[derive(Clone, Debug)]
pub struct IntersectionGraph {
    rays: Vec<Ray>,
    adjacency: Vec<Vec<RayPair>>,
    params: PairParams,
    stats: PairStats,
}

impl IntersectionGraph {
    /// Intersect every pair of detections whose cameras are within the
    /// admissible separation band.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(detections = records.len()))
    )]
    pub fn build(records: &[DetectionRecord], params: PairParams) -> Self {
        let n = records.len();
        let rays: Vec<Ray> = records.iter().map(Ray::from_record).collect();
        let cameras: Vec<Point2<f64>> = records.iter().map(|r| r.camera_position).collect();
        let index = SiteIndex::build(&cameras);

        let mut adjacency: Vec<Vec<RayPair>> = vec![Vec::new(); n];
        let mut stats = PairStats {
            total_pairs: n * n.saturating_sub(1) / 2,
            ..PairStats::default()
        };
        let mut evaluated_in_band = 0usize;

        for s in 0..index.len() {
            if s % 1000 == 0 && s > 0 {
                debug!(
                    "paired {s} camera sites ({:.2}%)",
                    100.0 * s as f64 / index.len() as f64
                );
            }
            for t in index.within(s, params.max_camera_separation) {
                if t <= s {
                    continue;
                }
                for &i in index.members(s) {
                    for &j in index.members(t) {
                        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
                        match classify(&rays[lo], &rays[hi], &params) {
                            Ok(crossing) => {
                                stats.admissible += 1;
                                adjacency[lo].push(RayPair {
                                    neighbor: hi,
                                    along_ray: crossing.t_first,
                                    point: crossing.point,
                                    mirror: 0,
                                });
                                adjacency[hi].push(RayPair {
                                    neighbor: lo,
                                    along_ray: crossing.t_second,
                                    point: crossing.point,
                                    mirror: 0,
                                });
                            }
                            Err(PairStatus::Parallel) => stats.parallel += 1,
                            Err(PairStatus::BehindCamera) => stats.behind_camera += 1,
                            Err(PairStatus::BeyondRange) => stats.beyond_range += 1,
                            Err(_) => continue,
                        }
                        evaluated_in_band += 1;
                    }
                }
            }
        }
        stats.camera_separation = stats.total_pairs - evaluated_in_band;

        for list in adjacency.iter_mut() {
            list.sort_by_key(|p| p.neighbor);
        }
        // Admissible pairs are stored on both sides, so every lookup hits.
        for i in 0..n {
            for slot in 0..adjacency[i].len() {
                let j = adjacency[i][slot].neighbor;
                if j < i {
                    continue;
                }
                if let Ok(mirror) = adjacency[j].binary_search_by_key(&i, |p| p.neighbor) {
                    adjacency[i][slot].mirror = mirror;
                    adjacency[j][mirror].mirror = slot;
                }
            }
        }

        info!("all admissible intersections: {}", stats.admissible);
        debug!(
            "rejected pairs: separation {}, parallel {}, behind {}, beyond {}",
            stats.camera_separation, stats.parallel, stats.behind_camera, stats.beyond_range
        );

        Self {
            rays,
            adjacency,
            params,
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    pub fn params(&self) -> &PairParams {
        &self.params
    }

    pub fn stats(&self) -> &PairStats {
        &self.stats
    }

    /// Admissible neighbours of `node`, ordered by neighbour index.
    pub fn neighbors(&self, node: usize) -> &[RayPair] {
        &self.adjacency[node]
    }

    /// Number of admissible pairs `node` takes part in.
    pub fn viable_degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    /// Position of `neighbor` in `node`'s adjacency list.
    pub fn slot_of(&self, node: usize, neighbor: usize) -> Option<usize> {
        self.adjacency[node]
            .binary_search_by_key(&neighbor, |p| p.neighbor)
            .ok()
    }

    pub(crate) fn mirror(&self, node: usize, slot: usize) -> usize {
        self.adjacency[node][slot].mirror
    }

    /// Status of the ordered pair `(i, j)`.
    pub fn pair_status(&self, i: usize, j: usize) -> PairStatus {
        if i == j {
            return PairStatus::SameDetection;
        }
        if let Some(slot) = self.slot_of(i, j) {
            let pair = &self.adjacency[i][slot];
            return PairStatus::Admissible {
                along_ray: pair.along_ray,
                point: pair.point,
            };
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        match classify(&self.rays[lo], &self.rays[hi], &self.params) {
            Err(status) => status,
            // Only reachable if the stored graph and the classifier disagree.
            Ok(crossing) => PairStatus::Admissible {
                along_ray: if i == lo {
                    crossing.t_first
                } else {
                    crossing.t_second
                },
                point: crossing.point,
            },
        }
    }

    /// Along-ray distance from camera `i` to its crossing with ray `j`, or
    /// the rejection sentinel (`-1` … `-5`).
    pub fn object_dst(&self, i: usize, j: usize) -> f64 {
        self.pair_status(i, j).object_dst()
    }

    /// Crossing point of rays `i` and `j`, if the pair is admissible.
    pub fn intersection(&self, i: usize, j: usize) -> Option<Point2<f64>> {
        self.slot_of(i, j).map(|slot| self.adjacency[i][slot].point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geotag_core::{bearing_towards, LoaderParams};

    fn params() -> PairParams {
        PairParams {
            max_dst_cam_object: 15.0,
            min_camera_separation: 0.5,
            max_camera_separation: 22.5,
        }
    }

    fn record_towards(camera: Point2<f64>, target: Point2<f64>) -> DetectionRecord {
        DetectionRecord::from_bearing(
            "t",
            camera,
            bearing_towards(camera, target),
            5.0,
            &LoaderParams::default(),
        )
    }

    fn record_with_bearing(camera: Point2<f64>, bearing: f64) -> DetectionRecord {
        DetectionRecord::from_bearing("b", camera, bearing, 5.0, &LoaderParams::default())
    }

    #[test]
    fn converging_rays_meet_at_the_target() {
        let target = Point2::new(10.0, 10.0);
        let records = vec![
            record_towards(Point2::new(0.0, 10.0), target),
            record_towards(Point2::new(10.0, 0.0), target),
        ];
        let graph = IntersectionGraph::build(&records, params());

        assert_eq!(graph.stats().admissible, 1);
        assert_eq!(graph.viable_degree(0), 1);
        // 10 units away at 2.5 units per step.
        assert_abs_diff_eq!(graph.object_dst(0, 1), 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(graph.object_dst(1, 0), 4.0, epsilon = 1e-9);

        let p = graph.intersection(0, 1).expect("admissible");
        assert_abs_diff_eq!(p.x, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 10.0, epsilon = 1e-9);
        assert_eq!(graph.intersection(1, 0), Some(p));
    }

    #[test]
    fn cameras_too_close_get_the_separation_sentinel() {
        let records = vec![
            record_with_bearing(Point2::new(0.0, 0.0), 10.0),
            record_with_bearing(Point2::new(0.4, 0.0), 300.0),
        ];
        let graph = IntersectionGraph::build(&records, params());
        assert_eq!(graph.object_dst(0, 1), -4.0);
        assert_eq!(graph.object_dst(1, 0), -4.0);
        assert_eq!(graph.stats().camera_separation, 1);
        assert_eq!(graph.viable_degree(0), 0);
    }

    #[test]
    fn cameras_too_far_apart_get_the_separation_sentinel() {
        let records = vec![
            record_with_bearing(Point2::new(0.0, 0.0), 10.0),
            record_with_bearing(Point2::new(30.0, 0.0), 300.0),
        ];
        let graph = IntersectionGraph::build(&records, params());
        assert_eq!(graph.object_dst(0, 1), -4.0);
        assert_eq!(graph.stats().camera_separation, 1);
    }

    #[test]
    fn parallel_rays_get_the_parallel_sentinel() {
        let records = vec![
            record_with_bearing(Point2::new(0.0, 0.0), 37.0),
            record_with_bearing(Point2::new(3.0, 1.0), 37.0),
        ];
        let graph = IntersectionGraph::build(&records, params());
        assert_eq!(graph.object_dst(0, 1), -1.0);
        assert_eq!(graph.object_dst(1, 0), -1.0);
        assert_eq!(graph.stats().parallel, 1);
    }

    #[test]
    fn crossing_behind_a_camera_is_rejected() {
        // Both rays point away from the crossing of their lines.
        let target = Point2::new(10.0, 10.0);
        let a = Point2::new(0.0, 10.0);
        let b = Point2::new(10.0, 0.0);
        let records = vec![
            record_with_bearing(a, (bearing_towards(a, target) + 180.0) % 360.0),
            record_towards(b, target),
        ];
        let graph = IntersectionGraph::build(&records, params());
        assert_eq!(graph.object_dst(0, 1), -2.0);
        assert_eq!(graph.object_dst(1, 0), -2.0);
    }

    #[test]
    fn crossing_beyond_range_is_rejected() {
        // Cameras 20 apart looking at a point 50 units away: 20 steps out.
        let target = Point2::new(10.0, 50.0);
        let records = vec![
            record_towards(Point2::new(0.0, 0.0), target),
            record_towards(Point2::new(20.0, 0.0), target),
        ];
        let graph = IntersectionGraph::build(&records, params());
        assert_eq!(graph.object_dst(0, 1), -3.0);
        assert_eq!(graph.stats().beyond_range, 1);
    }

    #[test]
    fn self_pairs_use_their_own_sentinel() {
        let records = vec![record_with_bearing(Point2::new(0.0, 0.0), 0.0)];
        let graph = IntersectionGraph::build(&records, params());
        assert_eq!(graph.object_dst(0, 0), -5.0);
        assert_eq!(graph.stats().total_pairs, 0);
    }

    #[test]
    fn viability_and_points_are_symmetric() {
        let target_a = Point2::new(5.0, 5.0);
        let target_b = Point2::new(-6.0, 8.0);
        let cams = [
            Point2::new(0.0, 0.0),
            Point2::new(3.0, -1.0),
            Point2::new(-2.0, 1.5),
            Point2::new(0.2, 0.1),
            Point2::new(8.0, 2.0),
        ];
        let mut records = Vec::new();
        for (k, &c) in cams.iter().enumerate() {
            let t = if k % 2 == 0 { target_a } else { target_b };
            records.push(record_towards(c, t));
            records.push(record_towards(c, if k % 2 == 0 { target_b } else { target_a }));
        }
        let graph = IntersectionGraph::build(&records, params());
        assert!(graph.stats().admissible > 0);

        for i in 0..records.len() {
            for j in 0..records.len() {
                let ij = graph.object_dst(i, j);
                let ji = graph.object_dst(j, i);
                assert_eq!(ij > 0.0, ji > 0.0, "pair ({i}, {j})");
                if ij > 0.0 {
                    assert_eq!(graph.intersection(i, j), graph.intersection(j, i));
                } else {
                    assert_eq!(ij, ji, "sentinels match for ({i}, {j})");
                }
            }
        }

        let counted = graph.stats().admissible
            + graph.stats().camera_separation
            + graph.stats().parallel
            + graph.stats().behind_camera
            + graph.stats().beyond_range;
        assert_eq!(counted, graph.stats().total_pairs);
    }

    #[test]
    fn mirrors_point_back() {
        let target = Point2::new(4.0, 4.0);
        let records: Vec<_> = [
            Point2::new(0.0, 0.0),
            Point2::new(4.0, -1.0),
            Point2::new(-1.0, 4.0),
            Point2::new(8.0, 1.0),
        ]
        .iter()
        .map(|&c| record_towards(c, target))
        .collect();
        let graph = IntersectionGraph::build(&records, params());
        for i in 0..graph.len() {
            for (slot, pair) in graph.neighbors(i).iter().enumerate() {
                let back = &graph.neighbors(pair.neighbor)[graph.mirror(i, slot)];
                assert_eq!(back.neighbor, i);
                assert_eq!(back.point, pair.point);
            }
        }
    }
}
