//! Merging per-detection estimates into object locations.
//!
//! Every detection that ends the ICM walk with at least one linked pair
//! contributes the mean of its linked crossing points. Those estimates are
//! grouped by agglomerative clustering cut at a fixed distance; each group
//! becomes one object whose score is the number of estimates it absorbed.

use log::{debug, info};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::intersection::IntersectionGraph;
use crate::mrf::Connectivity;
use crate::spatial::SiteIndex;

/// Inter-cluster distance used by the agglomeration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Nearest-member distance. Clusters are the connected components of the
    /// "closer than the cutoff" relation.
    #[default]
    Single,
    /// Mean pairwise member distance (UPGMA).
    Average,
}

/// Location estimate of one detection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidatePoint {
    pub node: usize,
    pub point: Point2<f64>,
}

/// One physical object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectCluster {
    pub centroid: Point2<f64>,
    /// Number of merged estimates.
    pub score: usize,
    /// Detection indices of the merged estimates, ascending.
    pub members: Vec<usize>,
}

/// Mean linked crossing point of every detection with at least one link,
/// in detection order.
pub fn averaged_estimates(
    graph: &IntersectionGraph,
    connectivity: &Connectivity,
) -> Vec<CandidatePoint> {
    let mut out = Vec::new();
    for node in 0..graph.len() {
        let linked = connectivity.active_degree(node);
        if linked == 0 {
            continue;
        }
        let sum = graph
            .neighbors(node)
            .iter()
            .enumerate()
            .filter(|&(slot, _)| connectivity.is_active(node, slot))
            .fold(Vector2::zeros(), |acc, (_, pair)| acc + pair.point.coords);
        out.push(CandidatePoint {
            node,
            point: Point2::from(sum / linked as f64),
        });
    }
    info!("ICM intersections: {}", out.len());
    out
}

/// Cluster `candidates` with the given linkage, cutting at `cutoff`.
///
/// Clusters come out ordered by their smallest member index.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(candidates = candidates.len()))
)]
pub fn cluster_candidates(
    candidates: &[CandidatePoint],
    cutoff: f64,
    linkage: Linkage,
) -> Vec<ObjectCluster> {
    if candidates.is_empty() {
        info!("no candidate points; nothing to cluster");
        return Vec::new();
    }

    let points: Vec<Point2<f64>> = candidates.iter().map(|c| c.point).collect();
    let components = radius_components(&points, cutoff);
    debug!(
        "{} candidates form {} single-linkage components",
        points.len(),
        components.len()
    );

    let groups: Vec<Vec<usize>> = match linkage {
        Linkage::Single => components,
        // Average linkage never merges across a single-linkage gap.
        Linkage::Average => components
            .into_iter()
            .flat_map(|component| average_linkage(&points, component, cutoff))
            .collect(),
    };

    let mut clusters: Vec<ObjectCluster> = groups
        .into_iter()
        .map(|group| {
            let sum = group
                .iter()
                .fold(Vector2::zeros(), |acc, &k| acc + points[k].coords);
            let mut members: Vec<usize> = group.iter().map(|&k| candidates[k].node).collect();
            members.sort_unstable();
            ObjectCluster {
                centroid: Point2::from(sum / group.len() as f64),
                score: group.len(),
                members,
            }
        })
        .collect();
    clusters.sort_by_key(|c| c.members[0]);

    info!("clusters: {}", clusters.len());
    clusters
}

/// Connected components of the graph linking points at most `cutoff` apart.
fn radius_components(points: &[Point2<f64>], cutoff: f64) -> Vec<Vec<usize>> {
    let index = SiteIndex::build(points);
    let mut visited = vec![false; index.len()];
    let mut components = Vec::new();

    for start in 0..index.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(site) = stack.pop() {
            if visited[site] {
                continue;
            }
            visited[site] = true;
            component.extend_from_slice(index.members(site));

            for other in index.within(site, cutoff) {
                if !visited[other] {
                    stack.push(other);
                }
            }
        }

        component.sort_unstable();
        components.push(component);
    }

    components
}

/// UPGMA restricted to one component; merges while the closest pair of
/// clusters is at most `cutoff` apart on average.
fn average_linkage(
    points: &[Point2<f64>],
    component: Vec<usize>,
    cutoff: f64,
) -> Vec<Vec<usize>> {
    let n = component.len();
    if n < 2 {
        return vec![component];
    }

    let mut dist = vec![vec![0.0f64; n]; n];
    for a in 0..n {
        for b in (a + 1)..n {
            let d = (points[component[a]] - points[component[b]]).norm();
            dist[a][b] = d;
            dist[b][a] = d;
        }
    }
    let mut groups: Vec<Option<Vec<usize>>> =
        component.into_iter().map(|k| Some(vec![k])).collect();

    loop {
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..n {
            if groups[a].is_none() {
                continue;
            }
            for b in (a + 1)..n {
                if groups[b].is_none() {
                    continue;
                }
                if best.is_none_or(|(_, _, d)| dist[a][b] < d) {
                    best = Some((a, b, dist[a][b]));
                }
            }
        }

        let Some((a, b, d)) = best else { break };
        if d > cutoff {
            break;
        }

        let (Some(ga), Some(gb)) = (groups[a].take(), groups[b].take()) else {
            break;
        };
        let (wa, wb) = (ga.len() as f64, gb.len() as f64);
        for k in 0..n {
            if k == a || k == b || groups[k].is_none() {
                continue;
            }
            let merged = (wa * dist[a][k] + wb * dist[b][k]) / (wa + wb);
            dist[a][k] = merged;
            dist[k][a] = merged;
        }
        let mut joined = ga;
        joined.extend(gb);
        groups[a] = Some(joined);
    }

    groups
        .into_iter()
        .flatten()
        .map(|mut g| {
            g.sort_unstable();
            g
        })
        .collect()
}
