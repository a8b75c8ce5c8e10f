use crate::intersection::IntersectionGraph;

use super::{Connectivity, MrfParams};

/// Local energy of `node` under the current connectivity.
///
/// A node without active edges costs `standalone_price`. Otherwise each
/// active neighbour adds `depth_weight * |t - depth|`, and the spread of the
/// along-ray distances adds `object_multiview * (max t - min t)` once.
pub fn node_energy(
    graph: &IntersectionGraph,
    connectivity: &Connectivity,
    depth: f64,
    node: usize,
    params: &MrfParams,
) -> f64 {
    if connectivity.active_degree(node) == 0 {
        return params.standalone_price;
    }

    let mut energy = 0.0;
    let mut t_min = f64::INFINITY;
    let mut t_max = f64::NEG_INFINITY;
    for (slot, pair) in graph.neighbors(node).iter().enumerate() {
        if !connectivity.is_active(node, slot) {
            continue;
        }
        energy += params.depth_weight * (pair.along_ray - depth).abs();
        t_min = t_min.min(pair.along_ray);
        t_max = t_max.max(pair.along_ray);
    }
    energy + params.object_multiview * (t_max - t_min)
}
