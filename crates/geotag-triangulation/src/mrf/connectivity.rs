use crate::intersection::IntersectionGraph;

/// Active/inactive flag per admissible pair.
///
/// Flags are stored per adjacency slot on both endpoints, so a toggle always
/// flips two flags and the relation stays symmetric. Self pairs are never
/// admissible and so can never be linked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connectivity {
    links: Vec<Vec<bool>>,
    active: Vec<usize>,
}

impl Connectivity {
    /// All-zero state shaped after `graph`.
    pub fn new(graph: &IntersectionGraph) -> Self {
        let links = (0..graph.len())
            .map(|i| vec![false; graph.viable_degree(i)])
            .collect();
        Self {
            links,
            active: vec![0; graph.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Flip the pair stored at `slot` of `node`'s adjacency, on both sides.
    /// Returns the new state.
    pub fn toggle(&mut self, graph: &IntersectionGraph, node: usize, slot: usize) -> bool {
        let neighbor = graph.neighbors(node)[slot].neighbor;
        let mirror = graph.mirror(node, slot);

        let now = !self.links[node][slot];
        self.links[node][slot] = now;
        self.links[neighbor][mirror] = now;

        if now {
            self.active[node] += 1;
            self.active[neighbor] += 1;
        } else {
            self.active[node] -= 1;
            self.active[neighbor] -= 1;
        }
        now
    }

    #[inline]
    pub fn is_active(&self, node: usize, slot: usize) -> bool {
        self.links[node][slot]
    }

    /// Whether `i` and `j` are currently linked.
    pub fn is_linked(&self, graph: &IntersectionGraph, i: usize, j: usize) -> bool {
        graph
            .slot_of(i, j)
            .is_some_and(|slot| self.links[i][slot])
    }

    #[inline]
    pub fn active_degree(&self, node: usize) -> usize {
        self.active[node]
    }

    /// Number of linked unordered pairs.
    pub fn total_links(&self) -> usize {
        self.active.iter().sum::<usize>() / 2
    }

    /// Linked neighbours of `node`, in ascending index order.
    pub fn linked_neighbors<'a>(
        &'a self,
        graph: &'a IntersectionGraph,
        node: usize,
    ) -> impl Iterator<Item = usize> + 'a {
        graph
            .neighbors(node)
            .iter()
            .zip(&self.links[node])
            .filter(|(_, on)| **on)
            .map(|(pair, _)| pair.neighbor)
    }

    /// Linked unordered pairs `(i, j)` with `i < j`.
    pub fn linked_edges(&self, graph: &IntersectionGraph) -> Vec<(usize, usize)> {
        let mut out = Vec::with_capacity(self.total_links());
        for i in 0..self.len() {
            out.extend(
                self.linked_neighbors(graph, i)
                    .filter(|&j| j > i)
                    .map(|j| (i, j)),
            );
        }
        out
    }

    /// Dense `N x N` 0/1 matrix, row-major.
    pub fn to_dense(&self, graph: &IntersectionGraph) -> Vec<Vec<u8>> {
        let n = self.len();
        let mut dense = vec![vec![0u8; n]; n];
        for (i, row) in dense.iter_mut().enumerate() {
            for j in self.linked_neighbors(graph, i) {
                row[j] = 1;
            }
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intersection::PairParams;
    use geotag_core::{bearing_towards, DetectionRecord, LoaderParams};
    use nalgebra::Point2;

    fn star_graph() -> IntersectionGraph {
        let target = Point2::new(0.0, 0.0);
        let records: Vec<_> = [
            Point2::new(0.0, 10.0),
            Point2::new(8.0, 6.0),
            Point2::new(-7.0, 7.0),
        ]
        .iter()
        .map(|&c| {
            DetectionRecord::from_bearing(
                "s",
                c,
                bearing_towards(c, target),
                5.0,
                &LoaderParams::default(),
            )
        })
        .collect();
        IntersectionGraph::build(
            &records,
            PairParams {
                max_dst_cam_object: 15.0,
                min_camera_separation: 0.5,
                max_camera_separation: 22.5,
            },
        )
    }

    #[test]
    fn toggle_keeps_the_relation_symmetric() {
        let graph = star_graph();
        assert_eq!(graph.viable_degree(0), 2);

        let mut conn = Connectivity::new(&graph);
        assert_eq!(conn.total_links(), 0);

        let slot = graph.slot_of(0, 2).unwrap();
        assert!(conn.toggle(&graph, 0, slot));
        assert!(conn.is_linked(&graph, 0, 2));
        assert!(conn.is_linked(&graph, 2, 0));
        assert_eq!(conn.active_degree(0), 1);
        assert_eq!(conn.active_degree(2), 1);
        assert_eq!(conn.active_degree(1), 0);
        assert_eq!(conn.linked_edges(&graph), vec![(0, 2)]);

        let dense = conn.to_dense(&graph);
        for i in 0..3 {
            assert_eq!(dense[i][i], 0);
            for j in 0..3 {
                assert_eq!(dense[i][j], dense[j][i]);
            }
        }

        let back = graph.slot_of(2, 0).unwrap();
        assert!(!conn.toggle(&graph, 2, back));
        assert_eq!(conn, Connectivity::new(&graph));
    }
}
