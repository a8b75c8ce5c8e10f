//! Radius queries over planar points with duplicate positions collapsed.
//!
//! Many detections share a camera (several objects in one panorama), and
//! averaged estimates can coincide exactly. Identical positions are merged
//! into one site before the KD-tree is built, so the tree never holds long
//! runs of equal coordinates.

use std::collections::HashMap;

use geotag_core::planar_distance;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point2;

pub(crate) struct SiteIndex {
    sites: Vec<Point2<f64>>,
    members: Vec<Vec<usize>>,
    tree: KdTree<f64, 2>,
}

fn site_key(p: Point2<f64>) -> [u64; 2] {
    // `+ 0.0` folds -0.0 into 0.0.
    [(p.x + 0.0).to_bits(), (p.y + 0.0).to_bits()]
}

impl SiteIndex {
    /// Group `points` by exact position. Sites keep first-seen order and
    /// members keep input order.
    pub(crate) fn build(points: &[Point2<f64>]) -> Self {
        let mut by_key: HashMap<[u64; 2], usize> = HashMap::new();
        let mut sites = Vec::new();
        let mut members: Vec<Vec<usize>> = Vec::new();

        for (i, &p) in points.iter().enumerate() {
            let site = *by_key.entry(site_key(p)).or_insert_with(|| {
                sites.push(p);
                members.push(Vec::new());
                sites.len() - 1
            });
            members[site].push(i);
        }

        let coords = sites.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>();
        let tree: KdTree<f64, 2> = (&coords).into();

        Self {
            sites,
            members,
            tree,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sites.len()
    }

    pub(crate) fn members(&self, site: usize) -> &[usize] {
        &self.members[site]
    }

    /// Sites within `radius` (inclusive) of `site`, itself included, in
    /// ascending site order.
    pub(crate) fn within(&self, site: usize, radius: f64) -> Vec<usize> {
        let p = self.sites[site];
        // Pad the squared radius so the tree never drops a boundary site;
        // the exact test below decides.
        let padded = radius * (1.0 + 1e-9) + 1e-9;
        let mut out: Vec<usize> = self
            .tree
            .within::<SquaredEuclidean>(&[p.x, p.y], padded * padded)
            .into_iter()
            .map(|nn| nn.item as usize)
            .filter(|&other| planar_distance(p, self.sites[other]) <= radius)
            .collect();
        out.sort_unstable();
        out
    }
}
