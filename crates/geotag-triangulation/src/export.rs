use std::io::{self, Write};

use geotag_core::{PlanarProjection, ProjectionError};
use serde::{Deserialize, Serialize};

use crate::cluster::ObjectCluster;

/// Final geographic object position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub lat: f64,
    pub lon: f64,
    /// Number of detection estimates supporting the object.
    pub score: usize,
}

/// Project every cluster centroid to latitude/longitude, keeping order.
pub fn export_locations<P: PlanarProjection + ?Sized>(
    clusters: &[ObjectCluster],
    projection: &P,
) -> Result<Vec<ObjectLocation>, ProjectionError> {
    clusters
        .iter()
        .map(|cluster| {
            let geo = projection.to_geographic(cluster.centroid)?;
            Ok(ObjectLocation {
                lat: geo.lat,
                lon: geo.lon,
                score: cluster.score,
            })
        })
        .collect()
}

/// Write `lat,lon,score` rows with six-decimal coordinates.
pub fn write_csv<W: Write>(locations: &[ObjectLocation], mut out: W) -> io::Result<()> {
    writeln!(out, "lat,lon,score")?;
    for loc in locations {
        writeln!(out, "{:.6},{:.6},{}", loc.lat, loc.lon, loc.score)?;
    }
    out.flush()
}
