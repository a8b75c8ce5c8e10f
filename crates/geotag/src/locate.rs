//! End-to-end helpers: detection file in, located-object CSV out.

use std::path::Path;
use std::time::Instant;

use geotag_core::{CameraLookup, PlanarProjection};
use geotag_triangulation::{TriangulationOutput, Triangulator};
use log::info;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::io::{write_locations_csv, GeotagIoError, RunConfig};

/// Triangulate one detections file and write its CSV to `output`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(detections = %detections.display()))
)]
pub fn locate_file<L, P>(
    cfg: &RunConfig,
    detections: &Path,
    output: &Path,
    triangulator: &Triangulator,
    cameras: &L,
    projection: &P,
) -> Result<TriangulationOutput, GeotagIoError>
where
    L: CameraLookup + ?Sized,
    P: PlanarProjection + ?Sized,
{
    let started = Instant::now();
    let inputs = cfg.load_detections(detections)?;
    let out = triangulator.run(&inputs, cameras, projection)?;
    write_locations_csv(output, &out.locations)?;
    info!(
        "{}: {} objects written to {} in {:.2}s",
        detections.display(),
        out.locations.len(),
        output.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(out)
}

/// Run `cfg` as written: its detections file, camera table and output path.
pub fn run_config(cfg: &RunConfig) -> Result<TriangulationOutput, GeotagIoError> {
    let projection = cfg.build_projection()?;
    let triangulator = cfg.build_triangulator()?;
    let cameras = cfg.load_cameras(&projection)?;
    locate_file(
        cfg,
        Path::new(&cfg.detections_path),
        &cfg.output_path(),
        &triangulator,
        &cameras,
        &projection,
    )
}
