//! Independent runs over many detection files, in parallel.
//!
//! Files share the camera table and projection read-only; each run owns its
//! RNG. With a configured seed, file `k` (in sorted order) runs with
//! `seed + k`, so a batch replays exactly.

use std::{
    fs,
    path::{Path, PathBuf},
};

use geotag_triangulation::{TriangulationOutput, Triangulator};
use log::{info, warn};
use rayon::prelude::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::io::{GeotagIoError, RunConfig};
use crate::locate::locate_file;

#[derive(Debug)]
pub struct BatchOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub result: Result<TriangulationOutput, GeotagIoError>,
}

/// Detection files (`.json` or `.csv`) directly under `dir`, sorted by path.
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>, GeotagIoError> {
    let mut inputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let known = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("csv"));
        if path.is_file() && known {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// Output CSV for `input` inside `output_dir`.
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "detections".to_string());
    output_dir.join(format!("{stem}_locations.csv"))
}

/// Triangulate every file in `inputs`, writing one CSV per file into
/// `output_dir`.
///
/// Setup failures (projection, camera table, parameters, output directory)
/// abort the batch; per-file failures are reported in the outcomes.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(files = inputs.len()))
)]
pub fn run_batch(
    cfg: &RunConfig,
    inputs: &[PathBuf],
    output_dir: &Path,
) -> Result<Vec<BatchOutcome>, GeotagIoError> {
    let projection = cfg.build_projection()?;
    // Rejects invalid parameters before any file is read.
    cfg.build_triangulator()?;
    let cameras = cfg.load_cameras(&projection)?;
    fs::create_dir_all(output_dir)?;

    info!("batch: {} files", inputs.len());
    let outcomes: Vec<BatchOutcome> = inputs
        .par_iter()
        .enumerate()
        .map(|(index, input)| {
            let output = output_path_for(input, output_dir);
            let mut params = cfg.params.clone();
            params.seed = params.seed.map(|s| s.wrapping_add(index as u64));
            let result = Triangulator::new(params)
                .map_err(GeotagIoError::from)
                .and_then(|tri| locate_file(cfg, input, &output, &tri, &cameras, &projection));
            if let Err(err) = &result {
                warn!("{}: {err}", input.display());
            }
            BatchOutcome {
                input: input.clone(),
                output,
                result,
            }
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        "batch finished: {} ok, {failed} failed",
        outcomes.len() - failed
    );
    Ok(outcomes)
}
