//! High-level facade crate for the `geotag-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core and triangulation crates
//! - readers for detector output (COCO JSON, `pano_id,center_x` CSV) and
//!   camera tables, and the located-object CSV writer
//! - end-to-end helpers and a parallel batch runner
//! - the `geotag` command-line tool (feature `cli`)
//!
//! ## Quickstart
//!
//! ```no_run
//! use geotag::io::RunConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cfg = RunConfig::new("coco_instances_results.json", "panoramas.json");
//! cfg.params.seed = Some(7);
//! let out = geotag::locate::run_config(&cfg)?;
//! println!("located {} objects", out.locations.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `geotag::core`: geometry, projections, camera lookup, detection loader.
//! - `geotag::triangulation`: intersections, MRF/ICM, clustering, export.
//! - `geotag::io`: file formats and [`io::RunConfig`].
//! - `geotag::report`: JSON run report.
//! - `geotag::batch`: many files in parallel with `rayon`.

pub use geotag_core as core;
pub use geotag_triangulation as triangulation;

pub use geotag_core::{
    CameraLookup, CameraPose, CameraTable, DetectionInput, GeoPoint, Projection, ProjectionKind,
};
pub use geotag_triangulation::{
    ObjectLocation, TriangulationOutput, TriangulationParams, Triangulator,
};

pub mod batch;
pub mod io;
pub mod locate;
pub mod report;
