use geotag_core::{LoadError, ProjectionError};

use crate::params::ParamsError;

/// Fatal failures of a triangulation run.
///
/// Degenerate geometry (parallel rays, crossings behind a camera, ...) is
/// never an error; it only makes a pair inadmissible.
#[derive(thiserror::Error, Debug)]
pub enum TriangulationError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error("invalid parameters: {0}")]
    Params(#[from] ParamsError),
    #[error("triangulation cancelled after {proposals} ICM proposals")]
    Cancelled { proposals: usize },
}
