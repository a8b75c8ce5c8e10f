//! Core types and utilities for bearing-only geotagging.
//!
//! This crate is intentionally small and purely geometric: bearing and
//! planar-distance helpers, planar ↔ geographic projections, the camera
//! metadata seam and the detection loader. It knows nothing about the MRF
//! model or clustering; see `geotag-triangulation` for those.

mod detection;
mod geometry;
mod logger;
mod lookup;
mod projection;

pub use detection::{
    load_detections, BoundingBox, DetectionInput, DetectionRecord, LoadError, LoaderParams,
};
pub use geometry::{
    bearing_direction, bearing_from_pixel, bearing_towards, pixel_from_bearing, planar_distance,
};
pub use lookup::{
    CameraLookup, CameraPose, CameraRecord, CameraTable, CameraTableError, FnLookup, LookupError,
};
pub use projection::{
    GeoPoint, LocalTangentPlane, PlanarProjection, Projection, ProjectionError, ProjectionKind,
    RijksDriehoek,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, parse_level};
