//! Camera metadata seam.
//!
//! Panorama metadata (where was the camera when the image was taken) lives
//! in an external service. The loader only sees the [`CameraLookup`] trait;
//! [`CameraTable`] serves pre-fetched metadata from memory and [`FnLookup`]
//! adapts any closure (an HTTP client, a database, a test fixture).

use std::collections::HashMap;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::projection::{GeoPoint, PlanarProjection, ProjectionError};

/// Camera position in the planar frame plus the panorama heading.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Point2<f64>,
    /// Heading of the panorama's left edge in degrees. Informational: the
    /// panoramas are assumed to be north-aligned already.
    #[serde(default)]
    pub heading_deg: f64,
}

impl CameraPose {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            position: Point2::new(x, y),
            heading_deg: 0.0,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("unknown image id `{0}`")]
    UnknownImage(String),
    #[error("metadata service failed: {0}")]
    Transport(String),
}

/// Resolve an image identifier into the pose of the camera that took it.
pub trait CameraLookup {
    fn lookup(&self, image_id: &str) -> Result<CameraPose, LookupError>;
}

impl<L: CameraLookup + ?Sized> CameraLookup for &L {
    fn lookup(&self, image_id: &str) -> Result<CameraPose, LookupError> {
        (**self).lookup(image_id)
    }
}

impl CameraLookup for HashMap<String, CameraPose> {
    fn lookup(&self, image_id: &str) -> Result<CameraPose, LookupError> {
        self.get(image_id)
            .copied()
            .ok_or_else(|| LookupError::UnknownImage(image_id.to_string()))
    }
}

/// Closure-backed lookup.
pub struct FnLookup<F>(pub F);

impl<F> CameraLookup for FnLookup<F>
where
    F: Fn(&str) -> Result<CameraPose, LookupError>,
{
    fn lookup(&self, image_id: &str) -> Result<CameraPose, LookupError> {
        (self.0)(image_id)
    }
}

/// One entry of a camera metadata file.
///
/// The service reports WGS84 positions; pre-projected planar positions are
/// accepted as well.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CameraRecord {
    Planar {
        x: f64,
        y: f64,
        #[serde(default)]
        heading_deg: f64,
    },
    Geographic {
        lat: f64,
        lon: f64,
        #[serde(default)]
        heading_deg: f64,
    },
}

impl CameraRecord {
    fn to_pose<P: PlanarProjection + ?Sized>(
        &self,
        projection: &P,
    ) -> Result<CameraPose, ProjectionError> {
        match *self {
            CameraRecord::Planar { x, y, heading_deg } => Ok(CameraPose {
                position: Point2::new(x, y),
                heading_deg,
            }),
            CameraRecord::Geographic {
                lat,
                lon,
                heading_deg,
            } => Ok(CameraPose {
                position: projection.to_planar(GeoPoint { lat, lon })?,
                heading_deg,
            }),
        }
    }
}

/// In-memory camera metadata keyed by image id.
#[derive(Clone, Debug, Default)]
pub struct CameraTable {
    poses: HashMap<String, CameraPose>,
}

impl CameraTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image_id: impl Into<String>, pose: CameraPose) {
        self.poses.insert(image_id.into(), pose);
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Build a table from file records, projecting geographic entries into
    /// the planar frame.
    pub fn from_records<P: PlanarProjection + ?Sized>(
        records: HashMap<String, CameraRecord>,
        projection: &P,
    ) -> Result<Self, ProjectionError> {
        let mut poses = HashMap::with_capacity(records.len());
        for (id, record) in records {
            let pose = record.to_pose(projection)?;
            poses.insert(id, pose);
        }
        Ok(Self { poses })
    }

    /// Parse a JSON object `{ "<image id>": { "x": .., "y": .. } | { "lat": .., "lon": .. } }`.
    pub fn from_json_str<P: PlanarProjection + ?Sized>(
        raw: &str,
        projection: &P,
    ) -> Result<Self, CameraTableError> {
        let records: HashMap<String, CameraRecord> = serde_json::from_str(raw)?;
        Ok(Self::from_records(records, projection)?)
    }
}

impl CameraLookup for CameraTable {
    fn lookup(&self, image_id: &str) -> Result<CameraPose, LookupError> {
        self.poses.lookup(image_id)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CameraTableError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}
