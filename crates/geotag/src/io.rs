//! File formats: run configuration, detector output, camera tables and the
//! located-object CSV.

use std::{
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
};

use geotag_core::{
    BoundingBox, CameraTable, CameraTableError, DetectionInput, PlanarProjection, Projection,
    ProjectionError, ProjectionKind,
};
use geotag_triangulation::{
    write_csv, ObjectLocation, TriangulationError, TriangulationParams, Triangulator,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum GeotagIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("line {line}: {message}")]
    Csv { line: usize, message: String },
    #[error("camera table: {0}")]
    Cameras(#[from] CameraTableError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Triangulation(#[from] TriangulationError),
}

/// Layout of a detections file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionFormat {
    /// COCO instance results: a JSON array of `{image_id, bbox, segmentation, score}`.
    #[default]
    Coco,
    /// `pano_id,center_x` rows after a header line.
    CenterCsv,
}

impl DetectionFormat {
    /// Guess from the file extension: `.csv` is [`DetectionFormat::CenterCsv`],
    /// anything else COCO.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => DetectionFormat::CenterCsv,
            _ => DetectionFormat::Coco,
        }
    }
}

fn default_pano_width() -> u32 {
    2000
}

/// Configuration of one triangulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub detections_path: String,
    pub cameras_path: String,
    #[serde(default)]
    pub detections_format: Option<DetectionFormat>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub report_path: Option<String>,
    #[serde(default)]
    pub projection: ProjectionKind,
    /// COCO entries scoring below this are dropped.
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Panorama width for CSV input, which carries no image size.
    #[serde(default = "default_pano_width")]
    pub pano_width: u32,
    #[serde(default)]
    pub params: TriangulationParams,
}

impl RunConfig {
    /// Config with default settings for the given inputs.
    pub fn new(detections_path: impl Into<String>, cameras_path: impl Into<String>) -> Self {
        Self {
            detections_path: detections_path.into(),
            cameras_path: cameras_path.into(),
            detections_format: None,
            output_path: None,
            report_path: None,
            projection: ProjectionKind::default(),
            min_score: None,
            pano_width: default_pano_width(),
            params: TriangulationParams::default(),
        }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, GeotagIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), GeotagIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the located-objects CSV path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("object_locations.csv"))
    }

    pub fn format_for(&self, path: &Path) -> DetectionFormat {
        self.detections_format
            .unwrap_or_else(|| DetectionFormat::from_path(path))
    }

    pub fn build_projection(&self) -> Result<Projection, GeotagIoError> {
        Ok(self.projection.build()?)
    }

    pub fn build_triangulator(&self) -> Result<Triangulator, GeotagIoError> {
        Ok(Triangulator::new(self.params.clone())?)
    }

    /// Read the camera table, projecting geographic entries with `projection`.
    pub fn load_cameras<P: PlanarProjection + ?Sized>(
        &self,
        projection: &P,
    ) -> Result<CameraTable, GeotagIoError> {
        load_camera_table(&self.cameras_path, projection)
    }

    /// Read detections from `path` in this config's format.
    pub fn load_detections(&self, path: &Path) -> Result<Vec<DetectionInput>, GeotagIoError> {
        match self.format_for(path) {
            DetectionFormat::Coco => read_coco_detections(path, self.min_score),
            DetectionFormat::CenterCsv => read_center_csv(path, self.pano_width),
        }
    }
}

pub fn load_camera_table<P: PlanarProjection + ?Sized>(
    path: impl AsRef<Path>,
    projection: &P,
) -> Result<CameraTable, GeotagIoError> {
    let raw = fs::read_to_string(path)?;
    let table = CameraTable::from_json_str(&raw, projection)?;
    info!("camera table: {} panoramas", table.len());
    Ok(table)
}

#[derive(Deserialize)]
struct CocoSegmentation {
    /// `[height, width]`.
    size: [u32; 2],
}

#[derive(Deserialize)]
struct CocoDetection {
    image_id: String,
    bbox: [f64; 4],
    segmentation: CocoSegmentation,
    #[serde(default)]
    score: Option<f64>,
}

/// Parse COCO instance results. A `.jpg` in image ids is dropped so they
/// match panorama ids; entries scoring below `min_score` are skipped.
pub fn parse_coco_detections(
    raw: &str,
    min_score: Option<f64>,
) -> Result<Vec<DetectionInput>, GeotagIoError> {
    let entries: Vec<CocoDetection> = serde_json::from_str(raw)?;
    let total = entries.len();
    let inputs: Vec<DetectionInput> = entries
        .into_iter()
        .filter(|e| match (min_score, e.score) {
            (Some(min), Some(score)) => score >= min,
            _ => true,
        })
        .map(|e| DetectionInput {
            image_id: e.image_id.replace(".jpg", ""),
            bbox: BoundingBox::from_xywh(e.bbox),
            image_width: e.segmentation.size[1],
        })
        .collect();
    if inputs.len() < total {
        info!(
            "dropped {} of {total} detections below the score threshold",
            total - inputs.len()
        );
    }
    Ok(inputs)
}

pub fn read_coco_detections(
    path: impl AsRef<Path>,
    min_score: Option<f64>,
) -> Result<Vec<DetectionInput>, GeotagIoError> {
    let raw = fs::read_to_string(path)?;
    parse_coco_detections(&raw, min_score)
}

/// Parse `pano_id,center_x` rows. The first line is a header and is
/// skipped. Rows without exactly two fields are skipped with a warning; an
/// unparsable `center_x` is an error.
pub fn parse_center_csv(
    raw: &str,
    pano_width: u32,
) -> Result<Vec<DetectionInput>, GeotagIoError> {
    let mut inputs = Vec::new();
    for (idx, line) in raw.lines().enumerate().skip(1) {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let &[pano_id, center] = fields.as_slice() else {
            warn!("broken entry ignored (line {line_no})");
            continue;
        };
        let center_x: f64 = center.parse().map_err(|_| GeotagIoError::Csv {
            line: line_no,
            message: format!("invalid center_x `{center}`"),
        })?;
        inputs.push(DetectionInput {
            image_id: pano_id.to_string(),
            bbox: BoundingBox::from_xywh([center_x, 0.0, 0.0, 0.0]),
            image_width: pano_width,
        });
    }
    Ok(inputs)
}

pub fn read_center_csv(
    path: impl AsRef<Path>,
    pano_width: u32,
) -> Result<Vec<DetectionInput>, GeotagIoError> {
    let raw = fs::read_to_string(path)?;
    parse_center_csv(&raw, pano_width)
}

/// Write located objects as `lat,lon,score` CSV.
pub fn write_locations_csv(
    path: impl AsRef<Path>,
    locations: &[ObjectLocation],
) -> Result<(), GeotagIoError> {
    let file = fs::File::create(path)?;
    write_csv(locations, BufWriter::new(file))?;
    Ok(())
}
