//! Detection records and the loader that builds them.
//!
//! A detection is a bounding box in an equirectangular panorama. The loader
//! resolves the camera that took the panorama, turns the box centre into a
//! bearing and derives the ray used by the intersection stage.

use log::{debug, info};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::geometry::{bearing_direction, bearing_from_pixel};
use crate::lookup::{CameraLookup, LookupError};

/// Axis-aligned box in panorama pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// COCO layout: `[x, y, width, height]`.
    pub fn from_xywh([x, y, width, height]: [f64; 4]) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Corner layout: `[xmin, ymin, xmax, ymax]`.
    pub fn from_corners([xmin, ymin, xmax, ymax]: [f64; 4]) -> Self {
        Self {
            x: xmin,
            y: ymin,
            width: xmax - xmin,
            height: ymax - ymin,
        }
    }

    #[inline]
    pub fn center_x(&self) -> f64 {
        self.x + 0.5 * self.width
    }
}

/// One detector output, as handed to the loader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionInput {
    pub image_id: String,
    pub bbox: BoundingBox,
    /// Panorama width in pixels (a full 360° turn).
    pub image_width: u32,
}

/// A detection resolved into a bearing ray in the planar frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub image_id: String,
    pub camera_position: Point2<f64>,
    pub camera_heading_deg: f64,
    /// Bearing of the box centre. Informational; the geometry uses `direction`.
    pub bearing_deg: f64,
    /// Camera-to-object depth in direction steps. Always `> 0`.
    pub depth_estimate: f64,
    /// Object position under `depth_estimate`. Informational until depth
    /// estimation replaces the placeholder.
    pub object_point_at_depth: Point2<f64>,
    /// Point one direction step from the camera along the bearing ray.
    pub object_point_normalized: Point2<f64>,
    /// `object_point_normalized - camera_position`, kept exactly.
    pub direction: Vector2<f64>,
}

impl DetectionRecord {
    /// Build a record for a camera at `camera` looking along `bearing_deg`.
    ///
    /// A non-positive or non-finite `depth` is replaced by
    /// `params.placeholder_depth`.
    pub fn from_bearing(
        image_id: impl Into<String>,
        camera: Point2<f64>,
        bearing_deg: f64,
        depth: f64,
        params: &LoaderParams,
    ) -> Self {
        let depth_estimate = if depth.is_finite() && depth > 0.0 {
            depth
        } else {
            params.placeholder_depth
        };
        let direction = bearing_direction(bearing_deg, params.calibration_factor);
        Self {
            image_id: image_id.into(),
            camera_position: camera,
            camera_heading_deg: 0.0,
            bearing_deg,
            depth_estimate,
            object_point_at_depth: camera + direction * depth_estimate,
            object_point_normalized: camera + direction,
            direction,
        }
    }
}

/// Loader settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderParams {
    /// Planar units per unit bearing-direction step.
    pub calibration_factor: f64,
    /// Depth assigned to every detection until depth estimation exists.
    pub placeholder_depth: f64,
}

impl Default for LoaderParams {
    fn default() -> Self {
        Self {
            calibration_factor: 640.0 / 256.0,
            placeholder_depth: 5.0,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("camera lookup failed for detection {index} (`{image_id}`)")]
    Lookup {
        index: usize,
        image_id: String,
        #[source]
        source: LookupError,
    },
    #[error("detection {index} (`{image_id}`) has zero image width")]
    InvalidImageWidth { index: usize, image_id: String },
}

/// Resolve every detection into a [`DetectionRecord`], preserving order.
///
/// The first lookup failure aborts the whole load; no partial result is
/// returned.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(detections = inputs.len()))
)]
pub fn load_detections<L: CameraLookup + ?Sized>(
    inputs: &[DetectionInput],
    lookup: &L,
    params: &LoaderParams,
) -> Result<Vec<DetectionRecord>, LoadError> {
    let mut records = Vec::with_capacity(inputs.len());

    for (index, input) in inputs.iter().enumerate() {
        if input.image_width == 0 {
            return Err(LoadError::InvalidImageWidth {
                index,
                image_id: input.image_id.clone(),
            });
        }

        let pose = lookup
            .lookup(&input.image_id)
            .map_err(|source| LoadError::Lookup {
                index,
                image_id: input.image_id.clone(),
                source,
            })?;

        let bearing = bearing_from_pixel(input.bbox.center_x(), f64::from(input.image_width));
        let mut record = DetectionRecord::from_bearing(
            input.image_id.clone(),
            pose.position,
            bearing,
            params.placeholder_depth,
            params,
        );
        record.camera_heading_deg = pose.heading_deg;
        debug!(
            "detection {index}: `{}` bearing {bearing:.2} deg",
            input.image_id
        );
        records.push(record);
    }

    info!("all detected objects: {}", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{CameraPose, CameraTable};
    use approx::assert_abs_diff_eq;

    fn input(id: &str, center_x: f64, width: u32) -> DetectionInput {
        DetectionInput {
            image_id: id.to_string(),
            bbox: BoundingBox::from_xywh([center_x - 10.0, 40.0, 20.0, 60.0]),
            image_width: width,
        }
    }

    #[test]
    fn bbox_layouts_share_the_center() {
        let a = BoundingBox::from_xywh([100.0, 5.0, 50.0, 10.0]);
        let b = BoundingBox::from_corners([100.0, 5.0, 150.0, 15.0]);
        assert_eq!(a, b);
        assert_abs_diff_eq!(a.center_x(), 125.0);
    }

    #[test]
    fn loader_builds_rays_in_input_order() {
        let mut table = CameraTable::new();
        table.insert("p1", CameraPose::at(100.0, 200.0));
        table.insert("p2", CameraPose::at(-5.0, 0.5));

        let inputs = vec![input("p2", 500.0, 2000), input("p1", 0.0, 2000)];
        let params = LoaderParams::default();
        let records = load_detections(&inputs, &table, &params).expect("all ids known");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].image_id, "p2");
        assert_eq!(records[1].image_id, "p1");

        // 500 / 2000 of a turn is 90 degrees: the ray points along -x.
        let r = &records[0];
        assert_abs_diff_eq!(r.bearing_deg, 90.0);
        assert_abs_diff_eq!(r.direction.x, -2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(r.direction.y, 0.0, epsilon = 1e-12);
        assert_eq!(r.object_point_normalized, r.camera_position + r.direction);
        assert_abs_diff_eq!(r.object_point_at_depth.x, -5.0 - 12.5, epsilon = 1e-9);
        assert_abs_diff_eq!(r.depth_estimate, 5.0);

        // Column zero looks along -y.
        let r = &records[1];
        assert_abs_diff_eq!(r.object_point_normalized.y, 197.5, epsilon = 1e-12);
    }

    #[test]
    fn non_positive_depth_falls_back_to_placeholder() {
        let params = LoaderParams::default();
        let r = DetectionRecord::from_bearing("x", Point2::origin(), 0.0, -1.0, &params);
        assert_abs_diff_eq!(r.depth_estimate, 5.0);
        let r = DetectionRecord::from_bearing("x", Point2::origin(), 0.0, 0.0, &params);
        assert_abs_diff_eq!(r.depth_estimate, 5.0);
        let r = DetectionRecord::from_bearing("x", Point2::origin(), 0.0, 3.0, &params);
        assert_abs_diff_eq!(r.depth_estimate, 3.0);
    }

    #[test]
    fn first_lookup_failure_aborts_the_load() {
        let mut table = CameraTable::new();
        table.insert("known", CameraPose::at(0.0, 0.0));
        let inputs = vec![
            input("known", 10.0, 2000),
            input("missing", 10.0, 2000),
            input("known", 20.0, 2000),
        ];
        let err = load_detections(&inputs, &table, &LoaderParams::default())
            .expect_err("unknown id");
        match err {
            LoadError::Lookup {
                index, image_id, ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(image_id, "missing");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn zero_width_is_rejected() {
        let table = CameraTable::new();
        let err = load_detections(&[input("a", 1.0, 0)], &table, &LoaderParams::default())
            .expect_err("zero width");
        assert!(matches!(err, LoadError::InvalidImageWidth { index: 0, .. }));
    }

    #[test]
    fn empty_input_is_not_an_error() {
        let table = CameraTable::new();
        let records = load_detections(&[], &table, &LoaderParams::default()).unwrap();
        assert!(records.is_empty());
    }
}
