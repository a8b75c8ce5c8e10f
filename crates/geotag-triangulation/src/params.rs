use geotag_core::LoaderParams;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::cluster::Linkage;
use crate::intersection::PairParams;
use crate::mrf::MrfParams;

/// Tunables of a triangulation run.
///
/// Distances are planar units (metres for the supported projections);
/// along-ray quantities (`max_dst_cam_object`, `placeholder_depth`) are in
/// direction steps of `calibration_factor` units each.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationParams {
    /// Max along-ray distance from a camera to an object.
    pub max_dst_cam_object: f64,
    /// Max physical size of one object cluster.
    pub max_cluster_size: f64,
    /// ICM sweeps; each sweep is one proposal per detection.
    pub icm_iterations: usize,
    /// Weight of the depth-consistency term.
    pub depth_weight: f64,
    /// Weight of the multi-view spread term.
    pub object_multiview: f64,
    /// Planar units per bearing-direction step.
    pub calibration_factor: f64,
    /// Depth assigned to detections until depth estimation exists.
    pub placeholder_depth: f64,
    /// Cameras closer than this never pair.
    pub min_camera_separation: f64,
    /// Cameras further apart than `camera_separation_factor * max_dst_cam_object`
    /// never pair.
    pub camera_separation_factor: f64,
    pub linkage: Linkage,
    /// RNG seed for the ICM walk. `None` derives one from the clock; the seed
    /// actually used is reported with the result.
    pub seed: Option<u64>,
}

impl Default for TriangulationParams {
    fn default() -> Self {
        Self {
            max_dst_cam_object: 15.0,
            max_cluster_size: 1.0,
            icm_iterations: 15,
            depth_weight: 0.2,
            object_multiview: 0.2,
            calibration_factor: 640.0 / 256.0,
            placeholder_depth: 5.0,
            min_camera_separation: 0.5,
            camera_separation_factor: 1.5,
            linkage: Linkage::Single,
            seed: None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("`{name}` must be {requirement} (got {value})")]
    OutOfRange {
        name: &'static str,
        requirement: &'static str,
        value: f64,
    },
    #[error("`icm_iterations` must be at least 1")]
    NoIterations,
}

fn require(
    name: &'static str,
    value: f64,
    requirement: &'static str,
    ok: impl Fn(f64) -> bool,
) -> Result<(), ParamsError> {
    if value.is_finite() && ok(value) {
        Ok(())
    } else {
        Err(ParamsError::OutOfRange {
            name,
            requirement,
            value,
        })
    }
}

impl TriangulationParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        let positive = |v: f64| v > 0.0;
        let non_negative = |v: f64| v >= 0.0;

        require("max_dst_cam_object", self.max_dst_cam_object, "> 0", positive)?;
        require("max_cluster_size", self.max_cluster_size, "> 0", positive)?;
        require("depth_weight", self.depth_weight, ">= 0", non_negative)?;
        require("object_multiview", self.object_multiview, ">= 0", non_negative)?;
        require("calibration_factor", self.calibration_factor, "> 0", positive)?;
        require("placeholder_depth", self.placeholder_depth, "> 0", positive)?;
        require(
            "min_camera_separation",
            self.min_camera_separation,
            "> 0",
            positive,
        )?;
        require(
            "camera_separation_factor",
            self.camera_separation_factor,
            "> 0",
            positive,
        )?;
        let max_sep = self.max_camera_separation();
        require(
            "min_camera_separation",
            self.min_camera_separation,
            "<= the max camera separation",
            |v| v <= max_sep,
        )?;
        if self.icm_iterations == 0 {
            return Err(ParamsError::NoIterations);
        }
        Ok(())
    }

    /// Energy of a detection with no accepted pairing.
    pub fn standalone_price(&self) -> f64 {
        (1.0 - self.depth_weight - self.object_multiview).max(0.0)
    }

    pub fn max_camera_separation(&self) -> f64 {
        self.camera_separation_factor * self.max_dst_cam_object
    }

    /// Single-linkage cutoff: the diagonal of a `0.707 * size` square, with
    /// the cluster size expressed in direction steps.
    pub fn cluster_cutoff(&self) -> f64 {
        let d45 = 0.707 * self.max_cluster_size * self.calibration_factor;
        Vector2::new(d45, d45).norm()
    }

    pub fn loader_params(&self) -> LoaderParams {
        LoaderParams {
            calibration_factor: self.calibration_factor,
            placeholder_depth: self.placeholder_depth,
        }
    }

    pub fn pair_params(&self) -> PairParams {
        PairParams {
            max_dst_cam_object: self.max_dst_cam_object,
            min_camera_separation: self.min_camera_separation,
            max_camera_separation: self.max_camera_separation(),
        }
    }

    pub fn mrf_params(&self) -> MrfParams {
        MrfParams {
            icm_iterations: self.icm_iterations,
            depth_weight: self.depth_weight,
            object_multiview: self.object_multiview,
            standalone_price: self.standalone_price(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn defaults_give_documented_derived_constants() {
        let p = TriangulationParams::default();
        p.validate().expect("defaults are valid");
        assert_abs_diff_eq!(p.standalone_price(), 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(p.max_camera_separation(), 22.5);
        assert_abs_diff_eq!(p.calibration_factor, 2.5);
        // 0.707 * 2.5 * sqrt(2)
        assert_abs_diff_eq!(p.cluster_cutoff(), 2.499_622, epsilon = 1e-5);
    }

    #[test]
    fn standalone_price_is_clamped_at_zero() {
        let p = TriangulationParams {
            depth_weight: 0.7,
            object_multiview: 0.6,
            ..TriangulationParams::default()
        };
        assert_eq!(p.standalone_price(), 0.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let p = TriangulationParams {
            calibration_factor: 0.0,
            ..TriangulationParams::default()
        };
        assert!(matches!(
            p.validate(),
            Err(ParamsError::OutOfRange {
                name: "calibration_factor",
                ..
            })
        ));

        let p = TriangulationParams {
            depth_weight: f64::NAN,
            ..TriangulationParams::default()
        };
        assert!(p.validate().is_err());

        let p = TriangulationParams {
            icm_iterations: 0,
            ..TriangulationParams::default()
        };
        assert_eq!(p.validate(), Err(ParamsError::NoIterations));

        let p = TriangulationParams {
            min_camera_separation: 30.0,
            ..TriangulationParams::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let p: TriangulationParams =
            serde_json::from_str(r#"{"icm_iterations": 40, "seed": 7, "linkage": "average"}"#)
                .expect("valid json");
        assert_eq!(p.icm_iterations, 40);
        assert_eq!(p.seed, Some(7));
        assert_eq!(p.linkage, Linkage::Average);
        assert_abs_diff_eq!(p.max_dst_cam_object, 15.0);
    }
}
