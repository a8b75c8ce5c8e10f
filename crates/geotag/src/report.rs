//! JSON run report: inputs, stage diagnostics and located objects.

use std::{fs, path::Path};

use geotag_triangulation::{
    IcmStats, ObjectCluster, ObjectLocation, PairStats, TriangulationOutput,
};
use serde::{Deserialize, Serialize};

use crate::io::{GeotagIoError, RunConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub detections_path: String,
    pub cameras_path: String,
    #[serde(default)]
    pub config_path: Option<String>,
    pub output_path: String,
    pub detections: usize,
    #[serde(default)]
    pub pairs: Option<PairStats>,
    #[serde(default)]
    pub icm: Option<IcmStats>,
    /// Detections that kept at least one link after ICM.
    pub candidates: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub clusters: Vec<ObjectCluster>,
    #[serde(default)]
    pub locations: Vec<ObjectLocation>,
    pub elapsed_s: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunReport {
    /// Base report for a run of `cfg` on `detections_path`.
    pub fn new(cfg: &RunConfig, config_path: Option<&Path>, detections_path: &Path) -> Self {
        Self {
            detections_path: detections_path.to_string_lossy().into_owned(),
            cameras_path: cfg.cameras_path.clone(),
            config_path: config_path.map(|p| p.to_string_lossy().into_owned()),
            output_path: cfg.output_path().to_string_lossy().into_owned(),
            detections: 0,
            pairs: None,
            icm: None,
            candidates: 0,
            seed: None,
            clusters: Vec::new(),
            locations: Vec::new(),
            elapsed_s: 0.0,
            error: None,
        }
    }

    /// Populate report fields from a finished run.
    pub fn set_output(&mut self, out: TriangulationOutput) {
        self.detections = out.detections;
        self.pairs = Some(out.pairs);
        self.icm = Some(out.icm);
        self.candidates = out.candidates;
        self.seed = Some(out.seed);
        self.clusters = out.clusters;
        self.locations = out.locations;
        self.error = None;
    }

    /// Record a failed run.
    pub fn set_error(&mut self, err: &GeotagIoError) {
        self.error = Some(err.to_string());
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, GeotagIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), GeotagIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
