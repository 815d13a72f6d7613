//! Tunables for routing, the spatial index and the viewport.
//!
//! Configuration is a plain value handed to [`Graph::with_config`](crate::graph::Graph::with_config)
//! and [`ViewportController::new`](crate::viewport::ViewportController::new).
//! Every field has a default, so a JSON config only needs the keys it changes.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Connection router settings, all in canvas units unless noted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterConfig {
    /// Length of the straight stub leaving a port before an orthogonal path turns
    pub port_extension: f32,
    /// Corner radius for smooth-step and editable paths
    pub corner_radius: f32,
    /// Clearance kept around nodes by loopback paths
    pub back_edge_gap: f32,
    /// Bezier bow factor in `[0, 1]`
    pub curvature: f32,
    /// Minimum bezier control point offset before curvature scaling
    pub bezier_min_offset: f32,
    /// Anchors closer than this are joined by a straight segment
    pub straight_threshold: f32,
    /// Samples per curved segment when flattening for hit-testing
    pub hit_samples: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            port_extension: 20.0,
            corner_radius: 8.0,
            back_edge_gap: 20.0,
            curvature: 1.0,
            bezier_min_offset: 50.0,
            straight_threshold: 10.0,
            hit_samples: 20,
        }
    }
}

/// Grid settings for the spatial index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpatialConfig {
    /// Edge length of a grid cell
    pub cell_size: f32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self { cell_size: 200.0 }
    }
}

/// Zoom limits for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewportConfig {
    /// Smallest zoom factor allowed
    pub min_zoom: f32,
    /// Largest zoom factor allowed
    pub max_zoom: f32,
    /// Zoom restored by `reset_viewport`
    pub default_zoom: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 4.0,
            default_zoom: 1.0,
        }
    }
}

impl ViewportConfig {
    /// Clamp into `[min_zoom, max_zoom]`. NaN falls back to the default zoom.
    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        if zoom.is_nan() {
            return self.default_zoom.clamp(self.min_zoom, self.max_zoom);
        }
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}

/// All editor settings, grouped by the component that reads them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    pub router: RouterConfig,
    pub spatial: SpatialConfig,
    pub viewport: ViewportConfig,
}

impl EditorConfig {
    /// Parse a JSON config and check it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EditorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.router;
        let distances = [
            ("router.portExtension", r.port_extension),
            ("router.cornerRadius", r.corner_radius),
            ("router.backEdgeGap", r.back_edge_gap),
            ("router.bezierMinOffset", r.bezier_min_offset),
            ("router.straightThreshold", r.straight_threshold),
        ];
        for (name, value) in distances {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&r.curvature) {
            return Err(ConfigError::Invalid(format!(
                "router.curvature must be within [0, 1], got {}",
                r.curvature
            )));
        }
        if r.hit_samples == 0 {
            return Err(ConfigError::Invalid("router.hitSamples must be at least 1".into()));
        }
        if !(self.spatial.cell_size > 0.0 && self.spatial.cell_size.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "spatial.cellSize must be positive, got {}",
                self.spatial.cell_size
            )));
        }
        let v = &self.viewport;
        if !(v.min_zoom > 0.0 && v.min_zoom <= v.max_zoom && v.max_zoom.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "viewport zoom range [{}, {}] is empty or not positive",
                v.min_zoom, v.max_zoom
            )));
        }
        Ok(())
    }
}
