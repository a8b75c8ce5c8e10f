//! Planar helpers shared by the loader and the triangulation stages.
//!
//! Bearings are measured in degrees over the full panorama width, so pixel
//! column `0` maps to `0°` and column `width` maps to `360°`.

use nalgebra::{Point2, Vector2};
use std::f64::consts::PI;

/// Convert a horizontal pixel coordinate in an equirectangular panorama into
/// a bearing in degrees.
#[inline]
pub fn bearing_from_pixel(pixel: f64, image_width: f64) -> f64 {
    360.0 * pixel / image_width
}

/// Inverse of [`bearing_from_pixel`].
#[inline]
pub fn pixel_from_bearing(bearing_deg: f64, image_width: f64) -> f64 {
    bearing_deg / 360.0 * image_width
}

/// Euclidean distance between two planar points.
#[inline]
pub fn planar_distance(p: Point2<f64>, q: Point2<f64>) -> f64 {
    (p - q).norm()
}

/// Direction step along a bearing ray.
///
/// The panorama bearing is measured from the direction opposite to the
/// planar `+y` axis, hence the half-turn offset. `scale` is the length of the
/// returned vector in planar units.
#[inline]
pub fn bearing_direction(bearing_deg: f64, scale: f64) -> Vector2<f64> {
    let theta = PI + bearing_deg.to_radians();
    Vector2::new(theta.sin(), theta.cos()) * scale
}

/// Bearing (degrees, wrapped to `[0, 360)`) under which `target` is seen
/// from `camera`.
///
/// This is the inverse of [`bearing_direction`] and is mostly useful for
/// building synthetic scenes.
pub fn bearing_towards(camera: Point2<f64>, target: Point2<f64>) -> f64 {
    let v = target - camera;
    let b = (-v.x).atan2(-v.y).to_degrees().rem_euclid(360.0);
    // rem_euclid rounds tiny negative angles up to exactly 360.
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}
