//! Planar ↔ geographic coordinate conversion.
//!
//! All triangulation happens in a metric planar frame. Two frames are
//! provided:
//!
//! - [`RijksDriehoek`]: the Dutch national grid (EPSG:28992), converted to and
//!   from WGS84 with the standard polynomial approximation. Sub-metre
//!   accurate over the Netherlands; `to_planar` inverts `to_geographic`
//!   exactly up to floating-point noise.
//! - [`LocalTangentPlane`]: an equirectangular frame in metres around a
//!   chosen origin. Its inverse is exact, which makes it the frame of choice
//!   for synthetic data and for regions outside the Dutch grid.

use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres (IUGG).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// WGS84 latitude / longitude in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("invalid coordinate ({a}, {b}): {reason}")]
    InvalidCoordinate { a: f64, b: f64, reason: &'static str },
}

impl ProjectionError {
    fn invalid(a: f64, b: f64, reason: &'static str) -> Self {
        Self::InvalidCoordinate { a, b, reason }
    }
}

/// A metric planar frame paired with its geographic counterpart.
pub trait PlanarProjection {
    /// Planar metres → latitude / longitude.
    fn to_geographic(&self, planar: Point2<f64>) -> Result<GeoPoint, ProjectionError>;

    /// Latitude / longitude → planar metres.
    fn to_planar(&self, geo: GeoPoint) -> Result<Point2<f64>, ProjectionError>;
}

impl<P: PlanarProjection + ?Sized> PlanarProjection for &P {
    fn to_geographic(&self, planar: Point2<f64>) -> Result<GeoPoint, ProjectionError> {
        (**self).to_geographic(planar)
    }

    fn to_planar(&self, geo: GeoPoint) -> Result<Point2<f64>, ProjectionError> {
        (**self).to_planar(geo)
    }
}

// Polynomial coefficients `(p, q, k)`: term `k * a^p * b^q`.
const RD_LAT: [(i32, i32, f64); 11] = [
    (0, 1, 3235.65389),
    (2, 0, -32.58297),
    (0, 2, -0.2475),
    (2, 1, -0.84978),
    (0, 3, -0.0665),
    (2, 2, -0.01709),
    (1, 0, -0.00738),
    (4, 0, 0.0053),
    (2, 3, -0.00039),
    (4, 1, 0.00033),
    (1, 1, -0.00012),
];

const RD_LON: [(i32, i32, f64); 12] = [
    (1, 0, 5260.52916),
    (1, 1, 105.94684),
    (1, 2, 2.45656),
    (3, 0, -0.81885),
    (1, 3, 0.05594),
    (3, 1, -0.05607),
    (0, 1, 0.01199),
    (3, 2, -0.00256),
    (1, 4, 0.00128),
    (0, 2, 0.00022),
    (2, 0, -0.00022),
    (5, 0, 0.00026),
];

const RD_X: [(i32, i32, f64); 9] = [
    (0, 1, 190094.945),
    (1, 1, -11832.228),
    (2, 1, -114.221),
    (0, 3, -32.391),
    (1, 0, -0.705),
    (3, 1, -2.340),
    (1, 3, -0.608),
    (0, 2, -0.008),
    (2, 3, 0.148),
];

const RD_Y: [(i32, i32, f64); 10] = [
    (1, 0, 309056.544),
    (0, 2, 3638.893),
    (2, 0, 73.077),
    (1, 2, -157.984),
    (3, 0, 59.788),
    (0, 1, 0.433),
    (2, 2, -6.439),
    (1, 1, -0.032),
    (0, 4, 0.092),
    (1, 4, -0.054),
];

fn eval_poly(terms: &[(i32, i32, f64)], a: f64, b: f64) -> f64 {
    terms
        .iter()
        .map(|&(p, q, k)| k * a.powi(p) * b.powi(q))
        .sum()
}

/// Partial derivatives `(d/da, d/db)` of the polynomial.
fn eval_poly_grad(terms: &[(i32, i32, f64)], a: f64, b: f64) -> (f64, f64) {
    terms.iter().fold((0.0, 0.0), |(da, db), &(p, q, k)| {
        let ga = if p > 0 {
            k * f64::from(p) * a.powi(p - 1) * b.powi(q)
        } else {
            0.0
        };
        let gb = if q > 0 {
            k * f64::from(q) * a.powi(p) * b.powi(q - 1)
        } else {
            0.0
        };
        (da + ga, db + gb)
    })
}

/// Dutch national grid (Rijksdriehoekscoördinaten, EPSG:28992).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RijksDriehoek;

impl RijksDriehoek {
    /// Amersfoort reference point in grid metres.
    pub const ORIGIN_RD: [f64; 2] = [155_000.0, 463_000.0];
    /// Amersfoort reference point in WGS84 degrees.
    pub const ORIGIN_WGS84: GeoPoint = GeoPoint {
        lat: 52.155_174_40,
        lon: 5.387_206_21,
    };

    const X_RANGE: (f64, f64) = (-7_000.0, 300_000.0);
    const Y_RANGE: (f64, f64) = (289_000.0, 629_000.0);
    const LAT_RANGE: (f64, f64) = (50.0, 54.0);
    const LON_RANGE: (f64, f64) = (3.0, 8.0);

    const MAX_REFINE_STEPS: usize = 8;
    /// Newton stops once a step moves the point less than this, in metres.
    const REFINE_TOL_M: f64 = 1e-9;

    /// Forward polynomial in arc-seconds, with its Jacobian w.r.t. grid
    /// metres: `(dlat/dx, dlat/dy, dlon/dx, dlon/dy)`.
    fn forward_arcsec(x: f64, y: f64) -> ([f64; 2], Matrix2<f64>) {
        let dx = (x - Self::ORIGIN_RD[0]) * 1e-5;
        let dy = (y - Self::ORIGIN_RD[1]) * 1e-5;
        let (lat_a, lat_b) = eval_poly_grad(&RD_LAT, dx, dy);
        let (lon_a, lon_b) = eval_poly_grad(&RD_LON, dx, dy);
        (
            [eval_poly(&RD_LAT, dx, dy), eval_poly(&RD_LON, dx, dy)],
            Matrix2::new(lat_a, lat_b, lon_a, lon_b) * 1e-5,
        )
    }
}

impl PlanarProjection for RijksDriehoek {
    fn to_geographic(&self, planar: Point2<f64>) -> Result<GeoPoint, ProjectionError> {
        let (x, y) = (planar.x, planar.y);
        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectionError::invalid(x, y, "non-finite grid coordinate"));
        }
        if !(Self::X_RANGE.0..=Self::X_RANGE.1).contains(&x)
            || !(Self::Y_RANGE.0..=Self::Y_RANGE.1).contains(&y)
        {
            return Err(ProjectionError::invalid(x, y, "outside the RD grid domain"));
        }

        let ([lat, lon], _) = Self::forward_arcsec(x, y);
        Ok(GeoPoint {
            lat: Self::ORIGIN_WGS84.lat + lat / 3600.0,
            lon: Self::ORIGIN_WGS84.lon + lon / 3600.0,
        })
    }

    fn to_planar(&self, geo: GeoPoint) -> Result<Point2<f64>, ProjectionError> {
        let GeoPoint { lat, lon } = geo;
        if !lat.is_finite() || !lon.is_finite() {
            return Err(ProjectionError::invalid(lat, lon, "non-finite lat/lon"));
        }
        if !(Self::LAT_RANGE.0..=Self::LAT_RANGE.1).contains(&lat)
            || !(Self::LON_RANGE.0..=Self::LON_RANGE.1).contains(&lon)
        {
            return Err(ProjectionError::invalid(lat, lon, "outside the RD grid domain"));
        }

        let dphi = 0.36 * (lat - Self::ORIGIN_WGS84.lat);
        let dlam = 0.36 * (lon - Self::ORIGIN_WGS84.lon);
        let mut p = Vector2::new(
            Self::ORIGIN_RD[0] + eval_poly(&RD_X, dphi, dlam),
            Self::ORIGIN_RD[1] + eval_poly(&RD_Y, dphi, dlam),
        );

        // The inverse polynomial is only good to ~0.1 m; solve the forward
        // polynomial for `geo` so both directions agree.
        let target = Vector2::new(
            (lat - Self::ORIGIN_WGS84.lat) * 3600.0,
            (lon - Self::ORIGIN_WGS84.lon) * 3600.0,
        );
        for _ in 0..Self::MAX_REFINE_STEPS {
            let ([f_lat, f_lon], jacobian) = Self::forward_arcsec(p.x, p.y);
            let Some(inv) = jacobian.try_inverse() else {
                break;
            };
            let step = inv * (target - Vector2::new(f_lat, f_lon));
            p += step;
            if !(step.norm() >= Self::REFINE_TOL_M) {
                break;
            }
        }
        Ok(Point2::from(p))
    }
}

/// Equirectangular metres around `origin`: `x` grows east, `y` grows north.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalTangentPlane {
    origin: GeoPoint,
    cos_lat0: f64,
}

impl LocalTangentPlane {
    /// Build a frame around `origin`. Polar origins are rejected because the
    /// east axis degenerates there.
    pub fn new(origin: GeoPoint) -> Result<Self, ProjectionError> {
        validate_lat_lon(origin)?;
        let cos_lat0 = origin.lat.to_radians().cos();
        if cos_lat0 <= 1e-9 {
            return Err(ProjectionError::invalid(
                origin.lat,
                origin.lon,
                "tangent plane origin at a pole",
            ));
        }
        Ok(Self { origin, cos_lat0 })
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }
}

fn validate_lat_lon(geo: GeoPoint) -> Result<(), ProjectionError> {
    if !geo.lat.is_finite() || !geo.lon.is_finite() {
        return Err(ProjectionError::invalid(geo.lat, geo.lon, "non-finite lat/lon"));
    }
    if !(-90.0..=90.0).contains(&geo.lat) || !(-180.0..=180.0).contains(&geo.lon) {
        return Err(ProjectionError::invalid(geo.lat, geo.lon, "lat/lon out of range"));
    }
    Ok(())
}

impl PlanarProjection for LocalTangentPlane {
    fn to_geographic(&self, planar: Point2<f64>) -> Result<GeoPoint, ProjectionError> {
        if !planar.x.is_finite() || !planar.y.is_finite() {
            return Err(ProjectionError::invalid(
                planar.x,
                planar.y,
                "non-finite planar coordinate",
            ));
        }
        let geo = GeoPoint {
            lat: self.origin.lat + (planar.y / EARTH_RADIUS_M).to_degrees(),
            lon: self.origin.lon + (planar.x / (EARTH_RADIUS_M * self.cos_lat0)).to_degrees(),
        };
        validate_lat_lon(geo).map_err(|_| {
            ProjectionError::invalid(planar.x, planar.y, "planar point leaves the globe")
        })?;
        Ok(geo)
    }

    fn to_planar(&self, geo: GeoPoint) -> Result<Point2<f64>, ProjectionError> {
        validate_lat_lon(geo)?;
        Ok(Point2::new(
            (geo.lon - self.origin.lon).to_radians() * EARTH_RADIUS_M * self.cos_lat0,
            (geo.lat - self.origin.lat).to_radians() * EARTH_RADIUS_M,
        ))
    }
}

/// Serializable choice of planar frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectionKind {
    #[default]
    RijksDriehoek,
    LocalTangentPlane {
        origin: GeoPoint,
    },
}

impl ProjectionKind {
    pub fn build(&self) -> Result<Projection, ProjectionError> {
        Ok(match *self {
            ProjectionKind::RijksDriehoek => Projection::RijksDriehoek(RijksDriehoek),
            ProjectionKind::LocalTangentPlane { origin } => {
                Projection::LocalTangentPlane(LocalTangentPlane::new(origin)?)
            }
        })
    }
}

/// A concrete projection selected at runtime.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    RijksDriehoek(RijksDriehoek),
    LocalTangentPlane(LocalTangentPlane),
}

impl PlanarProjection for Projection {
    fn to_geographic(&self, planar: Point2<f64>) -> Result<GeoPoint, ProjectionError> {
        match self {
            Projection::RijksDriehoek(p) => p.to_geographic(planar),
            Projection::LocalTangentPlane(p) => p.to_geographic(planar),
        }
    }

    fn to_planar(&self, geo: GeoPoint) -> Result<Point2<f64>, ProjectionError> {
        match self {
            Projection::RijksDriehoek(p) => p.to_planar(geo),
            Projection::LocalTangentPlane(p) => p.to_planar(geo),
        }
    }
}
