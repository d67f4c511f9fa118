//! Universal Transverse Mercator projection on the WGS-84 ellipsoid.
//!
//! Series expansion after Snyder, "Map Projections: A Working Manual"
//! (USGS 1395), pp. 61-64. Sub-millimetre within a zone, which is far more
//! than a per-tick step of a few hundred metres needs.

use crate::error::{GeometryError, GeometryResult};
use crate::model::GeoPoint;

const SEMI_MAJOR_M: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_223_563;
const SCALE: f64 = 0.9996;
const FALSE_EASTING_M: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH_M: f64 = 10_000_000.0;

const MIN_LATITUDE: f64 = -80.0;
const MAX_LATITUDE: f64 = 84.0;

/// A UTM zone. Zone 33 north is the ETRS89 / EPSG:25833 grid used for Berlin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    pub number: u8,
    pub north: bool,
}

impl UtmZone {
    pub const fn north(number: u8) -> Self {
        Self { number, north: true }
    }

    pub const fn south(number: u8) -> Self {
        Self { number, north: false }
    }

    /// Zone containing `point`, ignoring the Norway/Svalbard exceptions.
    pub fn containing(point: GeoPoint) -> Self {
        let number = (((point.lon + 180.0) / 6.0).floor() as i64).clamp(0, 59) as u8 + 1;
        Self {
            number,
            north: point.lat >= 0.0,
        }
    }

    fn central_meridian(&self) -> f64 {
        (f64::from(self.number) - 1.0) * 6.0 - 180.0 + 3.0
    }

    /// Geographic to (easting, northing) in metres.
    pub fn forward(&self, point: GeoPoint) -> GeometryResult<(f64, f64)> {
        if !point.is_finite() {
            return Err(GeometryError::NonFinite(point.lat, point.lon));
        }
        if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&point.lat) {
            return Err(GeometryError::OutOfDomain(point.lat));
        }

        let e2 = FLATTENING * (2.0 - FLATTENING);
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let ep2 = e2 / (1.0 - e2);

        let phi = point.lat.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = SEMI_MAJOR_M / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = ep2 * cos_phi * cos_phi;
        let a = cos_phi * (point.lon - self.central_meridian()).to_radians();

        let m = SEMI_MAJOR_M
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

        let easting = SCALE
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
            + FALSE_EASTING_M;

        let mut northing = SCALE
            * (m + n
                * tan_phi
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
        if !self.north {
            northing += FALSE_NORTHING_SOUTH_M;
        }

        Ok((easting, northing))
    }

    /// (easting, northing) in metres back to geographic.
    pub fn inverse(&self, easting: f64, northing: f64) -> GeometryResult<GeoPoint> {
        if !easting.is_finite() || !northing.is_finite() {
            return Err(GeometryError::NonFinite(easting, northing));
        }

        let e2 = FLATTENING * (2.0 - FLATTENING);
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let ep2 = e2 / (1.0 - e2);
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

        let x = easting - FALSE_EASTING_M;
        let y = if self.north {
            northing
        } else {
            northing - FALSE_NORTHING_SOUTH_M
        };

        let m = y / SCALE;
        let mu = m / (SEMI_MAJOR_M * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin_phi1, cos_phi1) = phi1.sin_cos();
        let tan_phi1 = phi1.tan();
        let denom = 1.0 - e2 * sin_phi1 * sin_phi1;

        let n1 = SEMI_MAJOR_M / denom.sqrt();
        let t1 = tan_phi1 * tan_phi1;
        let c1 = ep2 * cos_phi1 * cos_phi1;
        let r1 = SEMI_MAJOR_M * (1.0 - e2) / denom.powf(1.5);
        let d = x / (n1 * SCALE);

        let lat = phi1
            - (n1 * tan_phi1 / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);

        let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d.powi(5)
                / 120.0)
            / cos_phi1;

        let point = GeoPoint::new(lat.to_degrees(), self.central_meridian() + lon.to_degrees());
        if !point.is_finite() {
            return Err(GeometryError::NonFinite(easting, northing));
        }
        Ok(point)
    }
}
