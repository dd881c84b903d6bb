//! Built-in coordinate transform between geographic and Web Mercator
//! coordinates. Anything else needs a caller-supplied
//! [`CoordinateTransform`].

use crate::core::constants::{DEFAULT_MAP_GCS, GEOGRAPHIC_GCS};
use crate::core::geo::{LatLng, Point};
use crate::traits::CoordinateTransform;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Projection {
    Geographic,
    WebMercator,
}

fn projection(gcs: &str) -> Option<Projection> {
    match gcs.to_ascii_uppercase().as_str() {
        GEOGRAPHIC_GCS | "WGS84" => Some(Projection::Geographic),
        DEFAULT_MAP_GCS | "EPSG:900913" | "EPSG:3785" => Some(Projection::WebMercator),
        _ => None,
    }
}

/// Transforms between EPSG:4326 (`x` = longitude, `y` = latitude) and
/// EPSG:3857. Identical systems pass points through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct MercatorTransform;

impl CoordinateTransform for MercatorTransform {
    fn transform(&self, source: &str, target: &str, points: &mut [Point]) -> Result<()> {
        if source.eq_ignore_ascii_case(target) {
            return Ok(());
        }
        let from = projection(source)
            .ok_or_else(|| Error::Transform(format!("unsupported source system {source}")))?;
        let to = projection(target)
            .ok_or_else(|| Error::Transform(format!("unsupported target system {target}")))?;

        match (from, to) {
            (Projection::Geographic, Projection::WebMercator) => {
                for point in points.iter_mut() {
                    *point = LatLng::new(point.y, point.x).to_mercator();
                }
            }
            (Projection::WebMercator, Projection::Geographic) => {
                for point in points.iter_mut() {
                    *point = LatLng::from_mercator(*point).to_point();
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::WEB_MERCATOR_EXTENT;

    #[test]
    fn test_geographic_to_mercator() {
        let mut points = [Point::new(180.0, 0.0), Point::new(0.0, 0.0)];
        MercatorTransform
            .transform("EPSG:4326", "EPSG:3857", &mut points)
            .unwrap();
        assert!((points[0].x - WEB_MERCATOR_EXTENT).abs() < 1e-6);
        assert!(points[1].x.abs() < 1e-9 && points[1].y.abs() < 1e-9);
    }

    #[test]
    fn test_same_system_is_identity() {
        let point = Point::new(12.5, -3.0);
        let out = MercatorTransform
            .transform_point("epsg:3857", "EPSG:3857", point)
            .unwrap();
        assert_eq!(out, point);
    }

    #[test]
    fn test_unknown_system_leaves_buffer() {
        let mut points = [Point::new(1.0, 2.0)];
        let result = MercatorTransform.transform("EPSG:4326", "EPSG:32633", &mut points);
        assert!(matches!(result, Err(Error::Transform(_))));
        assert_eq!(points[0], Point::new(1.0, 2.0));
    }
}
