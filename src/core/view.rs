use crate::core::bounds::Bounds;
use crate::core::constants::{BASE_UNITS_PER_PIXEL, DEFAULT_MAP_GCS};
use crate::core::geo::{LatLng, Point};
use serde::{Deserialize, Serialize};

/// The camera looking at the map: where it is centred, how far it is zoomed,
/// how large the display surface is and how it is rotated.
///
/// World coordinates are in the map's coordinate system (`gcs`, y up);
/// display coordinates are pixels with the origin at the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// The center of the view in map coordinates
    pub center: Point,
    /// The current zoom level, possibly fractional
    pub zoom: f64,
    /// The size of the display surface in pixels
    pub size: Point,
    /// Clockwise rotation of the map in radians
    pub rotation: f64,
    /// The minimum allowed zoom level
    pub min_zoom: f64,
    /// The maximum allowed zoom level
    pub max_zoom: f64,
    /// Coordinate system of the map
    gcs: String,
    /// Map units covered by one display pixel at zoom 0
    base_units_per_pixel: f64,
    /// Map coordinate that tile origins are measured from
    origin: Point,
}

impl Viewport {
    /// Creates a new viewport over a Web Mercator map
    pub fn new(center: Point, zoom: f64, size: Point) -> Self {
        Self {
            center,
            zoom,
            size,
            rotation: 0.0,
            min_zoom: 0.0,
            max_zoom: 20.0,
            gcs: DEFAULT_MAP_GCS.to_string(),
            base_units_per_pixel: BASE_UNITS_PER_PIXEL,
            origin: Point::default(),
        }
    }

    /// Creates a viewport centred on a geographic location
    pub fn from_lat_lng(center: LatLng, zoom: f64, size: Point) -> Self {
        Self::new(center.to_mercator(), zoom, size)
    }

    pub fn with_gcs(mut self, gcs: impl Into<String>) -> Self {
        self.gcs = gcs.into();
        self
    }

    /// Overrides the map units per pixel at zoom 0
    pub fn with_units_per_pixel(mut self, base: f64) -> Self {
        self.base_units_per_pixel = base;
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_origin(mut self, origin: Point) -> Self {
        self.origin = origin;
        self
    }

    pub fn gcs(&self) -> &str {
        &self.gcs
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn set_center(&mut self, center: Point) {
        self.center = center;
    }

    /// Sets the zoom level, clamping to valid range
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    pub fn set_size(&mut self, size: Point) {
        self.size = size;
    }

    /// Moves the view by a display-pixel offset
    pub fn pan(&mut self, delta: Point) {
        let target = Point::new(self.size.x / 2.0 + delta.x, self.size.y / 2.0 + delta.y);
        self.center = self.display_to_gcs(&target);
    }

    /// Map units per display pixel at `zoom`, or at the current zoom
    pub fn units_per_pixel(&self, zoom: Option<f64>) -> f64 {
        self.base_units_per_pixel * 2f64.powf(-zoom.unwrap_or(self.zoom))
    }

    /// Converts a display pixel to map coordinates
    pub fn display_to_gcs(&self, point: &Point) -> Point {
        let unit = self.units_per_pixel(None);
        let dx = (point.x - self.size.x / 2.0) * unit;
        let dy = -(point.y - self.size.y / 2.0) * unit;
        let (sin, cos) = (-self.rotation).sin_cos();
        Point::new(
            self.center.x + dx * cos - dy * sin,
            self.center.y + dx * sin + dy * cos,
        )
    }

    /// Converts map coordinates to a display pixel
    pub fn gcs_to_display(&self, point: &Point) -> Point {
        let unit = self.units_per_pixel(None);
        let dx = (point.x - self.center.x) / unit;
        let dy = (point.y - self.center.y) / unit;
        let (sin, cos) = self.rotation.sin_cos();
        let rx = dx * cos - dy * sin;
        let ry = dx * sin + dy * cos;
        Point::new(rx + self.size.x / 2.0, -ry + self.size.y / 2.0)
    }

    /// The display corners: top-left, top-right, bottom-left, bottom-right
    pub fn display_corners(&self) -> [Point; 4] {
        [
            Point::new(0.0, 0.0),
            Point::new(self.size.x, 0.0),
            Point::new(0.0, self.size.y),
            Point::new(self.size.x, self.size.y),
        ]
    }

    /// Map-coordinate bounds enclosing the whole display
    pub fn bounds(&self) -> Bounds {
        let corners = self.display_corners().map(|corner| self.display_to_gcs(&corner));
        Bounds::from_points(&corners).unwrap_or_default()
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(Point::default(), 0.0, Point::new(800.0, 600.0))
    }
}
