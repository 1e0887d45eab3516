//! Longitude wrapping and geographic bounding boxes.
//!
//! Everything here works in degrees. Longitudes are canonicalized into
//! `(-180, 180]`; a bounding box may extend past 180 on its eastern edge so
//! that a view straddling the antimeridian stays non-inverted.
//!
//! The same [`GeoBounds::contains`] test is used for the visible-viewport
//! check and the field-domain check, both on the host and (mirrored) in the
//! WGSL transform, so that particles never spawn or persist outside the map.

use serde::{Deserialize, Serialize};

/// Wrap a longitude into `(-180, 180]` using floored modulo.
///
/// If `min_lng` is given and the wrapped value falls below it, 360 is added
/// so the result lands in the contiguous window starting at `min_lng`.
///
/// ```
/// use driftlines::geo::wrap_longitude;
///
/// assert_eq!(wrap_longitude(185.0, None), -175.0);
/// assert_eq!(wrap_longitude(-170.0, Some(170.0)), 190.0);
/// ```
pub fn wrap_longitude(lng: f32, min_lng: Option<f32>) -> f32 {
    let mut wrapped = lng - 360.0 * ((lng + 180.0) / 360.0).floor();
    if wrapped <= -180.0 {
        wrapped = 180.0;
    }
    match min_lng {
        Some(min) if min.is_finite() && wrapped < min => wrapped + 360.0,
        _ => wrapped,
    }
}

/// An axis-aligned geographic box in degrees.
///
/// Serialized as `[min_lng, min_lat, max_lng, max_lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct GeoBounds {
    pub min_lng: f32,
    pub min_lat: f32,
    pub max_lng: f32,
    pub max_lat: f32,
}

impl GeoBounds {
    /// The whole globe.
    pub const GLOBE: GeoBounds = GeoBounds::new(-180.0, -90.0, 180.0, 90.0);

    pub const fn new(min_lng: f32, min_lat: f32, max_lng: f32, max_lat: f32) -> Self {
        Self {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        }
    }

    /// Longitude extent in degrees (may be negative for an inverted box).
    #[inline]
    pub fn lng_span(&self) -> f32 {
        self.max_lng - self.min_lng
    }

    /// Latitude extent in degrees.
    #[inline]
    pub fn lat_span(&self) -> f32 {
        self.max_lat - self.min_lat
    }

    /// Whether a position lies inside the box, with longitude compared in
    /// the wrap window that starts at `min_lng`.
    pub fn contains(&self, lng: f32, lat: f32) -> bool {
        let lng = wrap_longitude(lng, Some(self.min_lng));
        lng >= self.min_lng && lng <= self.max_lng && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Canonical form of this box; see [`wrap_bounds`].
    pub fn wrapped(&self) -> GeoBounds {
        wrap_bounds(*self)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.min_lng, self.min_lat, self.max_lng, self.max_lat]
    }

    /// Whether all four edges are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self::GLOBE
    }
}

impl From<[f32; 4]> for GeoBounds {
    fn from(b: [f32; 4]) -> Self {
        Self::new(b[0], b[1], b[2], b[3])
    }
}

impl From<GeoBounds> for [f32; 4] {
    fn from(b: GeoBounds) -> Self {
        b.to_array()
    }
}

/// Clip a bounding box to valid lat/lon extents.
///
/// Boxes spanning less than 360° of longitude keep their extent: the west
/// edge is wrapped into `(-180, 180]` and the east edge is wrapped relative to
/// it, so a box crossing the antimeridian comes out as e.g. `[170, .., 190, ..]`.
/// Anything wider snaps to the full `[-180, 180]` range. Latitude is clamped
/// to `[-90, 90]`.
pub fn wrap_bounds(bounds: GeoBounds) -> GeoBounds {
    let (min_lng, max_lng) = if bounds.lng_span() < 360.0 {
        let min_lng = wrap_longitude(bounds.min_lng, None);
        (min_lng, wrap_longitude(bounds.max_lng, Some(min_lng)))
    } else {
        (-180.0, 180.0)
    };

    GeoBounds {
        min_lng,
        min_lat: bounds.min_lat.clamp(-90.0, 90.0),
        max_lng,
        max_lat: bounds.max_lat.clamp(-90.0, 90.0),
    }
}

/// What the host map is currently showing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Visible box, not necessarily wrapped.
    pub bounds: GeoBounds,
    /// Web-mercator zoom level.
    pub zoom: f32,
}

impl Viewport {
    pub fn new(bounds: GeoBounds, zoom: f32) -> Self {
        Self { bounds, zoom }
    }

    /// The visible box in canonical form, as used for respawn and culling.
    pub fn visible_bounds(&self) -> GeoBounds {
        wrap_bounds(self.bounds)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(GeoBounds::GLOBE, 0.0)
    }
}
