//! Layer configuration.
//!
//! [`LayerProps`] is the option surface a host sets on the particle layer.
//! It can be built in code or loaded from JSON; every field is optional in
//! JSON and falls back to its default.
//!
//! ```json
//! {
//!     "num_particles": 8000,
//!     "max_age": 60,
//!     "speed_factor": 4.0,
//!     "color": [255, 255, 255, 200],
//!     "width": 1.5,
//!     "bounds": [0, -90, 360, 90],
//!     "image_unscale": [-30, 30],
//!     "palette": "wind"
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::field::UnscaleRange;
use crate::geo::GeoBounds;
use crate::palette::ColorScheme;
use crate::particles::CohortLayout;

/// Upper bound for `num_particles`.
pub const MAX_PARTICLES: u32 = 100_000;
/// Upper bound for `max_age` (trail length in ticks).
pub const MAX_AGE: u32 = 255;
/// Upper bound for `speed_factor`.
pub const MAX_SPEED_FACTOR: f32 = 255.0;

/// Options recognized by the particle layer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayerProps {
    /// Particles per cohort.
    pub num_particles: u32,
    /// Number of cohorts, i.e. trail length in ticks. Zero disables the layer.
    pub max_age: u32,
    /// Advection speed multiplier, before zoom compensation.
    pub speed_factor: f32,
    /// Base RGBA color; alpha fades with age.
    pub color: [u8; 4],
    /// Line width in pixels. Zero disables the layer.
    pub width: f32,
    /// Geographic domain covered by the field rasters.
    pub bounds: GeoBounds,
    /// Physical velocity range for normalized rasters; `None` for float rasters.
    pub image_unscale: Option<UnscaleRange>,
    /// Blend weight of the next raster, `[0, 1]`.
    pub image_blend: f32,
    /// Whether ticks advance the simulation.
    pub animate: bool,
    /// Speed color scheme; `None` keeps the base RGB.
    pub palette: Option<ColorScheme>,
    /// Speed mapped to the top of the palette. Derived from `image_unscale`
    /// when unset.
    pub max_speed: Option<f32>,
}

impl Default for LayerProps {
    fn default() -> Self {
        Self {
            num_particles: 5000,
            max_age: 100,
            speed_factor: 1.0,
            color: [255, 255, 255, 255],
            width: 1.0,
            bounds: GeoBounds::GLOBE,
            image_unscale: None,
            image_blend: 0.0,
            animate: true,
            palette: None,
            max_speed: None,
        }
    }
}

impl LayerProps {
    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// A copy with every option clamped to its documented range.
    ///
    /// Non-finite numbers fall back to the defaults. Zero particle count,
    /// age or width are kept as zero: they mean "disabled", not "invalid".
    pub fn validated(&self) -> Self {
        let defaults = Self::default();
        let finite_or = |v: f32, d: f32| if v.is_finite() { v } else { d };

        Self {
            num_particles: self.num_particles.min(MAX_PARTICLES),
            max_age: self.max_age.min(MAX_AGE),
            speed_factor: finite_or(self.speed_factor, defaults.speed_factor)
                .clamp(0.0, MAX_SPEED_FACTOR),
            color: self.color,
            width: finite_or(self.width, defaults.width).max(0.0),
            bounds: if self.bounds.is_finite() {
                self.bounds
            } else {
                defaults.bounds
            },
            image_unscale: self
                .image_unscale
                .filter(|r| r.min.is_finite() && r.max.is_finite()),
            image_blend: finite_or(self.image_blend, 0.0).clamp(0.0, 1.0),
            animate: self.animate,
            palette: self.palette.clone(),
            max_speed: self.max_speed.filter(|s| s.is_finite() && *s > 0.0),
        }
    }

    /// Cohort layout implied by these props.
    pub fn layout(&self) -> CohortLayout {
        CohortLayout::new(self.num_particles, self.max_age)
    }

    /// Whether the layer can run at all.
    pub fn is_structurally_valid(&self) -> bool {
        self.layout().is_valid() && self.width > 0.0
    }

    /// Decode range, falling back to the float encoding.
    pub fn unscale(&self) -> UnscaleRange {
        self.image_unscale.unwrap_or(UnscaleRange::FLOAT)
    }

    /// Speed that maps to 1.0 in each record's color channel.
    pub fn speed_normalization(&self) -> f32 {
        match self.max_speed {
            Some(s) if s.is_finite() && s > 0.0 => s,
            _ => {
                let unscale = self.unscale();
                if unscale.is_scaled() && unscale.magnitude() > 0.0 {
                    unscale.magnitude()
                } else {
                    1.0
                }
            }
        }
    }
}
