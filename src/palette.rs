//! Color schemes for speed-keyed particle coloring.
//!
//! A scheme is a function `[0, 1] -> RGB` built from evenly spaced color
//! stops. Each particle record stores its normalized speed, and the line
//! renderer looks the RGB up here; alpha always comes from the cohort fade.
//!
//! Built-in schemes are addressed by name so they can be picked from JSON
//! configuration:
//!
//! | Name | Stops | Look |
//! |------|-------|------|
//! | `current` | 4 | deep blue through cyan and yellow to red |
//! | `wind` | 8 | slate blue through greens and yellows to magenta |
//! | `viridis` | 5 | purple to yellow, colorblind-friendly |
//! | `magma` | 5 | black to pale yellow through red |
//! | `plasma` | 5 | blue to yellow through pink |
//! | `inferno` | 5 | black to yellow through orange |
//!
//! Custom schemes are written as an array of `[r, g, b]` stops.

use std::fmt;
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum number of stops uploaded to the line shader.
pub const MAX_GPU_STOPS: usize = 8;

const CURRENT: [Vec3; 4] = [
    Vec3::new(0.125, 0.25, 0.65),
    Vec3::new(0.2, 0.75, 0.85),
    Vec3::new(0.95, 0.85, 0.25),
    Vec3::new(0.85, 0.2, 0.15),
];

const WIND: [Vec3; 8] = [
    Vec3::new(0.384, 0.427, 0.631),
    Vec3::new(0.243, 0.565, 0.745),
    Vec3::new(0.259, 0.722, 0.612),
    Vec3::new(0.463, 0.820, 0.373),
    Vec3::new(0.910, 0.863, 0.302),
    Vec3::new(0.953, 0.620, 0.251),
    Vec3::new(0.863, 0.302, 0.302),
    Vec3::new(0.624, 0.180, 0.420),
];

const VIRIDIS: [Vec3; 5] = [
    Vec3::new(0.267, 0.004, 0.329),
    Vec3::new(0.229, 0.322, 0.545),
    Vec3::new(0.127, 0.566, 0.551),
    Vec3::new(0.369, 0.789, 0.383),
    Vec3::new(0.993, 0.906, 0.144),
];

const MAGMA: [Vec3; 5] = [
    Vec3::new(0.001, 0.0, 0.014),
    Vec3::new(0.316, 0.071, 0.485),
    Vec3::new(0.716, 0.215, 0.475),
    Vec3::new(0.987, 0.535, 0.382),
    Vec3::new(0.987, 0.991, 0.750),
];

const PLASMA: [Vec3; 5] = [
    Vec3::new(0.050, 0.030, 0.528),
    Vec3::new(0.494, 0.012, 0.658),
    Vec3::new(0.798, 0.280, 0.470),
    Vec3::new(0.973, 0.585, 0.254),
    Vec3::new(0.940, 0.975, 0.131),
];

const INFERNO: [Vec3; 5] = [
    Vec3::new(0.001, 0.0, 0.014),
    Vec3::new(0.341, 0.063, 0.429),
    Vec3::new(0.735, 0.216, 0.330),
    Vec3::new(0.978, 0.557, 0.035),
    Vec3::new(0.988, 0.998, 0.645),
];

/// A speed-to-color mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemeRepr", into = "SchemeRepr")]
pub enum ColorScheme {
    /// Four stops tuned for ocean currents.
    Current,
    /// Eight stops tuned for wind speed.
    Wind,
    Viridis,
    Magma,
    Plasma,
    Inferno,
    /// User-supplied stops, evenly spaced over `[0, 1]`.
    Custom(Vec<Vec3>),
}

impl ColorScheme {
    /// All named built-in schemes.
    pub const BUILT_IN: [ColorScheme; 6] = [
        ColorScheme::Current,
        ColorScheme::Wind,
        ColorScheme::Viridis,
        ColorScheme::Magma,
        ColorScheme::Plasma,
        ColorScheme::Inferno,
    ];

    /// Color stops, first maps to 0 and last maps to 1.
    pub fn stops(&self) -> &[Vec3] {
        match self {
            ColorScheme::Current => &CURRENT,
            ColorScheme::Wind => &WIND,
            ColorScheme::Viridis => &VIRIDIS,
            ColorScheme::Magma => &MAGMA,
            ColorScheme::Plasma => &PLASMA,
            ColorScheme::Inferno => &INFERNO,
            ColorScheme::Custom(stops) => stops,
        }
    }

    /// Name used in configuration, `None` for custom schemes.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            ColorScheme::Current => Some("current"),
            ColorScheme::Wind => Some("wind"),
            ColorScheme::Viridis => Some("viridis"),
            ColorScheme::Magma => Some("magma"),
            ColorScheme::Plasma => Some("plasma"),
            ColorScheme::Inferno => Some("inferno"),
            ColorScheme::Custom(_) => None,
        }
    }

    /// Map `t` (clamped to `[0, 1]`) to a color by piecewise-linear
    /// interpolation between stops.
    pub fn sample(&self, t: f32) -> Vec3 {
        sample_stops(self.stops(), t)
    }

    /// Stops resampled to at most [`MAX_GPU_STOPS`] entries, padded for a
    /// uniform block, together with the live count.
    pub fn gpu_stops(&self) -> ([[f32; 4]; MAX_GPU_STOPS], u32) {
        let stops = self.stops();
        let mut out = [[0.0; 4]; MAX_GPU_STOPS];
        let count = stops.len().min(MAX_GPU_STOPS);
        for (i, slot) in out.iter_mut().enumerate().take(count) {
            let c = if stops.len() <= MAX_GPU_STOPS {
                stops[i]
            } else {
                sample_stops(stops, i as f32 / (MAX_GPU_STOPS - 1) as f32)
            };
            *slot = [c.x, c.y, c.z, 1.0];
        }
        (out, count as u32)
    }
}

fn sample_stops(stops: &[Vec3], t: f32) -> Vec3 {
    match stops.len() {
        0 => Vec3::ONE,
        1 => stops[0],
        n => {
            let scaled = t.clamp(0.0, 1.0) * (n - 1) as f32;
            let i = (scaled.floor() as usize).min(n - 2);
            let f = scaled - i as f32;
            stops[i] * (1.0 - f) + stops[i + 1] * f
        }
    }
}

impl FromStr for ColorScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ColorScheme::BUILT_IN
            .iter()
            .find(|scheme| scheme.name() == Some(lower.as_str()))
            .cloned()
            .ok_or_else(|| ConfigError::UnknownPalette(s.to_string()))
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "custom({} stops)", self.stops().len()),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SchemeRepr {
    Named(String),
    Stops(Vec<[f32; 3]>),
}

impl TryFrom<SchemeRepr> for ColorScheme {
    type Error = ConfigError;

    fn try_from(repr: SchemeRepr) -> Result<Self, Self::Error> {
        match repr {
            SchemeRepr::Named(name) => name.parse(),
            SchemeRepr::Stops(stops) => Ok(ColorScheme::Custom(
                stops.into_iter().map(Vec3::from_array).collect(),
            )),
        }
    }
}

impl From<ColorScheme> for SchemeRepr {
    fn from(scheme: ColorScheme) -> Self {
        match scheme.name() {
            Some(name) => SchemeRepr::Named(name.to_string()),
            None => SchemeRepr::Stops(scheme.stops().iter().map(|c| c.to_array()).collect()),
        }
    }
}
