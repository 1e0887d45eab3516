//! Vector field rasters and sampling.
//!
//! A field is an RGBA raster covering a geographic domain. Row 0 is the
//! northern edge. The R and G channels carry the eastward and northward
//! velocity components, encoded in one of two ways:
//!
//! | Encoding | Selected when | Valid texel | Velocity |
//! |----------|---------------|-------------|----------|
//! | Scaled | `unscale.min < unscale.max` | `a >= 1.0` | `min + rg * (max - min)` |
//! | Float | otherwise | `r` is not NaN | `rg` as stored |
//!
//! The encoding is chosen by configuration, never by image metadata, because
//! data sources disagree on how they pack their rasters.
//!
//! Two rasters (the current and the next time step) are sampled at the same
//! coordinate and blended linearly before decoding.
//!
//! # Example
//!
//! ```ignore
//! let current = Arc::new(FieldImage::from_file("wind_0600.png")?);
//! let sampler = FieldSampler::new(&current, &current, GeoBounds::GLOBE, UnscaleRange::new(-20.0, 20.0), 0.0);
//! if let Some(v) = sampler.velocity(12.5, 41.9) {
//!     println!("u={} v={}", v.x, v.y);
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::error::TextureError;
use crate::geo::{wrap_longitude, GeoBounds};

/// A decoded RGBA raster with one `Vec4` per texel.
///
/// 8-bit sources are normalized to `[0, 1]`; float sources are kept as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldImage {
    width: u32,
    height: u32,
    texels: Vec<Vec4>,
}

impl FieldImage {
    /// Build a raster from float texels in row-major order, north row first.
    pub fn from_texels(texels: Vec<Vec4>, width: u32, height: u32) -> Result<Self, TextureError> {
        if width == 0 || height == 0 {
            return Err(TextureError::Empty { width, height });
        }
        if texels.len() != width as usize * height as usize {
            return Err(TextureError::SizeMismatch {
                width,
                height,
                actual: texels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    /// Build a raster from 8-bit RGBA bytes, normalizing each channel to `[0, 1]`.
    pub fn from_rgba8(data: &[u8], width: u32, height: u32) -> Result<Self, TextureError> {
        if data.len() % 4 != 0 {
            return Err(TextureError::SizeMismatch {
                width,
                height,
                actual: data.len() / 4,
            });
        }
        let texels = data
            .chunks_exact(4)
            .map(|px| Vec4::new(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32) / 255.0)
            .collect();
        Self::from_texels(texels, width, height)
    }

    /// Load a raster from an image file (PNG or JPEG).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let bytes = std::fs::read(path.as_ref())?;
        let img = image::load_from_memory(&bytes)?.into_rgba8();
        let (width, height) = img.dimensions();
        log::debug!(
            "loaded field raster {} ({}x{})",
            path.as_ref().display(),
            width,
            height
        );
        Self::from_rgba8(img.as_raw(), width, height)
    }

    /// Generate a raster procedurally. `f` receives the texel column and row.
    pub fn from_fn(
        width: u32,
        height: u32,
        f: impl Fn(u32, u32) -> Vec4,
    ) -> Result<Self, TextureError> {
        let texels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self::from_texels(texels, width, height)
    }

    /// A 1x1 raster holding a single texel everywhere.
    pub fn uniform(texel: Vec4) -> Self {
        Self {
            width: 1,
            height: 1,
            texels: vec![texel],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    /// Raw bytes for upload as an `Rgba32Float` texture.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    #[inline]
    fn texel(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.texels[y * self.width as usize + x]
    }

    /// Bilinear sample at normalized coordinates, clamping to the edge texels.
    ///
    /// Texel centers sit at `(i + 0.5) / width`, matching hardware sampling.
    pub fn sample(&self, u: f32, v: f32) -> Vec4 {
        let x = u * self.width as f32 - 0.5;
        let y = v * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let tx = x - x0;
        let ty = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = lerp4(self.texel(x0, y0), self.texel(x0 + 1, y0), tx);
        let bottom = lerp4(self.texel(x0, y0 + 1), self.texel(x0 + 1, y0 + 1), tx);
        lerp4(top, bottom, ty)
    }
}

/// `a + (b - a) * t`, which keeps equal endpoints exact.
#[inline]
fn lerp4(a: Vec4, b: Vec4, t: f32) -> Vec4 {
    a + (b - a) * t
}

/// Physical velocity range used to decode normalized texels.
///
/// Serialized as `[min, max]`. A range with `min >= max` (including the
/// default `[0, 0]`) selects the float encoding.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct UnscaleRange {
    pub min: f32,
    pub max: f32,
}

impl UnscaleRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Range that selects the float encoding.
    pub const FLOAT: UnscaleRange = UnscaleRange::new(0.0, 0.0);

    /// Whether texels are normalized and need mapping into `[min, max]`.
    #[inline]
    pub fn is_scaled(&self) -> bool {
        self.min < self.max
    }

    /// Decode a (blended) texel into a velocity, or `None` for no-data.
    pub fn decode(&self, texel: Vec4) -> Option<Vec2> {
        if self.is_scaled() {
            if texel.w >= 1.0 {
                let rg = Vec2::new(texel.x, texel.y);
                Some(Vec2::splat(self.min) + rg * (self.max - self.min))
            } else {
                None
            }
        } else if texel.x.is_nan() {
            None
        } else {
            Some(Vec2::new(texel.x, texel.y))
        }
    }

    /// Largest absolute speed component the range can express.
    pub fn magnitude(&self) -> f32 {
        self.min.abs().max(self.max.abs())
    }
}

impl From<[f32; 2]> for UnscaleRange {
    fn from(r: [f32; 2]) -> Self {
        Self::new(r[0], r[1])
    }
}

impl From<UnscaleRange> for [f32; 2] {
    fn from(r: UnscaleRange) -> Self {
        [r.min, r.max]
    }
}

/// Samples velocity from two time-adjacent rasters over a geographic domain.
#[derive(Debug, Clone, Copy)]
pub struct FieldSampler<'a> {
    pub current: &'a FieldImage,
    pub next: &'a FieldImage,
    pub bounds: GeoBounds,
    pub unscale: UnscaleRange,
    /// Weight of `next`, in `[0, 1]`.
    pub blend: f32,
}

impl<'a> FieldSampler<'a> {
    pub fn new(
        current: &'a FieldImage,
        next: &'a FieldImage,
        bounds: GeoBounds,
        unscale: UnscaleRange,
        blend: f32,
    ) -> Self {
        Self {
            current,
            next,
            bounds,
            unscale,
            blend,
        }
    }

    /// Texture coordinates for a position; `v` is flipped so row 0 is north.
    pub fn uv(&self, lng: f32, lat: f32) -> Vec2 {
        let b = &self.bounds;
        let lng = wrap_longitude(lng, Some(b.min_lng));
        Vec2::new(
            (lng - b.min_lng) / (b.max_lng - b.min_lng),
            (lat - b.max_lat) / (b.min_lat - b.max_lat),
        )
    }

    /// Blended raw texel at a position.
    pub fn texel(&self, lng: f32, lat: f32) -> Vec4 {
        let uv = self.uv(lng, lat);
        let a = self.current.sample(uv.x, uv.y);
        let b = self.next.sample(uv.x, uv.y);
        lerp4(a, b, self.blend)
    }

    /// Decoded velocity at a position, or `None` where the field has no data.
    pub fn velocity(&self, lng: f32, lat: f32) -> Option<Vec2> {
        self.unscale.decode(self.texel(lng, lat))
    }
}

/// A field raster as handed over by the host.
///
/// Asset loading is asynchronous on most hosts, so a layer can be configured
/// with the URL of a raster that has not arrived yet. Simulation setup is
/// deferred until the source is [`TextureSource::Ready`].
#[derive(Debug, Clone)]
pub enum TextureSource {
    /// Placeholder for an unresolved asset.
    Pending(String),
    /// A decoded raster.
    Ready(Arc<FieldImage>),
}

impl TextureSource {
    pub fn ready(image: FieldImage) -> Self {
        TextureSource::Ready(Arc::new(image))
    }

    /// The raster, if it has resolved.
    pub fn image(&self) -> Option<&Arc<FieldImage>> {
        match self {
            TextureSource::Ready(image) => Some(image),
            TextureSource::Pending(_) => None,
        }
    }
}

impl From<FieldImage> for TextureSource {
    fn from(image: FieldImage) -> Self {
        TextureSource::ready(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> FieldImage {
        // 2x2, columns differ in R, rows differ in G
        FieldImage::from_texels(
            vec![
                Vec4::new(0.0, 0.0, 0.0, 1.0),
                Vec4::new(1.0, 0.0, 0.0, 1.0),
                Vec4::new(0.0, 1.0, 0.0, 1.0),
                Vec4::new(1.0, 1.0, 0.0, 1.0),
            ],
            2,
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_size_validation() {
        assert!(matches!(
            FieldImage::from_texels(vec![Vec4::ZERO; 3], 2, 2),
            Err(TextureError::SizeMismatch { actual: 3, .. })
        ));
        assert!(matches!(
            FieldImage::from_texels(vec![], 0, 2),
            Err(TextureError::Empty { .. })
        ));
    }

    #[test]
    fn test_from_rgba8_normalizes() {
        let img = FieldImage::from_rgba8(&[255, 0, 51, 255], 1, 1).unwrap();
        assert_eq!(img.texels()[0], Vec4::new(1.0, 0.0, 0.2, 1.0));
    }

    #[test]
    fn test_bilinear_sample() {
        let img = gradient();
        // texel centers
        assert_eq!(img.sample(0.25, 0.25), Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(img.sample(0.75, 0.75), Vec4::new(1.0, 1.0, 0.0, 1.0));
        // midpoint between all four
        let mid = img.sample(0.5, 0.5);
        assert!((mid.x - 0.5).abs() < 1e-6);
        assert!((mid.y - 0.5).abs() < 1e-6);
        assert_eq!(mid.w, 1.0);
        // clamped outside
        assert_eq!(img.sample(-1.0, -1.0), Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_scaled_decode() {
        let unscale = UnscaleRange::new(-2.0, 2.0);
        assert!(unscale.is_scaled());
        assert_eq!(
            unscale.decode(Vec4::new(0.75, 0.5, 0.0, 1.0)),
            Some(Vec2::new(1.0, 0.0))
        );
        // alpha below 1 marks no-data
        assert_eq!(unscale.decode(Vec4::new(0.75, 0.5, 0.0, 0.99)), None);
        // NaN in R is irrelevant in scaled mode
        assert!(unscale.decode(Vec4::new(f32::NAN, 0.5, 0.0, 1.0)).is_some());
    }

    #[test]
    fn test_float_decode() {
        let unscale = UnscaleRange::FLOAT;
        assert!(!unscale.is_scaled());
        assert_eq!(
            unscale.decode(Vec4::new(-3.5, 7.0, 0.0, 0.0)),
            Some(Vec2::new(-3.5, 7.0))
        );
        assert_eq!(unscale.decode(Vec4::new(f32::NAN, 1.0, 0.0, 1.0)), None);
        // equal bounds also select float mode
        assert!(!UnscaleRange::new(5.0, 5.0).is_scaled());
    }

    #[test]
    fn test_uv_flips_latitude() {
        let img = gradient();
        let sampler = FieldSampler::new(&img, &img, GeoBounds::GLOBE, UnscaleRange::FLOAT, 0.0);
        assert_eq!(sampler.uv(-90.0, 45.0), Vec2::new(0.25, 0.25));
        assert_eq!(sampler.uv(0.0, 0.0), Vec2::new(0.5, 0.5));
        assert_eq!(sampler.uv(180.0, -90.0), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_uv_wraps_into_domain_window() {
        let img = gradient();
        let bounds = GeoBounds::new(0.0, -90.0, 360.0, 90.0);
        let sampler = FieldSampler::new(&img, &img, bounds, UnscaleRange::FLOAT, 0.0);
        assert_eq!(sampler.uv(-90.0, 0.0).x, 0.75);
    }

    #[test]
    fn test_blend_between_rasters() {
        let a = FieldImage::uniform(Vec4::new(1.0, 0.0, 0.0, 1.0));
        let b = FieldImage::uniform(Vec4::new(3.0, 2.0, 0.0, 1.0));
        let sampler = FieldSampler::new(&a, &b, GeoBounds::GLOBE, UnscaleRange::FLOAT, 0.25);
        assert_eq!(sampler.velocity(10.0, 10.0), Some(Vec2::new(1.5, 0.5)));
    }

    #[test]
    fn test_nan_texel_is_no_data() {
        let img = FieldImage::uniform(Vec4::new(f32::NAN, f32::NAN, 0.0, 0.0));
        let sampler = FieldSampler::new(&img, &img, GeoBounds::GLOBE, UnscaleRange::FLOAT, 0.0);
        assert_eq!(sampler.velocity(0.0, 0.0), None);
    }

    #[test]
    fn test_texture_source() {
        assert!(TextureSource::Pending("https://tiles/wind.png".into()).image().is_none());
        let ready: TextureSource = FieldImage::uniform(Vec4::ONE).into();
        assert_eq!(ready.image().unwrap().width(), 1);
    }
}
