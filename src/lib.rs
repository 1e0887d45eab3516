//! # Driftlines
//!
//! GPU particle trails for vector-field map overlays.
//!
//! Driftlines advects tens of thousands of particles through a 2D velocity
//! raster (ocean currents, wind) entirely on the GPU and draws each particle's
//! recent history as a fading trail. The host map supplies the viewport and a
//! projection; everything else (respawning, culling, aging, blending between
//! two time steps of the field) happens here.
//!
//! ## Quick Start
//!
//! ```ignore
//! use driftlines::prelude::*;
//!
//! let ctx = Arc::new(pollster::block_on(GpuContext::headless())?);
//! let mut layer = ParticleLayer::new(ctx, surface_format, None);
//!
//! let props = LayerProps {
//!     num_particles: 8000,
//!     max_age: 60,
//!     image_unscale: Some(UnscaleRange::new(-30.0, 30.0)),
//!     palette: Some(ColorScheme::Wind),
//!     ..Default::default()
//! };
//! layer.setup(&ParticleLayerInput::new(props, FieldImage::from_file("wind.png")?))?;
//!
//! // Every frame:
//! layer.animate(elapsed, &Viewport::new(visible_bounds, zoom));
//! layer.draw(&mut render_pass, &FrameUniforms { view_proj, viewport_size });
//! ```
//!
//! ## Core Concepts
//!
//! ### Cohorts
//!
//! Particles are stored as `num_particles * max_age` records. Record `i` is
//! particle `i % num_particles` as it was `i / num_particles` ticks ago, so a
//! single buffer holds both live positions and trails. See [`particles`].
//!
//! ### Ticks
//!
//! The simulation runs at a fixed 30 ticks per second regardless of frame
//! rate. Each tick rewrites the youngest cohort with the rules in [`advect`]
//! and slides every older cohort one slot along. See [`simulation`].
//!
//! ### Fields
//!
//! A field raster stores velocity in its red and green channels, either as
//! raw floats (no-data is NaN) or normalized to a `[min, max]` range (no-data
//! is alpha below 1). See [`field`].
//!
//! ## Module Overview
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`geo`] | longitude wrapping, bounding boxes, viewport |
//! | [`field`] | rasters, decoding, bilinear sampling |
//! | [`particles`] | cohort layout, colors, host buffers |
//! | [`advect`] | per-particle rules |
//! | [`backend`] | CPU backend and the backend trait |
//! | [`gpu`] | GPU backend and line renderer |
//! | [`simulation`] | tick driver and lifecycle |
//! | [`layer`] | host lifecycle hooks |
//! | [`config`] | layer options |
//! | [`palette`] | speed color schemes |

pub mod advect;
pub mod backend;
pub mod config;
pub mod error;
pub mod field;
pub mod geo;
pub mod gpu;
pub mod layer;
pub mod palette;
pub mod particles;
pub mod shader;
pub mod simulation;
pub mod time;

pub use bytemuck;
pub use glam::{Mat4, Vec2, Vec3, Vec4};

pub use advect::{advect_particle, Step, TransformParams};
pub use backend::{CpuBackend, ParticleBackend};
pub use config::LayerProps;
pub use error::{ConfigError, Error, GpuError, Result, TextureError};
pub use field::{FieldImage, FieldSampler, TextureSource, UnscaleRange};
pub use geo::{wrap_bounds, wrap_longitude, GeoBounds, Viewport};
pub use gpu::{FrameUniforms, GpuBackend, GpuContext, LineRenderer};
pub use layer::{Layer, ParticleLayer, ParticleLayerInput};
pub use palette::ColorScheme;
pub use particles::{CohortLayout, ParticleBuffers};
pub use simulation::{Simulation, TickOutcome};
pub use time::{FrameScheduler, TickClock};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use driftlines::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::{CpuBackend, ParticleBackend};
    pub use crate::config::LayerProps;
    pub use crate::field::{FieldImage, TextureSource, UnscaleRange};
    pub use crate::geo::{GeoBounds, Viewport};
    pub use crate::gpu::{FrameUniforms, GpuContext};
    pub use crate::layer::{Layer, ParticleLayer, ParticleLayerInput};
    pub use crate::palette::ColorScheme;
    pub use crate::simulation::{Simulation, TickOutcome};
    pub use crate::time::{FrameScheduler, TickClock};
    pub use crate::{Mat4, Vec2, Vec3, Vec4};
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
