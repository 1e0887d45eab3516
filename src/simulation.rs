//! Simulation driver.
//!
//! [`Simulation`] owns a [`ParticleBackend`] and all per-tick state, and
//! decides when the backend may be allocated, ticked or torn down:
//!
//! ```text
//!              update (valid props, texture ready)
//!   Uninitialized ─────────────────────────────────▶ Ready
//!        ▲                                            │
//!        └──────── update (invalid props) / finalize ─┘
//! ```
//!
//! Only [`update`](Simulation::update) changes structure. Viewport and
//! texture changes rebind fields but never rebuild buffers.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::advect::TransformParams;
use crate::backend::ParticleBackend;
use crate::config::LayerProps;
use crate::error::Result;
use crate::field::{FieldImage, TextureSource};
use crate::geo::Viewport;
use crate::particles::{cohort_colors, CohortLayout};
use crate::time::TickClock;

/// Thinning factor for a zoom transition: `2^((previous - current) * 4)`.
///
/// Zooming out by one level yields 16, so only every 16th particle of the
/// youngest cohort survives the tick. Clamped to `f32::MAX` so the device
/// remainder never divides by infinity.
pub fn zoom_change(previous_zoom: f32, zoom: f32) -> f32 {
    2f32.powf((previous_zoom - zoom) * 4.0).min(f32::MAX)
}

/// Degrees-per-tick multiplier at a zoom level: `speed_factor / 2^(zoom + 7)`.
pub fn zoom_adjusted_speed(speed_factor: f32, zoom: f32) -> f32 {
    speed_factor / 2f32.powf(zoom + 7.0)
}

/// Parameters whose change requires reallocating every buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Structure {
    pub layout: CohortLayout,
    pub width: f32,
    pub color: [u8; 4],
}

impl Structure {
    pub fn of(props: &LayerProps) -> Self {
        Self {
            layout: props.layout(),
            width: props.width,
            color: props.color,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Uninitialized,
    Ready(Structure),
}

/// What a call to [`Simulation::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No buffers are allocated.
    Idle,
    /// Animation is switched off.
    Paused,
    /// Same tick identifier as the last run; nothing happened.
    Unchanged,
    /// Transform, shift and swap ran for this tick identifier.
    Advanced(u64),
}

/// Drives a particle backend through setup, ticks and teardown.
pub struct Simulation<B: ParticleBackend> {
    backend: B,
    state: State,
    props: LayerProps,
    current: Option<Arc<FieldImage>>,
    next: Option<Arc<FieldImage>>,
    clock: TickClock,
    last_tick: Option<u64>,
    last_zoom: Option<f32>,
    rng: StdRng,
    ticks: u64,
}

impl<B: ParticleBackend> Simulation<B> {
    /// Create an idle simulation around a backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: State::Uninitialized,
            props: LayerProps::default(),
            current: None,
            next: None,
            clock: TickClock::default(),
            last_tick: None,
            last_zoom: None,
            rng: StdRng::from_entropy(),
            ticks: 0,
        }
    }

    /// Use a fixed seed for respawn positions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Use a custom tick clock.
    pub fn with_clock(mut self, clock: TickClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Props from the last update, clamped.
    pub fn props(&self) -> &LayerProps {
        &self.props
    }

    pub fn clock(&self) -> TickClock {
        self.clock
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Current structure, if buffers are allocated.
    pub fn structure(&self) -> Option<Structure> {
        match self.state {
            State::Ready(structure) => Some(structure),
            State::Uninitialized => None,
        }
    }

    /// Tick identifier of the last completed tick.
    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Number of ticks completed since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Apply new props and field rasters.
    ///
    /// Invalid structure tears everything down. A pending primary raster
    /// defers setup until a later update delivers it. A missing or pending
    /// next raster is replaced by the primary one.
    pub fn update(
        &mut self,
        props: &LayerProps,
        current: &TextureSource,
        next: Option<&TextureSource>,
    ) -> Result<()> {
        let props = props.validated();

        if !props.is_structurally_valid() {
            if self.is_ready() {
                log::debug!(
                    "tearing down particles: count={} age={} width={}",
                    props.num_particles,
                    props.max_age,
                    props.width
                );
            }
            self.teardown();
            self.props = props;
            return Ok(());
        }

        let structure = Structure::of(&props);
        if self.is_ready() && self.structure() != Some(structure) {
            log::debug!("particle structure changed, rebuilding");
            self.teardown();
        }
        self.props = props;

        let Some(current) = current.image() else {
            if let TextureSource::Pending(url) = current {
                log::debug!("field texture '{}' not ready, deferring setup", url);
            }
            return Ok(());
        };
        let next = match next.and_then(TextureSource::image) {
            Some(next) => next,
            None => {
                log::debug!("no next field texture, using the current one");
                current
            }
        };

        if !self.is_ready() {
            let colors = cohort_colors(structure.layout, structure.color);
            if let Err(e) = self.backend.allocate(structure.layout, &colors) {
                self.teardown();
                return Err(e);
            }
            log::info!(
                "allocated {} particles x {} cohorts ({} records, {} bytes per buffer)",
                structure.layout.num_particles,
                structure.layout.max_age,
                structure.layout.len(),
                structure.layout.len() * std::mem::size_of::<[f32; 4]>()
            );
            self.state = State::Ready(structure);
        }

        if !self.fields_bound(current, next) {
            if let Err(e) = self.backend.set_fields(current, next) {
                self.teardown();
                return Err(e);
            }
            self.current = Some(Arc::clone(current));
            self.next = Some(Arc::clone(next));
        }

        Ok(())
    }

    fn fields_bound(&self, current: &Arc<FieldImage>, next: &Arc<FieldImage>) -> bool {
        matches!(
            (&self.current, &self.next),
            (Some(c), Some(n)) if Arc::ptr_eq(c, current) && Arc::ptr_eq(n, next)
        )
    }

    /// Run one simulation tick if `now` falls into a new tick interval.
    pub fn tick(&mut self, now: Duration, viewport: &Viewport) -> TickOutcome {
        if !self.is_ready() {
            return TickOutcome::Idle;
        }
        if !self.props.animate {
            return TickOutcome::Paused;
        }

        let tick = self.clock.tick_id(now);
        if self.last_tick == Some(tick) {
            return TickOutcome::Unchanged;
        }

        let params = self.transform_params(tick, viewport);
        self.backend.advect(&params);
        self.backend.shift_cohorts();
        self.backend.swap();

        self.last_tick = Some(tick);
        self.last_zoom = Some(viewport.zoom);
        self.ticks += 1;
        log::trace!("tick {} (zoom change {})", tick, params.zoom_change);
        TickOutcome::Advanced(tick)
    }

    /// Uniform block for the next transform.
    pub fn transform_params(&mut self, tick: u64, viewport: &Viewport) -> TransformParams {
        let seed: u32 = self.rng.gen();
        let props = &self.props;
        let previous_zoom = self.last_zoom.unwrap_or(viewport.zoom);

        TransformParams {
            num_particles: props.num_particles,
            max_age: props.max_age,
            tick_phase: TransformParams::tick_phase(tick, props.max_age),
            seed,
            speed_factor: zoom_adjusted_speed(props.speed_factor, viewport.zoom),
            zoom_change: zoom_change(previous_zoom, viewport.zoom),
            blend: props.image_blend,
            max_speed: props.speed_normalization(),
            unscale: props.unscale().into(),
            _pad: [0.0; 2],
            viewport: viewport.visible_bounds().to_array(),
            bounds: props.bounds.to_array(),
        }
    }

    /// Reset every particle to the dropped sentinel without releasing buffers.
    pub fn clear(&mut self) {
        if self.is_ready() {
            log::debug!("clearing all particles");
            self.backend.clear();
        }
    }

    /// Release everything; the simulation goes idle.
    pub fn finalize(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.backend.is_allocated() {
            self.backend.release();
        }
        self.state = State::Uninitialized;
        self.current = None;
        self.next = None;
        self.last_tick = None;
        self.last_zoom = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, GpuError};
    use glam::Vec4;

    /// Accepts layouts up to `max_records`, like a device with a small
    /// buffer limit.
    #[derive(Default)]
    struct LimitedBackend {
        max_records: usize,
        allocated: bool,
    }

    impl ParticleBackend for LimitedBackend {
        fn allocate(&mut self, layout: CohortLayout, _colors: &[Vec4]) -> Result<()> {
            if layout.len() > self.max_records {
                return Err(GpuError::BufferTooLarge {
                    records: layout.len(),
                    bytes: layout.len() as u64 * 16,
                    limit: self.max_records as u64 * 16,
                }
                .into());
            }
            self.allocated = true;
            Ok(())
        }
        fn set_fields(&mut self, _: &Arc<FieldImage>, _: &Arc<FieldImage>) -> Result<()> {
            Ok(())
        }
        fn advect(&mut self, _: &TransformParams) {}
        fn shift_cohorts(&mut self) {}
        fn swap(&mut self) {}
        fn clear(&mut self) {}
        fn release(&mut self) {
            self.allocated = false;
        }
        fn is_allocated(&self) -> bool {
            self.allocated
        }
        fn mutations(&self) -> u64 {
            0
        }
    }

    #[test]
    fn test_zoom_change() {
        assert_eq!(zoom_change(3.0, 3.0), 1.0);
        assert_eq!(zoom_change(3.0, 2.0), 16.0);
        assert_eq!(zoom_change(2.0, 3.0), 1.0 / 16.0);
        assert_eq!(zoom_change(2.5, 2.0), 4.0);
    }

    #[test]
    fn test_zoom_change_stays_finite() {
        assert_eq!(zoom_change(40.0, 0.0), f32::MAX);
        assert_eq!(zoom_change(0.0, 40.0), 0.0);
        // WGSL evaluates x % y as x - y * trunc(x / y); with a finite factor
        // this matches the host remainder
        let factor = zoom_change(40.0, 0.0);
        let index = 7.0f32;
        assert_eq!(index - factor * (index / factor).trunc(), index % factor);
    }

    #[test]
    fn test_zoom_adjusted_speed() {
        assert_eq!(zoom_adjusted_speed(1.0, -7.0), 1.0);
        assert_eq!(zoom_adjusted_speed(128.0, 0.0), 1.0);
        assert_eq!(zoom_adjusted_speed(1.0, 1.0), 1.0 / 256.0);
    }

    #[test]
    fn test_structure_key() {
        let props = LayerProps::default();
        let other = LayerProps {
            speed_factor: 9.0,
            image_blend: 0.5,
            ..props.clone()
        };
        assert_eq!(Structure::of(&props), Structure::of(&other));

        let wider = LayerProps {
            width: 2.0,
            ..props.clone()
        };
        assert_ne!(Structure::of(&props), Structure::of(&wider));
    }

    #[test]
    fn test_oversized_layout_fails_and_tears_down() {
        let field = TextureSource::ready(FieldImage::uniform(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        let mut sim = Simulation::new(LimitedBackend {
            max_records: 1_000,
            ..Default::default()
        });

        let small = LayerProps {
            num_particles: 10,
            max_age: 10,
            ..Default::default()
        };
        sim.update(&small, &field, None).unwrap();
        assert!(sim.is_ready());

        let large = LayerProps {
            num_particles: 100_000,
            max_age: 255,
            ..Default::default()
        };
        let err = sim.update(&large, &field, None).unwrap_err();
        assert!(matches!(err, Error::Gpu(GpuError::BufferTooLarge { .. })));
        assert!(!sim.is_ready());
        assert!(!sim.backend().is_allocated());
        assert_eq!(
            sim.tick(Duration::ZERO, &Viewport::default()),
            TickOutcome::Idle
        );
    }
}
