//! Execution substrates for the particle simulation.
//!
//! The driver in [`crate::simulation`] never touches particle memory directly.
//! It talks to a [`ParticleBackend`], which owns the double-buffered cohort
//! store and knows how to run the transform on it:
//!
//! - [`CpuBackend`] keeps everything in host memory and runs the rules with
//!   rayon. It is the reference implementation and what the tests drive.
//! - [`GpuBackend`](crate::gpu::GpuBackend) keeps the buffers on the device
//!   and runs the WGSL transform as a compute pass.

use std::sync::Arc;

use glam::{Vec3, Vec4};
use rayon::prelude::*;

use crate::advect::{advect_particle, TransformParams};
use crate::error::Result;
use crate::field::FieldImage;
use crate::particles::{CohortLayout, ParticleBuffers};

/// Storage and compute for one particle simulation.
///
/// A tick is always `advect`, then `shift_cohorts`, then `swap`. Backends may
/// batch these into a single submission as long as the observable order is
/// kept.
pub trait ParticleBackend {
    /// Create both record buffers in the dropped state, plus the per-record
    /// colors. Replaces any previous allocation.
    fn allocate(&mut self, layout: CohortLayout, colors: &[Vec4]) -> Result<()>;

    /// Bind the current and next field rasters.
    fn set_fields(&mut self, current: &Arc<FieldImage>, next: &Arc<FieldImage>) -> Result<()>;

    /// Write cohort 0 of the target from the source.
    fn advect(&mut self, params: &TransformParams);

    /// Copy source cohorts `0..max_age-1` into target cohorts `1..max_age`.
    fn shift_cohorts(&mut self);

    /// Exchange source and target roles.
    fn swap(&mut self);

    /// Reset every record in both buffers to the dropped sentinel.
    fn clear(&mut self);

    /// Drop all resources.
    fn release(&mut self);

    fn is_allocated(&self) -> bool;

    /// Count of buffer-mutating operations performed so far.
    fn mutations(&self) -> u64;
}

/// Host-memory backend.
#[derive(Debug, Default)]
pub struct CpuBackend {
    buffers: Option<ParticleBuffers>,
    current: Option<Arc<FieldImage>>,
    next: Option<Arc<FieldImage>>,
    mutations: u64,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records read by the next tick (empty if unallocated).
    pub fn source(&self) -> &[Vec3] {
        self.buffers.as_ref().map(|b| b.source()).unwrap_or(&[])
    }

    /// Records written by the last tick's transform before the swap.
    pub fn target(&self) -> &[Vec3] {
        self.buffers.as_ref().map(|b| b.target()).unwrap_or(&[])
    }

    /// Direct access for seeding state in tests and tools.
    pub fn source_mut(&mut self) -> Option<&mut [Vec3]> {
        self.buffers.as_mut().map(|b| b.source_mut())
    }
}

impl ParticleBackend for CpuBackend {
    fn allocate(&mut self, layout: CohortLayout, _colors: &[Vec4]) -> Result<()> {
        self.buffers = Some(ParticleBuffers::new(layout));
        self.mutations += 1;
        Ok(())
    }

    fn set_fields(&mut self, current: &Arc<FieldImage>, next: &Arc<FieldImage>) -> Result<()> {
        self.current = Some(Arc::clone(current));
        self.next = Some(Arc::clone(next));
        Ok(())
    }

    fn advect(&mut self, params: &TransformParams) {
        let (Some(buffers), Some(current), Some(next)) =
            (self.buffers.as_mut(), self.current.as_deref(), self.next.as_deref())
        else {
            return;
        };

        let n = (params.num_particles as usize).min(buffers.layout().len());
        let (source, target) = buffers.split();
        target[..n]
            .par_iter_mut()
            .zip(source[..n].par_iter())
            .enumerate()
            .for_each(|(i, (out, record))| {
                let (_, next_record) = advect_particle(i as u32, *record, params, current, next);
                *out = next_record;
            });
        self.mutations += 1;
    }

    fn shift_cohorts(&mut self) {
        if let Some(buffers) = self.buffers.as_mut() {
            buffers.shift_cohorts();
            self.mutations += 1;
        }
    }

    fn swap(&mut self) {
        if let Some(buffers) = self.buffers.as_mut() {
            buffers.swap();
        }
    }

    fn clear(&mut self) {
        if let Some(buffers) = self.buffers.as_mut() {
            buffers.clear();
            self.mutations += 1;
        }
    }

    fn release(&mut self) {
        self.buffers = None;
        self.current = None;
        self.next = None;
    }

    fn is_allocated(&self) -> bool {
        self.buffers.is_some()
    }

    fn mutations(&self) -> u64 {
        self.mutations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoBounds;
    use crate::particles::{cohort_colors, is_dropped};

    fn params(layout: CohortLayout) -> TransformParams {
        TransformParams {
            num_particles: layout.num_particles,
            max_age: layout.max_age,
            tick_phase: layout.max_age + 1,
            seed: 7,
            speed_factor: 1.0,
            zoom_change: 1.0,
            blend: 0.0,
            max_speed: 1.0,
            unscale: [0.0, 0.0],
            _pad: [0.0; 2],
            viewport: GeoBounds::GLOBE.to_array(),
            bounds: GeoBounds::GLOBE.to_array(),
        }
    }

    fn backend(layout: CohortLayout) -> CpuBackend {
        let mut backend = CpuBackend::new();
        backend
            .allocate(layout, &cohort_colors(layout, [255; 4]))
            .unwrap();
        let field = Arc::new(FieldImage::uniform(Vec4::new(0.1, 0.0, 0.0, 1.0)));
        backend.set_fields(&field, &field).unwrap();
        backend
    }

    #[test]
    fn test_advect_only_writes_cohort_zero() {
        let layout = CohortLayout::new(3, 2);
        let mut backend = backend(layout);
        backend.advect(&params(layout));

        let target = backend.target();
        assert!(target[..3].iter().all(|r| !is_dropped(*r)));
        assert!(target[3..].iter().all(|r| is_dropped(*r)));
    }

    #[test]
    fn test_unbound_fields_is_noop() {
        let layout = CohortLayout::new(2, 2);
        let mut backend = CpuBackend::new();
        backend
            .allocate(layout, &cohort_colors(layout, [255; 4]))
            .unwrap();
        let before = backend.mutations();
        backend.advect(&params(layout));
        assert_eq!(backend.mutations(), before);
        assert!(backend.target().iter().all(|r| is_dropped(*r)));
    }

    #[test]
    fn test_full_tick_moves_records() {
        let layout = CohortLayout::new(2, 3);
        let mut backend = backend(layout);
        backend.source_mut().unwrap()[0] = Vec3::new(10.0, 0.5, 0.0);

        backend.advect(&params(layout));
        backend.shift_cohorts();
        backend.swap();

        let source = backend.source();
        assert!((source[0].x - 10.1).abs() < 1e-4);
        assert_eq!(source[2], Vec3::new(10.0, 0.5, 0.0));
    }

    #[test]
    fn test_release() {
        let layout = CohortLayout::new(2, 2);
        let mut backend = backend(layout);
        assert!(backend.is_allocated());
        backend.release();
        assert!(!backend.is_allocated());
        assert!(backend.source().is_empty());
        // no-ops once released
        backend.clear();
        backend.shift_cohorts();
    }
}
