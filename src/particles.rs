//! Particle storage organized into age cohorts.
//!
//! Records live in one flat buffer of `num_particles * max_age` entries.
//! Record `i` belongs to cohort `i / num_particles`; cohort 0 holds the most
//! recently computed positions and the last cohort the oldest.
//!
//! Each record is `(lng, lat, speed)` where `speed` is the normalized `[0, 1]`
//! magnitude used for color mapping. The position `(0, 0)` is reserved as the
//! "dropped" sentinel: a slot holding it is waiting to respawn.
//!
//! Two buffers exist, source and target. A tick writes the youngest cohort
//! of the target, shifts every older cohort one slot along with a single
//! copy, and then swaps roles:
//!
//! ```text
//!   source: [c0 | c1 | c2 | ... | cN-1]
//!              \    \    \
//!   target: [new| c0 | c1 | ... | cN-2]   (cN-1 falls off)
//! ```

use std::ops::Range;

use glam::{Vec2, Vec3, Vec4};

/// Position that marks an inactive slot.
pub const DROPPED: Vec2 = Vec2::ZERO;

/// Whether a record holds the dropped sentinel.
#[inline]
pub fn is_dropped(record: Vec3) -> bool {
    record.x == DROPPED.x && record.y == DROPPED.y
}

/// A record in the dropped state.
#[inline]
pub fn dropped() -> Vec3 {
    DROPPED.extend(0.0)
}

/// Shape of a cohort buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CohortLayout {
    pub num_particles: u32,
    pub max_age: u32,
}

impl CohortLayout {
    pub fn new(num_particles: u32, max_age: u32) -> Self {
        Self {
            num_particles,
            max_age,
        }
    }

    /// Whether both dimensions are non-zero.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.num_particles > 0 && self.max_age > 0
    }

    /// Total records across all cohorts.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_particles as usize * self.max_age as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cohort (age) of a record index.
    #[inline]
    pub fn cohort_of(&self, index: usize) -> u32 {
        (index / self.num_particles as usize) as u32
    }

    /// Record indices belonging to one cohort.
    pub fn cohort_range(&self, cohort: u32) -> Range<usize> {
        let n = self.num_particles as usize;
        let start = cohort as usize * n;
        start..start + n
    }

    /// Number of records moved by the cohort shift.
    #[inline]
    pub fn shifted_len(&self) -> usize {
        self.num_particles as usize * self.max_age.saturating_sub(1) as usize
    }
}

/// Per-record constant color, RGBA in `0..=255` units.
///
/// Alpha fades linearly with cohort age: `alpha * (1 - age / max_age)`.
pub fn cohort_colors(layout: CohortLayout, base: [u8; 4]) -> Vec<Vec4> {
    let rgb = Vec3::new(base[0] as f32, base[1] as f32, base[2] as f32);
    let alpha = base[3] as f32;
    (0..layout.max_age)
        .flat_map(|age| {
            let fade = 1.0 - age as f32 / layout.max_age as f32;
            std::iter::repeat(rgb.extend(alpha * fade)).take(layout.num_particles as usize)
        })
        .collect()
}

/// Double-buffered cohort store held in host memory.
///
/// Roles are swapped with a flag, never by copying.
#[derive(Debug, Clone)]
pub struct ParticleBuffers {
    layout: CohortLayout,
    a: Vec<Vec3>,
    b: Vec<Vec3>,
    /// Which buffer is currently the source (false = A, true = B)
    source_is_b: bool,
}

impl ParticleBuffers {
    /// Allocate both buffers in the dropped state.
    pub fn new(layout: CohortLayout) -> Self {
        Self {
            layout,
            a: vec![dropped(); layout.len()],
            b: vec![dropped(); layout.len()],
            source_is_b: false,
        }
    }

    #[inline]
    pub fn layout(&self) -> CohortLayout {
        self.layout
    }

    /// The buffer read by the transform and drawn as line start points.
    pub fn source(&self) -> &[Vec3] {
        if self.source_is_b {
            &self.b
        } else {
            &self.a
        }
    }

    /// The buffer written by the transform and drawn as line end points.
    pub fn target(&self) -> &[Vec3] {
        if self.source_is_b {
            &self.a
        } else {
            &self.b
        }
    }

    pub fn source_mut(&mut self) -> &mut [Vec3] {
        if self.source_is_b {
            &mut self.b
        } else {
            &mut self.a
        }
    }

    /// Source for reading and target for writing at the same time.
    pub fn split(&mut self) -> (&[Vec3], &mut [Vec3]) {
        if self.source_is_b {
            (&self.b, &mut self.a)
        } else {
            (&self.a, &mut self.b)
        }
    }

    /// Slide cohorts `0..max_age-1` of the source into cohorts
    /// `1..max_age` of the target. Target cohort 0 is left untouched.
    pub fn shift_cohorts(&mut self) {
        let n = self.layout.num_particles as usize;
        let count = self.layout.shifted_len();
        if count == 0 {
            return;
        }
        let (source, target) = self.split();
        target[n..n + count].copy_from_slice(&source[..count]);
    }

    /// Exchange source and target roles.
    pub fn swap(&mut self) {
        self.source_is_b = !self.source_is_b;
    }

    /// Reset every record in both buffers to the dropped sentinel.
    pub fn clear(&mut self) {
        self.a.fill(dropped());
        self.b.fill(dropped());
    }
}
