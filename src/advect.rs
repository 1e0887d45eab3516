//! The per-particle advection rules.
//!
//! Each tick, every record of the youngest cohort is run through an ordered
//! list of rules. The first rule that matches decides the record's next
//! value and nothing after it is evaluated:
//!
//! | # | Rule | Condition | Result |
//! |---|------|-----------|--------|
//! | 1 | [`Step::Skipped`] | record is not in cohort 0 | unchanged (the cohort shift moves it) |
//! | 2 | [`Step::Respawned`] | record is the dropped sentinel | random point in the viewport |
//! | 3 | [`Step::Thinned`] | view zoomed out and index in the thinning subset | dropped |
//! | 4 | [`Step::Expired`] | `index % (max_age + 2) == tick % (max_age + 2)` | dropped |
//! | 5 | [`Step::Clamped`] | outside the field domain | unchanged |
//! | 6 | [`Step::OffScreen`] | outside the visible viewport | dropped |
//! | 7 | [`Step::NoData`] | field has no value here | dropped |
//! | 8 | [`Step::Advected`] | otherwise | one Euler step along the field |
//!
//! The order matters: a record that is both outside the domain and outside
//! the viewport is held (5), not dropped (6).
//!
//! [`advect_particle`] is the host implementation. The WGSL program in
//! [`crate::shader`] evaluates the same rules on the GPU, and the respawn hash
//! uses only integer arithmetic so both produce identical random points.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::field::{FieldImage, FieldSampler, UnscaleRange};
use crate::geo::{wrap_longitude, GeoBounds};
use crate::particles::{dropped, is_dropped};

/// Lower bound on `cos(latitude)` so steps stay finite at the poles.
pub const MIN_DISTORTION: f32 = 0.01;

/// Tick-global inputs of the transform, laid out as the WGSL uniform block.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct TransformParams {
    pub num_particles: u32,
    pub max_age: u32,
    /// Tick identifier reduced modulo `max_age + 2`.
    pub tick_phase: u32,
    /// Per-tick random seed for respawn positions.
    pub seed: u32,
    /// Degrees per tick per unit of field velocity.
    pub speed_factor: f32,
    /// `2^((previous_zoom - zoom) * 4)`; above 1 when zooming out.
    pub zoom_change: f32,
    /// Weight of the next field raster.
    pub blend: f32,
    /// Speed that maps to 1.0 in the record's color channel.
    pub max_speed: f32,
    pub unscale: [f32; 2],
    pub _pad: [f32; 2],
    /// Visible viewport, already wrapped.
    pub viewport: [f32; 4],
    /// Field domain.
    pub bounds: [f32; 4],
}

impl TransformParams {
    /// Reduce a tick identifier to the phase compared by the expiry rule.
    pub fn tick_phase(tick: u64, max_age: u32) -> u32 {
        (tick % (max_age as u64 + 2)) as u32
    }

    pub fn viewport(&self) -> GeoBounds {
        self.viewport.into()
    }

    pub fn bounds(&self) -> GeoBounds {
        self.bounds.into()
    }

    pub fn unscale(&self) -> UnscaleRange {
        self.unscale.into()
    }

    /// Sampler over the two rasters configured by these parameters.
    pub fn sampler<'a>(&self, current: &'a FieldImage, next: &'a FieldImage) -> FieldSampler<'a> {
        FieldSampler::new(current, next, self.bounds(), self.unscale(), self.blend)
    }
}

/// Which rule decided a record's next value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Skipped,
    Respawned,
    Thinned,
    Expired,
    Clamped,
    OffScreen,
    NoData,
    Advected,
}

/// PCG-style integer hash, identical to `pcg_hash` in the WGSL transform.
#[inline]
pub fn pcg_hash(v: u32) -> u32 {
    let state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Map a hash to `[0, 1)` using its top 24 bits (exact in `f32`).
#[inline]
pub fn unit_float(h: u32) -> f32 {
    (h >> 8) as f32 / 16_777_216.0
}

#[inline]
fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Pseudo-random position for a respawning record, uniform in longitude
/// over the viewport and smoothstep-remapped in latitude.
pub fn respawn_position(index: u32, seed: u32, viewport: GeoBounds) -> Vec2 {
    let h1 = pcg_hash(index ^ pcg_hash(seed));
    let h2 = pcg_hash(h1);
    let lng = viewport.min_lng + unit_float(h1) * viewport.lng_span();
    let lat = viewport.min_lat + smoothstep(unit_float(h2)) * viewport.lat_span();
    Vec2::new(wrap_longitude(lng, None), lat)
}

/// Evaluate the rules for one record and return the deciding rule and the
/// record's next value.
pub fn advect_particle(
    index: u32,
    source: Vec3,
    params: &TransformParams,
    current: &FieldImage,
    next: &FieldImage,
) -> (Step, Vec3) {
    if params.num_particles == 0 || index / params.num_particles > 0 {
        return (Step::Skipped, source);
    }

    if is_dropped(source) {
        let pos = respawn_position(index, params.seed, params.viewport());
        return (Step::Respawned, pos.extend(0.0));
    }

    if params.zoom_change > 1.0 && (index as f32 % params.zoom_change) >= 1.0 {
        return (Step::Thinned, dropped());
    }

    if index % (params.max_age + 2) == params.tick_phase {
        return (Step::Expired, dropped());
    }

    if !params.bounds().contains(source.x, source.y) {
        return (Step::Clamped, source);
    }

    if !params.viewport().contains(source.x, source.y) {
        return (Step::OffScreen, dropped());
    }

    let Some(velocity) = params.sampler(current, next).velocity(source.x, source.y) else {
        return (Step::NoData, dropped());
    };

    let step = velocity * params.speed_factor;
    let distortion = source.y.to_radians().cos().max(MIN_DISTORTION);
    let lng = wrap_longitude(source.x + step.x / distortion, None);
    let lat = source.y + step.y;
    let speed = if params.max_speed > 0.0 {
        (velocity.length() / params.max_speed).min(1.0)
    } else {
        0.0
    };

    (Step::Advected, Vec3::new(lng, lat, speed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn params() -> TransformParams {
        TransformParams {
            num_particles: 4,
            max_age: 10,
            tick_phase: 5,
            seed: 1234,
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

    fn east_field() -> FieldImage {
        FieldImage::uniform(Vec4::new(0.1, 0.0, 0.0, 1.0))
    }

    #[test]
    fn test_params_layout_matches_wgsl() {
        assert_eq!(std::mem::size_of::<TransformParams>(), 80);
    }

    #[test]
    fn test_older_cohorts_pass_through() {
        let field = east_field();
        let src = Vec3::new(10.0, 5.0, 0.3);
        let (step, out) = advect_particle(4, src, &params(), &field, &field);
        assert_eq!(step, Step::Skipped);
        assert_eq!(out, src);
    }

    #[test]
    fn test_respawn_lands_in_viewport() {
        let field = east_field();
        let mut p = params();
        p.viewport = [20.0, -30.0, 60.0, 10.0];
        for seed in 0..200 {
            p.seed = seed;
            for index in 0..4 {
                let (step, out) = advect_particle(index, dropped(), &p, &field, &field);
                assert_eq!(step, Step::Respawned);
                assert!(out.x >= 20.0 && out.x <= 60.0, "{out}");
                assert!(out.y >= -30.0 && out.y <= 10.0, "{out}");
                assert_eq!(out.z, 0.0);
            }
        }
    }

    #[test]
    fn test_respawn_wraps_longitude() {
        let view = GeoBounds::new(170.0, -10.0, 190.0, 10.0);
        for index in 0..100 {
            let pos = respawn_position(index, 99, view);
            assert!(pos.x > -180.0 && pos.x <= 180.0);
            assert!(view.contains(pos.x, pos.y));
        }
    }

    #[test]
    fn test_respawn_is_deterministic_per_seed() {
        let view = GeoBounds::GLOBE;
        assert_eq!(respawn_position(3, 7, view), respawn_position(3, 7, view));
        assert_ne!(respawn_position(3, 7, view), respawn_position(3, 8, view));
        assert_ne!(respawn_position(3, 7, view), respawn_position(2, 7, view));
    }

    #[test]
    fn test_zoom_out_thinning() {
        let field = east_field();
        let mut p = params();
        p.num_particles = 100;
        p.zoom_change = 4.0;
        let src = Vec3::new(10.0, 0.0, 0.0);
        let thinned: Vec<u32> = (0..12)
            .filter(|&i| advect_particle(i, src, &p, &field, &field).0 == Step::Thinned)
            .collect();
        // every index except multiples of 4 is dropped
        assert_eq!(thinned, vec![1, 2, 3, 5, 6, 7, 9, 10, 11]);

        // zooming in never thins
        p.zoom_change = 0.25;
        assert_eq!(advect_particle(1, src, &p, &field, &field).0, Step::Advected);
    }

    #[test]
    fn test_expiry_by_tick_phase() {
        let field = east_field();
        let mut p = params();
        p.num_particles = 100;
        let src = Vec3::new(10.0, 0.0, 0.0);
        // max_age + 2 = 12, phase 5 -> indices 5, 17, 29
        for index in [5, 17, 29] {
            assert_eq!(advect_particle(index, src, &p, &field, &field), (Step::Expired, dropped()));
        }
        assert_eq!(advect_particle(6, src, &p, &field, &field).0, Step::Advected);
        assert_eq!(TransformParams::tick_phase(41, 10), 5);
    }

    #[test]
    fn test_advect_step() {
        let field = east_field();
        let src = Vec3::new(10.0, 0.0, 0.0);
        let (step, out) = advect_particle(0, src, &params(), &field, &field);
        assert_eq!(step, Step::Advected);
        assert!((out.x - 10.1).abs() < 1e-5);
        assert_eq!(out.y, 0.0);
        assert!((out.z - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_advect_latitude_distortion() {
        let field = east_field();
        let src = Vec3::new(10.0, 60.0, 0.0);
        let (_, out) = advect_particle(0, src, &params(), &field, &field);
        // cos(60°) = 0.5 doubles the longitude step
        assert!((out.x - 10.2).abs() < 1e-4, "{out}");
    }

    #[test]
    fn test_advect_wraps_antimeridian() {
        let field = FieldImage::uniform(Vec4::new(1.0, 0.0, 0.0, 1.0));
        let src = Vec3::new(179.5, 0.0, 0.0);
        let (_, out) = advect_particle(0, src, &params(), &field, &field);
        assert!((out.x + 179.5).abs() < 1e-4, "{out}");
    }

    #[test]
    fn test_out_of_domain_clamps_before_viewport_drop() {
        let field = east_field();
        let mut p = params();
        p.bounds = [-20.0, -20.0, 20.0, 20.0];
        p.viewport = [-10.0, -10.0, 10.0, 10.0];
        let src = Vec3::new(50.0, 10.0, 0.4);
        assert_eq!(advect_particle(0, src, &p, &field, &field), (Step::Clamped, src));
    }

    #[test]
    fn test_respawn_precedes_thinning() {
        let field = east_field();
        let mut p = params();
        p.zoom_change = 4.0;
        let (step, out) = advect_particle(1, dropped(), &p, &field, &field);
        assert_eq!(step, Step::Respawned);
        assert!(!is_dropped(out));
    }

    #[test]
    fn test_thinning_precedes_expiry() {
        let field = east_field();
        let mut p = params();
        p.num_particles = 100;
        p.zoom_change = 4.0;
        // 5 % 4 = 1 thins, and 5 % 12 = 5 also matches the tick phase
        let src = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(advect_particle(5, src, &p, &field, &field).0, Step::Thinned);
    }

    #[test]
    fn test_saturated_zoom_change_thins() {
        let field = east_field();
        let mut p = params();
        p.num_particles = 100;
        p.zoom_change = f32::MAX;
        let src = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(advect_particle(0, src, &p, &field, &field).0, Step::Advected);
        assert_eq!(advect_particle(3, src, &p, &field, &field).0, Step::Thinned);
    }

    #[test]
    fn test_expiry_precedes_domain_clamp() {
        let field = east_field();
        let mut p = params();
        p.num_particles = 100;
        p.bounds = [-20.0, -20.0, 20.0, 20.0];
        let src = Vec3::new(50.0, 10.0, 0.4);
        assert_eq!(advect_particle(5, src, &p, &field, &field), (Step::Expired, dropped()));
        assert_eq!(advect_particle(6, src, &p, &field, &field), (Step::Clamped, src));
    }

    #[test]
    fn test_off_screen_precedes_no_data() {
        let field = FieldImage::uniform(Vec4::new(f32::NAN, f32::NAN, 0.0, 1.0));
        let mut p = params();
        p.viewport = [-10.0, -10.0, 10.0, 10.0];
        let off_screen = Vec3::new(15.0, 1.0, 0.0);
        assert_eq!(
            advect_particle(0, off_screen, &p, &field, &field),
            (Step::OffScreen, dropped())
        );
        let on_screen = Vec3::new(5.0, 1.0, 0.0);
        assert_eq!(advect_particle(0, on_screen, &p, &field, &field).0, Step::NoData);
    }

    #[test]
    fn test_off_screen_drop() {
        let field = east_field();
        let mut p = params();
        p.viewport = [-10.0, -10.0, 10.0, 10.0];
        let src = Vec3::new(15.0, 1.0, 0.0);
        assert_eq!(advect_particle(0, src, &p, &field, &field), (Step::OffScreen, dropped()));
    }

    #[test]
    fn test_no_data_drop() {
        let field = FieldImage::uniform(Vec4::new(f32::NAN, 0.0, 0.0, 1.0));
        let src = Vec3::new(15.0, 1.0, 0.0);
        assert_eq!(advect_particle(0, src, &params(), &field, &field), (Step::NoData, dropped()));

        let mut p = params();
        p.unscale = [-1.0, 1.0];
        let transparent = FieldImage::uniform(Vec4::new(0.5, 0.5, 0.0, 0.0));
        assert_eq!(
            advect_particle(0, src, &p, &transparent, &transparent).0,
            Step::NoData
        );
    }

    #[test]
    fn test_speed_is_normalized() {
        let field = FieldImage::uniform(Vec4::new(3.0, 4.0, 0.0, 1.0));
        let mut p = params();
        p.speed_factor = 0.01;
        p.max_speed = 10.0;
        let (_, out) = advect_particle(0, Vec3::new(1.0, 1.0, 0.0), &p, &field, &field);
        assert!((out.z - 0.5).abs() < 1e-6);

        p.max_speed = 2.0;
        let (_, out) = advect_particle(0, Vec3::new(1.0, 1.0, 0.0), &p, &field, &field);
        assert_eq!(out.z, 1.0);
    }

    #[test]
    fn test_unit_float_range() {
        assert_eq!(unit_float(0), 0.0);
        assert!(unit_float(u32::MAX) < 1.0);
    }
}
