//! Host integration.
//!
//! A map host composes layers and drives them through four hooks. The
//! [`Layer`] trait names those hooks; [`ParticleLayer`] is the GPU particle
//! trail layer built on [`Simulation`] and [`LineRenderer`].

use std::sync::Arc;
use std::time::Duration;

use crate::config::LayerProps;
use crate::error::Result;
use crate::field::TextureSource;
use crate::geo::Viewport;
use crate::gpu::{FrameUniforms, GpuBackend, GpuContext, LineRenderer, LineUniforms};
use crate::simulation::{Simulation, TickOutcome};
use crate::time::TickClock;

/// Lifecycle hooks a host calls on each of its layers.
pub trait Layer {
    /// Whatever the host passes on setup and prop changes.
    type Input;

    /// First call after the layer is added.
    fn setup(&mut self, input: &Self::Input) -> Result<()>;

    /// Called whenever the host's props change.
    fn update(&mut self, input: &Self::Input) -> Result<()>;

    /// Called once when the layer is removed.
    fn finalize(&mut self);

    /// Record draw commands into an open render pass.
    fn draw(&mut self, pass: &mut wgpu::RenderPass<'_>, frame: &FrameUniforms);
}

/// Props plus field rasters, as handed over by the host.
#[derive(Debug, Clone)]
pub struct ParticleLayerInput {
    pub props: LayerProps,
    pub image: TextureSource,
    /// Raster for the next time step; the primary one stands in when absent.
    pub image_next: Option<TextureSource>,
}

impl ParticleLayerInput {
    pub fn new(props: LayerProps, image: impl Into<TextureSource>) -> Self {
        Self {
            props,
            image: image.into(),
            image_next: None,
        }
    }

    pub fn with_next(mut self, image: impl Into<TextureSource>) -> Self {
        self.image_next = Some(image.into());
        self
    }
}

/// Animated particle trails over a vector field.
pub struct ParticleLayer {
    ctx: Arc<GpuContext>,
    simulation: Simulation<GpuBackend>,
    renderer: LineRenderer,
}

impl ParticleLayer {
    pub fn new(
        ctx: Arc<GpuContext>,
        format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        let renderer = LineRenderer::new(&ctx.device, format, depth_format);
        let simulation = Simulation::new(GpuBackend::new(Arc::clone(&ctx)));
        Self {
            ctx,
            simulation,
            renderer,
        }
    }

    /// Use a custom tick clock.
    pub fn with_clock(mut self, clock: TickClock) -> Self {
        self.simulation = self.simulation.with_clock(clock);
        self
    }

    pub fn simulation(&self) -> &Simulation<GpuBackend> {
        &self.simulation
    }

    /// Advance the particles if `now` starts a new tick.
    pub fn animate(&mut self, now: Duration, viewport: &Viewport) -> TickOutcome {
        self.simulation.tick(now, viewport)
    }

    /// Reset every particle to the dropped sentinel; buffers are kept.
    pub fn clear(&mut self) {
        self.simulation.clear();
    }

    fn apply(&mut self, input: &ParticleLayerInput) -> Result<()> {
        let result = self
            .simulation
            .update(&input.props, &input.image, input.image_next.as_ref());
        if self.simulation.is_ready() {
            self.renderer.sync(self.simulation.backend());
        } else {
            self.renderer.reset();
        }
        result
    }
}

impl Layer for ParticleLayer {
    type Input = ParticleLayerInput;

    fn setup(&mut self, input: &Self::Input) -> Result<()> {
        self.apply(input)
    }

    fn update(&mut self, input: &Self::Input) -> Result<()> {
        self.apply(input)
    }

    fn finalize(&mut self) {
        self.simulation.finalize();
        self.renderer.reset();
    }

    fn draw(&mut self, pass: &mut wgpu::RenderPass<'_>, frame: &FrameUniforms) {
        if !self.simulation.is_ready() {
            return;
        }
        let props = self.simulation.props();
        let uniforms = LineUniforms::new(frame, props.width, props.palette.as_ref());
        self.renderer.write_uniforms(&self.ctx.queue, &uniforms);
        self.renderer.draw(pass, self.simulation.backend());
    }
}
