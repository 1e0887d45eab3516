//! Interactive demo: particle trails over a synthetic vortex field.
//!
//! Drag to pan, scroll to zoom, `C` clears the particles, `Space` pauses.
//! Pass a JSON file of layer options as the first argument to override the
//! defaults.

use std::sync::Arc;
use std::time::{Duration, Instant};

use driftlines::prelude::*;
use driftlines::TextureError;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, StartCause, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const FIELD_WIDTH: u32 = 360;
const FIELD_HEIGHT: u32 = 180;

/// Zonal jets plus a few rotating cells; NaN poleward of 80 degrees.
fn vortex_field() -> Result<FieldImage, TextureError> {
    FieldImage::from_fn(FIELD_WIDTH, FIELD_HEIGHT, |x, y| {
        let lng = x as f32 + 0.5 - 180.0;
        let lat = 90.0 - (y as f32 + 0.5);
        if lat.abs() > 80.0 {
            return Vec4::new(f32::NAN, f32::NAN, 0.0, 1.0);
        }
        let (lng_r, lat_r) = (lng.to_radians(), lat.to_radians());
        let u = 12.0 * (3.0 * lat_r).sin() + 4.0 * (2.0 * lng_r).cos() * (2.0 * lat_r).cos();
        let v = -6.0 * (2.0 * lng_r).sin() * (4.0 * lat_r).sin();
        Vec4::new(u, v, 0.0, 1.0)
    })
}

fn demo_props() -> LayerProps {
    LayerProps {
        num_particles: 8000,
        max_age: 40,
        speed_factor: 2.0,
        color: [255, 255, 255, 220],
        width: 1.5,
        max_speed: Some(16.0),
        palette: Some(ColorScheme::Wind),
        ..Default::default()
    }
}

struct Renderer {
    surface: wgpu::Surface<'static>,
    ctx: Arc<GpuContext>,
    config: wgpu::SurfaceConfiguration,
    layer: ParticleLayer,
}

impl Renderer {
    async fn new(window: Arc<Window>, input: &ParticleLayerInput) -> driftlines::Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(driftlines::GpuError::from)?;
        let (ctx, adapter) = GpuContext::request(&instance, Some(&surface)).await?;
        let ctx = Arc::new(ctx);

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &config);

        let mut layer = ParticleLayer::new(Arc::clone(&ctx), surface_format, None);
        layer.setup(input)?;

        Ok(Self {
            surface,
            ctx,
            config,
            layer,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.ctx.device, &self.config);
        }
    }

    fn size(&self) -> Vec2 {
        Vec2::new(self.config.width as f32, self.config.height as f32)
    }

    fn render(&mut self, frame: &FrameUniforms) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.02,
                            g: 0.03,
                            b: 0.06,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.layer.draw(&mut render_pass, frame);
        }

        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

/// Equirectangular map camera.
struct MapView {
    center: Vec2,
    zoom: f32,
}

impl MapView {
    /// Visible box for a render target of `size` pixels.
    fn bounds(&self, size: Vec2) -> GeoBounds {
        let half_w = 180.0 / 2f32.powf(self.zoom);
        let half_h = half_w * size.y / size.x.max(1.0);
        GeoBounds::new(
            self.center.x - half_w,
            self.center.y - half_h,
            self.center.x + half_w,
            self.center.y + half_h,
        )
    }

    fn view_proj(&self, size: Vec2) -> Mat4 {
        let b = self.bounds(size);
        Mat4::orthographic_rh(b.min_lng, b.max_lng, b.min_lat, b.max_lat, -1.0, 1.0)
    }

    fn pan_pixels(&mut self, dx: f32, dy: f32, size: Vec2) {
        let degrees_per_pixel = self.bounds(size).lng_span() / size.x.max(1.0);
        self.center.x -= dx * degrees_per_pixel;
        self.center.y = (self.center.y + dy * degrees_per_pixel).clamp(-90.0, 90.0);
    }
}

struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    input: ParticleLayerInput,
    scheduler: FrameScheduler,
    start: Instant,
    view: MapView,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
}

impl App {
    fn new(props: LayerProps, field: FieldImage) -> Self {
        Self {
            window: None,
            renderer: None,
            input: ParticleLayerInput::new(props, field),
            scheduler: FrameScheduler::default(),
            start: Instant::now(),
            view: MapView {
                center: Vec2::ZERO,
                zoom: 0.0,
            },
            dragging: false,
            last_cursor: None,
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn toggle_animation(&mut self) {
        self.input.props.animate = !self.input.props.animate;
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.layer.update(&self.input) {
                log::error!("failed to update layer: {}", e);
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = self.elapsed();
        let Some(renderer) = &mut self.renderer else {
            return;
        };

        let size = renderer.size();
        let viewport = Viewport::new(self.view.bounds(size), self.view.zoom);
        renderer.layer.animate(now, &viewport);

        let frame = FrameUniforms {
            view_proj: self.view.view_proj(size),
            viewport_size: size,
        };
        match renderer.render(&frame) {
            Ok(_) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                renderer.resize(renderer.config.width, renderer.config.height)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
            Err(e) => log::warn!("render error: {:?}", e),
        }
    }
}

impl ApplicationHandler for App {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, cause: StartCause) {
        if let StartCause::ResumeTimeReached { .. } = cause {
            self.scheduler.fire();
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("Driftlines")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(Renderer::new(Arc::clone(&window), &self.input)) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                log::error!("failed to initialize GPU: {}", e);
                event_loop.exit();
                return;
            }
        }
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.layer.finalize();
                }
                self.scheduler.cancel();
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(physical_size.width, physical_size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::KeyC) => {
                        if let Some(renderer) = &mut self.renderer {
                            renderer.layer.clear();
                        }
                    }
                    PhysicalKey::Code(KeyCode::Space) if !event.repeat => self.toggle_animation(),
                    _ => {}
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.dragging = state == ElementState::Pressed;
                    if !self.dragging {
                        self.last_cursor = None;
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.dragging {
                    if let (Some((last_x, last_y)), Some(renderer)) =
                        (self.last_cursor, &self.renderer)
                    {
                        let dx = (position.x - last_x) as f32;
                        let dy = (position.y - last_y) as f32;
                        self.view.pan_pixels(dx, dy, renderer.size());
                    }
                    self.last_cursor = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.1,
                };
                self.view.zoom = (self.view.zoom + scroll * 0.25).clamp(-1.0, 6.0);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(delay) = self.scheduler.schedule(self.elapsed()) {
            event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + delay));
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let props = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("loading layer options from {}", path);
            LayerProps::load(&path)?
        }
        None => demo_props(),
    };

    let field = vortex_field()?;
    log::info!("generated {}x{} vortex field", field.width(), field.height());

    let event_loop = EventLoop::new()?;
    let mut app = App::new(props, field);
    event_loop.run_app(&mut app)?;
    Ok(())
}
