// app.rs
use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::*,
    event_loop::ActiveEventLoop,
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::error::PeelError;
use crate::renderer::gpu::{GpuMesh, WgpuBackend};
use crate::renderer::{DepthPeelCoordinator, TargetSize};
use crate::scene::{Camera, SceneLayers};
use crate::settings::RenderSettings;

/// Builds the scene once the GPU is available.
pub type SceneBuilder = Box<dyn Fn(&WgpuBackend) -> SceneLayers<GpuMesh>>;

const ORBIT_SPEED: f32 = 0.25;

struct Running {
    window: Arc<Window>,
    backend: WgpuBackend,
    coordinator: DepthPeelCoordinator<WgpuBackend>,
    scene: SceneLayers<GpuMesh>,
    camera: Camera,
    last_frame: Instant,
}

pub struct App {
    settings: RenderSettings,
    build_scene: SceneBuilder,
    running: Option<Running>,
}

impl App {
    pub fn new(settings: RenderSettings, build_scene: SceneBuilder) -> Self {
        Self {
            settings,
            build_scene,
            running: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running, Box<dyn std::error::Error>> {
        let attributes = Window::default_attributes()
            .with_title("depth peeling")
            .with_inner_size(PhysicalSize::new(
                self.settings.resolution.width,
                self.settings.resolution.height,
            ));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let backend = pollster::block_on(WgpuBackend::new(window.clone(), &self.settings))?;
        let size = window.inner_size();
        let coordinator = DepthPeelCoordinator::new(
            self.settings.peel.clone(),
            TargetSize::new(size.width, size.height),
        )?;
        let scene = (self.build_scene)(&backend);

        Ok(Running {
            window,
            backend,
            coordinator,
            scene,
            camera: Camera::default(),
            last_frame: Instant::now(),
        })
    }
}

impl Running {
    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.camera.orbit_y(dt * ORBIT_SPEED);

        match self
            .coordinator
            .render_frame(&mut self.backend, &mut self.scene, &self.camera)
        {
            Ok(report) => log::trace!("Frame: {:?}", report.phases),
            Err(PeelError::Surface(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                log::warn!("Surface lost, reconfiguring");
                self.backend.reconfigure_surface();
            }
            Err(PeelError::Surface(wgpu::SurfaceError::Timeout)) => {
                log::debug!("Surface timeout, skipping frame");
            }
            Err(err) => {
                log::error!("Render error: {err}");
                event_loop.exit();
            }
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.backend.resize_surface(size);
        let scale = self.window.scale_factor();
        let logical = size.to_logical::<f64>(scale);
        self.coordinator
            .on_viewport_resize(logical.width, logical.height, scale);
    }

    fn handle_key(&mut self, key: &Key, event_loop: &ActiveEventLoop) {
        match key {
            Key::Named(NamedKey::Escape) => event_loop.exit(),
            Key::Character(c) => match c.as_str() {
                "p" | "P" => {
                    let enabled = !self.coordinator.settings().peeling_enabled;
                    self.coordinator.set_peeling_enabled(enabled);
                }
                "+" | "=" => {
                    let count = self.coordinator.settings().layer_count + 1;
                    match self.coordinator.set_layer_count(count) {
                        Ok(()) => log::info!("Peel layers: {count}"),
                        Err(err) => log::warn!("{err}"),
                    }
                }
                "-" => {
                    let count = self.coordinator.settings().layer_count.saturating_sub(1);
                    match self.coordinator.set_layer_count(count) {
                        Ok(()) => log::info!("Peel layers: {count}"),
                        Err(err) => log::warn!("{err}"),
                    }
                }
                "d" | "D" => {
                    let double_sided = !self.coordinator.settings().double_sided;
                    self.coordinator.set_double_sided(double_sided);
                    log::info!("Double sided: {double_sided}");
                }
                _ => {}
            },
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(err) => {
                log::error!("Failed to start renderer: {err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if running.window.id() != id {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                running.coordinator.release(&mut running.backend);
                event_loop.exit();
            }
            WindowEvent::Resized(size) => running.resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = running.window.inner_size();
                running.resize(size);
            }
            WindowEvent::RedrawRequested => {
                running.redraw(event_loop);
                running.window.request_redraw();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => running.handle_key(&logical_key, event_loop),
            _ => {}
        }
    }
}
