// renderer/coordinator.rs
//
// Per-frame driver of the depth-peeling sequence:
//   OpaquePass -> PeelPass(0) .. PeelPass(N-1) -> CompositePass
// or, with peeling disabled, a single forward pass blitted to the output.

use log::{debug, error, info, trace};

use crate::error::{PeelError, PeelResult};
use crate::renderer::backend::{OutputLoad, RenderBackend, ScenePass, TargetSize};
use crate::renderer::compositor::CompositeBlend;
use crate::renderer::peel_material::{BlendMode, CullSide, DepthSource, PeelState};
use crate::renderer::target_pool::OffscreenTargetPool;
use crate::scene::{Camera, SceneLayers};
use crate::settings::PeelSettings;

/// A pass issued by [`DepthPeelCoordinator::render_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    OpaquePass,
    PeelPass(usize),
    /// Opaque colour blitted to the output with [`CompositeBlend::Replace`].
    CompositeOpaque,
    /// Peeled layer blended onto the output.
    CompositeLayer(usize),
    /// Opaque and transparent geometry in one pass (peeling disabled).
    ForwardPass,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub phases: Vec<FramePhase>,
    pub size: Option<TargetSize>,
}

impl FrameReport {
    pub fn skipped(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn peel_passes(&self) -> usize {
        self.phases
            .iter()
            .filter(|phase| matches!(phase, FramePhase::PeelPass(_)))
            .count()
    }
}

/// Ping-pong slot written by peel pass `layer`.
pub fn write_slot(layer: usize) -> usize {
    (layer + 1) % 2
}

/// Near depth read by peel pass `layer`; the nearest layer reads none.
pub fn near_source(layer: usize) -> Option<DepthSource> {
    if layer == 0 {
        None
    } else {
        Some(DepthSource::PingPong(layer % 2))
    }
}

struct LayerParams {
    near: Option<DepthSource>,
    opacity: f32,
    resolution: (u32, u32),
    cull_side: CullSide,
}

fn configure_peel_layer(state: &mut PeelState, params: &LayerParams) {
    state.set_peeling_enabled(true);
    state.set_opaque_depth(Some(DepthSource::Opaque));
    state.set_near_depth(params.near);
    state.blend_mode = BlendMode::None;
    state.depth_write = true;
    state.opacity = params.opacity;
    state.resolution = params.resolution;
    state.cull_side = params.cull_side;
}

fn configure_forward(state: &mut PeelState, resolution: (u32, u32), cull_side: CullSide) {
    state.set_peeling_enabled(false);
    state.blend_mode = BlendMode::Normal;
    state.depth_write = true;
    state.opacity = 1.0;
    state.resolution = resolution;
    state.cull_side = cull_side;
}

fn pool_not_ready() -> PeelError {
    PeelError::allocation("peel targets", "pool is not fully allocated")
}

/// Owns the target pool and the peeling configuration, and issues every pass
/// of a frame in order through a [`RenderBackend`].
pub struct DepthPeelCoordinator<B: RenderBackend> {
    settings: PeelSettings,
    pool: OffscreenTargetPool<B>,
    pending_size: Option<TargetSize>,
}

impl<B: RenderBackend> DepthPeelCoordinator<B> {
    pub fn new(settings: PeelSettings, viewport: TargetSize) -> PeelResult<Self> {
        PeelSettings::check_layer_count(settings.layer_count)?;
        PeelSettings::check_opacity(settings.opacity)?;
        let pool = OffscreenTargetPool::new(viewport, settings.layer_count)?;
        Ok(Self {
            settings,
            pool,
            pending_size: None,
        })
    }

    pub fn settings(&self) -> &PeelSettings {
        &self.settings
    }

    pub fn pool(&self) -> &OffscreenTargetPool<B> {
        &self.pool
    }

    pub fn viewport(&self) -> TargetSize {
        self.pool.size()
    }

    pub fn set_peeling_enabled(&mut self, enabled: bool) {
        if self.settings.peeling_enabled != enabled {
            info!(
                "Depth peeling {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.settings.peeling_enabled = enabled;
    }

    /// Takes effect at the start of the next frame. Zero is rejected.
    pub fn set_layer_count(&mut self, layer_count: usize) -> PeelResult<()> {
        PeelSettings::check_layer_count(layer_count)?;
        self.settings.layer_count = layer_count;
        Ok(())
    }

    pub fn set_opacity(&mut self, opacity: f32) -> PeelResult<()> {
        PeelSettings::check_opacity(opacity)?;
        self.settings.opacity = opacity;
        Ok(())
    }

    pub fn set_double_sided(&mut self, double_sided: bool) {
        self.settings.double_sided = double_sided;
    }

    pub fn set_background_color(&mut self, color: [f32; 3]) {
        self.settings.background_color = color;
    }

    /// Records a new viewport; targets are resized when the next frame starts.
    pub fn on_viewport_resize(&mut self, width: f64, height: f64, pixel_ratio: f64) {
        self.resize_physical(TargetSize::from_logical(width, height, pixel_ratio));
    }

    pub fn resize_physical(&mut self, size: TargetSize) {
        if size.is_empty() {
            debug!("Ignoring empty viewport {}x{}", size.width, size.height);
            return;
        }
        self.pending_size = Some(size);
    }

    /// Destroys every pooled surface, e.g. before the device goes away.
    pub fn release(&mut self, backend: &mut B) {
        self.pool.release_all(backend);
    }

    pub fn render_frame(
        &mut self,
        backend: &mut B,
        scene: &mut SceneLayers<B::Mesh>,
        camera: &Camera,
    ) -> PeelResult<FrameReport> {
        self.apply_pending(backend)?;

        let size = self.pool.size();
        if size.is_empty() {
            trace!("Skipping frame for empty viewport");
            return Ok(FrameReport::default());
        }

        self.pool.ensure_allocated(backend)?;
        backend.begin_frame()?;

        let result = if self.settings.peeling_enabled {
            self.peel_frame(backend, scene, camera)
        } else {
            self.forward_frame(backend, scene, camera)
        };

        scene.show(true, true);

        match result {
            Ok(mut report) => {
                backend.finish_frame()?;
                report.size = Some(size);
                Ok(report)
            }
            Err(err) => {
                error!("Frame aborted: {err}");
                backend.abandon_frame();
                Err(err)
            }
        }
    }

    fn apply_pending(&mut self, backend: &mut B) -> PeelResult<()> {
        if let Some(size) = self.pending_size.take() {
            self.pool.resize(backend, size);
        }
        self.pool.set_layer_count(backend, self.settings.layer_count)
    }

    fn peel_frame(
        &self,
        backend: &mut B,
        scene: &mut SceneLayers<B::Mesh>,
        camera: &Camera,
    ) -> PeelResult<FrameReport> {
        let pool = &self.pool;
        let size = pool.size();
        let layer_count = pool.layer_count();
        let background = self.settings.background();
        let cull_side = CullSide::from_double_sided(self.settings.double_sided);

        let opaque_target = pool.opaque_target().ok_or_else(pool_not_ready)?;
        let opaque_depth = pool.opaque_depth().ok_or_else(pool_not_ready)?;
        let ping_pong = pool.ping_pong().ok_or_else(pool_not_ready)?;

        let mut report = FrameReport::default();

        scene.show(true, false);
        scene
            .opaque
            .for_each_material(|m| m.peel.set_peeling_enabled(false));
        backend.render_into(
            &ScenePass {
                label: "OpaquePass",
                color: opaque_target,
                depth: opaque_depth,
                clear_color: background,
                sources: pool.depth_bindings().ok_or_else(pool_not_ready)?,
                resolution: size,
            },
            scene,
            camera,
        )?;
        report.phases.push(FramePhase::OpaquePass);

        for layer in 0..layer_count {
            scene.show(false, true);

            let params = LayerParams {
                near: near_source(layer),
                opacity: self.settings.opacity,
                resolution: (size.width, size.height),
                cull_side,
            };
            scene
                .transparent
                .for_each_material(|m| configure_peel_layer(&mut m.peel, &params));

            let label = format!("PeelPass{layer}");
            let target = pool.layer(layer).ok_or_else(pool_not_ready)?;
            trace!(
                "{label}: write depth {}, near {:?}",
                write_slot(layer),
                params.near
            );
            backend.render_into(
                &ScenePass {
                    label: &label,
                    color: target,
                    depth: &ping_pong[write_slot(layer)],
                    clear_color: wgpu::Color::TRANSPARENT,
                    sources: pool.depth_bindings().ok_or_else(pool_not_ready)?,
                    resolution: size,
                },
                scene,
                camera,
            )?;
            report.phases.push(FramePhase::PeelPass(layer));
        }

        backend.draw_fullscreen(
            opaque_target,
            CompositeBlend::Replace,
            OutputLoad::Clear(background),
        )?;
        report.phases.push(FramePhase::CompositeOpaque);

        // Farthest first; front-to-back with normal blending would let the
        // nearer layers' translucent pixels hide what lies behind them.
        for layer in (0..layer_count).rev() {
            let target = pool.layer(layer).ok_or_else(pool_not_ready)?;
            backend.draw_fullscreen(target, CompositeBlend::NormalAlpha, OutputLoad::Load)?;
            report.phases.push(FramePhase::CompositeLayer(layer));
        }

        Ok(report)
    }

    fn forward_frame(
        &self,
        backend: &mut B,
        scene: &mut SceneLayers<B::Mesh>,
        camera: &Camera,
    ) -> PeelResult<FrameReport> {
        let pool = &self.pool;
        let size = pool.size();
        let background = self.settings.background();
        let cull_side = CullSide::from_double_sided(self.settings.double_sided);

        let color = pool.opaque_target().ok_or_else(pool_not_ready)?;
        let depth = pool.opaque_depth().ok_or_else(pool_not_ready)?;

        scene.show(true, true);
        scene
            .opaque
            .for_each_material(|m| m.peel.set_peeling_enabled(false));
        scene.transparent.for_each_material(|m| {
            configure_forward(&mut m.peel, (size.width, size.height), cull_side)
        });

        let mut report = FrameReport::default();
        backend.render_into(
            &ScenePass {
                label: "ForwardPass",
                color,
                depth,
                clear_color: background,
                sources: pool.depth_bindings().ok_or_else(pool_not_ready)?,
                resolution: size,
            },
            scene,
            camera,
        )?;
        report.phases.push(FramePhase::ForwardPass);

        backend.draw_fullscreen(color, CompositeBlend::Replace, OutputLoad::Clear(background))?;
        report.phases.push(FramePhase::CompositeOpaque);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_pong_alternates_by_parity() {
        assert_eq!(near_source(0), None);
        assert_eq!(write_slot(0), 1);
        assert_eq!(near_source(1), Some(DepthSource::PingPong(1)));
        assert_eq!(write_slot(1), 0);
        assert_eq!(near_source(2), Some(DepthSource::PingPong(0)));
        assert_eq!(write_slot(2), 1);

        // Each pass reads exactly what the previous one wrote.
        for layer in 1..8 {
            assert_eq!(
                near_source(layer),
                Some(DepthSource::PingPong(write_slot(layer - 1)))
            );
        }
    }

    #[test]
    fn peel_layer_configuration_replaces_and_writes_depth() {
        let mut state = PeelState::new();
        configure_peel_layer(
            &mut state,
            &LayerParams {
                near: Some(DepthSource::PingPong(1)),
                opacity: 0.4,
                resolution: (640, 480),
                cull_side: CullSide::Front,
            },
        );

        assert!(state.peeling_enabled());
        assert_eq!(state.opaque_depth(), Some(DepthSource::Opaque));
        assert_eq!(state.near_depth(), Some(DepthSource::PingPong(1)));
        assert_eq!(state.blend_mode, BlendMode::None);
        assert!(state.depth_write);
        assert_eq!(state.opacity, 0.4);
        assert_eq!(state.resolution, (640, 480));
        assert_eq!(state.cull_side, CullSide::Front);
    }

    #[test]
    fn forward_configuration_drops_peeling_inputs() {
        let mut state = PeelState::new();
        configure_peel_layer(
            &mut state,
            &LayerParams {
                near: Some(DepthSource::PingPong(0)),
                opacity: 0.2,
                resolution: (4, 4),
                cull_side: CullSide::Both,
            },
        );
        configure_forward(&mut state, (4, 4), CullSide::Both);

        assert!(!state.peeling_enabled());
        assert_eq!(state.near_depth(), None);
        assert_eq!(state.opaque_depth(), None);
        assert_eq!(state.blend_mode, BlendMode::Normal);
        assert_eq!(state.opacity, 1.0);
    }
}
