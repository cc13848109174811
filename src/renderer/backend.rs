// renderer/backend.rs
//
// The seam between the peeling core and whatever rasterises for it. The wgpu
// implementation lives in `renderer::gpu`; tests drive the same core through a
// CPU implementation.

use crate::error::PeelResult;
use crate::renderer::compositor::CompositeBlend;
use crate::renderer::peel_material::DepthSource;
use crate::scene::{Camera, SceneLayers};

/// Physical size of an offscreen surface in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Logical size scaled by the device pixel ratio.
    pub fn from_logical(width: f64, height: f64, pixel_ratio: f64) -> Self {
        Self {
            width: (width * pixel_ratio).round().max(0.0) as u32,
            height: (height * pixel_ratio).round().max(0.0) as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Creates and destroys the textures the target pool hands out.
///
/// `destroy_*` must release the memory immediately rather than waiting for the
/// handle to be dropped.
pub trait TargetAllocator {
    type ColorTarget;
    type DepthTexture;

    fn create_color_target(&mut self, size: TargetSize, label: &str)
        -> PeelResult<Self::ColorTarget>;
    fn create_depth_texture(
        &mut self,
        size: TargetSize,
        label: &str,
    ) -> PeelResult<Self::DepthTexture>;
    fn destroy_color_target(&mut self, target: Self::ColorTarget);
    fn destroy_depth_texture(&mut self, texture: Self::DepthTexture);
}

/// Depth textures a material may sample during a scene pass.
pub struct DepthBindings<'a, D> {
    pub opaque: &'a D,
    pub ping_pong: &'a [D; 2],
}

impl<'a, D> DepthBindings<'a, D> {
    pub fn resolve(&self, source: DepthSource) -> &'a D {
        match source {
            DepthSource::Opaque => self.opaque,
            DepthSource::PingPong(slot) => &self.ping_pong[slot % 2],
        }
    }
}

/// One scene render into an offscreen target.
pub struct ScenePass<'a, C, D> {
    pub label: &'a str,
    pub color: &'a C,
    /// Depth attachment written by this pass.
    pub depth: &'a D,
    pub clear_color: wgpu::Color,
    pub sources: DepthBindings<'a, D>,
    pub resolution: TargetSize,
}

/// How the visible output is prepared before a full-screen draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputLoad {
    Clear(wgpu::Color),
    Load,
}

pub trait RenderBackend: TargetAllocator {
    type Mesh;

    fn begin_frame(&mut self) -> PeelResult<()>;

    /// Renders the visible collections of `scene` through `camera`.
    fn render_into(
        &mut self,
        pass: &ScenePass<'_, Self::ColorTarget, Self::DepthTexture>,
        scene: &mut SceneLayers<Self::Mesh>,
        camera: &Camera,
    ) -> PeelResult<()>;

    /// Draws one full-screen quad sampling `source` into the visible output.
    fn draw_fullscreen(
        &mut self,
        source: &Self::ColorTarget,
        blend: CompositeBlend,
        load: OutputLoad,
    ) -> PeelResult<()>;

    fn finish_frame(&mut self) -> PeelResult<()>;

    /// Drops whatever `begin_frame` acquired after a failed pass.
    fn abandon_frame(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_size_is_scaled_by_pixel_ratio() {
        let size = TargetSize::from_logical(800.0, 600.0, 1.5);
        assert_eq!(size, TargetSize::new(1200, 900));
        assert!(!size.is_empty());
        assert!(TargetSize::from_logical(0.0, 600.0, 2.0).is_empty());
    }

    #[test]
    fn depth_bindings_resolve_sources() {
        let opaque = 7u32;
        let pair = [1u32, 2u32];
        let bindings = DepthBindings {
            opaque: &opaque,
            ping_pong: &pair,
        };
        assert_eq!(*bindings.resolve(DepthSource::Opaque), 7);
        assert_eq!(*bindings.resolve(DepthSource::PingPong(0)), 1);
        assert_eq!(*bindings.resolve(DepthSource::PingPong(1)), 2);
    }
}
