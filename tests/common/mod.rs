// CPU rasteriser for driving the depth-peeling core without a GPU.
//
// Every mesh is a flat surface at a constant depth covering a range of
// columns, so each pass can be checked pixel by pixel.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ops::Range;

use depth_peel::error::{PeelError, PeelResult};
use depth_peel::renderer::peel_material::{fragment_visibility, DepthSampler, FragmentDecision};
use depth_peel::renderer::{
    CompositeBlend, DepthPeelCoordinator, Material, OutputLoad, RenderBackend, ScenePass,
    TargetAllocator, TargetSize,
};
use depth_peel::scene::{Camera, Drawable, SceneLayers};
use depth_peel::settings::PeelSettings;

pub const EPS: f32 = 1e-5;

#[derive(Debug, Clone)]
pub struct Surface {
    pub depth: f32,
    pub front_facing: bool,
    pub columns: Option<Range<u32>>,
}

impl Surface {
    pub fn at(depth: f32) -> Self {
        Self {
            depth,
            front_facing: true,
            columns: None,
        }
    }

    pub fn back_facing(mut self) -> Self {
        self.front_facing = false;
        self
    }

    pub fn columns(mut self, columns: Range<u32>) -> Self {
        self.columns = Some(columns);
        self
    }
}

pub fn surface(depth: f32, color: [f32; 4]) -> Drawable<Surface> {
    Drawable::new(Surface::at(depth), Material::unlit(color))
}

#[derive(Debug)]
pub struct Handle {
    pub id: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassRecord {
    pub label: String,
    pub color: String,
    pub depth: String,
    pub near_sources: Vec<String>,
    pub near_reads: usize,
    pub compiles: usize,
    pub drawn: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Created(String),
    Destroyed(String),
    BeginFrame,
    Scene(PassRecord),
    Composite {
        source: String,
        blend: CompositeBlend,
        load: OutputLoad,
    },
    FinishFrame,
    AbandonFrame,
}

#[derive(Default)]
pub struct SoftwareBackend {
    next_id: usize,
    sizes: HashMap<usize, TargetSize>,
    colors: HashMap<usize, Vec<[f32; 4]>>,
    depths: HashMap<usize, Vec<f32>>,
    output: Vec<[f32; 4]>,
    in_frame: bool,
    pub events: Vec<Event>,
    pub fail_allocation_on: Option<String>,
    pub fail_pass_on: Option<String>,
}

struct PixelDepths<'a> {
    opaque: Option<&'a [f32]>,
    near: Option<&'a [f32]>,
    pixel: usize,
    near_reads: &'a mut usize,
}

impl DepthSampler for PixelDepths<'_> {
    fn opaque_depth(&mut self) -> f32 {
        self.opaque.expect("opaque depth is not bound")[self.pixel]
    }

    fn near_depth(&mut self) -> f32 {
        *self.near_reads += 1;
        self.near.expect("near depth is not bound")[self.pixel]
    }
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> &[[f32; 4]] {
        &self.output
    }

    pub fn color(&self, handle: &Handle) -> &[[f32; 4]] {
        &self.colors[&handle.id]
    }

    pub fn depth(&self, handle: &Handle) -> &[f32] {
        &self.depths[&handle.id]
    }

    pub fn live_textures(&self) -> usize {
        self.sizes.len()
    }

    pub fn live_sizes(&self) -> Vec<TargetSize> {
        self.sizes.values().copied().collect()
    }

    pub fn scene_passes(&self) -> Vec<&PassRecord> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Scene(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    fn allocate(&mut self, size: TargetSize, label: &str) -> PeelResult<Handle> {
        if self.fail_allocation_on.as_deref() == Some(label) {
            return Err(PeelError::allocation(label, "out of memory"));
        }
        self.next_id += 1;
        self.sizes.insert(self.next_id, size);
        self.events.push(Event::Created(label.to_string()));
        Ok(Handle {
            id: self.next_id,
            label: label.to_string(),
        })
    }

    fn release(&mut self, handle: Handle) {
        self.sizes.remove(&handle.id);
        self.colors.remove(&handle.id);
        self.depths.remove(&handle.id);
        self.events.push(Event::Destroyed(handle.label));
    }
}

impl TargetAllocator for SoftwareBackend {
    type ColorTarget = Handle;
    type DepthTexture = Handle;

    fn create_color_target(&mut self, size: TargetSize, label: &str) -> PeelResult<Handle> {
        let handle = self.allocate(size, label)?;
        let len = (size.width * size.height) as usize;
        self.colors.insert(handle.id, vec![[0.0; 4]; len]);
        Ok(handle)
    }

    fn create_depth_texture(&mut self, size: TargetSize, label: &str) -> PeelResult<Handle> {
        let handle = self.allocate(size, label)?;
        let len = (size.width * size.height) as usize;
        self.depths.insert(handle.id, vec![1.0; len]);
        Ok(handle)
    }

    fn destroy_color_target(&mut self, target: Handle) {
        self.release(target);
    }

    fn destroy_depth_texture(&mut self, texture: Handle) {
        self.release(texture);
    }
}

impl RenderBackend for SoftwareBackend {
    type Mesh = Surface;

    fn begin_frame(&mut self) -> PeelResult<()> {
        self.in_frame = true;
        self.events.push(Event::BeginFrame);
        Ok(())
    }

    fn render_into(
        &mut self,
        pass: &ScenePass<'_, Handle, Handle>,
        scene: &mut SceneLayers<Surface>,
        _camera: &Camera,
    ) -> PeelResult<()> {
        if !self.in_frame {
            return Err(PeelError::FrameNotStarted);
        }
        if self.fail_pass_on.as_deref() == Some(pass.label) {
            return Err(PeelError::ShaderCompilation {
                label: pass.label.to_string(),
                message: "injected failure".into(),
            });
        }

        let size = pass.resolution;
        let len = (size.width * size.height) as usize;
        let clear = pass.clear_color;
        let mut color = vec![[clear.r as f32, clear.g as f32, clear.b as f32, clear.a as f32]; len];
        let mut depth = vec![1.0f32; len];

        let mut record = PassRecord {
            label: pass.label.to_string(),
            color: pass.color.label.clone(),
            depth: pass.depth.label.clone(),
            near_sources: Vec::new(),
            near_reads: 0,
            compiles: 0,
            drawn: 0,
        };

        for drawable in scene.visible_mut() {
            if drawable.material.peel.needs_recompile() {
                record.compiles += 1;
            }
            drawable.material.peel.mark_compiled();

            let peel = &drawable.material.peel;
            if !peel.cull_side.renders(drawable.mesh.front_facing) {
                continue;
            }

            let opaque = peel.opaque_depth().map(|source| {
                let handle = pass.sources.resolve(source);
                assert_ne!(handle.id, pass.depth.id, "sampling the depth attachment");
                self.depths[&handle.id].clone()
            });
            let near = peel.near_depth().map(|source| {
                let handle = pass.sources.resolve(source);
                assert_ne!(handle.id, pass.depth.id, "sampling the depth attachment");
                if !record.near_sources.contains(&handle.label) {
                    record.near_sources.push(handle.label.clone());
                }
                self.depths[&handle.id].clone()
            });

            let key = peel.program_key();
            let src = drawable.material.effective_color();
            let z = drawable.mesh.depth;
            let columns = drawable.mesh.columns.clone().unwrap_or(0..size.width);
            record.drawn += 1;

            for y in 0..size.height {
                for x in columns.clone() {
                    let pixel = (y * size.width + x) as usize;
                    let mut sampler = PixelDepths {
                        opaque: opaque.as_deref(),
                        near: near.as_deref(),
                        pixel,
                        near_reads: &mut record.near_reads,
                    };
                    if fragment_visibility(key, z, &mut sampler) != FragmentDecision::Keep {
                        continue;
                    }
                    if z >= depth[pixel] {
                        continue;
                    }
                    if peel.depth_write {
                        depth[pixel] = z;
                    }
                    color[pixel] = peel.blend_mode.apply(src, color[pixel]);
                }
            }
        }

        self.colors.insert(pass.color.id, color);
        self.depths.insert(pass.depth.id, depth);
        self.events.push(Event::Scene(record));
        Ok(())
    }

    fn draw_fullscreen(
        &mut self,
        source: &Handle,
        blend: CompositeBlend,
        load: OutputLoad,
    ) -> PeelResult<()> {
        if !self.in_frame {
            return Err(PeelError::FrameNotStarted);
        }
        let pixels = self.colors[&source.id].clone();
        if let OutputLoad::Clear(c) = load {
            self.output = vec![[c.r as f32, c.g as f32, c.b as f32, c.a as f32]; pixels.len()];
        }
        assert_eq!(self.output.len(), pixels.len(), "output was never cleared");
        for (dst, src) in self.output.iter_mut().zip(pixels) {
            *dst = blend.apply(src, *dst);
        }
        self.events.push(Event::Composite {
            source: source.label.clone(),
            blend,
            load,
        });
        Ok(())
    }

    fn finish_frame(&mut self) -> PeelResult<()> {
        if !self.in_frame {
            return Err(PeelError::FrameNotStarted);
        }
        self.in_frame = false;
        self.events.push(Event::FinishFrame);
        Ok(())
    }

    fn abandon_frame(&mut self) {
        self.in_frame = false;
        self.events.push(Event::AbandonFrame);
    }
}

pub fn settings(peeling: bool, layers: usize, opacity: f32) -> PeelSettings {
    PeelSettings {
        peeling_enabled: peeling,
        layer_count: layers,
        opacity,
        background_color: [0.1, 0.2, 0.3],
        ..PeelSettings::default()
    }
}

pub fn coordinator(
    settings: PeelSettings,
    width: u32,
    height: u32,
) -> DepthPeelCoordinator<SoftwareBackend> {
    DepthPeelCoordinator::new(settings, TargetSize::new(width, height))
        .expect("valid settings")
}

pub fn background(settings: &PeelSettings) -> [f32; 4] {
    let [r, g, b] = settings.background_color;
    [r, g, b, 1.0]
}

pub fn over(src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    let a = src[3];
    [
        src[0] * a + dst[0] * (1.0 - a),
        src[1] * a + dst[1] * (1.0 - a),
        src[2] * a + dst[2] * (1.0 - a),
        a + dst[3] * (1.0 - a),
    ]
}

pub fn assert_pixel(actual: [f32; 4], expected: [f32; 4]) {
    for i in 0..4 {
        assert!(
            (actual[i] - expected[i]).abs() < EPS,
            "pixel {actual:?} != {expected:?}"
        );
    }
}
