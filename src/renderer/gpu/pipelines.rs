use std::collections::HashMap;
use std::mem;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};

use super::context::RenderContext;
use crate::error::{PeelError, PeelResult};
use crate::renderer::targets::{ColorTarget, DepthTexture};
use crate::renderer::peel_material::{build_fragment_source, BlendMode, CullSide, ProgramKey};
use crate::renderer::{CameraUniform, Material, PipelineBuilder, Vertex};

/// Per-draw data in the `objects` storage buffer.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub(crate) struct ObjectData {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    /// x: opacity
    pub params: [f32; 4],
}

impl ObjectData {
    pub(crate) fn new(model: glam::Mat4, material: &Material) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: material.base_color,
            params: [material.peel.opacity, 0.0, 0.0, 0.0],
        }
    }
}

/// `PeelUniform` in the generated preamble.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub(crate) struct PeelUniform {
    pub resolution: [f32; 2],
    pub epsilon: f32,
    pub _pad: f32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub shading: String,
    pub program: ProgramKey,
    pub blend: BlendMode,
    pub depth_write: bool,
    pub cull: CullSide,
}

impl PipelineKey {
    pub(crate) fn for_material(material: &Material) -> Self {
        Self {
            shading: material.shading.label().to_string(),
            program: material.peel.program_key(),
            blend: material.peel.blend_mode,
            depth_write: material.peel.depth_write,
            cull: material.peel.cull_side,
        }
    }
}

fn depth_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Lazily compiled material programs plus the bind-group layouts they share.
pub(crate) struct MaterialPipelines {
    pub camera_layout: wgpu::BindGroupLayout,
    pub objects_layout: wgpu::BindGroupLayout,
    /// Peel group for the nearest layer: uniform + opaque depth.
    pub peel_first_layout: wgpu::BindGroupLayout,
    /// Peel group for later layers: uniform + opaque depth + near depth.
    pub peel_later_layout: wgpu::BindGroupLayout,
    forward_pipeline_layout: wgpu::PipelineLayout,
    peel_first_pipeline_layout: wgpu::PipelineLayout,
    peel_later_pipeline_layout: wgpu::PipelineLayout,
    cache: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl MaterialPipelines {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("CameraBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<CameraUniform>() as u64),
                },
                count: None,
            }],
        });

        let objects_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ObjectsBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let peel_uniform_entry = wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(mem::size_of::<PeelUniform>() as u64),
            },
            count: None,
        };

        let peel_first_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("PeelFirstBindLayout"),
            entries: &[peel_uniform_entry, depth_entry(1)],
        });
        let peel_later_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("PeelLaterBindLayout"),
            entries: &[peel_uniform_entry, depth_entry(1), depth_entry(2)],
        });

        let pipeline_layout = |label: &str, groups: &[&wgpu::BindGroupLayout]| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: groups,
                push_constant_ranges: &[],
            })
        };

        let forward_pipeline_layout =
            pipeline_layout("ForwardPipelineLayout", &[&camera_layout, &objects_layout]);
        let peel_first_pipeline_layout = pipeline_layout(
            "PeelFirstPipelineLayout",
            &[&camera_layout, &objects_layout, &peel_first_layout],
        );
        let peel_later_pipeline_layout = pipeline_layout(
            "PeelLaterPipelineLayout",
            &[&camera_layout, &objects_layout, &peel_later_layout],
        );

        Self {
            camera_layout,
            objects_layout,
            peel_first_layout,
            peel_later_layout,
            forward_pipeline_layout,
            peel_first_pipeline_layout,
            peel_later_pipeline_layout,
            cache: HashMap::new(),
        }
    }

    /// Returns the program for `material`, compiling it if this combination
    /// has not been seen before. Clears the material's recompile flag.
    pub(crate) fn prepare(
        &mut self,
        ctx: &RenderContext,
        material: &mut Material,
    ) -> PeelResult<wgpu::RenderPipeline> {
        let key = PipelineKey::for_material(material);
        if let Some(pipeline) = self.cache.get(&key) {
            material.peel.mark_compiled();
            return Ok(pipeline.clone());
        }

        let label = format!(
            "{}:peel={}:first={}",
            key.shading, key.program.peeling, key.program.first_layer
        );
        log::debug!("Compiling material program {label}");

        let source = build_fragment_source(&material.shading, key.program);
        let layout = match (key.program.peeling, key.program.first_layer) {
            (false, _) => &self.forward_pipeline_layout,
            (true, true) => &self.peel_first_pipeline_layout,
            (true, false) => &self.peel_later_pipeline_layout,
        };

        let (pipeline, error) = ctx.scoped(|device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            let mut builder = PipelineBuilder::new(device, layout, &shader)
                .with_label(&label)
                .with_vertex_buffer(Vertex::layout())
                .with_color_target(ColorTarget::FORMAT, Some(key.blend.to_wgpu()))
                .with_depth_stencil(
                    DepthTexture::FORMAT,
                    key.depth_write,
                    wgpu::CompareFunction::Less,
                );
            builder = match key.cull.cull_mode() {
                Some(face) => builder.with_cull_mode(face),
                None => builder.with_no_culling(),
            };
            builder.build()
        });

        if let Some(err) = error {
            log::error!("Material program {label} failed: {err}");
            return Err(PeelError::ShaderCompilation {
                label,
                message: err.to_string(),
            });
        }

        self.cache.insert(key, pipeline.clone());
        material.peel.mark_compiled();
        Ok(pipeline)
    }
}
