// renderer/compositor.rs

use crate::renderer::peel_material::BlendMode;
use crate::renderer::PipelineBuilder;

/// Blend used when a full-screen quad is drawn into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeBlend {
    /// Overwrite the output; used for the opaque blit.
    Replace,
    /// Standard alpha blending; used for the peeled layers.
    NormalAlpha,
}

impl CompositeBlend {
    fn as_blend_mode(self) -> BlendMode {
        match self {
            CompositeBlend::Replace => BlendMode::None,
            CompositeBlend::NormalAlpha => BlendMode::Normal,
        }
    }

    pub fn to_wgpu(self) -> wgpu::BlendState {
        self.as_blend_mode().to_wgpu()
    }

    /// CPU reference of the configured blend.
    pub fn apply(self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        self.as_blend_mode().apply(src, dst)
    }
}

/// Full-screen quad pass. Depth testing and writing are never enabled.
pub struct Compositor {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    replace: wgpu::RenderPipeline,
    normal_alpha: wgpu::RenderPipeline,
}

impl Compositor {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("CompositeLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("CompositeSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("CompositeShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shader/composite.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("CompositePipelineLayout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let build = |blend: CompositeBlend, label: &str| {
            PipelineBuilder::new(device, &pipeline_layout, &shader)
                .with_label(label)
                .with_vertex_entry("vs_fullscreen")
                .with_fragment_entry("fs_composite")
                .with_color_target(output_format, Some(blend.to_wgpu()))
                .with_no_culling()
                .build()
        };

        Self {
            replace: build(CompositeBlend::Replace, "CompositeReplacePipeline"),
            normal_alpha: build(CompositeBlend::NormalAlpha, "CompositeAlphaPipeline"),
            layout,
            sampler,
        }
    }

    fn pipeline(&self, blend: CompositeBlend) -> &wgpu::RenderPipeline {
        match blend {
            CompositeBlend::Replace => &self.replace,
            CompositeBlend::NormalAlpha => &self.normal_alpha,
        }
    }

    pub fn draw(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        output: &wgpu::TextureView,
        blend: CompositeBlend,
        load: wgpu::LoadOp<wgpu::Color>,
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("CompositeBindGroup"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("CompositePass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(self.pipeline(blend));
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: [f32; 4], b: [f32; 4]) {
        for i in 0..4 {
            assert!((a[i] - b[i]).abs() < 1e-6, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn replace_overwrites_destination() {
        let src = [0.1, 0.2, 0.3, 0.0];
        approx(CompositeBlend::Replace.apply(src, [1.0, 1.0, 1.0, 1.0]), src);
        assert_eq!(CompositeBlend::Replace.to_wgpu(), wgpu::BlendState::REPLACE);
    }

    #[test]
    fn normal_alpha_matches_over_operator() {
        let src = [1.0, 0.0, 0.0, 0.25];
        let dst = [0.0, 0.0, 1.0, 1.0];
        approx(
            CompositeBlend::NormalAlpha.apply(src, dst),
            [0.25, 0.0, 0.75, 1.0],
        );
        assert_eq!(
            CompositeBlend::NormalAlpha.to_wgpu(),
            wgpu::BlendState::ALPHA_BLENDING
        );
    }

    #[test]
    fn transparent_black_layer_leaves_output_untouched() {
        let dst = [0.3, 0.6, 0.9, 1.0];
        approx(CompositeBlend::NormalAlpha.apply([0.0; 4], dst), dst);
    }
}
