use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::context::RenderContext;
use super::pipelines::{MaterialPipelines, ObjectData, PeelUniform};
use super::GpuMesh;
use crate::error::{PeelError, PeelResult};
use crate::renderer::backend::{OutputLoad, RenderBackend, ScenePass, TargetAllocator, TargetSize};
use crate::renderer::compositor::{CompositeBlend, Compositor};
use crate::renderer::targets::{ColorTarget, DepthTexture};
use crate::renderer::peel_material::{DepthSource, PEEL_EPSILON};
use crate::renderer::CameraUniform;
use crate::scene::{Camera, SceneLayers};
use crate::settings::RenderSettings;

const INITIAL_OBJECTS_CAPACITY: u32 = 256;

struct FrameInFlight {
    surface: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

struct DrawCall {
    pipeline: wgpu::RenderPipeline,
    vbuf: wgpu::Buffer,
    ibuf: wgpu::Buffer,
    index_count: u32,
    instance: u32,
    peel_group: Option<usize>,
}

/// wgpu implementation of [`RenderBackend`] presenting to a window surface.
///
/// Each scene pass and each full-screen draw is submitted on its own so the
/// camera, object and peel uniforms written for it are visible to exactly that
/// pass.
pub struct WgpuBackend {
    ctx: RenderContext,
    pipelines: MaterialPipelines,
    compositor: Compositor,

    camera_buf: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,

    peel_buf: wgpu::Buffer,

    objects_buf: wgpu::Buffer,
    objects_capacity: u32,
    objects_bind_group: wgpu::BindGroup,
    objects_scratch: Vec<ObjectData>,

    frame: Option<FrameInFlight>,
}

impl WgpuBackend {
    pub async fn new(window: Arc<Window>, settings: &RenderSettings) -> PeelResult<Self> {
        let ctx = RenderContext::new(window, settings).await?;
        let device = &ctx.device;

        let pipelines = MaterialPipelines::new(device);
        let compositor = Compositor::new(device, ctx.config.format);

        let camera_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("CameraBuffer"),
            contents: bytemuck::bytes_of(&CameraUniform::new()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("CameraBindGroup"),
            layout: &pipelines.camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buf.as_entire_binding(),
            }],
        });

        let peel_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("PeelUniformBuffer"),
            contents: bytemuck::bytes_of(&PeelUniform {
                resolution: [1.0, 1.0],
                epsilon: PEEL_EPSILON,
                _pad: 0.0,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let objects_buf = Self::create_objects_buffer(device, INITIAL_OBJECTS_CAPACITY);
        let objects_bind_group =
            Self::create_objects_bind_group(device, &pipelines.objects_layout, &objects_buf);

        Ok(Self {
            ctx,
            pipelines,
            compositor,
            camera_buf,
            camera_bind_group,
            peel_buf,
            objects_buf,
            objects_capacity: INITIAL_OBJECTS_CAPACITY,
            objects_bind_group,
            objects_scratch: Vec::with_capacity(INITIAL_OBJECTS_CAPACITY as usize),
            frame: None,
        })
    }

    pub fn resize_surface(&mut self, size: PhysicalSize<u32>) {
        self.ctx.resize(size);
    }

    /// Reconfigures the surface after it was lost or became outdated.
    pub fn reconfigure_surface(&mut self) {
        self.ctx.reconfigure();
    }

    pub fn upload_mesh(&self, mesh: (Vec<crate::renderer::Vertex>, Vec<u32>)) -> GpuMesh {
        GpuMesh::from_pair(&self.ctx.device, mesh)
    }

    fn create_objects_buffer(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ObjectsBuffer"),
            size: (capacity as usize * std::mem::size_of::<ObjectData>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_objects_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ObjectsBindGroup"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    fn upload_objects(&mut self) {
        let required = self.objects_scratch.len() as u32;
        if required > self.objects_capacity {
            let new_capacity = required.max(self.objects_capacity * 2);
            log::info!(
                "Growing objects buffer: {} -> {}",
                self.objects_capacity,
                new_capacity
            );
            self.objects_buf = Self::create_objects_buffer(&self.ctx.device, new_capacity);
            self.objects_bind_group = Self::create_objects_bind_group(
                &self.ctx.device,
                &self.pipelines.objects_layout,
                &self.objects_buf,
            );
            self.objects_capacity = new_capacity;
        }

        if !self.objects_scratch.is_empty() {
            self.ctx.queue.write_buffer(
                &self.objects_buf,
                0,
                bytemuck::cast_slice(&self.objects_scratch),
            );
        }
    }

    fn peel_bind_group(
        &self,
        pass: &ScenePass<'_, ColorTarget, DepthTexture>,
        opaque: DepthSource,
        near: Option<DepthSource>,
    ) -> wgpu::BindGroup {
        let opaque_view = &pass.sources.resolve(opaque).view;
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.peel_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(opaque_view),
            },
        ];
        let layout = match near {
            Some(source) => {
                entries.push(wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&pass.sources.resolve(source).view),
                });
                &self.pipelines.peel_later_layout
            }
            None => &self.pipelines.peel_first_layout,
        };

        self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("PeelBindGroup"),
            layout,
            entries: &entries,
        })
    }

    fn frame_view(&self) -> PeelResult<&wgpu::TextureView> {
        self.frame
            .as_ref()
            .map(|frame| &frame.view)
            .ok_or(PeelError::FrameNotStarted)
    }
}

impl TargetAllocator for WgpuBackend {
    type ColorTarget = ColorTarget;
    type DepthTexture = DepthTexture;

    fn create_color_target(&mut self, size: TargetSize, label: &str) -> PeelResult<ColorTarget> {
        let (target, error) = self
            .ctx
            .scoped(|device| ColorTarget::new(device, size, label));
        match error {
            Some(err) => {
                target.destroy();
                Err(PeelError::allocation(label, err))
            }
            None => Ok(target),
        }
    }

    fn create_depth_texture(&mut self, size: TargetSize, label: &str) -> PeelResult<DepthTexture> {
        let (texture, error) = self
            .ctx
            .scoped(|device| DepthTexture::new(device, size, label));
        match error {
            Some(err) => {
                texture.destroy();
                Err(PeelError::allocation(label, err))
            }
            None => Ok(texture),
        }
    }

    fn destroy_color_target(&mut self, target: ColorTarget) {
        target.destroy();
    }

    fn destroy_depth_texture(&mut self, texture: DepthTexture) {
        texture.destroy();
    }
}

impl RenderBackend for WgpuBackend {
    type Mesh = GpuMesh;

    fn begin_frame(&mut self) -> PeelResult<()> {
        let surface = self.ctx.surface.get_current_texture()?;
        let view = surface
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(FrameInFlight { surface, view });
        Ok(())
    }

    fn render_into(
        &mut self,
        pass: &ScenePass<'_, ColorTarget, DepthTexture>,
        scene: &mut SceneLayers<GpuMesh>,
        camera: &Camera,
    ) -> PeelResult<()> {
        self.frame_view()?;

        let camera_uniform = CameraUniform::from_camera(camera, pass.resolution.aspect_ratio());
        self.ctx
            .queue
            .write_buffer(&self.camera_buf, 0, bytemuck::bytes_of(&camera_uniform));
        self.ctx.queue.write_buffer(
            &self.peel_buf,
            0,
            bytemuck::bytes_of(&PeelUniform {
                resolution: [pass.resolution.width as f32, pass.resolution.height as f32],
                epsilon: PEEL_EPSILON,
                _pad: 0.0,
            }),
        );

        self.objects_scratch.clear();
        let mut draws = Vec::new();
        let mut peel_sources: Vec<(DepthSource, Option<DepthSource>)> = Vec::new();

        for drawable in scene.visible_mut() {
            let pipeline = self.pipelines.prepare(&self.ctx, &mut drawable.material)?;
            let peel = &drawable.material.peel;

            let peel_group = if peel.peeling_enabled() {
                let sources = (
                    peel.opaque_depth().unwrap_or(DepthSource::Opaque),
                    peel.near_depth(),
                );
                Some(match peel_sources.iter().position(|s| *s == sources) {
                    Some(index) => index,
                    None => {
                        peel_sources.push(sources);
                        peel_sources.len() - 1
                    }
                })
            } else {
                None
            };

            draws.push(DrawCall {
                pipeline,
                vbuf: drawable.mesh.vbuf.clone(),
                ibuf: drawable.mesh.ibuf.clone(),
                index_count: drawable.mesh.index_count,
                instance: self.objects_scratch.len() as u32,
                peel_group,
            });
            self.objects_scratch
                .push(ObjectData::new(drawable.transform.matrix(), &drawable.material));
        }

        self.upload_objects();

        let peel_groups: Vec<wgpu::BindGroup> = peel_sources
            .iter()
            .map(|(opaque, near)| self.peel_bind_group(pass, *opaque, *near))
            .collect();

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(pass.label),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &pass.color.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(pass.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &pass.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rpass.set_bind_group(0, &self.camera_bind_group, &[]);
            rpass.set_bind_group(1, &self.objects_bind_group, &[]);

            for draw in &draws {
                rpass.set_pipeline(&draw.pipeline);
                if let Some(group) = draw.peel_group {
                    rpass.set_bind_group(2, &peel_groups[group], &[]);
                }
                rpass.set_vertex_buffer(0, draw.vbuf.slice(..));
                rpass.set_index_buffer(draw.ibuf.slice(..), wgpu::IndexFormat::Uint32);
                rpass.draw_indexed(0..draw.index_count, 0, draw.instance..draw.instance + 1);
            }
        }

        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn draw_fullscreen(
        &mut self,
        source: &ColorTarget,
        blend: CompositeBlend,
        load: OutputLoad,
    ) -> PeelResult<()> {
        let output = self.frame_view()?;
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("CompositeEncoder"),
            });

        let load = match load {
            OutputLoad::Clear(color) => wgpu::LoadOp::Clear(color),
            OutputLoad::Load => wgpu::LoadOp::Load,
        };
        self.compositor.draw(
            &self.ctx.device,
            &mut encoder,
            &source.view,
            output,
            blend,
            load,
        );

        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn finish_frame(&mut self) -> PeelResult<()> {
        let frame = self.frame.take().ok_or(PeelError::FrameNotStarted)?;
        frame.surface.present();
        Ok(())
    }

    fn abandon_frame(&mut self) {
        // Dropping the surface texture without presenting releases it.
        self.frame = None;
    }
}
