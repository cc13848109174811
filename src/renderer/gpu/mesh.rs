use wgpu::util::DeviceExt;

use crate::renderer::Vertex;

/// Uploaded mesh. Cloning shares the buffers.
#[derive(Clone, Debug)]
pub struct GpuMesh {
    pub vbuf: wgpu::Buffer,
    pub ibuf: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn from_vertices(device: &wgpu::Device, vertices: &[Vertex], indices: &[u32]) -> Self {
        let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh.VertexBuffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let ibuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh.IndexBuffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vbuf,
            ibuf,
            index_count: indices.len() as u32,
        }
    }

    pub fn from_pair(device: &wgpu::Device, (vertices, indices): (Vec<Vertex>, Vec<u32>)) -> Self {
        Self::from_vertices(device, &vertices, &indices)
    }
}
