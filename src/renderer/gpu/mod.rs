// renderer/gpu
//
// wgpu implementation of the render backend.

mod backend;
mod context;
mod mesh;
mod pipelines;

pub use backend::WgpuBackend;
pub use mesh::GpuMesh;
