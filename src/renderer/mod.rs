pub mod backend;
pub mod camera;
pub mod compositor;
pub mod coordinator;
pub mod gpu;
pub mod material;
pub mod peel_material;
pub mod pipeline_builder;
pub mod primitives;
pub mod target_pool;
pub mod targets;
pub mod vertex;

pub use backend::{OutputLoad, RenderBackend, ScenePass, TargetAllocator, TargetSize};
pub use camera::CameraUniform;
pub use compositor::CompositeBlend;
pub use coordinator::{DepthPeelCoordinator, FramePhase, FrameReport};
pub use material::{BaseShading, Material};
pub use peel_material::{BlendMode, CullSide, DepthSource, PeelState, ProgramKey};
pub use pipeline_builder::PipelineBuilder;
pub use primitives::{cube_mesh, cylinder_mesh};
pub use target_pool::{OffscreenTargetPool, PoolStats};
pub use vertex::Vertex;
