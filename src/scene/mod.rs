// scene/mod.rs

pub mod camera;
pub mod drawable;
pub mod transform;

pub use camera::Camera;
pub use drawable::{Drawable, DrawableCollection, SceneLayers};
pub use transform::Transform;
