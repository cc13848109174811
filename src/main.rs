use depth_peel::app::App;
use depth_peel::renderer::gpu::{GpuMesh, WgpuBackend};
use depth_peel::renderer::{cube_mesh, cylinder_mesh, Material};
use depth_peel::scene::{Drawable, SceneLayers, Transform};
use depth_peel::settings::RenderSettings;
use glam::{EulerRot, Quat, Vec3};

/// An opaque pillar standing inside three overlapping holographic cubes.
fn build_scene(backend: &WgpuBackend) -> SceneLayers<GpuMesh> {
    let mut scene = SceneLayers::new();

    let pillar = backend.upload_mesh(cylinder_mesh(32));
    scene.opaque.push(
        Drawable::new(pillar, Material::rgb(0xdd, 0xdd, 0xdd))
            .with_transform(Transform::at(0.5, 0.0, 0.5).scaled(Vec3::new(0.125, 1.0, 0.125))),
    );

    let cube = backend.upload_mesh(cube_mesh());
    let cubes = [
        ([-0.4, 0.0, 0.0], [0.2, 0.8, 1.0, 0.5]),
        ([0.0, 0.2, 0.3], [1.0, 0.4, 0.8, 0.5]),
        ([0.4, -0.1, -0.2], [0.5, 1.0, 0.4, 0.5]),
    ];
    scene
        .transparent
        .extend(cubes.into_iter().enumerate().map(|(i, ([x, y, z], color))| {
            let rotation = Quat::from_euler(EulerRot::YXZ, 0.6 * i as f32, 0.4, 0.0);
            Drawable::new(cube.clone(), Material::holographic(color))
                .with_transform(Transform::at(x, y, z).rotated(rotation))
        }));

    scene
}

fn main() {
    let settings = RenderSettings::load();
    let app = App::new(settings, Box::new(build_scene));
    if let Err(err) = depth_peel::run(app) {
        eprintln!("Application error: {err}");
    }
}
