use super::vertex::{push_quad, v, Vertex};
use std::f32::consts::PI;

/// Unit cube centred on the origin, 24 vertices so each face keeps its normal.
pub fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    // (normal, u axis, v axis); corners are n/2 +- u/2 +- v/2.
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    for (n, u, w) in faces {
        let corner = |su: f32, sv: f32| {
            [
                0.5 * (n[0] + su * u[0] + sv * w[0]),
                0.5 * (n[1] + su * u[1] + sv * w[1]),
                0.5 * (n[2] + su * u[2] + sv * w[2]),
            ]
        };
        push_quad(
            &mut vertices,
            &mut indices,
            [
                v(corner(-1.0, -1.0), n, [0.0, 1.0]),
                v(corner(1.0, -1.0), n, [1.0, 1.0]),
                v(corner(1.0, 1.0), n, [1.0, 0.0]),
                v(corner(-1.0, 1.0), n, [0.0, 0.0]),
            ],
        );
    }

    (vertices, indices)
}

/// Cylinder of radius 1 spanning y in [-1, 1], with caps.
pub fn cylinder_mesh(segments: u32) -> (Vec<Vertex>, Vec<u32>) {
    let segments = segments.max(3);
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for segment in 0..segments {
        let t0 = 2.0 * PI * segment as f32 / segments as f32;
        let t1 = 2.0 * PI * (segment + 1) as f32 / segments as f32;
        let (s0, c0) = t0.sin_cos();
        let (s1, c1) = t1.sin_cos();
        let u0 = segment as f32 / segments as f32;
        let u1 = (segment + 1) as f32 / segments as f32;

        push_quad(
            &mut vertices,
            &mut indices,
            [
                v([s0, -1.0, c0], [s0, 0.0, c0], [u0, 1.0]),
                v([s1, -1.0, c1], [s1, 0.0, c1], [u1, 1.0]),
                v([s1, 1.0, c1], [s1, 0.0, c1], [u1, 0.0]),
                v([s0, 1.0, c0], [s0, 0.0, c0], [u0, 0.0]),
            ],
        );
    }

    for (y, normal) in [(1.0f32, [0.0, 1.0, 0.0]), (-1.0f32, [0.0, -1.0, 0.0])] {
        let centre = vertices.len() as u32;
        vertices.push(v([0.0, y, 0.0], normal, [0.5, 0.5]));
        for segment in 0..segments {
            let t = 2.0 * PI * segment as f32 / segments as f32;
            let (s, c) = t.sin_cos();
            vertices.push(v([s, y, c], normal, [0.5 + 0.5 * s, 0.5 + 0.5 * c]));
        }
        for segment in 0..segments {
            let a = centre + 1 + segment;
            let b = centre + 1 + (segment + 1) % segments;
            if y > 0.0 {
                indices.extend_from_slice(&[centre, a, b]);
            } else {
                indices.extend_from_slice(&[centre, b, a]);
            }
        }
    }

    (vertices, indices)
}
