// renderer/peel_material.rs
//
// Peeling-aware material state plus the fragment program generator that grafts
// the discard preamble onto any base shading snippet.

use crate::renderer::material::BaseShading;

/// Guard against re-peeling the surface that produced the near depth.
pub const PEEL_EPSILON: f32 = 1e-6;

const PREAMBLE_MARKER: &str = "// @peel-preamble";

/// Identifies a depth texture owned by the target pool.
///
/// Materials only hold these identifiers; the backend resolves them against
/// the pool for the pass being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthSource {
    Opaque,
    PingPong(usize),
}

/// Colour blending applied while a material is rasterised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// src * src_alpha + dst * (1 - src_alpha)
    #[default]
    Normal,
    /// src + dst
    Additive,
    /// src overwrites dst. Used by peel passes so a layer never blends with itself.
    None,
}

impl BlendMode {
    pub fn to_wgpu(self) -> wgpu::BlendState {
        match self {
            BlendMode::Normal => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            },
            BlendMode::None => wgpu::BlendState::REPLACE,
        }
    }

    /// CPU reference of the blend equation configured by [`BlendMode::to_wgpu`].
    pub fn apply(self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        match self {
            BlendMode::Normal => {
                let a = src[3];
                [
                    src[0] * a + dst[0] * (1.0 - a),
                    src[1] * a + dst[1] * (1.0 - a),
                    src[2] * a + dst[2] * (1.0 - a),
                    a + dst[3] * (1.0 - a),
                ]
            }
            BlendMode::Additive => [
                src[0] + dst[0],
                src[1] + dst[1],
                src[2] + dst[2],
                src[3] + dst[3],
            ],
            BlendMode::None => src,
        }
    }
}

/// Which faces of a surface are rasterised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullSide {
    Front,
    Back,
    #[default]
    Both,
}

impl CullSide {
    pub fn from_double_sided(double_sided: bool) -> Self {
        if double_sided {
            CullSide::Both
        } else {
            CullSide::Front
        }
    }

    /// wgpu culls the face it is given, so rendering front faces culls back faces.
    pub fn cull_mode(self) -> Option<wgpu::Face> {
        match self {
            CullSide::Front => Some(wgpu::Face::Back),
            CullSide::Back => Some(wgpu::Face::Front),
            CullSide::Both => None,
        }
    }

    pub fn renders(self, front_facing: bool) -> bool {
        match self {
            CullSide::Front => front_facing,
            CullSide::Back => !front_facing,
            CullSide::Both => true,
        }
    }
}

/// The two axes that change the structure of the generated fragment program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub peeling: bool,
    pub first_layer: bool,
}

impl ProgramKey {
    pub const FALLBACK: Self = Self {
        peeling: false,
        first_layer: true,
    };

    pub fn reads_near_depth(self) -> bool {
        self.peeling && !self.first_layer
    }
}

/// Per-material peeling state.
///
/// When peeling is disabled both depth sources are always `None`, so they can
/// never leak into program selection.
#[derive(Debug, Clone, PartialEq)]
pub struct PeelState {
    peeling_enabled: bool,
    near_depth: Option<DepthSource>,
    opaque_depth: Option<DepthSource>,
    pub resolution: (u32, u32),
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub depth_write: bool,
    pub cull_side: CullSide,
    program_revision: u32,
    needs_recompile: bool,
}

impl Default for PeelState {
    fn default() -> Self {
        Self {
            peeling_enabled: false,
            near_depth: None,
            opaque_depth: None,
            resolution: (1, 1),
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            depth_write: true,
            cull_side: CullSide::Both,
            program_revision: 0,
            needs_recompile: true,
        }
    }
}

impl PeelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peeling_enabled(&self) -> bool {
        self.peeling_enabled
    }

    pub fn near_depth(&self) -> Option<DepthSource> {
        self.near_depth
    }

    pub fn opaque_depth(&self) -> Option<DepthSource> {
        self.opaque_depth
    }

    pub fn set_peeling_enabled(&mut self, enabled: bool) {
        let before = self.program_key();
        self.peeling_enabled = enabled;
        if !enabled {
            self.near_depth = None;
            self.opaque_depth = None;
        }
        self.note_program_change(before);
    }

    pub fn set_near_depth(&mut self, source: Option<DepthSource>) {
        if source.is_some() && !self.peeling_enabled {
            log::warn!("Ignoring near depth on a material with peeling disabled");
            return;
        }
        let before = self.program_key();
        self.near_depth = source;
        self.note_program_change(before);
    }

    pub fn set_opaque_depth(&mut self, source: Option<DepthSource>) {
        if source.is_some() && !self.peeling_enabled {
            log::warn!("Ignoring opaque depth on a material with peeling disabled");
            return;
        }
        // Not part of the program key: rebinding is a uniform change only.
        self.opaque_depth = source;
    }

    pub fn program_key(&self) -> ProgramKey {
        ProgramKey {
            peeling: self.peeling_enabled,
            first_layer: self.near_depth.is_none(),
        }
    }

    /// Bumped once for every change of [`PeelState::program_key`].
    pub fn program_revision(&self) -> u32 {
        self.program_revision
    }

    pub fn needs_recompile(&self) -> bool {
        self.needs_recompile
    }

    /// Called by the backend once it has a program for the current key.
    pub fn mark_compiled(&mut self) {
        self.needs_recompile = false;
    }

    fn note_program_change(&mut self, before: ProgramKey) {
        if self.program_key() != before {
            self.program_revision = self.program_revision.wrapping_add(1);
            self.needs_recompile = true;
        }
    }
}

/// Outcome of the peel preamble for one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentDecision {
    Keep,
    /// Behind opaque geometry; never part of any layer.
    DiscardOccluded,
    /// Already captured by an earlier layer.
    DiscardPeeled,
}

/// Depth lookups at the fragment's screen position.
pub trait DepthSampler {
    fn opaque_depth(&mut self) -> f32;
    fn near_depth(&mut self) -> f32;
}

/// CPU mirror of the generated preamble. Samples only what the program for
/// `key` would sample.
pub fn fragment_visibility<S: DepthSampler>(key: ProgramKey, z: f32, depths: &mut S) -> FragmentDecision {
    if !key.peeling {
        return FragmentDecision::Keep;
    }
    if depths.opaque_depth() < z {
        return FragmentDecision::DiscardOccluded;
    }
    if !key.first_layer && depths.near_depth() >= z - PEEL_EPSILON {
        return FragmentDecision::DiscardPeeled;
    }
    FragmentDecision::Keep
}

const MESH_WGSL: &str = include_str!("../shader/mesh.wgsl");

const PEEL_BINDINGS_WGSL: &str = r#"
struct PeelUniform {
    resolution: vec2<f32>,
    epsilon: f32,
    _pad: f32,
};

@group(2) @binding(0) var<uniform> peel: PeelUniform;
@group(2) @binding(1) var opaque_depth: texture_depth_2d;

fn peel_texel(frag_coord: vec4<f32>) -> vec2<i32> {
    let uv = frag_coord.xy / peel.resolution;
    let dims = vec2<f32>(textureDimensions(opaque_depth));
    return vec2<i32>(clamp(uv * dims, vec2<f32>(0.0), dims - vec2<f32>(1.0)));
}
"#;

const NEAR_BINDING_WGSL: &str = r#"
@group(2) @binding(2) var near_depth: texture_depth_2d;
"#;

const OPAQUE_TEST_WGSL: &str = r#"
    let peel_coord = peel_texel(in.clip_position);
    if textureLoad(opaque_depth, peel_coord, 0) < in.clip_position.z {
        discard;
    }
"#;

const NEAR_TEST_WGSL: &str = r#"
    if textureLoad(near_depth, peel_coord, 0) >= in.clip_position.z - peel.epsilon {
        discard;
    }
"#;

/// Builds the WGSL for `shading` specialised for `key`.
///
/// The result is the shared mesh stage with the peel bindings prepended, the
/// discard preamble injected at the top of `fs_main`, and the shading snippet
/// appended.
pub fn build_fragment_source(shading: &BaseShading, key: ProgramKey) -> String {
    let mut bindings = String::new();
    let mut preamble = String::new();

    if key.peeling {
        bindings.push_str(PEEL_BINDINGS_WGSL);
        preamble.push_str(OPAQUE_TEST_WGSL);
        if !key.first_layer {
            bindings.push_str(NEAR_BINDING_WGSL);
            preamble.push_str(NEAR_TEST_WGSL);
        }
    }

    let stage = MESH_WGSL.replacen(PREAMBLE_MARKER, &preamble, 1);

    format!("{}\n{}\n{}", bindings, stage, shading.source())
}
