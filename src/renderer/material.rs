// renderer/material.rs

use std::borrow::Cow;

use crate::renderer::peel_material::PeelState;

const UNLIT_WGSL: &str = include_str!("../shader/shading_unlit.wgsl");
const LAMBERT_WGSL: &str = include_str!("../shader/shading_lambert.wgsl");
const HOLOGRAPHIC_WGSL: &str = include_str!("../shader/shading_holographic.wgsl");

/// Base surface shading, independent of peeling.
///
/// Each variant provides `fn shade(in: FragmentInput) -> vec4<f32>`. Custom
/// snippets are keyed by `label` in the pipeline cache, so labels must be
/// unique per source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum BaseShading {
    #[default]
    Unlit,
    Lambert,
    Holographic,
    Custom {
        label: Cow<'static, str>,
        source: Cow<'static, str>,
    },
}

impl BaseShading {
    pub fn label(&self) -> &str {
        match self {
            BaseShading::Unlit => "unlit",
            BaseShading::Lambert => "lambert",
            BaseShading::Holographic => "holographic",
            BaseShading::Custom { label, .. } => label,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            BaseShading::Unlit => UNLIT_WGSL,
            BaseShading::Lambert => LAMBERT_WGSL,
            BaseShading::Holographic => HOLOGRAPHIC_WGSL,
            BaseShading::Custom { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub shading: BaseShading,
    pub base_color: [f32; 4],
    pub peel: PeelState,
}

impl Material {
    pub fn new(shading: BaseShading, base_color: [f32; 4]) -> Self {
        Self {
            shading,
            base_color,
            peel: PeelState::new(),
        }
    }

    pub fn unlit(color: [f32; 4]) -> Self {
        Self::new(BaseShading::Unlit, color)
    }

    pub fn lambert(color: [f32; 4]) -> Self {
        Self::new(BaseShading::Lambert, color)
    }

    pub fn holographic(color: [f32; 4]) -> Self {
        Self::new(BaseShading::Holographic, color)
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::lambert([r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0])
    }

    /// Base colour with the material opacity folded into alpha.
    pub fn effective_color(&self) -> [f32; 4] {
        let [r, g, b, a] = self.base_color;
        [r, g, b, a * self.peel.opacity]
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::unlit([1.0, 1.0, 1.0, 1.0])
    }
}
