//! Lights as components of positioned scene entities.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Point and directional lights that reach the shader.
pub const MAX_POINT_LIGHTS: usize = 4;
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;

fn white() -> Vec3 {
    Vec3::ONE
}

/// Phong color terms of a light.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightColor {
    #[serde(default)]
    pub ambient: Vec3,
    #[serde(default = "white")]
    pub diffuse: Vec3,
    #[serde(default = "white")]
    pub specular: Vec3,
}

impl Default for LightColor {
    fn default() -> Self {
        Self { ambient: Vec3::ZERO, diffuse: white(), specular: white() }
    }
}

/// Distance falloff `1 / (1 + linear·d + quadratic·d²)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attenuation {
    #[serde(default)]
    pub linear: f32,
    #[serde(default)]
    pub quadratic: f32,
}

impl Attenuation {
    pub fn factor(&self, distance: f32) -> f32 {
        1.0 / (1.0 + self.linear * distance + self.quadratic * distance * distance)
    }
}

/// Light behaviour attached to an entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightComponent {
    Ambient { color: Vec3 },
    Directional { direction: Vec3, color: LightColor },
    Point { color: LightColor, attenuation: Attenuation },
}

/// Something placed in the scene, optionally emitting light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneEntity {
    pub position: Vec3,
    pub light: Option<LightComponent>,
}

impl SceneEntity {
    pub fn ambient(color: Vec3) -> Self {
        Self { position: Vec3::ZERO, light: Some(LightComponent::Ambient { color }) }
    }

    pub fn directional(direction: Vec3, color: LightColor) -> Self {
        Self {
            position: Vec3::ZERO,
            light: Some(LightComponent::Directional { direction: direction.normalize_or(Vec3::NEG_Y), color }),
        }
    }

    pub fn point(position: Vec3, color: LightColor, attenuation: Attenuation) -> Self {
        Self { position, light: Some(LightComponent::Point { color, attenuation }) }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct PointLightGpu {
    pub position: [f32; 4],
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// (linear, quadratic, 0, 0)
    pub attenuation: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct DirectionalLightGpu {
    pub direction: [f32; 4],
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
}

/// Light block of the frame uniforms.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct LightsGpu {
    pub ambient: [f32; 4],
    pub num_point: u32,
    pub num_directional: u32,
    pub _pad: [u32; 2],
    pub point: [PointLightGpu; MAX_POINT_LIGHTS],
    pub directional: [DirectionalLightGpu; MAX_DIRECTIONAL_LIGHTS],
}

impl LightsGpu {
    /// Pack entity lights. Ambient terms add up; extra point or directional
    /// lights beyond the shader limits are dropped with a warning.
    pub fn from_entities(entities: &[SceneEntity]) -> Self {
        let mut out = Self::default();
        let mut ambient = Vec3::ZERO;
        let (mut np, mut nd) = (0usize, 0usize);
        let mut dropped = 0;

        for entity in entities {
            match entity.light {
                Some(LightComponent::Ambient { color }) => ambient += color,
                Some(LightComponent::Point { color, attenuation }) if np < MAX_POINT_LIGHTS => {
                    out.point[np] = PointLightGpu {
                        position: entity.position.extend(1.0).to_array(),
                        ambient: color.ambient.extend(0.0).to_array(),
                        diffuse: color.diffuse.extend(0.0).to_array(),
                        specular: color.specular.extend(0.0).to_array(),
                        attenuation: [attenuation.linear, attenuation.quadratic, 0.0, 0.0],
                    };
                    np += 1;
                }
                Some(LightComponent::Directional { direction, color }) if nd < MAX_DIRECTIONAL_LIGHTS => {
                    out.directional[nd] = DirectionalLightGpu {
                        direction: direction.extend(0.0).to_array(),
                        ambient: color.ambient.extend(0.0).to_array(),
                        diffuse: color.diffuse.extend(0.0).to_array(),
                        specular: color.specular.extend(0.0).to_array(),
                    };
                    nd += 1;
                }
                Some(_) => dropped += 1,
                None => {}
            }
        }
        if dropped > 0 {
            log::warn!("{} lights exceed the shader limits and are ignored", dropped);
        }

        out.ambient = ambient.extend(1.0).to_array();
        out.num_point = np as u32;
        out.num_directional = nd as u32;
        out
    }
}
