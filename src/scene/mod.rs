//! Scene descriptions.
//!
//! A scene is a JSON document naming the camera, shader programs, meshes
//! (static or cloth), lights and collision planes. [`SceneDescription`] is
//! the raw document; [`Scene::load`] resolves it into meshes in world space,
//! cloth instances ready for a solver backend, and light entities.
//!
//! Relative paths are resolved against the scene file's directory. Mesh
//! paths of the form `builtin:grid:<cols>x<rows>` produce a procedural sheet.

pub mod light;
pub mod texture;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::cloth::HostCloth;
use crate::constraints::Plane;
use crate::error::SceneError;
use crate::mesh::HostMesh;
pub use light::{Attenuation, LightColor, LightComponent, LightsGpu, SceneEntity};
pub use texture::{TextureCache, TextureData};

/// Shader names available without a `shaders` entry.
pub const BUILTIN_SHADERS: &[&str] = &["phong", "checkerboard"];

/// Scene shipped with the binary.
pub const DEFAULT_SCENE_JSON: &str = include_str!("../../assets/scenes/cloth_sheet.json");

fn default_fov() -> f32 {
    60.0
}

fn default_scale() -> f32 {
    1.0
}

fn default_shader() -> String {
    "phong".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDescription {
    pub position: Vec3,
    #[serde(rename = "fovY", default = "default_fov")]
    pub fov_y: f32,
    #[serde(default)]
    pub target: Vec3,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShaderDescription {
    pub name: String,
    pub vertex: String,
    pub fragment: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshDescription {
    pub path: String,
    #[serde(default = "default_shader")]
    pub shader: String,
    #[serde(default)]
    pub is_cloth: bool,
    #[serde(default)]
    pub position: Vec3,
    /// XYZ Euler angles in degrees.
    #[serde(default)]
    pub orientation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub flip_normals: bool,
    #[serde(default)]
    pub pinned: Vec<u32>,
    #[serde(default)]
    pub texture: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointLightDescription {
    pub position: Vec3,
    #[serde(default)]
    pub color: LightColor,
    #[serde(default)]
    pub attenuation: Attenuation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLightDescription {
    pub direction: Vec3,
    #[serde(default)]
    pub color: LightColor,
}

/// The scene document as written on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescription {
    #[serde(default)]
    pub name: String,
    pub camera: CameraDescription,
    #[serde(default)]
    pub shaders: Vec<ShaderDescription>,
    pub meshes: Vec<MeshDescription>,
    #[serde(default)]
    pub point_lights: Vec<PointLightDescription>,
    #[serde(default)]
    pub directional_lights: Vec<DirectionalLightDescription>,
    #[serde(default)]
    pub ambient_light: Option<Vec3>,
    /// Collision planes; the ground `y = 0` when absent.
    #[serde(default)]
    pub planes: Option<Vec<Plane>>,
}

impl SceneDescription {
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn default_scene() -> Result<Self, SceneError> {
        Self::from_json(DEFAULT_SCENE_JSON)
    }

    fn declares_shader(&self, name: &str) -> bool {
        BUILTIN_SHADERS.contains(&name) || self.shaders.iter().any(|s| s.name == name)
    }
}

/// A shader program with sources resolved against the scene directory.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderProgram {
    pub name: String,
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

/// A mesh drawn but not simulated.
#[derive(Clone, Debug)]
pub struct StaticMesh {
    pub name: String,
    pub mesh: HostMesh,
    pub shader: String,
    pub texture: Option<Arc<TextureData>>,
}

/// A cloth instance with its render material.
#[derive(Clone, Debug)]
pub struct ClothEntry {
    pub cloth: HostCloth,
    pub shader: String,
    pub texture: Option<Arc<TextureData>>,
}

/// A resolved scene.
#[derive(Debug)]
pub struct Scene {
    pub name: String,
    pub source: Option<PathBuf>,
    /// Directory relative paths were resolved against.
    pub base_dir: PathBuf,
    /// The document this scene was built from; used to reset and save.
    pub description: SceneDescription,
    pub camera: Camera,
    pub shaders: Vec<ShaderProgram>,
    pub static_meshes: Vec<StaticMesh>,
    pub cloths: Vec<ClothEntry>,
    pub entities: Vec<SceneEntity>,
    pub planes: Vec<Plane>,
}

impl Scene {
    /// Read and resolve a scene file.
    pub fn load(path: &Path, textures: &mut TextureCache) -> Result<Self, SceneError> {
        let json = fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let description = SceneDescription::from_json(&json)?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        let mut scene = Self::from_description(description, base_dir, textures)?;
        scene.source = Some(path.to_path_buf());
        log::info!("Loaded scene '{}' from {}", scene.name, path.display());
        Ok(scene)
    }

    /// The built-in cloth sheet scene.
    pub fn default_scene(textures: &mut TextureCache) -> Result<Self, SceneError> {
        Self::from_description(SceneDescription::default_scene()?, Path::new("."), textures)
    }

    pub fn from_description(
        description: SceneDescription,
        base_dir: &Path,
        textures: &mut TextureCache,
    ) -> Result<Self, SceneError> {
        for mesh in &description.meshes {
            if !description.declares_shader(&mesh.shader) {
                return Err(SceneError::UnknownShader { mesh: mesh.path.clone(), shader: mesh.shader.clone() });
            }
        }

        let shaders = description
            .shaders
            .iter()
            .map(|s| ShaderProgram {
                name: s.name.clone(),
                vertex: base_dir.join(&s.vertex),
                fragment: base_dir.join(&s.fragment),
            })
            .collect();

        let mut static_meshes = Vec::new();
        let mut cloths = Vec::new();
        for desc in &description.meshes {
            let mut mesh = HostMesh::load(&desc.path, base_dir).map_err(|source| SceneError::Mesh {
                path: desc.path.clone(),
                source,
            })?;
            mesh.transform(desc.position, desc.orientation, desc.scale);
            if desc.flip_normals {
                mesh.flip_normals();
            }

            let texture = desc.texture.as_ref().and_then(|t| {
                let path = base_dir.join(t);
                textures
                    .load(&path)
                    .map_err(|e| log::warn!("Mesh '{}': texture {} unavailable: {}", desc.path, path.display(), e))
                    .ok()
            });

            if desc.is_cloth {
                let cloth = HostCloth::new(desc.path.clone(), mesh, &desc.pinned).map_err(|source| {
                    SceneError::Topology { path: desc.path.clone(), source }
                })?;
                cloths.push(ClothEntry { cloth, shader: desc.shader.clone(), texture });
            } else {
                static_meshes.push(StaticMesh { name: desc.path.clone(), mesh, shader: desc.shader.clone(), texture });
            }
        }

        let mut entities = Vec::new();
        if let Some(ambient) = description.ambient_light {
            entities.push(SceneEntity::ambient(ambient));
        }
        for light in &description.point_lights {
            entities.push(SceneEntity::point(light.position, light.color, light.attenuation));
        }
        for light in &description.directional_lights {
            entities.push(SceneEntity::directional(light.direction, light.color));
        }

        let planes = description
            .planes
            .as_ref()
            .map(|planes| planes.iter().map(|p| Plane::new(p.normal, p.offset)).collect())
            .unwrap_or_else(|| vec![Plane::GROUND]);

        let camera = Camera::looking_at(description.camera.position, description.camera.target, description.camera.fov_y);

        Ok(Self {
            name: description.name.clone(),
            source: None,
            base_dir: base_dir.to_path_buf(),
            description,
            camera,
            shaders,
            static_meshes,
            cloths,
            entities,
            planes,
        })
    }

    pub fn shader(&self, name: &str) -> Option<&ShaderProgram> {
        self.shaders.iter().find(|s| s.name == name)
    }

    /// Rebuild every mesh and cloth from the description, discarding
    /// simulation state and interactive pins.
    pub fn rebuild(&self, textures: &mut TextureCache) -> Result<Self, SceneError> {
        let mut scene = Self::from_description(self.description.clone(), &self.base_dir, textures)?;
        scene.source = self.source.clone();
        Ok(scene)
    }

    /// Move the cloth instances out for a solver backend.
    pub fn take_cloths(&mut self) -> Vec<ClothEntry> {
        std::mem::take(&mut self.cloths)
    }

    /// Write the scene description as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), SceneError> {
        let json = serde_json::to_string_pretty(&self.description)?;
        fs::write(path, json).map_err(|source| SceneError::Io { path: path.to_path_buf(), source })?;
        log::info!("Saved scene '{}' to {}", self.name, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeshError;

    const MINIMAL: &str = r#"{
        "name": "minimal",
        "camera": { "position": [0, 1, 4], "fovY": 45 },
        "meshes": [
            { "path": "builtin:grid:2x2", "isCloth": true, "position": [0, 1, 0], "pinned": [0, 2] },
            { "path": "builtin:grid:1x1", "shader": "checkerboard", "scale": 10 }
        ]
    }"#;

    fn resolve(json: &str) -> Result<Scene, SceneError> {
        let mut cache = TextureCache::new();
        Scene::from_description(SceneDescription::from_json(json)?, Path::new("."), &mut cache)
    }

    #[test]
    fn test_minimal_scene() {
        let scene = resolve(MINIMAL).unwrap();
        assert_eq!(scene.name, "minimal");
        assert_eq!(scene.cloths.len(), 1);
        assert_eq!(scene.static_meshes.len(), 1);
        assert_eq!(scene.planes, vec![Plane::GROUND]);
        assert_eq!(scene.camera.fov_y, 45.0);

        let cloth = &scene.cloths[0].cloth;
        assert!(cloth.vertex_data[0].is_pinned());
        assert!(cloth.vertex_data[2].is_pinned());
        assert!(cloth.mesh.vertices.iter().all(|v| (v.position[1] - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_default_scene_parses() {
        let mut cache = TextureCache::new();
        let scene = Scene::default_scene(&mut cache).unwrap();
        assert!(!scene.cloths.is_empty());
        assert!(!scene.entities.is_empty());
    }

    #[test]
    fn test_unknown_shader_rejected() {
        let json = r#"{ "camera": { "position": [0, 0, 1] },
                        "meshes": [ { "path": "builtin:grid:1x1", "shader": "toon" } ] }"#;
        assert!(matches!(resolve(json), Err(SceneError::UnknownShader { .. })));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(resolve("{ \"camera\": "), Err(SceneError::Parse(_))));
        assert!(matches!(resolve(r#"{ "meshes": [] }"#), Err(SceneError::Parse(_))));
    }

    #[test]
    fn test_missing_mesh_file() {
        let json = r#"{ "camera": { "position": [0, 0, 1] },
                        "meshes": [ { "path": "nope.obj" } ] }"#;
        assert!(matches!(resolve(json), Err(SceneError::Mesh { .. })));
    }

    #[test]
    fn test_oversized_grid_is_mesh_error() {
        for dims in ["4294967295x1", "1x4294967295", "65535x65535", "4096x1024"] {
            let json = format!(
                r#"{{ "camera": {{ "position": [0, 0, 1] }},
                     "meshes": [ {{ "path": "builtin:grid:{}", "isCloth": true }} ] }}"#,
                dims
            );
            match resolve(&json) {
                Err(SceneError::Mesh { source: MeshError::GridTooLarge { .. }, .. }) => {}
                other => panic!("{}: expected GridTooLarge, got {:?}", dims, other.map(|s| s.name)),
            }
        }
    }

    #[test]
    fn test_custom_planes_normalized() {
        let json = r#"{ "camera": { "position": [0, 0, 1] }, "meshes": [],
                        "planes": [ { "normal": [0, 2, 0], "offset": -1 } ] }"#;
        let scene = resolve(json).unwrap();
        assert_eq!(scene.planes, vec![Plane { normal: Vec3::Y, offset: -1.0 }]);
    }

    #[test]
    fn test_rebuild_and_take_cloths() {
        let mut scene = resolve(MINIMAL).unwrap();
        let taken = scene.take_cloths();
        assert_eq!(taken.len(), 1);
        assert!(scene.cloths.is_empty());

        let mut cache = TextureCache::new();
        let rebuilt = scene.rebuild(&mut cache).unwrap();
        assert_eq!(rebuilt.cloths.len(), 1);
        assert_eq!(rebuilt.description, scene.description);
    }

    #[test]
    fn test_save_round_trip() {
        let scene = resolve(MINIMAL).unwrap();
        let path = std::env::temp_dir().join(format!("pbd_cloth_scene_{}.json", std::process::id()));
        scene.save(&path).unwrap();

        let mut cache = TextureCache::new();
        let loaded = Scene::load(&path, &mut cache).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded.description, scene.description);
        assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_missing_scene_file() {
        let mut cache = TextureCache::new();
        assert!(matches!(
            Scene::load(Path::new("no/such/scene.json"), &mut cache),
            Err(SceneError::Io { .. })
        ));
    }
}
