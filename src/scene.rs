//! Read-only scene snapshot handed over by the host application.
//!
//! Every record is a plain value. Cross references (bone parents, material
//! slots, texture images, metadata text blocks) are names resolved through
//! lookup tables built once per export, never live back-references.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─── Scene root ───────────────────────────────────────────────────────────────

/// Complete input of one export call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub armature: Armature,
    #[serde(default)]
    pub meshes: Vec<MeshObject>,
    #[serde(default)]
    pub empties: Vec<EmptyObject>,
    #[serde(default)]
    pub materials: Vec<Material>,
    /// Image assets in authoring order. This order drives image indices.
    #[serde(default)]
    pub images: Vec<ImageAsset>,
    #[serde(default)]
    pub texts: Vec<TextBlock>,
}

impl SceneSnapshot {
    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|material| material.name == name)
    }

    pub fn image(&self, name: &str) -> Option<&ImageAsset> {
        self.images.iter().find(|image| image.name == name)
    }

    pub fn text(&self, name: &str) -> Option<&TextBlock> {
        self.texts.iter().find(|text| text.name == name)
    }
}

// ─── Armature ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Armature {
    pub name: String,
    #[serde(default)]
    pub location: [f64; 3],
    /// Bones in authoring order; node indices follow this order.
    #[serde(default)]
    pub bones: Vec<Bone>,
    /// Humanoid role (`hips`, `leftUpperArm`, ...) to bone name.
    #[serde(default)]
    pub humanoid: BTreeMap<String, String>,
    /// Custom properties overriding the VRM meta block (`title`, `author`, ...).
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Image name used as the avatar thumbnail.
    #[serde(default)]
    pub texture: Option<String>,
    #[serde(default)]
    pub metadata_texts: MetadataTexts,
}

/// Names of the text blocks holding the avatar metadata JSON blobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataTexts {
    #[serde(default)]
    pub humanoid_params: Option<String>,
    #[serde(default)]
    pub first_person_params: Option<String>,
    #[serde(default)]
    pub look_at_params: Option<String>,
    #[serde(default)]
    pub blendshape_group: Option<String>,
    #[serde(default)]
    pub spring_bone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Head position in armature space.
    pub head_local: [f64; 3],
}

// ─── Meshes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshObject {
    pub name: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub location: [f64; 3],
    /// Row-major object-to-world matrix. Falls back to a pure translation
    /// by `location` when absent.
    #[serde(default)]
    pub matrix_world: Option<[[f64; 4]; 4]>,
    /// Whether the object is parented to the armature object.
    #[serde(default)]
    pub parented_to_armature: bool,
    #[serde(default)]
    pub parent_bone: Option<String>,
    #[serde(default)]
    pub has_armature_modifier: bool,
    /// Material name per slot.
    #[serde(default)]
    pub material_slots: Vec<String>,
    #[serde(default)]
    pub uv_layers: Vec<String>,
    #[serde(default)]
    pub vertices: Vec<Vertex>,
    #[serde(default)]
    pub faces: Vec<Face>,
    /// Shape keys; the first entry is the reference (basis) key.
    #[serde(default)]
    pub shape_keys: Vec<ShapeKey>,
}

impl MeshObject {
    /// Skinned meshes deform with the armature. A mesh parented straight to
    /// a bone without an armature modifier is attached to that bone instead.
    pub fn is_skinned(&self) -> bool {
        !(!self.has_armature_modifier && self.parented_to_armature && self.parent_bone.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    pub co: [f64; 3],
    /// Smooth vertex normal. Computed from the geometry when absent.
    #[serde(default)]
    pub normal: Option<[f64; 3]>,
    #[serde(default)]
    pub groups: Vec<GroupWeight>,
}

/// Membership of a vertex in a named vertex group (bone deform group).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupWeight {
    pub group: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub loops: Vec<Loop>,
    #[serde(default)]
    pub material_index: usize,
    #[serde(default)]
    pub smooth: bool,
}

/// One face corner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    pub vertex: usize,
    /// One coordinate per UV layer, in `uv_layers` order.
    #[serde(default)]
    pub uv: Vec<[f64; 2]>,
    /// Custom split normal.
    #[serde(default)]
    pub normal: Option<[f64; 3]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeKey {
    pub name: String,
    pub positions: Vec<[f64; 3]>,
    #[serde(default)]
    pub normals: Option<Vec<[f64; 3]>>,
}

// ─── Empties ──────────────────────────────────────────────────────────────────

/// Empty object parented to an armature bone, exported as a spring bone collider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmptyObject {
    pub name: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub parent_bone: Option<String>,
    pub world_location: [f64; 3],
    #[serde(default = "default_display_size")]
    pub display_size: f64,
}

// ─── Materials ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// Shader dialect tag: `MToon_unversioned`, `GLTF` or `TRANSPARENT_ZWRITE`.
    pub shader: String,
    #[serde(default = "default_blend_method")]
    pub blend_method: String,
    #[serde(default = "default_alpha_threshold")]
    pub alpha_threshold: f64,
    #[serde(default)]
    pub use_backface_culling: bool,
    /// Shader group inputs by socket name.
    #[serde(default)]
    pub inputs: BTreeMap<String, ShaderInput>,
}

impl Material {
    pub fn float_input(&self, name: &str) -> Option<f64> {
        match self.inputs.get(name)? {
            ShaderInput::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// RGBA input; a 3-component color gets alpha 1.
    pub fn color_input(&self, name: &str) -> Option<[f64; 4]> {
        match self.inputs.get(name)? {
            ShaderInput::Color(values) => {
                let mut rgba = [0.0, 0.0, 0.0, 1.0];
                for (slot, value) in rgba.iter_mut().zip(values.iter()) {
                    *slot = *value;
                }
                Some(rgba)
            }
            _ => None,
        }
    }

    pub fn texture_input(&self, name: &str) -> Option<&TextureLink> {
        match self.inputs.get(name)? {
            ShaderInput::Texture(link) => Some(link),
            _ => None,
        }
    }
}

/// Resolved value of one shader socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShaderInput {
    Float(f64),
    Color(Vec<f64>),
    Texture(TextureLink),
}

/// Image texture node linked into a shader socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureLink {
    pub image: String,
    /// `Linear`, `Closest`, `Cubic` or `Smart`.
    #[serde(default = "default_interpolation")]
    pub interpolation: String,
    /// `REPEAT`, `EXTEND` or `CLIP`.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Mapping node feeding the texture coordinates.
    #[serde(default)]
    pub uv_transform: Option<UvTransform>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UvTransform {
    pub offset: [f64; 2],
    pub scale: [f64; 2],
}

// ─── Images / texts ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageAsset {
    pub name: String,
    /// Path of the encoded image, relative to the snapshot file.
    #[serde(default)]
    pub filepath: Option<String>,
    /// Host file format name (`PNG`, `JPEG`, ...).
    #[serde(default)]
    pub file_format: Option<String>,
    /// Encoded image bytes. Filled from `filepath` by [`load_scene_snapshot`].
    #[serde(default, skip_serializing)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub name: String,
    pub body: String,
}

fn default_true() -> bool {
    true
}

fn default_display_size() -> f64 {
    1.0
}

fn default_blend_method() -> String {
    "OPAQUE".to_string()
}

fn default_alpha_threshold() -> f64 {
    0.5
}

fn default_interpolation() -> String {
    "Linear".to_string()
}

fn default_extension() -> String {
    "REPEAT".to_string()
}

// ─── Loading ──────────────────────────────────────────────────────────────────

/// Load a snapshot JSON file and read every referenced image from disk.
pub fn load_scene_snapshot(path: &Path) -> Result<SceneSnapshot> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene snapshot: {}", path.display()))?;
    let mut scene: SceneSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse scene snapshot: {}", path.display()))?;

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    resolve_image_data(&mut scene, &base_dir)?;
    Ok(scene)
}

fn resolve_image_data(scene: &mut SceneSnapshot, base_dir: &Path) -> Result<()> {
    for image in &mut scene.images {
        if !image.data.is_empty() {
            continue;
        }
        let Some(filepath) = image.filepath.as_deref() else {
            continue;
        };
        let image_path: PathBuf = base_dir.join(filepath);
        image.data = fs::read(&image_path).with_context(|| {
            format!(
                "failed to read image '{}': {}",
                image.name,
                image_path.display()
            )
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn given_mixed_shader_inputs_when_deserializing_then_variants_are_resolved() {
        let material: Material = serde_json::from_value(json!({
            "name": "Body",
            "shader": "GLTF",
            "inputs": {
                "metallic": 0.25,
                "base_Color": [0.5, 0.4, 0.3],
                "color_texture": {"image": "body.png", "interpolation": "Closest"}
            }
        }))
        .expect("material");

        assert_eq!(material.blend_method, "OPAQUE");
        assert_eq!(material.float_input("metallic"), Some(0.25));
        assert_eq!(material.color_input("base_Color"), Some([0.5, 0.4, 0.3, 1.0]));
        let link = material.texture_input("color_texture").expect("texture");
        assert_eq!(link.image, "body.png");
        assert_eq!(link.extension, "REPEAT");
        assert!(material.texture_input("metallic").is_none());
    }

    #[test]
    fn given_bone_parented_mesh_without_modifier_when_classifying_then_mesh_is_attached() {
        let mut mesh = MeshObject {
            name: "Hat".to_string(),
            parented_to_armature: true,
            parent_bone: Some("head".to_string()),
            ..MeshObject::default()
        };
        assert!(!mesh.is_skinned());

        mesh.has_armature_modifier = true;
        assert!(mesh.is_skinned());

        mesh.has_armature_modifier = false;
        mesh.parent_bone = None;
        assert!(mesh.is_skinned());
    }

    #[test]
    fn given_snapshot_with_image_path_when_loading_then_bytes_are_read_relative_to_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("thumb.png"), [1u8, 2, 3]).expect("image");
        let snapshot = json!({
            "armature": {"name": "Armature"},
            "images": [{"name": "thumb", "filepath": "thumb.png", "file_format": "PNG"}]
        });
        let snapshot_path = dir.path().join("scene.json");
        fs::write(&snapshot_path, snapshot.to_string()).expect("snapshot");

        let scene = load_scene_snapshot(&snapshot_path).expect("load");

        assert_eq!(scene.images[0].data, vec![1, 2, 3]);
        assert!(scene.meshes.is_empty());
    }

    #[test]
    fn given_missing_image_file_when_loading_then_error_names_the_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshot = json!({
            "armature": {"name": "Armature"},
            "images": [{"name": "face", "filepath": "missing.png"}]
        });
        let snapshot_path = dir.path().join("scene.json");
        fs::write(&snapshot_path, snapshot.to_string()).expect("snapshot");

        let error = load_scene_snapshot(&snapshot_path).expect_err("missing file");
        assert!(format!("{error:#}").contains("face"));
    }
}
