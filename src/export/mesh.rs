use std::collections::{BTreeSet, HashMap};

use nalgebra::Vector3;
use serde_json::{Map, Value, json};

use super::ExportContext;
use super::geometry::{BakedGeometry, fan_triangles, to_gltf_axes, to_gltf_f32, triangle_normal};
use super::packer::{BinaryPacker, ElementType};
use super::skeleton::Skeleton;
use super::skinning::{VertexSkin, resolve_vertex_skin};
use super::types::VrmVersion;
use crate::error::ExportError;
use crate::scene::{Armature, MeshObject};

const TRIANGLES: u32 = 4;

/// Shared, read-only inputs of every mesh translation.
pub(crate) struct MeshInputs<'a> {
    pub(crate) version: VrmVersion,
    pub(crate) armature: &'a Armature,
    pub(crate) skeleton: &'a Skeleton,
    /// Material name to exported material index.
    pub(crate) material_index: &'a HashMap<String, usize>,
}

/// Mesh entry plus the node that instantiates it.
#[derive(Debug)]
pub(crate) struct TranslatedMesh {
    pub(crate) mesh: Value,
    pub(crate) node: Value,
    /// Bone node the mesh node hangs under; `None` for scene roots.
    pub(crate) parent_node: Option<usize>,
    pub(crate) vertex_count: usize,
    pub(crate) triangle_count: usize,
}

/// Deduplication key of an exported vertex: uv per layer, normal and source vertex.
type VertexKey = (Vec<u64>, [u64; 3], usize);

#[derive(Default)]
struct VertexStreams {
    positions: Vec<f32>,
    normals: Vec<f32>,
    uvs: Vec<Vec<f32>>,
    joints: Vec<[u16; 4]>,
    weights: Vec<f32>,
    morph_positions: Vec<Vec<f32>>,
    morph_normals: Vec<Vec<f32>>,
}

impl VertexStreams {
    fn new(uv_layers: usize, morph_targets: usize, with_morph_normals: bool) -> Self {
        Self {
            uvs: vec![Vec::new(); uv_layers],
            morph_positions: vec![Vec::new(); morph_targets],
            morph_normals: if with_morph_normals {
                vec![Vec::new(); morph_targets]
            } else {
                Vec::new()
            },
            ..Self::default()
        }
    }

    fn len(&self) -> usize {
        self.positions.len() / 3
    }
}

// ─── Validation ───────────────────────────────────────────────────────────────

/// Resolve the exported material of every slot and check face references.
fn resolve_slot_materials(
    mesh: &MeshObject,
    material_index: &HashMap<String, usize>,
) -> Result<Vec<usize>, ExportError> {
    let slot_materials = mesh
        .material_slots
        .iter()
        .map(|material| {
            material_index
                .get(material)
                .copied()
                .ok_or_else(|| ExportError::MissingMaterial {
                    mesh: mesh.name.clone(),
                    material: material.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (face_index, face) in mesh.faces.iter().enumerate() {
        if face.material_index >= slot_materials.len() {
            return Err(ExportError::InvalidMaterialSlot {
                mesh: mesh.name.clone(),
                face: face_index,
                slot: face.material_index,
            });
        }
        if let Some(corner) = face
            .loops
            .iter()
            .find(|corner| corner.vertex >= mesh.vertices.len())
        {
            return Err(ExportError::InvalidVertexIndex {
                mesh: mesh.name.clone(),
                face: face_index,
                vertex: corner.vertex,
            });
        }
    }
    Ok(slot_materials)
}

// ─── Skinning ─────────────────────────────────────────────────────────────────

/// Resolve joints and weights of every source vertex against skin 0.
fn resolve_mesh_skin(
    mesh: &MeshObject,
    inputs: &MeshInputs<'_>,
    context: &mut ExportContext,
) -> Vec<VertexSkin> {
    let skeleton = inputs.skeleton;
    let joint_slots = skeleton
        .bone_index
        .iter()
        .filter_map(|(name, node)| {
            skeleton
                .joint_slot(0, *node)
                .map(|slot| (name.as_str(), slot as u16))
        })
        .collect::<HashMap<&str, u16>>();

    let fallback_joint = inputs
        .armature
        .humanoid
        .get("hips")
        .and_then(|bone| joint_slots.get(bone.as_str()))
        .copied()
        .unwrap_or(0);

    let unknown_groups = mesh
        .vertices
        .iter()
        .flat_map(|vertex| vertex.groups.iter())
        .filter(|group| !joint_slots.contains_key(group.group.as_str()))
        .map(|group| group.group.as_str())
        .collect::<BTreeSet<_>>();
    if !unknown_groups.is_empty() {
        context.warn(
            "UNKNOWN_JOINT",
            format!(
                "Mesh '{}' has vertex groups without a matching joint: {}",
                mesh.name,
                unknown_groups.into_iter().collect::<Vec<_>>().join(", ")
            ),
        );
    }

    let mut truncated = 0usize;
    let mut zero_weight = 0usize;
    let skins = mesh
        .vertices
        .iter()
        .map(|vertex| {
            let (skin, warnings) = resolve_vertex_skin(&vertex.groups, &joint_slots, fallback_joint);
            truncated += usize::from(warnings.truncated);
            zero_weight += usize::from(warnings.zero_weight);
            skin
        })
        .collect::<Vec<_>>();

    if truncated > 0 {
        context.warn(
            "JOINTS_TRUNCATED",
            format!(
                "Mesh '{}': {} vertex(es) had more than 4 influences; the lightest were dropped",
                mesh.name, truncated
            ),
        );
    }
    if zero_weight > 0 {
        context.warn(
            "ZERO_WEIGHT_VERTEX",
            format!(
                "Mesh '{}': {} vertex(es) had no weight and were bound to the hips joint",
                mesh.name, zero_weight
            ),
        );
    }
    skins
}

// ─── Translation ──────────────────────────────────────────────────────────────

/// Translate one mesh object into a glTF mesh, packing its vertex streams.
///
/// Face corners sharing the same uv set, normal and source vertex collapse
/// into one exported vertex. Triangles are grouped into one primitive per
/// distinct material, in material slot order. Returns `None` for a mesh
/// without faces.
pub(crate) fn translate_mesh(
    mesh: &MeshObject,
    mesh_index: usize,
    inputs: &MeshInputs<'_>,
    packer: &mut BinaryPacker,
    context: &mut ExportContext,
) -> Result<Option<TranslatedMesh>, ExportError> {
    let slot_materials = resolve_slot_materials(mesh, inputs.material_index)?;
    if mesh.faces.is_empty() {
        context.warn(
            "EMPTY_MESH",
            format!("Mesh '{}' has no faces and was skipped", mesh.name),
        );
        return Ok(None);
    }

    let skinned = mesh.is_skinned();
    let skin = if skinned && inputs.skeleton.skins.is_empty() {
        context.warn(
            "NO_SKIN_FOR_SKINNED_MESH",
            format!(
                "Mesh '{}' deforms with the armature but no skin was exported; it is written unskinned",
                mesh.name
            ),
        );
        None
    } else if skinned {
        Some(resolve_mesh_skin(mesh, inputs, context))
    } else {
        None
    };

    // Primitive order follows the first slot of every distinct material.
    let mut primitive_materials = Vec::<usize>::new();
    let slot_primitive = slot_materials
        .iter()
        .map(|material| match primitive_materials.iter().position(|m| m == material) {
            Some(position) => position,
            None => {
                primitive_materials.push(*material);
                primitive_materials.len() - 1
            }
        })
        .collect::<Vec<_>>();

    let source_triangles = mesh
        .faces
        .iter()
        .flat_map(|face| {
            fan_triangles(face.loops.len())
                .map(|corners| corners.map(|corner| face.loops[corner].vertex))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    let baked = BakedGeometry::bake(mesh, &source_triangles);

    let morph_targets = mesh.shape_keys.len().saturating_sub(1);
    let with_morph_normals = inputs.version.is_legacy();
    let uv_layers = mesh.uv_layers.len();
    let mut streams = VertexStreams::new(uv_layers, morph_targets, with_morph_normals);
    let mut indices = vec![Vec::<u32>::new(); primitive_materials.len()];
    let mut seen = HashMap::<VertexKey, u32>::new();

    for face in &mesh.faces {
        let primitive = slot_primitive[face.material_index];
        for corners in fan_triangles(face.loops.len()) {
            let [a, b, c] = corners.map(|corner| &baked.positions[face.loops[corner].vertex]);
            let face_normal = triangle_normal(a, b, c);

            for corner in corners {
                let corner = &face.loops[corner];
                let normal = match corner.normal {
                    Some(split) => baked.split_normal(split),
                    None if face.smooth => baked.vertex_normals[corner.vertex],
                    None => face_normal,
                };
                let uvs = (0..uv_layers)
                    .map(|layer| corner.uv.get(layer).copied().unwrap_or([0.0, 0.0]))
                    .collect::<Vec<_>>();
                let key: VertexKey = (
                    uvs.iter().flatten().map(|value| value.to_bits()).collect(),
                    [normal.x.to_bits(), normal.y.to_bits(), normal.z.to_bits()],
                    corner.vertex,
                );

                if let Some(index) = seen.get(&key) {
                    indices[primitive].push(*index);
                    continue;
                }

                let index = streams.len() as u32;
                push_vertex(
                    &mut streams,
                    &baked,
                    corner.vertex,
                    &normal,
                    &uvs,
                    skin.as_ref().map(|skins| &skins[corner.vertex]),
                );
                seen.insert(key, index);
                indices[primitive].push(index);
            }
        }
    }

    let primitives = pack_primitives(
        mesh,
        &streams,
        &primitive_materials,
        &indices,
        packer,
    );

    let (translation, parent_node) = mesh_node_placement(mesh, inputs, context);
    let mut node = json!({
        "name": mesh.name,
        "translation": translation,
        "rotation": [0.0, 0.0, 0.0, 1.0],
        "scale": [1.0, 1.0, 1.0],
        "mesh": mesh_index,
    });
    if skin.is_some() {
        node["skin"] = json!(0);
    }

    Ok(Some(TranslatedMesh {
        mesh: json!({
            "name": mesh.name,
            "primitives": primitives,
        }),
        node,
        parent_node,
        vertex_count: streams.len(),
        triangle_count: indices.iter().map(Vec::len).sum::<usize>() / 3,
    }))
}

fn push_vertex(
    streams: &mut VertexStreams,
    baked: &BakedGeometry,
    vertex: usize,
    normal: &Vector3<f64>,
    uvs: &[[f64; 2]],
    skin: Option<&VertexSkin>,
) {
    for (layer, uv) in uvs.iter().enumerate() {
        streams.uvs[layer].extend([uv[0] as f32, (1.0 - uv[1]) as f32]);
    }

    let base = &baked.positions[vertex];
    for (target, positions) in streams.morph_positions.iter_mut().enumerate() {
        let delta = baked.shape_positions[target + 1]
            .get(vertex)
            .map(|shape| shape - base)
            .unwrap_or_else(Vector3::zeros);
        positions.extend(to_gltf_f32(&delta));
    }
    for (target, normals) in streams.morph_normals.iter_mut().enumerate() {
        let reference = baked.shape_normals[0].get(vertex);
        let delta = baked.shape_normals[target + 1]
            .get(vertex)
            .zip(reference)
            .map(|(shape, reference)| shape - reference)
            .unwrap_or_else(Vector3::zeros);
        normals.extend(to_gltf_f32(&delta));
    }

    if let Some(skin) = skin {
        streams.joints.push(skin.joints);
        streams.weights.extend(skin.weights);
    }

    streams.positions.extend(to_gltf_f32(base));
    streams.normals.extend(to_gltf_f32(normal));
}

/// Pack every stream in accessor order and build the primitive list.
fn pack_primitives(
    mesh: &MeshObject,
    streams: &VertexStreams,
    primitive_materials: &[usize],
    indices: &[Vec<u32>],
    packer: &mut BinaryPacker,
) -> Vec<Value> {
    let index_accessors = indices
        .iter()
        .map(|buffer| (!buffer.is_empty()).then(|| packer.pack_indices(buffer)))
        .collect::<Vec<_>>();

    let position = packer.pack_floats(&streams.positions, ElementType::Vec3, true);
    let normal = packer.pack_floats(&streams.normals, ElementType::Vec3, false);
    let uvs = streams
        .uvs
        .iter()
        .map(|uv| packer.pack_floats(uv, ElementType::Vec2, false))
        .collect::<Vec<_>>();
    let skin_accessors = (!streams.joints.is_empty()).then(|| {
        (
            packer.pack_joints(&streams.joints),
            packer.pack_floats(&streams.weights, ElementType::Vec4, false),
        )
    });
    let morph_positions = streams
        .morph_positions
        .iter()
        .map(|deltas| packer.pack_floats(deltas, ElementType::Vec3, true))
        .collect::<Vec<_>>();
    let morph_normals = streams
        .morph_normals
        .iter()
        .map(|deltas| packer.pack_floats(deltas, ElementType::Vec3, false))
        .collect::<Vec<_>>();

    let mut attributes = Map::new();
    attributes.insert("POSITION".to_string(), json!(position));
    attributes.insert("NORMAL".to_string(), json!(normal));
    if let Some((joints, weights)) = skin_accessors {
        attributes.insert("JOINTS_0".to_string(), json!(joints));
        attributes.insert("WEIGHTS_0".to_string(), json!(weights));
    }
    for (layer, accessor) in uvs.iter().enumerate() {
        attributes.insert(format!("TEXCOORD_{layer}"), json!(accessor));
    }

    let targets = morph_positions
        .iter()
        .enumerate()
        .map(|(target, position)| {
            let mut entry = json!({ "POSITION": position });
            if let Some(normal) = morph_normals.get(target) {
                entry["NORMAL"] = json!(normal);
            }
            entry
        })
        .collect::<Vec<_>>();
    let target_names = mesh
        .shape_keys
        .iter()
        .skip(1)
        .map(|shape| shape.name.as_str())
        .collect::<Vec<_>>();

    primitive_materials
        .iter()
        .zip(index_accessors)
        .filter_map(|(material, accessor)| {
            let accessor = accessor?;
            let mut primitive = json!({
                "mode": TRIANGLES,
                "material": material,
                "indices": accessor,
                "attributes": attributes,
            });
            if !targets.is_empty() {
                primitive["targets"] = json!(targets);
                primitive["extras"] = json!({ "targetNames": target_names });
            }
            Some(primitive)
        })
        .collect()
}

/// Node translation and parent of a mesh node.
///
/// Skinned meshes sit at the origin of the scene. Attached meshes hang under
/// their bone node, offset from the bone head.
fn mesh_node_placement(
    mesh: &MeshObject,
    inputs: &MeshInputs<'_>,
    context: &mut ExportContext,
) -> ([f64; 3], Option<usize>) {
    if mesh.is_skinned() {
        return ([0.0; 3], None);
    }
    let bone_name = mesh.parent_bone.as_deref().unwrap_or_default();
    match inputs.skeleton.node_index(bone_name) {
        Some(node) => {
            let head = inputs.armature.bones[node].head_local;
            let offset = [
                mesh.location[0] - head[0],
                mesh.location[1] - head[1],
                mesh.location[2] - head[2],
            ];
            (to_gltf_axes(offset), Some(node))
        }
        None => {
            context.warn(
                "UNKNOWN_PARENT_BONE",
                format!(
                    "Mesh '{}' is attached to unknown bone '{}'; it is placed at the scene root",
                    mesh.name, bone_name
                ),
            );
            (to_gltf_axes(mesh.location), None)
        }
    }
}
