use std::collections::HashMap;

use serde_json::{Map, Value, json};

use super::ExportContext;
use super::geometry::to_gltf_axes;
use super::material::TextureRegistry;
use super::skeleton::Skeleton;
use super::types::{
    EXPORTER_NAME, GL_LINEAR, GL_REPEAT, LEGACY_METAS, LEGACY_REQUIRED_METAS, VrmVersion,
    human_bone_roles,
};
use crate::error::ExportError;
use crate::scene::{EmptyObject, SceneSnapshot};

/// Everything the avatar block reads from the already assembled document.
pub(crate) struct AvatarInputs<'a> {
    pub(crate) version: VrmVersion,
    /// Schema version string as requested, written to `specVersion`.
    pub(crate) spec_version: &'a str,
    pub(crate) scene: &'a SceneSnapshot,
    /// Collider empties that passed the export filter.
    pub(crate) empties: &'a [&'a EmptyObject],
    pub(crate) skeleton: &'a Skeleton,
    pub(crate) meshes: &'a [Value],
    pub(crate) materials: &'a [Value],
    pub(crate) image_index: &'a HashMap<String, usize>,
}

fn index_by_name(entries: &[Value], name: &str) -> Option<usize> {
    entries
        .iter()
        .position(|entry| entry["name"].as_str() == Some(name))
}

// ─── Metadata text blobs ──────────────────────────────────────────────────────

fn metadata_blob(
    scene: &SceneSnapshot,
    key: &'static str,
    reference: Option<&str>,
) -> Result<Option<(String, Value)>, ExportError> {
    let Some(name) = reference else {
        return Ok(None);
    };
    let text = scene
        .text(name)
        .ok_or_else(|| ExportError::MissingMetadataText {
            key,
            text: name.to_string(),
        })?;
    let value = serde_json::from_str(&text.body).map_err(|source| {
        ExportError::InvalidMetadataJson {
            text: name.to_string(),
            source,
        }
    })?;
    Ok(Some((name.to_string(), value)))
}

/// Parse a text blob holding a JSON object; an absent reference is `{}`.
fn object_blob(
    scene: &SceneSnapshot,
    key: &'static str,
    reference: Option<&str>,
) -> Result<Map<String, Value>, ExportError> {
    match metadata_blob(scene, key, reference)? {
        None => Ok(Map::new()),
        Some((_, Value::Object(object))) => Ok(object),
        Some((text, _)) => Err(ExportError::InvalidMetadataShape {
            text,
            reason: "expected a JSON object",
        }),
    }
}

/// Parse a text blob holding a JSON array of objects; an absent reference is `[]`.
fn object_list_blob(
    scene: &SceneSnapshot,
    key: &'static str,
    reference: Option<&str>,
) -> Result<Vec<Map<String, Value>>, ExportError> {
    let Some((text, value)) = metadata_blob(scene, key, reference)? else {
        return Ok(Vec::new());
    };
    let shape_error = || ExportError::InvalidMetadataShape {
        text: text.clone(),
        reason: "expected a JSON array of objects",
    };
    let Value::Array(entries) = value else {
        return Err(shape_error());
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::Object(object) => Ok(object),
            _ => Err(shape_error()),
        })
        .collect()
}

// ─── Sections ─────────────────────────────────────────────────────────────────

fn build_meta(inputs: &AvatarInputs<'_>, registry: &mut TextureRegistry) -> Map<String, Value> {
    let properties = &inputs.scene.armature.properties;
    let mut meta = Map::new();
    if inputs.version.is_legacy() {
        for (key, default) in LEGACY_REQUIRED_METAS {
            let value = properties.get(key).cloned().unwrap_or_else(|| json!(default));
            meta.insert(key.to_string(), value);
        }
        for key in LEGACY_METAS {
            let value = properties.get(key).cloned().unwrap_or_else(|| json!(""));
            meta.insert(key.to_string(), value);
        }
    }

    let thumbnail = inputs
        .scene
        .armature
        .texture
        .as_ref()
        .and_then(|name| inputs.image_index.get(name));
    if let Some(image) = thumbnail {
        let texture = registry.texture_index(*image, GL_REPEAT, GL_LINEAR);
        meta.insert("texture".to_string(), json!(texture));
    }
    meta
}

fn build_humanoid(
    inputs: &AvatarInputs<'_>,
    context: &mut ExportContext,
) -> Result<Value, ExportError> {
    let armature = &inputs.scene.armature;
    let mut resolved = Vec::new();
    for role in human_bone_roles() {
        let Some(bone) = armature.humanoid.get(role).filter(|bone| !bone.is_empty()) else {
            continue;
        };
        match inputs.skeleton.node_index(bone) {
            Some(node) => resolved.push((role, node)),
            None => context.warn(
                "UNRESOLVED_HUMAN_BONE",
                format!("Humanoid bone '{role}' maps to unknown bone '{bone}'"),
            ),
        }
    }

    if !inputs.version.is_legacy() {
        let bones = resolved
            .into_iter()
            .map(|(role, node)| (role.to_string(), json!({ "node": node })))
            .collect::<Map<_, _>>();
        return Ok(json!({ "humanBones": bones }));
    }

    let bones = resolved
        .into_iter()
        .map(|(role, node)| json!({ "bone": role, "node": node, "useDefaultValues": true }))
        .collect::<Vec<_>>();
    let mut humanoid = Map::new();
    humanoid.insert("humanBones".to_string(), json!(bones));
    let params = object_blob(
        inputs.scene,
        "humanoid_params",
        armature.metadata_texts.humanoid_params.as_deref(),
    )?;
    humanoid.extend(params);
    Ok(Value::Object(humanoid))
}

fn build_first_person(
    inputs: &AvatarInputs<'_>,
    context: &mut ExportContext,
) -> Result<Value, ExportError> {
    let mut first_person = object_blob(
        inputs.scene,
        "first_person_params",
        inputs
            .scene
            .armature
            .metadata_texts
            .first_person_params
            .as_deref(),
    )?;

    if let Some(bone) = first_person.get("firstPersonBone").and_then(Value::as_str) {
        let node = match inputs.skeleton.node_index(bone) {
            Some(node) => json!(node),
            None => {
                context.warn(
                    "UNRESOLVED_FIRST_PERSON_BONE",
                    format!("First person bone '{bone}' does not exist; it is left unset"),
                );
                json!(-1)
            }
        };
        first_person.insert("firstPersonBone".to_string(), node);
    }

    if let Some(Value::Array(annotations)) = first_person.get_mut("meshAnnotations") {
        annotations.retain_mut(|annotation| {
            let Some(name) = annotation["mesh"].as_str() else {
                return true;
            };
            match index_by_name(inputs.meshes, name) {
                Some(mesh) => {
                    annotation["mesh"] = json!(mesh);
                    true
                }
                None => {
                    context.warn(
                        "UNRESOLVED_MESH_ANNOTATION",
                        format!("First person annotation names unknown mesh '{name}'"),
                    );
                    false
                }
            }
        });
    }
    Ok(Value::Object(first_person))
}

fn clamp_bind_weight(weight: f64, max: f64, context: &mut ExportContext) -> f64 {
    if (0.0..=max).contains(&weight) {
        return weight;
    }
    context.warn(
        "BLEND_SHAPE_WEIGHT_CLAMPED",
        format!("Blend shape bind weight {weight} is outside 0..={max} and was clamped"),
    );
    weight.clamp(0.0, max)
}

/// Resolve one bind's mesh and morph target names; `None` drops the bind.
fn resolve_bind(
    mut bind: Value,
    inputs: &AvatarInputs<'_>,
    context: &mut ExportContext,
) -> Option<Value> {
    let mesh_name = bind["mesh"].as_str().unwrap_or_default().to_string();
    let Some(mesh) = index_by_name(inputs.meshes, &mesh_name) else {
        context.warn(
            "UNRESOLVED_BLEND_SHAPE_BIND",
            format!("Blend shape bind names unknown mesh '{mesh_name}'"),
        );
        return None;
    };

    let target_name = bind["index"].as_str().unwrap_or_default().to_string();
    let target = inputs.meshes[mesh]["primitives"][0]["extras"]["targetNames"]
        .as_array()
        .and_then(|names| {
            names
                .iter()
                .position(|name| name.as_str() == Some(target_name.as_str()))
        });
    let Some(target) = target else {
        context.warn(
            "UNRESOLVED_BLEND_SHAPE_BIND",
            format!("Mesh '{mesh_name}' has no morph target named '{target_name}'"),
        );
        return None;
    };

    bind["mesh"] = json!(mesh);
    bind["index"] = json!(target);
    if let Some(weight) = bind["weight"].as_f64() {
        let weight = if inputs.version.is_legacy() {
            clamp_bind_weight(weight * 100.0, 100.0, context)
        } else {
            clamp_bind_weight(weight, 1.0, context)
        };
        bind["weight"] = json!(weight);
    }
    Some(bind)
}

fn build_blend_shapes(
    inputs: &AvatarInputs<'_>,
    context: &mut ExportContext,
) -> Result<Value, ExportError> {
    let mut groups = object_list_blob(
        inputs.scene,
        "blendshape_group",
        inputs
            .scene
            .armature
            .metadata_texts
            .blendshape_group
            .as_deref(),
    )?;

    for group in &mut groups {
        if let Some(Value::Array(binds)) = group.get_mut("binds") {
            *binds = std::mem::take(binds)
                .into_iter()
                .filter_map(|bind| resolve_bind(bind, inputs, context))
                .collect();
        }

        if inputs.version.is_legacy() {
            continue;
        }
        if let Some(Value::Array(values)) = group.get_mut("materialValues") {
            values.retain_mut(|value| {
                let Some(name) = value["material"].as_str() else {
                    return true;
                };
                match index_by_name(inputs.materials, name) {
                    Some(material) => {
                        value["material"] = json!(material);
                        true
                    }
                    None => {
                        context.warn(
                            "UNRESOLVED_MATERIAL_VALUE",
                            format!("Blend shape material value names unknown material '{name}'"),
                        );
                        false
                    }
                }
            });
        }
    }
    Ok(json!({ "blendShapeGroups": groups }))
}

fn collider_entry(version: VrmVersion, offset: [f64; 3], size: f64) -> Value {
    let offset = to_gltf_axes(offset);
    if version.is_legacy() {
        json!({
            "radius": size,
            "offset": {"x": offset[0], "y": offset[1], "z": -offset[2]},
        })
    } else {
        json!({
            "size": [size],
            "offset": offset,
            "shapeType": "sphere",
        })
    }
}

fn build_spring_bones(
    inputs: &AvatarInputs<'_>,
    context: &mut ExportContext,
) -> Result<Value, ExportError> {
    let armature = &inputs.scene.armature;

    // Collider groups keyed by owning bone node, in first-appearance order.
    let mut groups: Vec<(usize, Vec<Value>)> = Vec::new();
    for empty in inputs.empties {
        let bone = empty.parent_bone.as_deref().unwrap_or_default();
        let Some(node) = inputs.skeleton.node_index(bone) else {
            context.warn(
                "UNRESOLVED_COLLIDER_BONE",
                format!("Collider '{}' is parented to unknown bone '{bone}'", empty.name),
            );
            continue;
        };
        let head = armature.bones[node].head_local;
        let offset = [0, 1, 2].map(|axis| {
            empty.world_location[axis] - armature.location[axis] - head[axis]
        });
        let collider = collider_entry(inputs.version, offset, empty.display_size);
        match groups.iter_mut().find(|(group_node, _)| *group_node == node) {
            Some((_, colliders)) => colliders.push(collider),
            None => groups.push((node, vec![collider])),
        }
    }
    let collider_nodes = groups.iter().map(|(node, _)| *node).collect::<Vec<_>>();

    let mut bone_groups = object_list_blob(
        inputs.scene,
        "spring_bone",
        armature.metadata_texts.spring_bone.as_deref(),
    )?;
    for bone_group in &mut bone_groups {
        if let Some(Value::Array(bones)) = bone_group.get("bones") {
            let nodes = bones
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|name| {
                    let node = inputs.skeleton.node_index(name);
                    if node.is_none() {
                        context.warn(
                            "UNRESOLVED_SPRING_BONE",
                            format!("Spring bone group names unknown bone '{name}'"),
                        );
                    }
                    node
                })
                .collect::<Vec<_>>();
            bone_group.insert("bones".to_string(), json!(nodes));
        }

        if let Some(Value::Array(names)) = bone_group.get("colliderGroups") {
            let indices = names
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|name| {
                    let index = inputs
                        .skeleton
                        .node_index(name)
                        .and_then(|node| collider_nodes.iter().position(|n| *n == node));
                    if index.is_none() {
                        context.warn(
                            "UNRESOLVED_COLLIDER_GROUP",
                            format!("Spring bone group names bone '{name}' which owns no colliders"),
                        );
                    }
                    index
                })
                .collect::<Vec<_>>();
            bone_group.insert("colliderGroups".to_string(), json!(indices));
        }
    }

    let collider_groups = groups
        .into_iter()
        .map(|(node, colliders)| json!({ "node": node, "colliders": colliders }))
        .collect::<Vec<_>>();
    Ok(json!({
        "boneGroups": bone_groups,
        "colliderGroups": collider_groups,
    }))
}

// ─── Assembly ─────────────────────────────────────────────────────────────────

/// Build the avatar extension members in document order.
pub(crate) fn build_avatar_extension(
    inputs: &AvatarInputs<'_>,
    registry: &mut TextureRegistry,
    context: &mut ExportContext,
) -> Result<Map<String, Value>, ExportError> {
    let legacy = inputs.version.is_legacy();
    let mut extension = Map::new();

    if legacy {
        extension.insert("exporterVersion".to_string(), json!(EXPORTER_NAME));
    }
    extension.insert("specVersion".to_string(), json!(inputs.spec_version));
    extension.insert(
        "meta".to_string(),
        Value::Object(build_meta(inputs, registry)),
    );
    extension.insert(
        "humanoid".to_string(),
        build_humanoid(inputs, context)?,
    );
    extension.insert(
        "firstPerson".to_string(),
        build_first_person(inputs, context)?,
    );
    if !legacy {
        let look_at = object_blob(
            inputs.scene,
            "look_at_params",
            inputs.scene.armature.metadata_texts.look_at_params.as_deref(),
        )?;
        extension.insert("lookAt".to_string(), Value::Object(look_at));
    }

    let blend_shape_key = if legacy { "blendShapeMaster" } else { "blendShape" };
    extension.insert(
        blend_shape_key.to_string(),
        build_blend_shapes(inputs, context)?,
    );

    let spring_bone_key = if legacy { "secondaryAnimation" } else { "springBone" };
    extension.insert(
        spring_bone_key.to_string(),
        build_spring_bones(inputs, context)?,
    );
    Ok(extension)
}
