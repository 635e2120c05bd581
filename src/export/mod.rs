mod avatar;
mod diagnostic;
mod geometry;
mod material;
mod mesh;
mod packer;
mod skeleton;
mod skinning;
mod types;

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};

use crate::container;
use crate::error::ExportError;
use crate::logging::ResultExt;
use crate::scene::{EmptyObject, ImageAsset, Material, MeshObject, SceneSnapshot};

// Re-export public types for callers of this module.
pub use skinning::normalize_weights;
pub use types::{
    EXPORTER_NAME, ExportOptions, ExportReport, OPTIONAL_HUMAN_BONES, REQUIRED_HUMAN_BONES,
    Severity, ValidationIssue, VrmVersion, load_export_options, save_export_options,
};

use avatar::{AvatarInputs, build_avatar_extension};
use diagnostic::{diagnostic_log_path_for_output, write_export_diagnostic_log};
use material::{MaterialTranslator, ShaderKind, TextureRegistry, linked_images};
use mesh::{MeshInputs, translate_mesh};
use packer::BinaryPacker;
use skeleton::translate_skeleton;

// ─── Export context ───────────────────────────────────────────────────────────

/// Per-export state collecting recoverable issues.
#[derive(Debug, Default)]
pub(crate) struct ExportContext {
    pub(crate) issues: Vec<ValidationIssue>,
}

impl ExportContext {
    pub(crate) fn warn(&mut self, code: &str, message: String) {
        crate::log_warn!("[{}] {}", code, message);
        self.issues.push(ValidationIssue {
            severity: Severity::Warning,
            code: code.to_string(),
            message,
        });
    }
}

/// Result of a successful in-memory export.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Complete GLB container.
    pub bytes: Vec<u8>,
    /// glTF document embedded in the container.
    pub json: Value,
    pub report: ExportReport,
}

// ─── Selection ────────────────────────────────────────────────────────────────

fn select_meshes<'a>(scene: &'a SceneSnapshot, options: &ExportOptions) -> Vec<&'a MeshObject> {
    scene
        .meshes
        .iter()
        .filter(|mesh| options.includes(mesh.visible, mesh.selected))
        .collect()
}

fn select_collider_empties<'a>(
    scene: &'a SceneSnapshot,
    options: &ExportOptions,
) -> Vec<&'a EmptyObject> {
    scene
        .empties
        .iter()
        .filter(|empty| empty.parent_bone.is_some())
        .filter(|empty| options.includes(empty.visible, empty.selected))
        .collect()
}

/// Distinct materials of the exported meshes, in first-appearance order.
fn collect_materials<'a>(
    scene: &'a SceneSnapshot,
    meshes: &[&MeshObject],
) -> Result<Vec<&'a Material>, ExportError> {
    let mut materials: Vec<&Material> = Vec::new();
    for mesh in meshes {
        for name in &mesh.material_slots {
            if materials.iter().any(|material| &material.name == name) {
                continue;
            }
            let material = scene
                .material(name)
                .ok_or_else(|| ExportError::MissingMaterial {
                    mesh: mesh.name.clone(),
                    material: name.clone(),
                })?;
            ShaderKind::classify(material)?;
            materials.push(material);
        }
    }
    Ok(materials)
}

/// Images linked by the exported materials plus the thumbnail, ordered by
/// their position in the scene's image list.
fn collect_images<'a>(
    scene: &'a SceneSnapshot,
    materials: &[&Material],
) -> Result<Vec<&'a ImageAsset>, ExportError> {
    let mut used: Vec<(usize, &ImageAsset)> = Vec::new();
    let mut request = |owner: &str, name: &str| -> Result<(), ExportError> {
        if used.iter().any(|(_, image)| image.name == name) {
            return Ok(());
        }
        let position = scene
            .images
            .iter()
            .position(|image| image.name == name)
            .ok_or_else(|| ExportError::MissingImage {
                owner: owner.to_string(),
                image: name.to_string(),
            })?;
        used.push((position, &scene.images[position]));
        Ok(())
    };

    for material in materials {
        for image in linked_images(material)? {
            request(&material.name, image)?;
        }
    }
    if let Some(thumbnail) = scene.armature.texture.as_deref() {
        request(&scene.armature.name, thumbnail)?;
    }

    used.sort_by_key(|(position, _)| *position);
    Ok(used.into_iter().map(|(_, image)| image).collect())
}

/// MIME type from the host file format, else sniffed from the encoded bytes.
fn image_mime_type(image: &ImageAsset) -> Result<String, ExportError> {
    if let Some(format) = image.file_format.as_deref().filter(|format| !format.is_empty()) {
        return Ok(format!("image/{}", format.to_lowercase()));
    }
    let format = image::guess_format(&image.data).map_err(|error| ExportError::InvalidImage {
        image: image.name.clone(),
        reason: error.to_string(),
    })?;
    Ok(format.to_mime_type().to_string())
}

// ─── Public API ───────────────────────────────────────────────────────────────

/// Serialize a scene snapshot into a VRM container in memory.
///
/// Fatal conditions return an [`ExportError`] before any output exists;
/// recoverable ones are collected in the report's `issues`.
pub fn export_vrm(
    scene: &SceneSnapshot,
    options: &ExportOptions,
) -> Result<ExportOutput, ExportError> {
    let version = VrmVersion::parse(options.vrm_version.as_deref())?;
    let spec_version = options.vrm_version.clone().unwrap_or_default();
    let mut context = ExportContext::default();

    let meshes = select_meshes(scene, options);
    let empties = select_collider_empties(scene, options);
    let materials = collect_materials(scene, &meshes)?;
    let images = collect_images(scene, &materials)?;
    crate::log_debug!(
        "Exporting {} mesh(es), {} material(s), {} image(s), {} collider(s)",
        meshes.len(),
        materials.len(),
        images.len(),
        empties.len()
    );

    let mut packer = BinaryPacker::new();
    let mut image_index = HashMap::with_capacity(images.len());
    for image in &images {
        let mime_type = image_mime_type(image)?;
        let index = packer.add_image(&image.name, &mime_type, &image.data);
        image_index.insert(image.name.clone(), index);
    }

    let skeleton = translate_skeleton(&scene.armature, &mut packer)?;

    let mut registry = TextureRegistry::default();
    let mut material_entries = Vec::with_capacity(materials.len());
    let mut legacy_material_entries = Vec::with_capacity(materials.len());
    let mut material_index = HashMap::with_capacity(materials.len());
    {
        let mut translator = MaterialTranslator {
            version,
            image_index: &image_index,
            registry: &mut registry,
        };
        for material in &materials {
            let translated = translator.translate(material)?;
            material_index.insert(material.name.clone(), material_entries.len());
            material_entries.push(translated.core);
            legacy_material_entries.push(translated.legacy);
        }
    }

    let mut nodes = skeleton.nodes.clone();
    let mut scene_roots = skeleton.scene_roots.clone();
    let mut mesh_entries = Vec::with_capacity(meshes.len());
    let mut total_vertices = 0;
    let mut total_triangles = 0;
    let mesh_inputs = MeshInputs {
        version,
        armature: &scene.armature,
        skeleton: &skeleton,
        material_index: &material_index,
    };
    for mesh in &meshes {
        let Some(translated) = translate_mesh(
            mesh,
            mesh_entries.len(),
            &mesh_inputs,
            &mut packer,
            &mut context,
        )?
        else {
            continue;
        };
        let node_index = nodes.len();
        nodes.push(translated.node);
        match translated.parent_node {
            Some(parent) => attach_child(&mut nodes[parent], node_index),
            None => scene_roots.push(node_index),
        }
        mesh_entries.push(translated.mesh);
        total_vertices += translated.vertex_count;
        total_triangles += translated.triangle_count;
    }

    let avatar = build_avatar_extension(
        &AvatarInputs {
            version,
            spec_version: &spec_version,
            scene,
            empties: &empties,
            skeleton: &skeleton,
            meshes: &mesh_entries,
            materials: &material_entries,
            image_index: &image_index,
        },
        &mut registry,
        &mut context,
    )?;

    // Attachment point for secondary animation.
    scene_roots.push(nodes.len());
    nodes.push(json!({
        "name": "secondary",
        "translation": [0.0, 0.0, 0.0],
        "rotation": [0.0, 0.0, 0.0, 1.0],
        "scale": [1.0, 1.0, 1.0],
    }));

    let mut extension = Map::new();
    if version.is_legacy() {
        extension.insert(
            "materialProperties".to_string(),
            json!(legacy_material_entries),
        );
    }
    extension.extend(avatar);
    let mut extensions = Map::new();
    extensions.insert(
        version.extension_name().to_string(),
        Value::Object(extension),
    );

    let samplers = registry.samplers_json();
    let textures = registry.textures_json();
    let packed = packer.finish();

    let mut document = Map::new();
    document.insert("scenes".to_string(), json!([{ "nodes": scene_roots }]));
    document.insert("nodes".to_string(), json!(nodes));
    document.insert("skins".to_string(), json!(skeleton.skins));
    if !samplers.is_empty() {
        document.insert("samplers".to_string(), json!(samplers));
    }
    if !textures.is_empty() {
        document.insert("textures".to_string(), json!(textures));
    }
    document.insert("materials".to_string(), json!(material_entries));
    document.insert("extensions".to_string(), Value::Object(extensions));
    document.insert("meshes".to_string(), json!(mesh_entries));
    document.insert("scene".to_string(), json!(0));
    document.insert(
        "extensionsUsed".to_string(),
        json!(version.extensions_used()),
    );
    document.insert(
        "asset".to_string(),
        json!({ "generator": EXPORTER_NAME, "version": "2.0" }),
    );
    if !packed.images.is_empty() {
        document.insert("images".to_string(), json!(packed.images));
    }
    document.insert("bufferViews".to_string(), json!(packed.buffer_views));
    document.insert("accessors".to_string(), json!(packed.accessors));
    document.insert("buffers".to_string(), json!(packed.buffers));
    let document = Value::Object(document);

    let bytes = container::encode(&document, &packed.blob)?;
    let report = ExportReport {
        vrm_version: spec_version,
        node_count: nodes.len(),
        mesh_count: mesh_entries.len(),
        material_count: material_entries.len(),
        skin_count: skeleton.skins.len(),
        image_count: packed.images.len(),
        total_vertices,
        total_triangles,
        binary_length: packed.blob.len(),
        issues: context.issues,
    };
    crate::log_info!(
        "Exported VRM {}: {} node(s), {} mesh(es), {} bytes, {} issue(s)",
        report.vrm_version,
        report.node_count,
        report.mesh_count,
        bytes.len(),
        report.issues.len()
    );

    Ok(ExportOutput {
        bytes,
        json: document,
        report,
    })
}

fn attach_child(parent: &mut Value, child: usize) {
    if parent.get("children").is_none() {
        parent["children"] = json!([]);
    }
    if let Some(children) = parent["children"].as_array_mut() {
        children.push(json!(child));
    }
}

/// Export a scene and write the container plus a diagnostic log next to it.
///
/// Nothing is written when the export itself fails.
pub fn write_vrm(
    scene: &SceneSnapshot,
    options: &ExportOptions,
    output_path: &Path,
) -> Result<ExportReport> {
    let output = export_vrm(scene, options).log_error(Some("VRM export failed"))?;

    fs::write(output_path, &output.bytes)
        .with_context(|| format!("failed to write output file: {}", output_path.display()))?;

    let diagnostic_path = diagnostic_log_path_for_output(output_path);
    write_export_diagnostic_log(&diagnostic_path, output_path, &output.json, &output.report)?;

    Ok(output.report)
}
