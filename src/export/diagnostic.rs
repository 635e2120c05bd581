use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value;

use super::types::ExportReport;

// ─── Diagnostic structs ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub(super) struct SkinDiagnostic {
    skin_index: usize,
    skeleton_name: Option<String>,
    joint_names: Vec<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct MeshNodeDiagnostic {
    node_index: usize,
    node_name: Option<String>,
    mesh_index: usize,
    skin_index: Option<usize>,
    primitive_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct ExportDiagnosticLog<'a> {
    exported_at: Timestamp,
    output_path: String,
    extensions_used: Vec<String>,
    scene_roots: Vec<usize>,
    mesh_nodes: Vec<MeshNodeDiagnostic>,
    skins: Vec<SkinDiagnostic>,
    report: &'a ExportReport,
}

// ─── Path helper ──────────────────────────────────────────────────────────────

pub(super) fn diagnostic_log_path_for_output(output_path: &Path) -> PathBuf {
    output_path.with_extension("diagnostic.json")
}

// ─── Collection ───────────────────────────────────────────────────────────────

fn node_name(nodes: &[Value], index: usize) -> Option<String> {
    nodes
        .get(index)
        .and_then(|node| node.get("name"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

fn as_index(value: &Value) -> Option<usize> {
    value.as_u64().map(|v| v as usize)
}

fn collect_skin_diagnostics(json: &Value, nodes: &[Value]) -> Vec<SkinDiagnostic> {
    let Some(skins) = json.get("skins").and_then(Value::as_array) else {
        return Vec::new();
    };
    skins
        .iter()
        .enumerate()
        .map(|(skin_index, skin)| SkinDiagnostic {
            skin_index,
            skeleton_name: skin
                .get("skeleton")
                .and_then(as_index)
                .and_then(|index| node_name(nodes, index)),
            joint_names: skin
                .get("joints")
                .and_then(Value::as_array)
                .map(|joints| {
                    joints
                        .iter()
                        .map(|joint| as_index(joint).and_then(|index| node_name(nodes, index)))
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

fn collect_mesh_node_diagnostics(json: &Value, nodes: &[Value]) -> Vec<MeshNodeDiagnostic> {
    nodes
        .iter()
        .enumerate()
        .filter_map(|(node_index, node)| {
            let mesh_index = node.get("mesh").and_then(as_index)?;
            let primitive_count = json["meshes"][mesh_index]["primitives"]
                .as_array()
                .map_or(0, Vec::len);
            Some(MeshNodeDiagnostic {
                node_index,
                node_name: node_name(nodes, node_index),
                mesh_index,
                skin_index: node.get("skin").and_then(as_index),
                primitive_count,
            })
        })
        .collect()
}

// ─── Diagnostic writer ────────────────────────────────────────────────────────

/// Write a JSON summary of the exported document next to the output file.
pub(super) fn write_export_diagnostic_log(
    diagnostic_path: &Path,
    output_path: &Path,
    json: &Value,
    report: &ExportReport,
) -> Result<()> {
    let nodes = json
        .get("nodes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let log = ExportDiagnosticLog {
        exported_at: Timestamp::now(),
        output_path: output_path.display().to_string(),
        extensions_used: json
            .get("extensionsUsed")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default(),
        scene_roots: json["scenes"][0]["nodes"]
            .as_array()
            .map(|roots| roots.iter().filter_map(as_index).collect())
            .unwrap_or_default(),
        mesh_nodes: collect_mesh_node_diagnostics(json, &nodes),
        skins: collect_skin_diagnostics(json, &nodes),
        report,
    };

    let content = serde_json::to_string_pretty(&log)
        .context("failed to serialize export diagnostic log as JSON")?;
    fs::write(diagnostic_path, content).with_context(|| {
        format!(
            "failed to write export diagnostic log: {}",
            diagnostic_path.display()
        )
    })?;
    Ok(())
}
