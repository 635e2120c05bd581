//! Reverse path: read a written VRM back for inspection and debugging.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use gltf::Gltf;
use serde::Serialize;
use serde_json::Value;

use crate::container;

/// Summary of a VRM container.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    /// `VRM` or `VRMC_vrm`, whichever extension the document carries.
    pub vrm_extension: Option<String>,
    pub spec_version: Option<String>,
    pub generator: Option<String>,
    pub extensions_used: Vec<String>,
    pub node_count: usize,
    pub mesh_count: usize,
    pub material_count: usize,
    pub skin_count: usize,
    pub image_count: usize,
    pub binary_length: usize,
}

/// Summarize a container held in memory.
pub fn inspect_bytes(bytes: &[u8]) -> Result<InspectReport> {
    let (json, binary) = container::decode(bytes).context("input is not a VRM container")?;
    let gltf = Gltf::from_slice_without_validation(bytes)
        .context("failed to read glTF document from VRM")?;
    let document = &gltf.document;

    let vrm_extension = ["VRM", "VRMC_vrm"]
        .into_iter()
        .find(|name| json["extensions"].get(*name).is_some())
        .map(ToOwned::to_owned);
    let spec_version = vrm_extension
        .as_deref()
        .and_then(|name| json["extensions"][name]["specVersion"].as_str())
        .map(ToOwned::to_owned);

    Ok(InspectReport {
        vrm_extension,
        spec_version,
        generator: json["asset"]["generator"].as_str().map(ToOwned::to_owned),
        extensions_used: json["extensionsUsed"]
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default(),
        node_count: document.nodes().count(),
        mesh_count: document.meshes().count(),
        material_count: document.materials().count(),
        skin_count: document.skins().count(),
        image_count: document.images().count(),
        binary_length: binary.len(),
    })
}

/// Summarize a VRM file on disk.
pub fn inspect_vrm(input_path: &Path) -> Result<InspectReport> {
    let bytes = fs::read(input_path)
        .with_context(|| format!("failed to read input file: {}", input_path.display()))?;
    inspect_bytes(&bytes)
}

/// Dump the JSON chunk of a VRM as pretty-printed `vrm.json`.
///
/// Defaults to a `ripped/` directory next to the input.
pub fn rip_vrm(input_path: &Path, output_dir: Option<&Path>) -> Result<PathBuf> {
    let bytes = fs::read(input_path)
        .with_context(|| format!("failed to read input file: {}", input_path.display()))?;
    let (json, _) = container::decode(&bytes).context("input is not a VRM container")?;

    let output_dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
            .join("ripped"),
    };
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create directory: {}", output_dir.display()))?;

    let output_path = output_dir.join("vrm.json");
    let content = serde_json::to_string_pretty(&json).context("failed to format VRM JSON")?;
    fs::write(&output_path, content)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_container() -> Vec<u8> {
        let document = json!({
            "asset": {"version": "2.0", "generator": "test"},
            "extensionsUsed": ["VRMC_vrm"],
            "extensions": {"VRMC_vrm": {"specVersion": "1.0"}},
            "scenes": [{"nodes": [0]}],
            "nodes": [{"name": "root"}],
            "buffers": [{"byteLength": 4}]
        });
        container::encode(&document, &[1, 2, 3, 4]).expect("encode")
    }

    #[test]
    fn given_container_when_inspecting_then_schema_and_counts_are_reported() {
        let report = inspect_bytes(&sample_container()).expect("inspect");

        assert_eq!(report.vrm_extension.as_deref(), Some("VRMC_vrm"));
        assert_eq!(report.spec_version.as_deref(), Some("1.0"));
        assert_eq!(report.generator.as_deref(), Some("test"));
        assert_eq!(report.extensions_used, vec!["VRMC_vrm".to_string()]);
        assert_eq!(report.node_count, 1);
        assert_eq!(report.mesh_count, 0);
        assert_eq!(report.binary_length, 4);
    }

    #[test]
    fn given_vrm_file_when_ripping_then_pretty_json_lands_in_ripped_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("avatar.vrm");
        fs::write(&input, sample_container()).expect("write");

        let output = rip_vrm(&input, None).expect("rip");

        assert_eq!(output, dir.path().join("ripped").join("vrm.json"));
        let content = fs::read_to_string(&output).expect("read");
        assert!(content.contains("\n  \"asset\""));
        let json: Value = serde_json::from_str(&content).expect("json");
        let first_key = json.as_object().and_then(|object| object.keys().next().cloned());
        assert_eq!(first_key.as_deref(), Some("asset"));
    }

    #[test]
    fn given_garbage_bytes_when_inspecting_then_error_is_returned() {
        assert!(inspect_bytes(b"not a container").is_err());
    }
}
