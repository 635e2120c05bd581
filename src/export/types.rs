use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ExportError;

// ─── glTF constants ───────────────────────────────────────────────────────────

pub(crate) const GL_FLOAT: u32 = 5126;
pub(crate) const GL_UNSIGNED_INT: u32 = 5125;
pub(crate) const GL_UNSIGNED_SHORT: u32 = 5123;

pub(crate) const GL_NEAREST: u32 = 9728;
pub(crate) const GL_LINEAR: u32 = 9729;
pub(crate) const GL_REPEAT: u32 = 10497;
pub(crate) const GL_CLAMP_TO_EDGE: u32 = 33071;

/// Value written to `asset.generator` and the legacy `exporterVersion`.
pub const EXPORTER_NAME: &str = concat!("vrm_exporter_", env!("CARGO_PKG_VERSION"));

// ─── Humanoid bone tables ─────────────────────────────────────────────────────

/// Humanoid roles every VRM avatar must map.
pub const REQUIRED_HUMAN_BONES: [&str; 17] = [
    "hips",
    "spine",
    "chest",
    "neck",
    "head",
    "leftUpperLeg",
    "leftLowerLeg",
    "leftFoot",
    "rightUpperLeg",
    "rightLowerLeg",
    "rightFoot",
    "leftUpperArm",
    "leftLowerArm",
    "leftHand",
    "rightUpperArm",
    "rightLowerArm",
    "rightHand",
];

/// Optional humanoid roles (eyes, jaw, toes, shoulders and fingers).
pub const OPTIONAL_HUMAN_BONES: [&str; 38] = [
    "leftEye",
    "rightEye",
    "upperChest",
    "jaw",
    "leftToes",
    "rightToes",
    "leftShoulder",
    "leftThumbProximal",
    "leftThumbIntermediate",
    "leftThumbDistal",
    "leftIndexProximal",
    "leftIndexIntermediate",
    "leftIndexDistal",
    "leftMiddleProximal",
    "leftMiddleIntermediate",
    "leftMiddleDistal",
    "leftRingProximal",
    "leftRingIntermediate",
    "leftRingDistal",
    "leftLittleProximal",
    "leftLittleIntermediate",
    "leftLittleDistal",
    "rightShoulder",
    "rightThumbProximal",
    "rightThumbIntermediate",
    "rightThumbDistal",
    "rightIndexProximal",
    "rightIndexIntermediate",
    "rightIndexDistal",
    "rightMiddleProximal",
    "rightMiddleIntermediate",
    "rightMiddleDistal",
    "rightRingProximal",
    "rightRingIntermediate",
    "rightRingDistal",
    "rightLittleProximal",
    "rightLittleIntermediate",
    "rightLittleDistal",
];

/// All humanoid roles in export order.
pub(crate) fn human_bone_roles() -> impl Iterator<Item = &'static str> {
    REQUIRED_HUMAN_BONES
        .iter()
        .chain(OPTIONAL_HUMAN_BONES.iter())
        .copied()
}

// ─── VRM meta defaults ────────────────────────────────────────────────────────

/// Legacy license metas with the most restrictive defaults.
pub(crate) const LEGACY_REQUIRED_METAS: [(&str, &str); 5] = [
    ("allowedUserName", "OnlyAuthor"),
    ("violentUssageName", "Disallow"),
    ("sexualUssageName", "Disallow"),
    ("commercialUssageName", "Disallow"),
    ("licenseName", "Redistribution_Prohibited"),
];

/// Legacy descriptive metas, defaulting to an empty string.
pub(crate) const LEGACY_METAS: [&str; 7] = [
    "version",
    "author",
    "contactInformation",
    "reference",
    "title",
    "otherPermissionUrl",
    "otherLicenseUrl",
];

// ─── Public types ─────────────────────────────────────────────────────────────

/// Export options shared by the CLI and library callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportOptions {
    /// Include hidden meshes and collider empties.
    #[serde(default)]
    pub export_invisibles: bool,
    /// Restrict meshes and collider empties to the host selection.
    #[serde(default)]
    pub export_only_selections: bool,
    /// Target VRM schema version string, e.g. `"0.0"` or `"1.0"`.
    #[serde(default)]
    pub vrm_version: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            export_invisibles: false,
            export_only_selections: false,
            vrm_version: Some("0.0".to_string()),
        }
    }
}

impl ExportOptions {
    /// Object filter applied to meshes and collider empties.
    pub(crate) fn includes(&self, visible: bool, selected: bool) -> bool {
        (visible || self.export_invisibles) && (selected || !self.export_only_selections)
    }
}

/// VRM schema generation targeted by an export.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VrmVersion {
    /// VRM 0.x (`extensions.VRM`).
    Legacy,
    /// VRM 1.x (`extensions.VRMC_vrm`).
    V1,
}

impl VrmVersion {
    pub fn parse(version: Option<&str>) -> Result<Self, ExportError> {
        let Some(version) = version else {
            return Err(ExportError::MissingVrmVersion);
        };
        if version.starts_with("0.") {
            Ok(Self::Legacy)
        } else if version.starts_with("1.") {
            Ok(Self::V1)
        } else {
            Err(ExportError::UnsupportedVrmVersion(version.to_string()))
        }
    }

    pub fn is_legacy(self) -> bool {
        self == Self::Legacy
    }

    pub(crate) fn extension_name(self) -> &'static str {
        match self {
            Self::Legacy => "VRM",
            Self::V1 => "VRMC_vrm",
        }
    }

    pub(crate) fn extensions_used(self) -> &'static [&'static str] {
        match self {
            Self::Legacy => &["VRM", "KHR_materials_unlit"],
            Self::V1 => &["VRMC_vrm", "KHR_materials_unlit", "VRMC_materials_mtoon"],
        }
    }
}

/// Severity level used by export issues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single recoverable issue produced during export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

/// Summary returned after a successful export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    pub vrm_version: String,
    pub node_count: usize,
    pub mesh_count: usize,
    pub material_count: usize,
    pub skin_count: usize,
    pub image_count: usize,
    pub total_vertices: usize,
    pub total_triangles: usize,
    pub binary_length: usize,
    pub issues: Vec<ValidationIssue>,
}

/// Save export options to a JSON file.
pub fn save_export_options(path: &Path, options: &ExportOptions) -> Result<()> {
    let content = serde_json::to_string_pretty(options)
        .context("failed to serialize export options as JSON")?;
    fs::write(path, content)
        .with_context(|| format!("failed to save export options: {}", path.display()))?;
    Ok(())
}

/// Load export options from a JSON file.
pub fn load_export_options(path: &Path) -> Result<ExportOptions> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to load export options: {}", path.display()))?;
    let options: ExportOptions =
        serde_json::from_str(&content).context("failed to parse export options JSON")?;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_version_strings_when_parsing_then_schema_generation_is_selected() {
        assert_eq!(VrmVersion::parse(Some("0.0")).ok(), Some(VrmVersion::Legacy));
        assert_eq!(VrmVersion::parse(Some("1.0-beta")).ok(), Some(VrmVersion::V1));
        assert!(matches!(
            VrmVersion::parse(None),
            Err(ExportError::MissingVrmVersion)
        ));
        assert!(matches!(
            VrmVersion::parse(Some("2.0")),
            Err(ExportError::UnsupportedVrmVersion(version)) if version == "2.0"
        ));
    }

    #[test]
    fn given_hidden_unselected_object_when_filtering_then_options_decide() {
        let mut options = ExportOptions::default();
        assert!(options.includes(true, false));
        assert!(!options.includes(false, true));

        options.export_invisibles = true;
        assert!(options.includes(false, false));

        options.export_only_selections = true;
        assert!(!options.includes(true, false));
        assert!(options.includes(false, true));
    }

    #[test]
    fn given_saved_options_when_loading_then_values_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("options.json");
        let options = ExportOptions {
            export_invisibles: true,
            export_only_selections: false,
            vrm_version: Some("1.0".to_string()),
        };

        save_export_options(&path, &options).expect("save");
        let loaded = load_export_options(&path).expect("load");

        assert_eq!(loaded, options);
    }

    #[test]
    fn given_human_bone_tables_when_iterating_then_required_roles_come_first() {
        let roles = human_bone_roles().collect::<Vec<_>>();
        assert_eq!(roles.len(), 55);
        assert_eq!(roles[0], "hips");
        assert_eq!(roles[17], "leftEye");
        assert_eq!(roles.last(), Some(&"rightLittleDistal"));
    }
}
