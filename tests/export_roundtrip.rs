use std::fs;

use gltf::{Gltf, binary::Glb};
use serde_json::{Value, json};
use vrm_exporter::{
    ExportOptions, SceneSnapshot, container, export_vrm, inspect::inspect_bytes,
    load_scene_snapshot, write_vrm,
};

fn avatar_scene() -> Value {
    json!({
        "armature": {
            "name": "Armature",
            "bones": [
                {"name": "Hips", "head_local": [0.0, 0.0, 1.0]},
                {"name": "Head", "parent": "Hips", "head_local": [0.0, 0.0, 1.5]}
            ],
            "humanoid": {"hips": "Hips", "head": "Head"},
            "properties": {"title": "Sample"}
        },
        "meshes": [{
            "name": "Body",
            "parented_to_armature": true,
            "has_armature_modifier": true,
            "material_slots": ["Body"],
            "vertices": [
                {"co": [0.0, 0.0, 0.0], "groups": [{"group": "Hips", "weight": 1.0}]},
                {"co": [1.0, 0.0, 0.0], "groups": [{"group": "Hips", "weight": 1.0}]},
                {"co": [0.0, 1.0, 0.0], "groups": [{"group": "Head", "weight": 2.0}]}
            ],
            "faces": [{"loops": [{"vertex": 0}, {"vertex": 1}, {"vertex": 2}]}]
        }],
        "materials": [{
            "name": "Body",
            "shader": "GLTF",
            "inputs": {"base_Color": [0.8, 0.7, 0.6], "metallic": 0.0, "roughness": 0.5}
        }]
    })
}

fn options(version: &str) -> ExportOptions {
    ExportOptions {
        vrm_version: Some(version.to_string()),
        ..ExportOptions::default()
    }
}

fn export(version: &str) -> vrm_exporter::ExportOutput {
    let scene: SceneSnapshot = serde_json::from_value(avatar_scene()).expect("scene");
    export_vrm(&scene, &options(version)).expect("export")
}

#[test]
fn given_legacy_export_when_reading_with_gltf_crate_then_geometry_and_skin_survive() {
    let output = export("0.0");

    let glb = Glb::from_slice(&output.bytes).expect("glb");
    assert_eq!(glb.header.length as usize, output.bytes.len());
    assert_eq!(glb.header.length % 4, 0);

    let gltf = Gltf::from_slice_without_validation(&output.bytes).expect("gltf");
    let blob = gltf.blob.clone().expect("blob");
    let document = &gltf.document;

    let skin = document.skins().next().expect("skin");
    let joint_names = skin
        .joints()
        .map(|joint| joint.name().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(joint_names, vec!["Hips", "Head"]);

    let mesh = document.meshes().next().expect("mesh");
    let primitive = mesh.primitives().next().expect("primitive");
    let reader = primitive.reader(|_| Some(blob.as_slice()));
    let positions = reader.read_positions().expect("positions").collect::<Vec<_>>();
    assert_eq!(positions.len(), 3);
    assert!(positions.contains(&[-1.0, 0.0, 0.0]));
    assert!(positions.contains(&[0.0, 0.0, 1.0]));

    let weights = reader
        .read_weights(0)
        .expect("weights")
        .into_f32()
        .collect::<Vec<_>>();
    for weight in weights {
        let sum: f32 = weight.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
}

#[test]
fn given_legacy_export_when_inspecting_then_vrm_extension_is_reported() {
    let output = export("0.0");

    let report = inspect_bytes(&output.bytes).expect("inspect");

    assert_eq!(report.vrm_extension.as_deref(), Some("VRM"));
    assert_eq!(report.spec_version.as_deref(), Some("0.0"));
    assert_eq!(report.skin_count, 1);
    assert_eq!(report.mesh_count, 1);
    assert_eq!(report.binary_length, output.report.binary_length);
    assert_eq!(
        output.json["extensions"]["VRM"]["meta"]["title"],
        json!("Sample")
    );
}

#[test]
fn given_v1_export_when_reading_back_then_vrmc_extension_replaces_legacy_one() {
    let output = export("1.0");

    let (json, binary) = container::decode(&output.bytes).expect("decode");
    assert_eq!(json["asset"], output.json["asset"]);
    assert_eq!(json["nodes"].as_array().map(Vec::len), Some(output.report.node_count));
    assert_eq!(binary.len(), output.report.binary_length);

    assert!(json["extensions"].get("VRM").is_none());
    let vrm = &json["extensions"]["VRMC_vrm"];
    assert_eq!(vrm["specVersion"], "1.0");
    assert_eq!(vrm["humanoid"]["humanBones"]["hips"], json!({"node": 0}));
    assert_eq!(vrm["humanoid"]["humanBones"]["head"], json!({"node": 1}));
    assert_eq!(
        json["extensionsUsed"],
        json!(["VRMC_vrm", "KHR_materials_unlit", "VRMC_materials_mtoon"])
    );
}

#[test]
fn given_snapshot_file_when_writing_then_vrm_and_diagnostic_log_are_created() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scene_path = dir.path().join("scene.json");
    let output_path = dir.path().join("avatar.vrm");
    fs::write(
        &scene_path,
        serde_json::to_string(&avatar_scene()).expect("serialize"),
    )
    .expect("write scene");

    let scene = load_scene_snapshot(&scene_path).expect("load");
    let report = write_vrm(&scene, &options("0.0"), &output_path).expect("write");

    let bytes = fs::read(&output_path).expect("read vrm");
    assert_eq!(&bytes[0..4], b"glTF");
    assert_eq!(report.total_triangles, 1);

    let diagnostic = fs::read_to_string(dir.path().join("avatar.diagnostic.json"))
        .expect("read diagnostic");
    let diagnostic: Value = serde_json::from_str(&diagnostic).expect("diagnostic json");
    assert_eq!(diagnostic["skins"][0]["joint_names"], json!(["Hips", "Head"]));
}

#[test]
fn given_failing_export_when_writing_then_no_file_is_created() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output_path = dir.path().join("avatar.vrm");
    let mut scene: SceneSnapshot = serde_json::from_value(avatar_scene()).expect("scene");
    scene.materials[0].shader = "Emission".to_string();

    let result = write_vrm(&scene, &options("0.0"), &output_path);

    assert!(result.is_err());
    assert!(!output_path.exists());
}
