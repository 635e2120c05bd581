use std::collections::{HashMap, HashSet};

use serde_json::{Value, json};

use super::geometry::to_gltf_axes;
use super::packer::{BinaryPacker, ElementType};
use super::types::human_bone_roles;
use crate::error::ExportError;
use crate::scene::{Armature, Bone};

/// Node/skin section built from the armature.
///
/// Node `i` is always bone `i` of the armature, so bone names resolve to node
/// indices through `bone_index`.
#[derive(Debug, Default)]
pub(crate) struct Skeleton {
    pub(crate) nodes: Vec<Value>,
    pub(crate) scene_roots: Vec<usize>,
    pub(crate) skins: Vec<Value>,
    /// Joint node indices per emitted skin.
    pub(crate) skin_joints: Vec<Vec<usize>>,
    pub(crate) bone_index: HashMap<String, usize>,
}

impl Skeleton {
    pub(crate) fn node_index(&self, bone: &str) -> Option<usize> {
        self.bone_index.get(bone).copied()
    }

    /// Slot of `node` in the joint list of skin `skin`.
    pub(crate) fn joint_slot(&self, skin: usize, node: usize) -> Option<usize> {
        self.skin_joints
            .get(skin)?
            .iter()
            .position(|joint| *joint == node)
    }
}

// ─── Hierarchy ────────────────────────────────────────────────────────────────

fn index_bones(bones: &[Bone]) -> Result<HashMap<String, usize>, ExportError> {
    let mut bone_index = HashMap::with_capacity(bones.len());
    for (index, bone) in bones.iter().enumerate() {
        if bone_index.insert(bone.name.clone(), index).is_some() {
            return Err(ExportError::DuplicateBoneName(bone.name.clone()));
        }
    }
    Ok(bone_index)
}

/// Children of every bone, in bone order.
fn collect_children(
    bones: &[Bone],
    bone_index: &HashMap<String, usize>,
) -> Result<Vec<Vec<usize>>, ExportError> {
    let mut children = vec![Vec::new(); bones.len()];
    for (index, bone) in bones.iter().enumerate() {
        let Some(parent) = bone.parent.as_deref() else {
            continue;
        };
        let Some(parent_index) = bone_index.get(parent) else {
            return Err(ExportError::UnknownParentBone {
                bone: bone.name.clone(),
                parent: parent.to_string(),
            });
        };
        children[*parent_index].push(index);
    }
    Ok(children)
}

fn bone_node(bone: &Bone, parent_head: [f64; 3], children: &[usize]) -> Value {
    let relative = [
        bone.head_local[0] - parent_head[0],
        bone.head_local[1] - parent_head[1],
        bone.head_local[2] - parent_head[2],
    ];
    let mut node = json!({
        "name": bone.name,
        "translation": to_gltf_axes(relative),
    });
    if !children.is_empty() {
        node["children"] = json!(children);
    }
    node
}

/// Translation-only inverse bind matrix in column-major order.
fn inverse_bind_matrix(head_local: [f64; 3]) -> [f32; 16] {
    let world = to_gltf_axes(head_local);
    [
        1.0,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
        0.0,
        -world[0] as f32,
        -world[1] as f32,
        -world[2] as f32,
        1.0,
    ]
}

// ─── Translation ──────────────────────────────────────────────────────────────

/// Flatten the armature into nodes and skins.
///
/// Joint lists walk each root subtree with an explicit stack: the root comes
/// first, then the most recently pushed child is expanded. Only subtrees that
/// contain a humanoid-mapped bone become skins.
pub(crate) fn translate_skeleton(
    armature: &Armature,
    packer: &mut BinaryPacker,
) -> Result<Skeleton, ExportError> {
    let bones = &armature.bones;
    let bone_index = index_bones(bones)?;
    let children = collect_children(bones, &bone_index)?;

    let human_bones = human_bone_roles()
        .filter_map(|role| armature.humanoid.get(role))
        .filter(|name| bone_index.contains_key(name.as_str()))
        .map(String::as_str)
        .collect::<HashSet<_>>();

    let nodes = bones
        .iter()
        .enumerate()
        .map(|(index, bone)| {
            let parent_head = bone
                .parent
                .as_deref()
                .and_then(|parent| bone_index.get(parent))
                .map(|parent| bones[*parent].head_local)
                .unwrap_or([0.0; 3]);
            bone_node(bone, parent_head, &children[index])
        })
        .collect::<Vec<_>>();

    let mut scene_roots = Vec::new();
    let mut skins = Vec::new();
    let mut skin_joints = Vec::new();

    for (root, bone) in bones.iter().enumerate() {
        if bone.parent.is_some() {
            continue;
        }
        scene_roots.push(root);

        let mut has_human_bone = human_bones.contains(bone.name.as_str());
        let mut joints = vec![root];
        let mut stack = children[root].clone();
        while let Some(child) = stack.pop() {
            has_human_bone |= human_bones.contains(bones[child].name.as_str());
            joints.push(child);
            stack.extend_from_slice(&children[child]);
        }

        if !has_human_bone {
            continue;
        }

        let matrices = joints
            .iter()
            .flat_map(|joint| inverse_bind_matrix(bones[*joint].head_local))
            .collect::<Vec<_>>();
        let accessor = packer.pack_floats(&matrices, ElementType::Mat4, false);

        skins.push(json!({
            "joints": joints,
            "skeleton": root,
            "inverseBindMatrices": accessor,
        }));
        skin_joints.push(joints);
    }

    Ok(Skeleton {
        nodes,
        scene_roots,
        skins,
        skin_joints,
        bone_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bone(name: &str, parent: Option<&str>, head: [f64; 3]) -> Bone {
        Bone {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            head_local: head,
        }
    }

    fn sample_armature() -> Armature {
        let mut armature = Armature {
            name: "Armature".to_string(),
            bones: vec![
                bone("Hips", None, [0.0, 0.0, 1.0]),
                bone("Spine", Some("Hips"), [0.0, 0.1, 1.2]),
                bone("LeftLeg", Some("Hips"), [0.1, 0.0, 0.9]),
                bone("Head", Some("Spine"), [0.0, 0.1, 1.6]),
                bone("Prop", None, [1.0, 1.0, 1.0]),
            ],
            ..Armature::default()
        };
        armature
            .humanoid
            .insert("hips".to_string(), "Hips".to_string());
        armature
            .humanoid
            .insert("head".to_string(), "Head".to_string());
        armature
    }

    #[test]
    fn given_bone_tree_when_translating_then_node_order_matches_bone_order() {
        let mut packer = BinaryPacker::new();
        let skeleton = translate_skeleton(&sample_armature(), &mut packer).expect("skeleton");

        assert_eq!(skeleton.nodes.len(), 5);
        assert_eq!(skeleton.nodes[3]["name"], "Head");
        assert_eq!(skeleton.nodes[0]["children"], json!([1, 2]));
        assert!(skeleton.nodes[3].get("children").is_none());
        assert_eq!(skeleton.scene_roots, vec![0, 4]);
        assert_eq!(skeleton.node_index("LeftLeg"), Some(2));
    }

    #[test]
    fn given_child_bone_when_translating_then_translation_is_relative_and_converted() {
        let mut packer = BinaryPacker::new();
        let skeleton = translate_skeleton(&sample_armature(), &mut packer).expect("skeleton");

        let translation = skeleton.nodes[2]["translation"]
            .as_array()
            .expect("translation")
            .iter()
            .map(|value| value.as_f64().expect("number"))
            .collect::<Vec<_>>();
        assert!((translation[0] + 0.1).abs() < 1e-12);
        assert!((translation[1] + 0.1).abs() < 1e-12);
        assert!(translation[2].abs() < 1e-12);
    }

    #[test]
    fn given_humanoid_subtree_when_translating_then_only_that_root_gets_a_skin() {
        let mut packer = BinaryPacker::new();
        let skeleton = translate_skeleton(&sample_armature(), &mut packer).expect("skeleton");

        assert_eq!(skeleton.skins.len(), 1);
        assert_eq!(skeleton.skin_joints[0], vec![0, 2, 1, 3]);
        assert_eq!(skeleton.skins[0]["skeleton"], 0);
        assert_eq!(skeleton.skins[0]["inverseBindMatrices"], 0);
        assert_eq!(skeleton.joint_slot(0, 3), Some(3));
        assert_eq!(skeleton.joint_slot(0, 4), None);
        assert_eq!(packer.finish().accessors.len(), 1);
    }

    #[test]
    fn given_joint_head_when_building_inverse_bind_matrix_then_translation_is_negated() {
        let matrix = inverse_bind_matrix([0.5, 2.0, 3.0]);
        assert_eq!(&matrix[12..16], &[0.5, -3.0, -2.0, 1.0]);
        assert_eq!(matrix[0], 1.0);
        assert_eq!(matrix[5], 1.0);
        assert_eq!(matrix[10], 1.0);
    }

    #[test]
    fn given_duplicate_or_orphan_bones_when_translating_then_export_fails() {
        let mut packer = BinaryPacker::new();
        let mut armature = sample_armature();
        armature.bones.push(bone("Head", Some("Spine"), [0.0; 3]));
        assert!(matches!(
            translate_skeleton(&armature, &mut packer),
            Err(ExportError::DuplicateBoneName(name)) if name == "Head"
        ));

        let mut armature = sample_armature();
        armature.bones.push(bone("Tail", Some("Ghost"), [0.0; 3]));
        assert!(matches!(
            translate_skeleton(&armature, &mut packer),
            Err(ExportError::UnknownParentBone { parent, .. }) if parent == "Ghost"
        ));
    }
}
