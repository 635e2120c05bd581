use std::collections::HashMap;

use crate::scene::GroupWeight;

// ─── Weight normalization ─────────────────────────────────────────────────────

const NORMALIZE_ROUNDS: usize = 10;

/// Round-trip every weight through a 32-bit float, as a file export followed
/// by an import would.
fn to_gl_float(weights: [f64; 4]) -> [f64; 4] {
    weights.map(|weight| weight as f32 as f64)
}

/// Error-compensated sum (Neumaier), so the sum-to-one error itself does not
/// drift with the summation order.
fn exact_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0f64;
    let mut compensation = 0.0f64;
    for value in values {
        let next = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - next) + value;
        } else {
            compensation += (value - next) + sum;
        }
        sum = next;
    }
    sum + compensation
}

/// Renormalize four skin weights so they sum as close to 1.0 as 32-bit float
/// storage allows.
///
/// Weights already summing to 1 within `f64::EPSILON` are returned unchanged.
/// Otherwise the weights are divided by their sum for at most ten rounds, each
/// round simulating the lossy float storage; a round is only kept while the
/// previous error is still at least epsilon and the new error is strictly
/// smaller.
pub fn normalize_weights(weights: [f64; 4]) -> [f64; 4] {
    if (weights.iter().sum::<f64>() - 1.0).abs() < f64::EPSILON {
        return weights;
    }

    let mut weights = to_gl_float(weights);
    for _ in 0..NORMALIZE_ROUNDS {
        let sum = weights.iter().sum::<f64>();
        let next = to_gl_float(weights.map(|weight| weight / sum));
        let error = (1.0 - exact_sum(&weights)).abs();
        let next_error = (1.0 - exact_sum(&next)).abs();
        if error >= f64::EPSILON && error > next_error {
            weights = next;
        } else {
            break;
        }
    }
    weights
}

// ─── Per-vertex joint resolution ──────────────────────────────────────────────

/// Joints and weights of one exported vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct VertexSkin {
    pub(crate) joints: [u16; 4],
    pub(crate) weights: [f32; 4],
}

/// Recoverable conditions met while resolving one vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SkinWarnings {
    pub(crate) truncated: bool,
    pub(crate) zero_weight: bool,
}

/// Resolve vertex-group memberships into four (joint, weight) influences.
///
/// `joint_slots` maps bone names to their slot in the skin's joint list.
/// Memberships naming an unknown bone or carrying a weight below epsilon are
/// dropped. The remaining influences are padded with `(0, 0)`, sorted heaviest
/// first (ties broken by the higher joint slot) and cut to four. A vertex left
/// without weight is bound fully to `fallback_joint`.
pub(crate) fn resolve_vertex_skin(
    groups: &[GroupWeight],
    joint_slots: &HashMap<&str, u16>,
    fallback_joint: u16,
) -> (VertexSkin, SkinWarnings) {
    let mut influences = groups
        .iter()
        .filter(|group| group.weight >= f64::EPSILON)
        .filter_map(|group| {
            joint_slots
                .get(group.group.as_str())
                .map(|joint| (group.weight, *joint))
        })
        .collect::<Vec<_>>();

    while influences.len() < 4 {
        influences.push((0.0, 0));
    }
    influences.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));

    let mut warnings = SkinWarnings::default();
    if influences.len() > 4 {
        warnings.truncated = true;
        influences.truncate(4);
    }

    let mut weights = [0.0f64; 4];
    let mut joints = [0u16; 4];
    for (slot, (weight, joint)) in influences.into_iter().enumerate() {
        weights[slot] = weight;
        joints[slot] = joint;
    }

    if weights.iter().sum::<f64>() < f64::EPSILON {
        warnings.zero_weight = true;
        weights = [1.0, 0.0, 0.0, 0.0];
        joints = [fallback_joint, 0, 0, 0];
    }

    let normalized = normalize_weights(weights);
    (
        VertexSkin {
            joints,
            weights: normalized.map(|weight| weight as f32),
        },
        warnings,
    )
}
