use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::scene::MeshObject;

// ─── Coordinate conversion ────────────────────────────────────────────────────

/// Convert a Z-up source vector into glTF's Y-up convention: `[-x, z, y]`.
pub(crate) fn to_gltf_axes(v: [f64; 3]) -> [f64; 3] {
    [-v[0], v[2], v[1]]
}

pub(crate) fn to_gltf_f32(v: &Vector3<f64>) -> [f32; 3] {
    let converted = to_gltf_axes([v.x, v.y, v.z]);
    [
        converted[0] as f32,
        converted[1] as f32,
        converted[2] as f32,
    ]
}

pub(crate) fn vector(v: [f64; 3]) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

// ─── World-space baking ───────────────────────────────────────────────────────

/// Object-to-world matrix of a mesh; a pure translation when the host gave none.
pub(crate) fn world_matrix(mesh: &MeshObject) -> Matrix4<f64> {
    match mesh.matrix_world {
        Some(rows) => {
            let flat = rows.iter().flatten().copied().collect::<Vec<_>>();
            Matrix4::from_row_slice(&flat)
        }
        None => Matrix4::new_translation(&vector(mesh.location)),
    }
}

/// Positions and normals of one mesh after the world transform was applied.
pub(crate) struct BakedGeometry {
    pub(crate) positions: Vec<Vector3<f64>>,
    /// Smooth vertex normals, supplied or area-weighted.
    pub(crate) vertex_normals: Vec<Vector3<f64>>,
    /// Positions of every shape key, including the reference key.
    pub(crate) shape_positions: Vec<Vec<Vector3<f64>>>,
    /// Vertex normals of every shape key, including the reference key.
    pub(crate) shape_normals: Vec<Vec<Vector3<f64>>>,
    normal_matrix: Matrix3<f64>,
}

impl BakedGeometry {
    /// Bake `mesh` into world space. Attached meshes are moved back by their
    /// own location so the node translation can carry it.
    pub(crate) fn bake(mesh: &MeshObject, triangles: &[[usize; 3]]) -> Self {
        let mut matrix = world_matrix(mesh);
        if !mesh.is_skinned() {
            matrix = Matrix4::new_translation(&-vector(mesh.location)) * matrix;
        }
        let linear = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = linear
            .try_inverse()
            .map(|inverse| inverse.transpose())
            .unwrap_or(linear);

        let transform = |co: &[f64; 3]| -> Vector3<f64> {
            matrix
                .transform_point(&Point3::new(co[0], co[1], co[2]))
                .coords
        };

        let positions = mesh
            .vertices
            .iter()
            .map(|vertex| transform(&vertex.co))
            .collect::<Vec<_>>();

        let computed = area_weighted_vertex_normals(&positions, triangles);
        let vertex_normals = mesh
            .vertices
            .iter()
            .zip(computed)
            .map(|(vertex, fallback)| match vertex.normal {
                Some(normal) => transform_normal(&normal_matrix, normal),
                None => fallback,
            })
            .collect::<Vec<_>>();

        let mut shape_positions = Vec::with_capacity(mesh.shape_keys.len());
        let mut shape_normals = Vec::with_capacity(mesh.shape_keys.len());
        for shape in &mesh.shape_keys {
            let baked = shape.positions.iter().map(transform).collect::<Vec<_>>();
            let normals = match &shape.normals {
                Some(normals) => normals
                    .iter()
                    .map(|normal| transform_normal(&normal_matrix, *normal))
                    .collect(),
                None => area_weighted_vertex_normals(&baked, triangles),
            };
            shape_positions.push(baked);
            shape_normals.push(normals);
        }

        Self {
            positions,
            vertex_normals,
            shape_positions,
            shape_normals,
            normal_matrix,
        }
    }

    /// Bring a custom split normal into world space.
    pub(crate) fn split_normal(&self, normal: [f64; 3]) -> Vector3<f64> {
        transform_normal(&self.normal_matrix, normal)
    }
}

fn transform_normal(normal_matrix: &Matrix3<f64>, normal: [f64; 3]) -> Vector3<f64> {
    let transformed = normal_matrix * vector(normal);
    transformed.try_normalize(f64::EPSILON).unwrap_or(transformed)
}

// ─── Triangulation and normals ────────────────────────────────────────────────

/// Fan-triangulate a polygon with `corner_count` corners into local corner
/// index triples.
pub(crate) fn fan_triangles(corner_count: usize) -> impl Iterator<Item = [usize; 3]> {
    (1..corner_count.saturating_sub(1)).map(|i| [0, i, i + 1])
}

pub(crate) fn triangle_normal(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
) -> Vector3<f64> {
    (b - a)
        .cross(&(c - a))
        .try_normalize(f64::EPSILON)
        .unwrap_or_else(Vector3::zeros)
}

/// Per-vertex normals weighted by the area of every adjacent triangle.
pub(crate) fn area_weighted_vertex_normals(
    positions: &[Vector3<f64>],
    triangles: &[[usize; 3]],
) -> Vec<Vector3<f64>> {
    let mut normals = vec![Vector3::zeros(); positions.len()];
    for triangle in triangles {
        let [Some(a), Some(b), Some(c)] = triangle.map(|index| positions.get(index)) else {
            continue;
        };
        // Unnormalized cross product length is twice the triangle area.
        let weighted = (b - a).cross(&(c - a));
        for index in triangle {
            normals[*index] += weighted;
        }
    }
    normals
        .into_iter()
        .map(|normal| normal.try_normalize(f64::EPSILON).unwrap_or(normal))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Vertex;

    fn vertex(co: [f64; 3]) -> Vertex {
        Vertex {
            co,
            normal: None,
            groups: Vec::new(),
        }
    }

    #[test]
    fn given_source_vector_when_converting_axes_then_x_is_negated_and_y_z_swapped() {
        assert_eq!(to_gltf_axes([1.0, 2.0, 3.0]), [-1.0, 3.0, 2.0]);
    }

    #[test]
    fn given_polygon_when_fan_triangulating_then_corner_zero_is_shared() {
        let triangles = fan_triangles(5).collect::<Vec<_>>();
        assert_eq!(triangles, vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]);
        assert_eq!(fan_triangles(2).count(), 0);
    }

    #[test]
    fn given_flat_quad_when_computing_vertex_normals_then_all_point_up() {
        let positions = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let normals = area_weighted_vertex_normals(&positions, &[[0, 1, 2], [0, 2, 3]]);

        for normal in normals {
            assert!((normal - Vector3::z()).norm() < 1e-12);
        }
    }

    #[test]
    fn given_attached_mesh_when_baking_then_location_is_removed_from_positions() {
        let mesh = MeshObject {
            name: "Hat".to_string(),
            location: [0.0, 0.0, 2.0],
            parented_to_armature: true,
            parent_bone: Some("head".to_string()),
            vertices: vec![vertex([0.0, 0.0, 0.5])],
            ..MeshObject::default()
        };

        let baked = BakedGeometry::bake(&mesh, &[]);

        assert!((baked.positions[0] - Vector3::new(0.0, 0.0, 0.5)).norm() < 1e-12);
    }

    #[test]
    fn given_skinned_mesh_with_scaled_world_matrix_when_baking_then_positions_are_scaled() {
        let mesh = MeshObject {
            name: "Body".to_string(),
            matrix_world: Some([
                [2.0, 0.0, 0.0, 1.0],
                [0.0, 2.0, 0.0, 0.0],
                [0.0, 0.0, 2.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]),
            vertices: vec![vertex([1.0, 1.0, 1.0])],
            ..MeshObject::default()
        };

        let baked = BakedGeometry::bake(&mesh, &[]);

        assert!((baked.positions[0] - Vector3::new(3.0, 2.0, 2.0)).norm() < 1e-12);
    }
}
