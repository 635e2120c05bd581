use serde_json::{Value, json};

use super::types::{GL_FLOAT, GL_UNSIGNED_INT, GL_UNSIGNED_SHORT};

// ─── Accessor layout ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl ElementType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ElementType::Scalar => "SCALAR",
            ElementType::Vec2 => "VEC2",
            ElementType::Vec3 => "VEC3",
            ElementType::Vec4 => "VEC4",
            ElementType::Mat4 => "MAT4",
        }
    }

    pub(crate) fn component_count(self) -> usize {
        match self {
            ElementType::Scalar => 1,
            ElementType::Vec2 => 2,
            ElementType::Vec3 => 3,
            ElementType::Vec4 => 4,
            ElementType::Mat4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComponentType {
    Float,
    UnsignedInt,
    UnsignedShort,
}

impl ComponentType {
    pub(crate) fn gl_constant(self) -> u32 {
        match self {
            ComponentType::Float => GL_FLOAT,
            ComponentType::UnsignedInt => GL_UNSIGNED_INT,
            ComponentType::UnsignedShort => GL_UNSIGNED_SHORT,
        }
    }

    pub(crate) fn byte_size(self) -> usize {
        match self {
            ComponentType::Float | ComponentType::UnsignedInt => 4,
            ComponentType::UnsignedShort => 2,
        }
    }
}

/// Per-component lower and upper bounds of an accessor.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Bounds {
    pub(crate) min: Vec<f32>,
    pub(crate) max: Vec<f32>,
}

impl Bounds {
    /// Bounds of tightly packed vectors with `components` lanes each.
    pub(crate) fn of(values: &[f32], components: usize) -> Option<Self> {
        if values.is_empty() || components == 0 {
            return None;
        }
        let mut min = vec![f32::MAX; components];
        let mut max = vec![f32::MIN; components];
        for chunk in values.chunks_exact(components) {
            for (lane, value) in chunk.iter().enumerate() {
                min[lane] = min[lane].min(*value);
                max[lane] = max[lane].max(*value);
            }
        }
        Some(Self { min, max })
    }
}

// ─── Packer ───────────────────────────────────────────────────────────────────

struct PendingImage {
    name: String,
    mime_type: String,
    data: Vec<u8>,
}

/// Final buffer section of the glTF document plus the binary blob.
pub(crate) struct PackedBuffers {
    pub(crate) buffer_views: Vec<Value>,
    pub(crate) accessors: Vec<Value>,
    pub(crate) images: Vec<Value>,
    pub(crate) buffers: Vec<Value>,
    pub(crate) blob: Vec<u8>,
}

/// Append-only packer for one export call.
///
/// Every accessor owns exactly one buffer view, so accessor `i` always reads
/// buffer view `i`. Image views are appended behind all accessor views when
/// the packer is finished, in image registration order.
#[derive(Default)]
pub(crate) struct BinaryPacker {
    blob: Vec<u8>,
    buffer_views: Vec<Value>,
    accessors: Vec<Value>,
    images: Vec<PendingImage>,
}

impl BinaryPacker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store raw accessor bytes and return the accessor index.
    pub(crate) fn pack(
        &mut self,
        data: &[u8],
        element: ElementType,
        component: ComponentType,
        count: usize,
        bounds: Option<Bounds>,
    ) -> usize {
        debug_assert_eq!(
            data.len(),
            count * element.component_count() * component.byte_size()
        );
        let buffer_view = self.push_buffer_view(data);

        let mut accessor = json!({
            "bufferView": buffer_view,
            "byteOffset": 0,
            "type": element.as_str(),
            "componentType": component.gl_constant(),
            "count": count,
        });
        if let Some(bounds) = bounds {
            accessor["min"] = json!(bounds.min);
            accessor["max"] = json!(bounds.max);
        }

        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    pub(crate) fn pack_floats(
        &mut self,
        values: &[f32],
        element: ElementType,
        with_bounds: bool,
    ) -> usize {
        let components = element.component_count();
        let bounds = if with_bounds {
            Bounds::of(values, components)
        } else {
            None
        };
        let bytes = values
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect::<Vec<_>>();
        self.pack(
            &bytes,
            element,
            ComponentType::Float,
            values.len() / components,
            bounds,
        )
    }

    pub(crate) fn pack_indices(&mut self, indices: &[u32]) -> usize {
        let bytes = indices
            .iter()
            .flat_map(|index| index.to_le_bytes())
            .collect::<Vec<_>>();
        self.pack(
            &bytes,
            ElementType::Scalar,
            ComponentType::UnsignedInt,
            indices.len(),
            None,
        )
    }

    pub(crate) fn pack_joints(&mut self, joints: &[[u16; 4]]) -> usize {
        let bytes = joints
            .iter()
            .flatten()
            .flat_map(|joint| joint.to_le_bytes())
            .collect::<Vec<_>>();
        self.pack(
            &bytes,
            ElementType::Vec4,
            ComponentType::UnsignedShort,
            joints.len(),
            None,
        )
    }

    /// Register an encoded image and return its image index.
    pub(crate) fn add_image(&mut self, name: &str, mime_type: &str, data: &[u8]) -> usize {
        self.images.push(PendingImage {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            data: data.to_vec(),
        });
        self.images.len() - 1
    }

    pub(crate) fn finish(mut self) -> PackedBuffers {
        let pending = std::mem::take(&mut self.images);
        let mut images = Vec::with_capacity(pending.len());
        for image in pending {
            let buffer_view = self.push_buffer_view(&image.data);
            images.push(json!({
                "name": image.name,
                "mimeType": image.mime_type,
                "bufferView": buffer_view,
            }));
        }

        self.align_blob();
        let buffers = vec![json!({ "byteLength": self.blob.len() })];

        PackedBuffers {
            buffer_views: self.buffer_views,
            accessors: self.accessors,
            images,
            buffers,
            blob: self.blob,
        }
    }

    fn align_blob(&mut self) {
        let padding = (4 - (self.blob.len() % 4)) % 4;
        self.blob.extend(std::iter::repeat_n(0u8, padding));
    }

    fn push_buffer_view(&mut self, data: &[u8]) -> usize {
        self.align_blob();
        let offset = self.blob.len();
        self.blob.extend_from_slice(data);
        self.buffer_views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": data.len(),
        }));
        self.buffer_views.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_offset(packed: &PackedBuffers, index: usize) -> u64 {
        packed.buffer_views[index]["byteOffset"]
            .as_u64()
            .expect("byteOffset")
    }

    #[test]
    fn given_unaligned_payloads_when_packing_then_every_view_starts_on_four_bytes() {
        let mut packer = BinaryPacker::new();
        let joints = packer.pack_joints(&[[1, 2, 3, 4], [5, 6, 7, 8]]);
        let odd = packer.pack(
            &[1, 2, 3, 4, 5, 6],
            ElementType::Vec3,
            ComponentType::UnsignedShort,
            1,
            None,
        );
        let indices = packer.pack_indices(&[0, 1, 2]);
        packer.add_image("thumb", "image/png", &[9, 9, 9]);

        let packed = packer.finish();

        assert_eq!((joints, odd, indices), (0, 1, 2));
        assert_eq!(view_offset(&packed, 0), 0);
        assert_eq!(view_offset(&packed, 1), 16);
        assert_eq!(view_offset(&packed, 2), 24);
        assert_eq!(view_offset(&packed, 3), 36);
        assert_eq!(packed.buffer_views[1]["byteLength"], 6);
        assert_eq!(packed.blob.len() % 4, 0);
        assert_eq!(packed.buffers[0]["byteLength"], packed.blob.len());
    }

    #[test]
    fn given_positions_with_bounds_when_packing_then_accessor_carries_min_max() {
        let mut packer = BinaryPacker::new();
        let accessor = packer.pack_floats(
            &[0.0, -1.0, 2.0, 3.0, 1.0, -4.0],
            ElementType::Vec3,
            true,
        );
        let normals = packer.pack_floats(&[0.0, 1.0, 0.0], ElementType::Vec3, false);

        let packed = packer.finish();
        let positions = &packed.accessors[accessor];

        assert_eq!(positions["count"], 2);
        assert_eq!(positions["componentType"], 5126);
        assert_eq!(positions["type"], "VEC3");
        assert_eq!(positions["min"], json!([0.0, -1.0, -4.0]));
        assert_eq!(positions["max"], json!([3.0, 1.0, 2.0]));
        assert!(packed.accessors[normals].get("min").is_none());
    }

    #[test]
    fn given_images_when_finishing_then_image_views_follow_accessor_views() {
        let mut packer = BinaryPacker::new();
        packer.pack_indices(&[0, 1, 2]);
        let first = packer.add_image("a", "image/png", &[1, 2]);
        let second = packer.add_image("b", "image/jpeg", &[3, 4, 5, 6]);

        let packed = packer.finish();

        assert_eq!((first, second), (0, 1));
        assert_eq!(packed.images[0]["bufferView"], 1);
        assert_eq!(packed.images[1]["bufferView"], 2);
        assert_eq!(packed.images[1]["mimeType"], "image/jpeg");
        assert_eq!(&packed.blob[12..14], &[1, 2]);
        assert_eq!(&packed.blob[16..20], &[3, 4, 5, 6]);
    }

    #[test]
    fn given_empty_packer_when_finishing_then_single_empty_buffer_is_declared() {
        let packed = BinaryPacker::new().finish();
        assert!(packed.blob.is_empty());
        assert_eq!(packed.buffers, vec![json!({"byteLength": 0})]);
        assert!(packed.accessors.is_empty());
    }
}
