use std::collections::HashMap;

use serde_json::{Map, Value, json};

use super::types::{GL_CLAMP_TO_EDGE, GL_LINEAR, GL_NEAREST, GL_REPEAT, VrmVersion};
use crate::error::ExportError;
use crate::scene::{Material, TextureLink};

// ─── MToon property tables ────────────────────────────────────────────────────

/// MToon float property → shader input.
const MTOON_FLOAT_INPUTS: [(&str, &str); 19] = [
    ("_Cutoff", "CutoffRate"),
    ("_BumpScale", "BumpScale"),
    ("_ReceiveShadowRate", "ReceiveShadowRate"),
    ("_ShadeShift", "ShadeShift"),
    ("_ShadeToony", "ShadeToony"),
    ("_RimLightingMix", "RimLightingMix"),
    ("_RimFresnelPower", "RimFresnelPower"),
    ("_RimLift", "RimLift"),
    ("_ShadingGradeRate", "ShadingGradeRate"),
    ("_LightColorAttenuation", "LightColorAttenuation"),
    ("_IndirectLightIntensity", "IndirectLightIntensity"),
    ("_OutlineWidth", "OutlineWidth"),
    ("_OutlineScaledMaxDistance", "OutlineScaleMaxDistance"),
    ("_OutlineLightingMix", "OutlineLightingMix"),
    ("_UvAnimScrollX", "UV_Scroll_X"),
    ("_UvAnimScrollY", "UV_Scroll_Y"),
    ("_UvAnimRotation", "UV_Scroll_Rotation"),
    ("_OutlineWidthMode", "OutlineWidthMode"),
    ("_OutlineColorMode", "OutlineColorMode"),
];

/// MToon texture property → shader input.
const MTOON_TEXTURE_INPUTS: [(&str, &str); 10] = [
    ("_MainTex", "MainTexture"),
    ("_ShadeTexture", "ShadeTexture"),
    ("_BumpMap", "NomalmapTexture"),
    ("_ReceiveShadowTexture", "ReceiveShadow_Texture"),
    ("_ShadingGradeTexture", "ShadingGradeTexture"),
    ("_EmissionMap", "Emission_Texture"),
    ("_SphereAdd", "SphereAddTexture"),
    ("_RimTexture", "RimTexture"),
    ("_OutlineWidthTexture", "OutlineWidthTexture"),
    ("_UvAnimMaskTexture", "UV_Animation_Mask_Texture"),
];

/// MToon color property → shader input.
const MTOON_COLOR_INPUTS: [(&str, &str); 5] = [
    ("_Color", "DiffuseColor"),
    ("_ShadeColor", "ShadeColor"),
    ("_EmissionColor", "EmissionColor"),
    ("_RimColor", "RimColor"),
    ("_OutlineColor", "OutlineColor"),
];

const GLTF_TEXTURE_INPUTS: [&str; 5] = [
    "color_texture",
    "normal",
    "emissive_texture",
    "occlusion_texture",
    "metallic_roughness_texture",
];

const ZWRITE_TEXTURE_INPUT: &str = "Main_Texture";

const MTOON_VERSION: u32 = 32;
const ZWRITE_RENDER_QUEUE: i32 = 2600;
const IDENTITY_UV_TRANSFORM: [f64; 4] = [0.0, 0.0, 1.0, 1.0];

// ─── Classification ───────────────────────────────────────────────────────────

/// The three supported shader dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShaderKind {
    MToon,
    Gltf,
    TransparentZWrite,
}

impl ShaderKind {
    pub(crate) fn classify(material: &Material) -> Result<Self, ExportError> {
        match material.shader.as_str() {
            "MToon_unversioned" => Ok(Self::MToon),
            "GLTF" => Ok(Self::Gltf),
            "TRANSPARENT_ZWRITE" => Ok(Self::TransparentZWrite),
            other => Err(ExportError::UnsupportedShader {
                material: material.name.clone(),
                shader: other.to_string(),
            }),
        }
    }

    /// Shader inputs that may link an image, in collection order.
    pub(crate) fn texture_inputs(self) -> Vec<&'static str> {
        match self {
            Self::MToon => MTOON_TEXTURE_INPUTS.iter().map(|(_, input)| *input).collect(),
            Self::Gltf => GLTF_TEXTURE_INPUTS.to_vec(),
            Self::TransparentZWrite => vec![ZWRITE_TEXTURE_INPUT],
        }
    }
}

/// Names of the images a material links, in shader-input order.
pub(crate) fn linked_images(material: &Material) -> Result<Vec<&str>, ExportError> {
    let kind = ShaderKind::classify(material)?;
    Ok(kind
        .texture_inputs()
        .into_iter()
        .filter_map(|input| material.texture_input(input))
        .map(|link| link.image.as_str())
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpacityMode {
    Opaque,
    Clip,
    Blend,
}

impl OpacityMode {
    pub(crate) fn from_blend_method(blend_method: &str) -> Self {
        match blend_method {
            "OPAQUE" => Self::Opaque,
            "CLIP" => Self::Clip,
            _ => Self::Blend,
        }
    }

    fn alpha_mode(self) -> &'static str {
        match self {
            Self::Opaque => "OPAQUE",
            Self::Clip => "MASK",
            Self::Blend => "BLEND",
        }
    }
}

// ─── Texture / sampler registry ───────────────────────────────────────────────

/// Deduplicates samplers by `(wrap, filter)` and textures by `(image, sampler)`.
#[derive(Debug, Default)]
pub(crate) struct TextureRegistry {
    samplers: Vec<(u32, u32)>,
    textures: Vec<(usize, usize)>,
}

impl TextureRegistry {
    pub(crate) fn texture_index(&mut self, image: usize, wrap: u32, filter: u32) -> usize {
        let sampler = match self.samplers.iter().position(|key| *key == (wrap, filter)) {
            Some(index) => index,
            None => {
                self.samplers.push((wrap, filter));
                self.samplers.len() - 1
            }
        };
        match self.textures.iter().position(|key| *key == (image, sampler)) {
            Some(index) => index,
            None => {
                self.textures.push((image, sampler));
                self.textures.len() - 1
            }
        }
    }

    pub(crate) fn samplers_json(&self) -> Vec<Value> {
        self.samplers
            .iter()
            .map(|(wrap, filter)| {
                json!({
                    "magFilter": filter,
                    "minFilter": filter,
                    "wrapS": wrap,
                    "wrapT": wrap,
                })
            })
            .collect()
    }

    pub(crate) fn textures_json(&self) -> Vec<Value> {
        self.textures
            .iter()
            .map(|(image, sampler)| json!({ "sampler": sampler, "source": image }))
            .collect()
    }
}

/// Sampler parameters of a linked texture node.
pub(crate) fn sampler_params(link: &TextureLink) -> (u32, u32) {
    let wrap = if link.extension == "REPEAT" {
        GL_REPEAT
    } else {
        GL_CLAMP_TO_EDGE
    };
    let filter = if link.interpolation == "Closest" {
        GL_NEAREST
    } else {
        GL_LINEAR
    };
    (wrap, filter)
}

// ─── Translation ──────────────────────────────────────────────────────────────

/// Core glTF material plus the legacy `materialProperties` entry.
#[derive(Debug, Clone)]
pub(crate) struct TranslatedMaterial {
    pub(crate) core: Value,
    pub(crate) legacy: Value,
}

/// Per-export state shared by every material translation.
pub(crate) struct MaterialTranslator<'a> {
    pub(crate) version: VrmVersion,
    pub(crate) image_index: &'a HashMap<String, usize>,
    pub(crate) registry: &'a mut TextureRegistry,
}

impl MaterialTranslator<'_> {
    pub(crate) fn translate(&mut self, material: &Material) -> Result<TranslatedMaterial, ExportError> {
        match ShaderKind::classify(material)? {
            ShaderKind::MToon => self.translate_mtoon(material),
            ShaderKind::Gltf => self.translate_gltf(material),
            ShaderKind::TransparentZWrite => self.translate_zwrite(material),
        }
    }

    fn texture(&mut self, material: &Material, input: &str) -> Result<Option<usize>, ExportError> {
        let Some(link) = material.texture_input(input) else {
            return Ok(None);
        };
        let Some(image) = self.image_index.get(&link.image) else {
            return Err(ExportError::MissingImage {
                owner: material.name.clone(),
                image: link.image.clone(),
            });
        };
        let (wrap, filter) = sampler_params(link);
        Ok(Some(self.registry.texture_index(*image, wrap, filter)))
    }

    fn translate_mtoon(&mut self, material: &Material) -> Result<TranslatedMaterial, ExportError> {
        let opacity = OpacityMode::from_blend_method(&material.blend_method);
        let mut keywords = Map::new();
        let mut tags = Map::new();
        let mut floats = Map::new();
        let mut vectors = Map::new();
        let mut textures = Map::new();

        let mut width_mode = 0u8;
        let mut color_mode = 0u8;
        for (property, input) in MTOON_FLOAT_INPUTS {
            let Some(value) = material.float_input(input) else {
                continue;
            };
            match property {
                "_OutlineWidthMode" => {
                    width_mode = clamp_mode(value, 2);
                    floats.insert(property.to_string(), json!(width_mode));
                }
                "_OutlineColorMode" => {
                    color_mode = clamp_mode(value, 1);
                    floats.insert(property.to_string(), json!(color_mode));
                }
                _ => {
                    floats.insert(property.to_string(), json!(value));
                }
            }
        }
        insert_outline_keywords(&mut keywords, width_mode, color_mode);

        for (property, input) in MTOON_COLOR_INPUTS {
            if let Some(color) = material.color_input(input) {
                vectors.insert(property.to_string(), json!(color));
            }
        }

        let mut main_texture = None;
        let mut use_normal_map = false;
        for (property, input) in MTOON_TEXTURE_INPUTS {
            let Some(index) = self.texture(material, input)? else {
                continue;
            };
            textures.insert(property.to_string(), json!(index));
            let uv_transform = material
                .texture_input(input)
                .and_then(|link| link.uv_transform)
                .map(|transform| {
                    [
                        transform.offset[0],
                        transform.offset[1],
                        transform.scale[0],
                        transform.scale[1],
                    ]
                })
                .unwrap_or(IDENTITY_UV_TRANSFORM);
            vectors.insert(property.to_string(), json!(uv_transform));
            match property {
                "_MainTex" => main_texture = Some(index),
                "_BumpMap" => use_normal_map = true,
                _ => {}
            }
        }

        let (blend_mode, src_blend, dst_blend, z_write, render_queue, render_type) = match opacity {
            OpacityMode::Opaque => (0, 1, 0, 1, -1, "Opaque"),
            OpacityMode::Clip => (1, 1, 0, 1, 2450, "TransparentCutout"),
            OpacityMode::Blend => (2, 5, 10, 0, 3000, "Transparent"),
        };
        floats.insert("_BlendMode".to_string(), json!(blend_mode));
        floats.insert("_SrcBlend".to_string(), json!(src_blend));
        floats.insert("_DstBlend".to_string(), json!(dst_blend));
        floats.insert("_ZWrite".to_string(), json!(z_write));
        if opacity == OpacityMode::Clip {
            keywords.insert("_ALPHATEST_ON".to_string(), json!(true));
            floats.insert("_Cutoff".to_string(), json!(material.alpha_threshold));
        }
        tags.insert("RenderType".to_string(), json!(render_type));
        keywords.insert(
            "_ALPHABLEND_ON".to_string(),
            json!(opacity == OpacityMode::Blend),
        );
        keywords.insert("_ALPHAPREMULTIPLY_ON".to_string(), json!(false));

        floats.insert("_MToonVersion".to_string(), json!(MTOON_VERSION));
        floats.insert(
            "_CullMode".to_string(),
            json!(if material.use_backface_culling { 2 } else { 0 }),
        );
        floats.insert("_OutlineCullMode".to_string(), json!(1));
        floats.insert("_DebugMode".to_string(), json!(0));
        keywords.insert("MTOON_DEBUG_NORMAL".to_string(), json!(false));
        keywords.insert("MTOON_DEBUG_LITSHADERATE".to_string(), json!(false));
        if use_normal_map {
            keywords.insert("_NORMALMAP".to_string(), json!(true));
        }

        let base_color = vectors
            .get("_Color")
            .cloned()
            .unwrap_or_else(|| json!([1.0, 1.0, 1.0, 1.0]));
        let mut core = PbrFallback {
            base_color: Some(base_color),
            base_color_texture: main_texture,
            opacity,
            double_sided: !material.use_backface_culling,
            ..PbrFallback::default()
        }
        .to_json(material);

        if self.version == VrmVersion::V1 {
            let properties = mtoon_v1_properties(
                material,
                opacity,
                width_mode,
                color_mode,
                &floats,
                &vectors,
                &textures,
            );
            core["extensions"]["VRMC_materials_mtoon"] = json!({ "properties": properties });
        }

        let legacy = json!({
            "name": material.name,
            "shader": "VRM/MToon",
            "keywordMap": keywords,
            "tagMap": tags,
            "floatProperties": floats,
            "vectorProperties": vectors,
            "textureProperties": textures,
            "renderQueue": render_queue,
        });

        Ok(TranslatedMaterial { core, legacy })
    }

    fn translate_gltf(&mut self, material: &Material) -> Result<TranslatedMaterial, ExportError> {
        let base_color_texture = self.texture(material, "color_texture")?;
        let metallic_roughness_texture = self.texture(material, "metallic_roughness_texture")?;
        let mut core = PbrFallback {
            base_color: material.color_input("base_Color").map(|color| json!(color)),
            metallic: material.float_input("metallic"),
            roughness: material.float_input("roughness"),
            base_color_texture,
            metallic_roughness_texture,
            opacity: OpacityMode::from_blend_method(&material.blend_method),
            unlit: material.float_input("unlit").is_some_and(|unlit| unlit >= 0.5),
            double_sided: !material.use_backface_culling,
        }
        .to_json(material);

        for (key, input) in [
            ("normalTexture", "normal"),
            ("emissiveTexture", "emissive_texture"),
            ("occlusionTexture", "occlusion_texture"),
        ] {
            if let Some(index) = self.texture(material, input)? {
                core[key] = json!({ "index": index, "texCoord": 0 });
            }
        }
        if let Some(emissive) = material.color_input("emissive_color") {
            core["emissiveFactor"] = json!(emissive[0..3]);
        }

        Ok(TranslatedMaterial {
            core,
            legacy: empty_legacy_entry(material, "VRM_USE_GLTFSHADER"),
        })
    }

    fn translate_zwrite(&mut self, material: &Material) -> Result<TranslatedMaterial, ExportError> {
        let main_texture = self.texture(material, ZWRITE_TEXTURE_INPUT)?;

        let mut legacy = json!({
            "name": material.name,
            "shader": "VRM/UnlitTransparentZWrite",
            "renderQueue": ZWRITE_RENDER_QUEUE,
            "keywordMap": {},
            "tagMap": {"RenderType": "Transparent"},
            "floatProperties": {},
            "vectorProperties": {},
            "textureProperties": {},
        });
        if let Some(index) = main_texture {
            legacy["textureProperties"] = json!({ "_MainTex": index });
            legacy["vectorProperties"] = json!({ "_MainTex": IDENTITY_UV_TRANSFORM });
        }

        let core = PbrFallback {
            base_color_texture: main_texture,
            opacity: OpacityMode::Blend,
            double_sided: !material.use_backface_culling,
            ..PbrFallback::default()
        }
        .to_json(material);

        Ok(TranslatedMaterial { core, legacy })
    }
}

/// Round half to even, then clamp into `0..=max`.
fn clamp_mode(value: f64, max: u8) -> u8 {
    value.round_ties_even().clamp(0.0, f64::from(max)) as u8
}

fn insert_outline_keywords(keywords: &mut Map<String, Value>, width_mode: u8, color_mode: u8) {
    if width_mode < 1 {
        return;
    }
    let width_keyword = if width_mode < 2 {
        "MTOON_OUTLINE_WIDTH_WORLD"
    } else {
        "MTOON_OUTLINE_WIDTH_SCREEN"
    };
    let color_keyword = if color_mode < 1 {
        "MTOON_OUTLINE_COLOR_FIXED"
    } else {
        "MTOON_OUTLINE_COLOR_MIXED"
    };
    keywords.insert(width_keyword.to_string(), json!(true));
    keywords.insert(color_keyword.to_string(), json!(true));
}

fn empty_legacy_entry(material: &Material, shader: &str) -> Value {
    json!({
        "name": material.name,
        "shader": shader,
        "keywordMap": {},
        "tagMap": {},
        "floatProperties": {},
        "vectorProperties": {},
        "textureProperties": {},
    })
}

// ─── Core PBR entry ───────────────────────────────────────────────────────────

/// Inputs of the glTF-core material every shader kind falls back to.
struct PbrFallback {
    base_color: Option<Value>,
    metallic: Option<f64>,
    roughness: Option<f64>,
    base_color_texture: Option<usize>,
    metallic_roughness_texture: Option<usize>,
    opacity: OpacityMode,
    unlit: bool,
    double_sided: bool,
}

impl Default for PbrFallback {
    fn default() -> Self {
        Self {
            base_color: Some(json!([1.0, 1.0, 1.0, 1.0])),
            metallic: Some(0.0),
            roughness: Some(0.9),
            base_color_texture: None,
            metallic_roughness_texture: None,
            opacity: OpacityMode::Opaque,
            unlit: true,
            double_sided: false,
        }
    }
}

impl PbrFallback {
    fn to_json(self, material: &Material) -> Value {
        let mut pbr = Map::new();
        if let Some(base_color) = self.base_color {
            pbr.insert("baseColorFactor".to_string(), base_color);
        }
        if let Some(metallic) = self.metallic {
            pbr.insert("metallicFactor".to_string(), json!(metallic));
        }
        if let Some(roughness) = self.roughness {
            pbr.insert("roughnessFactor".to_string(), json!(roughness));
        }
        if let Some(index) = self.base_color_texture {
            pbr.insert(
                "baseColorTexture".to_string(),
                json!({ "index": index, "texCoord": 0 }),
            );
        }
        if let Some(index) = self.metallic_roughness_texture {
            pbr.insert(
                "metallicRoughnessTexture".to_string(),
                json!({ "index": index, "texCoord": 0 }),
            );
        }

        let mut entry = json!({
            "name": material.name,
            "pbrMetallicRoughness": pbr,
            "alphaMode": self.opacity.alpha_mode(),
        });
        if self.opacity == OpacityMode::Clip {
            entry["alphaCutoff"] = json!(material.alpha_threshold);
        }
        if self.unlit {
            entry["extensions"] = json!({ "KHR_materials_unlit": {} });
        }
        entry["doubleSided"] = json!(self.double_sided);
        entry
    }
}

// ─── VRMC_materials_mtoon ─────────────────────────────────────────────────────

fn mtoon_v1_properties(
    material: &Material,
    opacity: OpacityMode,
    width_mode: u8,
    color_mode: u8,
    floats: &Map<String, Value>,
    vectors: &Map<String, Value>,
    textures: &Map<String, Value>,
) -> Map<String, Value> {
    let render_mode = match opacity {
        OpacityMode::Opaque => "opaque",
        OpacityMode::Clip => "cutout",
        OpacityMode::Blend => "transparent",
    };
    let outline_width_mode = match width_mode {
        0 => "none",
        1 => "worldCoordinates",
        _ => "screenCoordinates",
    };
    let outline_color_mode = if color_mode == 0 {
        "fixedColor"
    } else {
        "mixedLighting"
    };
    let uv_transform = vectors
        .get("_MainTex")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_else(|| IDENTITY_UV_TRANSFORM.iter().map(|v| json!(v)).collect());
    let offset = uv_transform.get(0..2).map(|slice| json!(slice));
    let scale = uv_transform.get(2..4).map(|slice| json!(slice));

    let float = |key: &str| floats.get(key).cloned();
    let vector = |key: &str| vectors.get(key).cloned();
    let texture = |key: &str| textures.get(key).cloned();

    let entries: Vec<(&str, Option<Value>)> = vec![
        ("version", Some(json!("3.2"))),
        ("renderMode", Some(json!(render_mode))),
        (
            "cullMode",
            Some(json!(if material.use_backface_culling {
                "back"
            } else {
                "off"
            })),
        ),
        ("renderQueueOffsetNumber", Some(json!(0))),
        ("litFactor", vector("_Color")),
        ("litMultiplyTexture", texture("_MainTex")),
        ("shadeFactor", vector("_ShadeColor")),
        ("shadeMultiplyTexture", texture("_ShadeTexture")),
        ("cutoutThresholdFactor", float("_Cutoff")),
        ("shadingShiftFactor", float("_ShadeShift")),
        ("shadingToonyFactor", float("_ShadeToony")),
        ("shadowReceiveMultiplierFactor", float("_ReceiveShadowRate")),
        (
            "shadowReceiveMultiplierMultiplyTexture",
            texture("_ReceiveShadowTexture"),
        ),
        ("litAndShadeMixingMultiplierFactor", float("_ShadingGradeRate")),
        (
            "litAndShadeMixingMultiplierMultiplyTexture",
            texture("_ShadingGradeTexture"),
        ),
        ("lightColorAttenuationFactor", float("_LightColorAttenuation")),
        ("giIntensityFactor", float("_IndirectLightIntensity")),
        ("normalTexture", texture("_BumpMap")),
        ("normalScaleFactor", float("_BumpScale")),
        ("emissionFactor", vector("_EmissionColor")),
        ("emissionMultiplyTexture", texture("_EmissionMap")),
        ("additiveTexture", texture("_SphereAdd")),
        ("rimFactor", vector("_RimColor")),
        ("rimMultiplyTexture", texture("_RimTexture")),
        ("rimLightingMixFactor", float("_RimLightingMix")),
        ("rimFresnelPowerFactor", float("_RimFresnelPower")),
        ("rimLiftFactor", float("_RimLift")),
        ("outlineWidthMode", Some(json!(outline_width_mode))),
        ("outlineWidthFactor", float("_OutlineWidth")),
        ("outlineWidthMultiplyTexture", texture("_OutlineWidthTexture")),
        (
            "outlineScaledMaxDistanceFactor",
            float("_OutlineScaledMaxDistance"),
        ),
        ("outlineColorMode", Some(json!(outline_color_mode))),
        ("outlineFactor", vector("_OutlineColor")),
        ("outlineLightingMixFactor", float("_OutlineLightingMix")),
        ("mainTextureLeftBottomOriginOffset", offset),
        ("mainTextureLeftBottomOriginScale", scale),
        ("uvAnimationMaskTexture", texture("_UvAnimMaskTexture")),
        ("uvAnimationScrollXSpeedFactor", float("_UvAnimScrollX")),
        ("uvAnimationScrollYSpeedFactor", float("_UvAnimScrollY")),
        ("uvAnimationRotationSpeedFactor", float("_UvAnimRotation")),
    ];

    entries
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(value: Value) -> Material {
        serde_json::from_value(value).expect("material")
    }

    fn images() -> HashMap<String, usize> {
        [("body".to_string(), 0usize), ("normal".to_string(), 1)]
            .into_iter()
            .collect()
    }

    fn translate(version: VrmVersion, material: &Material) -> (TranslatedMaterial, TextureRegistry) {
        let images = images();
        let mut registry = TextureRegistry::default();
        let translated = MaterialTranslator {
            version,
            image_index: &images,
            registry: &mut registry,
        }
        .translate(material)
        .expect("translate");
        (translated, registry)
    }

    fn toon(blend_method: &str) -> Material {
        material(json!({
            "name": "Skin",
            "shader": "MToon_unversioned",
            "blend_method": blend_method,
            "alpha_threshold": 0.3,
            "use_backface_culling": true,
            "inputs": {
                "DiffuseColor": [0.8, 0.7, 0.6, 1.0],
                "OutlineColor": [0.0, 0.0, 0.0, 1.0],
                "ShadeShift": 0.1,
                "OutlineWidth": 0.2,
                "OutlineLightingMix": 1.0,
                "OutlineWidthMode": 1.5,
                "OutlineColorMode": 0.5,
                "MainTexture": {
                    "image": "body",
                    "uv_transform": {"offset": [0.1, 0.2], "scale": [2.0, 3.0]}
                },
                "NomalmapTexture": {"image": "normal", "interpolation": "Closest", "extension": "EXTEND"}
            }
        }))
    }

    #[test]
    fn given_clip_material_when_translating_then_mask_with_threshold_cutoff() {
        let (translated, _) = translate(VrmVersion::Legacy, &toon("CLIP"));

        assert_eq!(translated.core["alphaMode"], "MASK");
        assert_eq!(translated.core["alphaCutoff"], 0.3);
        assert_eq!(translated.legacy["floatProperties"]["_Cutoff"], 0.3);
        assert_eq!(translated.legacy["keywordMap"]["_ALPHATEST_ON"], true);
        assert_eq!(translated.legacy["renderQueue"], 2450);
        assert_eq!(translated.legacy["tagMap"]["RenderType"], "TransparentCutout");
    }

    #[test]
    fn given_opaque_material_when_translating_then_no_cutoff_is_written() {
        let (translated, _) = translate(VrmVersion::Legacy, &toon("OPAQUE"));

        assert_eq!(translated.core["alphaMode"], "OPAQUE");
        assert!(translated.core.get("alphaCutoff").is_none());
        assert_eq!(translated.legacy["renderQueue"], -1);
        assert_eq!(translated.legacy["keywordMap"]["_ALPHABLEND_ON"], false);
        assert_eq!(translated.core["doubleSided"], false);
    }

    #[test]
    fn given_hashed_material_when_translating_then_blend_preset_is_used() {
        let (translated, _) = translate(VrmVersion::Legacy, &toon("HASHED"));

        assert_eq!(translated.core["alphaMode"], "BLEND");
        assert_eq!(translated.legacy["floatProperties"]["_ZWrite"], 0);
        assert_eq!(translated.legacy["floatProperties"]["_DstBlend"], 10);
        assert_eq!(translated.legacy["keywordMap"]["_ALPHABLEND_ON"], true);
    }

    #[test]
    fn given_half_integer_outline_modes_when_translating_then_round_half_to_even_is_applied() {
        let (translated, _) = translate(VrmVersion::Legacy, &toon("OPAQUE"));
        let legacy = &translated.legacy;

        assert_eq!(legacy["floatProperties"]["_OutlineWidthMode"], 2);
        assert_eq!(legacy["floatProperties"]["_OutlineColorMode"], 0);
        assert_eq!(legacy["keywordMap"]["MTOON_OUTLINE_WIDTH_SCREEN"], true);
        assert_eq!(legacy["keywordMap"]["MTOON_OUTLINE_COLOR_FIXED"], true);
        assert!(legacy["keywordMap"].get("MTOON_OUTLINE_WIDTH_WORLD").is_none());
        assert_eq!(legacy["keywordMap"]["_NORMALMAP"], true);
    }

    #[test]
    fn given_mtoon_textures_when_translating_then_textures_and_uv_vectors_are_recorded() {
        let (translated, registry) = translate(VrmVersion::Legacy, &toon("OPAQUE"));
        let legacy = &translated.legacy;

        assert_eq!(legacy["textureProperties"]["_MainTex"], 0);
        assert_eq!(legacy["textureProperties"]["_BumpMap"], 1);
        assert_eq!(legacy["vectorProperties"]["_MainTex"], json!([0.1, 0.2, 2.0, 3.0]));
        assert_eq!(legacy["vectorProperties"]["_BumpMap"], json!([0.0, 0.0, 1.0, 1.0]));
        assert_eq!(translated.core["pbrMetallicRoughness"]["baseColorTexture"]["index"], 0);
        assert_eq!(
            translated.core["pbrMetallicRoughness"]["baseColorFactor"],
            json!([0.8, 0.7, 0.6, 1.0])
        );
        assert_eq!(
            registry.samplers_json(),
            vec![
                json!({"magFilter": 9729, "minFilter": 9729, "wrapS": 10497, "wrapT": 10497}),
                json!({"magFilter": 9728, "minFilter": 9728, "wrapS": 33071, "wrapT": 33071}),
            ]
        );
        assert_eq!(
            registry.textures_json(),
            vec![
                json!({"sampler": 0, "source": 0}),
                json!({"sampler": 1, "source": 1})
            ]
        );
    }

    #[test]
    fn given_v1_target_when_translating_mtoon_then_properties_are_remapped() {
        let (translated, _) = translate(VrmVersion::V1, &toon("CLIP"));
        let properties = &translated.core["extensions"]["VRMC_materials_mtoon"]["properties"];

        assert_eq!(properties["version"], "3.2");
        assert_eq!(properties["renderMode"], "cutout");
        assert_eq!(properties["cullMode"], "back");
        assert_eq!(properties["outlineWidthMode"], "screenCoordinates");
        assert_eq!(properties["outlineColorMode"], "fixedColor");
        assert_eq!(properties["outlineWidthFactor"], 0.2);
        assert_eq!(properties["outlineFactor"], json!([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(properties["outlineLightingMixFactor"], 1.0);
        assert_eq!(properties["cutoutThresholdFactor"], 0.3);
        assert_eq!(properties["mainTextureLeftBottomOriginScale"], json!([2.0, 3.0]));
        assert!(properties.get("rimFactor").is_none());
        assert!(translated.core["extensions"].get("KHR_materials_unlit").is_some());
    }

    #[test]
    fn given_gltf_material_when_translating_then_pbr_inputs_are_read_directly() {
        let material = material(json!({
            "name": "Metal",
            "shader": "GLTF",
            "inputs": {
                "base_Color": [0.1, 0.2, 0.3, 1.0],
                "metallic": 1.0,
                "roughness": 0.4,
                "unlit": 0.2,
                "emissive_color": [0.5, 0.5, 0.5, 1.0],
                "normal": {"image": "normal"}
            }
        }));

        let (translated, _) = translate(VrmVersion::Legacy, &material);
        let core = &translated.core;

        assert_eq!(core["pbrMetallicRoughness"]["metallicFactor"], 1.0);
        assert_eq!(core["pbrMetallicRoughness"]["roughnessFactor"], 0.4);
        assert!(core.get("extensions").is_none());
        assert_eq!(core["normalTexture"], json!({"index": 0, "texCoord": 0}));
        assert_eq!(core["emissiveFactor"], json!([0.5, 0.5, 0.5]));
        assert_eq!(translated.legacy["shader"], "VRM_USE_GLTFSHADER");
    }

    #[test]
    fn given_zwrite_material_when_translating_then_blend_and_fixed_queue_are_used() {
        let material = material(json!({
            "name": "Hair",
            "shader": "TRANSPARENT_ZWRITE",
            "inputs": {"Main_Texture": {"image": "body"}}
        }));

        let (translated, _) = translate(VrmVersion::Legacy, &material);

        assert_eq!(translated.core["alphaMode"], "BLEND");
        assert_eq!(translated.core["pbrMetallicRoughness"]["roughnessFactor"], 0.9);
        assert_eq!(translated.legacy["renderQueue"], 2600);
        assert_eq!(translated.legacy["textureProperties"]["_MainTex"], 0);
        assert_eq!(translated.legacy["vectorProperties"]["_MainTex"], json!([0.0, 0.0, 1.0, 1.0]));
    }

    #[test]
    fn given_unknown_shader_when_translating_then_export_aborts() {
        let material = material(json!({"name": "Glass", "shader": "Principled"}));
        let images = images();
        let mut registry = TextureRegistry::default();

        let result = MaterialTranslator {
            version: VrmVersion::Legacy,
            image_index: &images,
            registry: &mut registry,
        }
        .translate(&material);

        assert!(matches!(
            result,
            Err(ExportError::UnsupportedShader { material, shader })
                if material == "Glass" && shader == "Principled"
        ));
    }

    #[test]
    fn given_texture_with_unknown_image_when_translating_then_missing_image_is_reported() {
        let material = material(json!({
            "name": "Eyes",
            "shader": "TRANSPARENT_ZWRITE",
            "inputs": {"Main_Texture": {"image": "eyes"}}
        }));
        let images = images();
        let mut registry = TextureRegistry::default();

        let result = MaterialTranslator {
            version: VrmVersion::Legacy,
            image_index: &images,
            registry: &mut registry,
        }
        .translate(&material);

        assert!(matches!(result, Err(ExportError::MissingImage { image, .. }) if image == "eyes"));
    }

    #[test]
    fn given_repeated_texture_requests_when_registering_then_indices_are_shared() {
        let mut registry = TextureRegistry::default();
        let first = registry.texture_index(3, GL_REPEAT, GL_LINEAR);
        let second = registry.texture_index(3, GL_REPEAT, GL_LINEAR);
        let other_sampler = registry.texture_index(3, GL_CLAMP_TO_EDGE, GL_LINEAR);

        assert_eq!(first, second);
        assert_eq!(other_sampler, 1);
        assert_eq!(registry.samplers_json().len(), 2);
    }
}
