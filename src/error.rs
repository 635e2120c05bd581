use thiserror::Error;

/// Fatal conditions that abort an export before any output is produced.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("VRM doesn't support \"{shader}\" shader (material: {material})")]
    UnsupportedShader { material: String, shader: String },

    #[error("VRM schema version is not set")]
    MissingVrmVersion,

    #[error("Unsupported VRM schema version: {0}")]
    UnsupportedVrmVersion(String),

    #[error("Metadata text '{text}' referenced by '{key}' does not exist")]
    MissingMetadataText { key: &'static str, text: String },

    #[error("Metadata text '{text}' is not valid JSON: {source}")]
    InvalidMetadataJson {
        text: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Metadata text '{text}' has an unexpected shape: {reason}")]
    InvalidMetadataShape { text: String, reason: &'static str },

    #[error("Bone name '{0}' is used more than once")]
    DuplicateBoneName(String),

    #[error("Bone '{bone}' references unknown parent '{parent}'")]
    UnknownParentBone { bone: String, parent: String },

    #[error("Image '{image}' used by '{owner}' is not part of the scene")]
    MissingImage { owner: String, image: String },

    #[error("Image '{image}' has an unrecognized format: {reason}")]
    InvalidImage { image: String, reason: String },

    #[error("Material '{material}' used by mesh '{mesh}' is not part of the scene")]
    MissingMaterial { mesh: String, material: String },

    #[error("Face {face} of mesh '{mesh}' uses material slot {slot} which does not exist")]
    InvalidMaterialSlot {
        mesh: String,
        face: usize,
        slot: usize,
    },

    #[error("Face {face} of mesh '{mesh}' references vertex {vertex} which does not exist")]
    InvalidVertexIndex {
        mesh: String,
        face: usize,
        vertex: usize,
    },

    #[error("Failed to serialize glTF JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced while reading a binary glTF container.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Container is too short ({0} bytes)")]
    TooShort(usize),

    #[error("Container magic is not 'glTF'")]
    InvalidMagic,

    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u32),

    #[error("Declared length {declared} does not fit the {actual} available bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Chunk at offset {offset} runs past the end of the container")]
    ChunkOutOfBounds { offset: usize },

    #[error("Expected a {expected} chunk at offset {offset}")]
    UnexpectedChunk {
        expected: &'static str,
        offset: usize,
    },

    #[error("JSON chunk is not valid: {0}")]
    Json(#[from] serde_json::Error),
}
