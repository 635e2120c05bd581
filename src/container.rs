//! Binary glTF container (GLB) encoding and decoding.
//!
//! Layout: 12-byte header (`glTF`, version 2, total length) followed by a JSON
//! chunk padded with spaces and a BIN chunk padded with zero bytes. Every chunk
//! starts with its own 4-byte length and 4-byte type tag.

use serde_json::Value;

use crate::error::{ContainerError, ExportError};

const MAGIC: &[u8; 4] = b"glTF";
const VERSION: u32 = 2;
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const JSON_CHUNK: &[u8; 4] = b"JSON";
const BIN_CHUNK: &[u8; 4] = b"BIN\0";

/// Serialize a glTF document and its binary blob into a GLB container.
pub fn encode(json: &Value, binary: &[u8]) -> Result<Vec<u8>, ExportError> {
    let mut json_bytes = serde_json::to_vec(json)?;
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }

    let bin_pad = (4 - binary.len() % 4) % 4;
    let bin_len = binary.len() + bin_pad;

    let total_len = HEADER_LEN + CHUNK_HEADER_LEN + json_bytes.len() + CHUNK_HEADER_LEN + bin_len;
    let mut out = Vec::with_capacity(total_len);

    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(total_len as u32).to_le_bytes());

    out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(JSON_CHUNK);
    out.extend_from_slice(&json_bytes);

    out.extend_from_slice(&(bin_len as u32).to_le_bytes());
    out.extend_from_slice(BIN_CHUNK);
    out.extend_from_slice(binary);
    out.extend(std::iter::repeat_n(0u8, bin_pad));

    Ok(out)
}

/// Split a GLB container back into its JSON document and binary blob.
///
/// The BIN chunk is optional. When the document declares
/// `buffers[0].byteLength` no larger than the chunk, the trailing chunk padding
/// is dropped so the returned blob matches what was encoded. Documents without
/// a `buffers[0].byteLength` get the padded chunk back, e.g. `[1, 2, 3]`
/// encoded under `{}` decodes as `[1, 2, 3, 0]`.
pub fn decode(bytes: &[u8]) -> Result<(Value, Vec<u8>), ContainerError> {
    if bytes.len() < HEADER_LEN {
        return Err(ContainerError::TooShort(bytes.len()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(ContainerError::InvalidMagic);
    }
    let version = read_u32(bytes, 4);
    if version != VERSION {
        return Err(ContainerError::UnsupportedVersion(version));
    }
    let declared = read_u32(bytes, 8) as usize;
    if declared > bytes.len() || declared < HEADER_LEN {
        return Err(ContainerError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    let bytes = &bytes[..declared];

    let (json_tag, json_chunk, next) = read_chunk(bytes, HEADER_LEN)?;
    if json_tag != JSON_CHUNK {
        return Err(ContainerError::UnexpectedChunk {
            expected: "JSON",
            offset: HEADER_LEN,
        });
    }
    let json: Value = serde_json::from_slice(json_chunk)?;

    let mut binary = Vec::new();
    if next < bytes.len() {
        let (bin_tag, bin_chunk, _) = read_chunk(bytes, next)?;
        if bin_tag != BIN_CHUNK {
            return Err(ContainerError::UnexpectedChunk {
                expected: "BIN",
                offset: next,
            });
        }
        binary = bin_chunk.to_vec();
    }

    if let Some(byte_length) = json
        .pointer("/buffers/0/byteLength")
        .and_then(Value::as_u64)
        .map(|value| value as usize)
        && byte_length <= binary.len()
    {
        binary.truncate(byte_length);
    }

    Ok((json, binary))
}

/// Reverse path used by inspection tooling; identical to [`decode`].
pub fn parse(bytes: &[u8]) -> Result<(Value, Vec<u8>), ContainerError> {
    decode(bytes)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_chunk(bytes: &[u8], offset: usize) -> Result<(&[u8], &[u8], usize), ContainerError> {
    let data_start = offset + CHUNK_HEADER_LEN;
    if data_start > bytes.len() {
        return Err(ContainerError::ChunkOutOfBounds { offset });
    }
    let length = read_u32(bytes, offset) as usize;
    let data_end = data_start
        .checked_add(length)
        .filter(|end| *end <= bytes.len())
        .ok_or(ContainerError::ChunkOutOfBounds { offset })?;

    Ok((
        &bytes[offset + 4..data_start],
        &bytes[data_start..data_end],
        data_end,
    ))
}
