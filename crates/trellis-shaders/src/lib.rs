//! Shaders for the Trellis sandbox.
//!
//! GLSL sources live in `shaders/` and are compiled to SPIR-V by the build
//! script using shaderc.

use std::sync::OnceLock;

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static MESH_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh_vert.spv"));
    pub static MESH_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh_frag.spv"));
}

/// Convert byte slice to aligned u32 Vec (SPIR-V requires 4-byte alignment).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    debug_assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be a multiple of 4 bytes"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

static MESH_VERT_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
static MESH_FRAG_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();

/// Mesh vertex shader: camera UBO at set 0, model matrix push constant.
pub fn mesh_vertex_shader() -> &'static [u32] {
    MESH_VERT_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::MESH_VERT))
}

/// Mesh fragment shader: vertex colour modulated by the set 1 texture.
pub fn mesh_fragment_shader() -> &'static [u32] {
    MESH_FRAG_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::MESH_FRAG))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn mesh_shaders_load() {
        for shader in [mesh_vertex_shader(), mesh_fragment_shader()] {
            assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
            assert!(shader.len() > 20, "Shader too small");
        }
    }

    #[test]
    fn byte_conversion_is_little_endian() {
        assert_eq!(bytes_to_spirv(&[0x03, 0x02, 0x23, 0x07]), vec![SPIRV_MAGIC]);
    }
}
