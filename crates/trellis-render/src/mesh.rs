//! Indexed mesh data and its GPU upload.

use std::mem::{offset_of, size_of};
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3};
use trellis_gpu::{GpuBuffer, GpuContext, Result};

use crate::drawable::Drawable;

/// Vertex layout shared by every mesh: position, colour and texture coordinates.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Self, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Self, color) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(2)
                .binding(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(offset_of!(Self, uv) as u32),
        ]
    }
}

/// CPU-side geometry.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Unit cube centred on the origin, one quad per face so every face gets
    /// its own colour and full texture. Triangles wind counter-clockwise seen
    /// from outside.
    pub fn cube() -> Self {
        // (normal, u axis, v axis, colour) with u x v == normal.
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y, [0.9, 0.3, 0.3]),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y, [0.3, 0.9, 0.3]),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z, [0.3, 0.3, 0.9]),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z, [0.9, 0.9, 0.3]),
            (Vec3::Z, Vec3::X, Vec3::Y, [0.9, 0.3, 0.9]),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y, [0.3, 0.9, 0.9]),
        ];
        let corners = [
            (-1.0, -1.0, [0.0, 1.0]),
            (1.0, -1.0, [1.0, 1.0]),
            (1.0, 1.0, [1.0, 0.0]),
            (-1.0, 1.0, [0.0, 0.0]),
        ];

        let mut data = Self {
            vertices: Vec::with_capacity(24),
            indices: Vec::with_capacity(36),
        };

        for (normal, u, v, color) in faces {
            let base = data.vertices.len() as u32;
            for (su, sv, uv) in corners {
                let position = (normal + u * su + v * sv) * 0.5;
                data.vertices.push(Vertex {
                    position: position.to_array(),
                    color,
                    uv,
                });
            }
            data.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        data
    }
}

/// Mesh uploaded to host-visible vertex and index buffers.
pub struct Mesh {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    index_count: u32,
}

impl Mesh {
    /// Upload `data` to new GPU buffers.
    pub fn upload(gpu: &Arc<GpuContext>, data: &MeshData) -> Result<Self> {
        let vertex_buffer = GpuBuffer::with_data(
            gpu,
            &data.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "mesh_vertices",
        )?;
        let index_buffer = GpuBuffer::with_data(
            gpu,
            &data.indices,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "mesh_indices",
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        })
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Drawable instance of this mesh. The mesh must outlive every frame
    /// that draws it.
    pub fn drawable(&self, transform: Mat4, material: vk::DescriptorSet) -> Drawable {
        Drawable {
            transform,
            vertex_buffer: self.vertex_buffer.handle(),
            index_buffer: self.index_buffer.handle(),
            index_count: self.index_count,
            descriptor_set: material,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout() {
        assert_eq!(size_of::<Vertex>(), 32);
        let attributes = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(Vertex::binding_descriptions()[0].stride, 32);
    }

    #[test]
    fn cube_counts() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertices.len()));
    }

    #[test]
    fn cube_fits_unit_bounds() {
        let cube = MeshData::cube();
        for vertex in &cube.vertices {
            for c in vertex.position {
                assert!((c.abs() - 0.5).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn cube_triangles_face_outward() {
        let cube = MeshData::cube();
        for triangle in cube.indices.chunks(3) {
            let [a, b, c] =
                [0, 1, 2].map(|i| Vec3::from(cube.vertices[triangle[i] as usize].position));
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) > 0.0, "inward triangle {triangle:?}");
        }
    }
}
