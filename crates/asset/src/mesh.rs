//! CPU-side mesh representation produced by the weld step.

use bytemuck::{Pod, Zeroable};

/// Interleaved vertex record: position, normal, texture coordinate.
/// Laid out exactly as the GPU vertex buffer expects (32 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Welded mesh: dense vertex list plus a `u32` index stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Returns `true` if both vertex and index buffers are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    /// Every index addresses an existing vertex.
    pub fn indices_in_bounds(&self) -> bool {
        let len = self.vertices.len();
        self.indices.iter().all(|&i| (i as usize) < len)
    }
}
