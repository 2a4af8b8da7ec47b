use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Data unique to each vertex, read by the vertex shader through a buffer device address
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec4,
    pub color: Vec4,
}

impl Vertex {
    pub const fn new(position: [f32; 4], color: [f32; 4]) -> Self {
        Self {
            position: Vec4::from_array(position),
            color: Vec4::from_array(color),
        }
    }
}

/// Data unique to each draw call passed as a push constant
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct DrawPushConstants {
    pub render_matrix: Mat4,
    pub vertex_buffer: u64,
    _padding: u64,
}

impl DrawPushConstants {
    pub fn new(render_matrix: Mat4, vertex_buffer: u64) -> Self {
        Self {
            render_matrix,
            vertex_buffer,
            _padding: 0,
        }
    }
}
