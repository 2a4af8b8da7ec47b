use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::Result;
use gpu_allocator::vulkan::Allocator;
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::shader_data::Vertex;

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
const YELLOW: [f32; 4] = [1.0, 1.0, 0.0, 1.0];
const MAGENTA: [f32; 4] = [1.0, 0.0, 1.0, 1.0];
const CYAN: [f32; 4] = [0.0, 1.0, 1.0, 1.0];

/// Unit cube as a triangle list, one solid color per face, clockwise winding
pub const COLORED_CUBE: [Vertex; 36] = [
    // +Z
    Vertex::new([-1.0, -1.0, 1.0, 1.0], RED),
    Vertex::new([-1.0, 1.0, 1.0, 1.0], RED),
    Vertex::new([1.0, -1.0, 1.0, 1.0], RED),
    Vertex::new([1.0, -1.0, 1.0, 1.0], RED),
    Vertex::new([-1.0, 1.0, 1.0, 1.0], RED),
    Vertex::new([1.0, 1.0, 1.0, 1.0], RED),
    // -Z
    Vertex::new([-1.0, -1.0, -1.0, 1.0], GREEN),
    Vertex::new([1.0, -1.0, -1.0, 1.0], GREEN),
    Vertex::new([-1.0, 1.0, -1.0, 1.0], GREEN),
    Vertex::new([-1.0, 1.0, -1.0, 1.0], GREEN),
    Vertex::new([1.0, -1.0, -1.0, 1.0], GREEN),
    Vertex::new([1.0, 1.0, -1.0, 1.0], GREEN),
    // -X
    Vertex::new([-1.0, 1.0, 1.0, 1.0], BLUE),
    Vertex::new([-1.0, -1.0, 1.0, 1.0], BLUE),
    Vertex::new([-1.0, 1.0, -1.0, 1.0], BLUE),
    Vertex::new([-1.0, 1.0, -1.0, 1.0], BLUE),
    Vertex::new([-1.0, -1.0, 1.0, 1.0], BLUE),
    Vertex::new([-1.0, -1.0, -1.0, 1.0], BLUE),
    // +X
    Vertex::new([1.0, 1.0, 1.0, 1.0], YELLOW),
    Vertex::new([1.0, 1.0, -1.0, 1.0], YELLOW),
    Vertex::new([1.0, -1.0, 1.0, 1.0], YELLOW),
    Vertex::new([1.0, -1.0, 1.0, 1.0], YELLOW),
    Vertex::new([1.0, 1.0, -1.0, 1.0], YELLOW),
    Vertex::new([1.0, -1.0, -1.0, 1.0], YELLOW),
    // +Y
    Vertex::new([1.0, 1.0, 1.0, 1.0], MAGENTA),
    Vertex::new([-1.0, 1.0, 1.0, 1.0], MAGENTA),
    Vertex::new([1.0, 1.0, -1.0, 1.0], MAGENTA),
    Vertex::new([1.0, 1.0, -1.0, 1.0], MAGENTA),
    Vertex::new([-1.0, 1.0, 1.0, 1.0], MAGENTA),
    Vertex::new([-1.0, 1.0, -1.0, 1.0], MAGENTA),
    // -Y
    Vertex::new([1.0, -1.0, 1.0, 1.0], CYAN),
    Vertex::new([1.0, -1.0, -1.0, 1.0], CYAN),
    Vertex::new([-1.0, -1.0, 1.0, 1.0], CYAN),
    Vertex::new([-1.0, -1.0, 1.0, 1.0], CYAN),
    Vertex::new([1.0, -1.0, -1.0, 1.0], CYAN),
    Vertex::new([-1.0, -1.0, -1.0, 1.0], CYAN),
];

/// Vertices uploaded once to device-local memory and addressed from the vertex shader
pub struct Mesh {
    pub vertex_buffer: Buffer,
    pub vertex_buffer_address: vk::DeviceAddress,
    pub vertex_count: u32,
}

impl Mesh {
    pub fn new(
        vertices: &[Vertex],
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        transfer_context: &TransferContext,
    ) -> Result<Self> {
        let vertex_buffer = Buffer::new_device_local(
            vertices,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            "Mesh vertex buffer",
            memory_allocator,
            device,
            transfer_context,
        )?;
        let vertex_buffer_address = vertex_buffer.device_address();

        Ok(Self {
            vertex_buffer,
            vertex_buffer_address,
            vertex_count: vertices.len() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn every_face_is_two_triangles_of_one_color() {
        for face in COLORED_CUBE.chunks(6) {
            assert!(face.iter().all(|v| v.color == face[0].color));
        }
        let mut colors: Vec<[f32; 4]> = COLORED_CUBE.chunks(6).map(|f| f[0].color.to_array()).collect();
        colors.dedup();
        assert_eq!(colors.len(), 6);
    }

    #[test]
    fn every_face_lies_on_a_cube_side() {
        for face in COLORED_CUBE.chunks(6) {
            let on_side = (0..3).any(|axis| {
                let c = face[0].position[axis];
                c.abs() == 1.0 && face.iter().all(|v| v.position[axis] == c)
            });
            assert!(on_side);
        }
    }

    #[test]
    fn winding_is_consistent_across_faces() {
        // Right-handed normals of every triangle point into the cube
        for tri in COLORED_CUBE.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|v| v.position.truncate());
            let normal = (b - a).cross(c - a);
            let centroid: Vec3 = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) < 0.0);
        }
    }
}
