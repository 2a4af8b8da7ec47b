use ash::vk;
use glam::{Mat4, Vec3, Vec4};

/// Fixed viewpoint looking at the origin, producing the model-view-projection-clip matrix
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    fov_y_deg: f32,
    near: f32,
    far: f32,
}

impl Camera {
    const DEFAULT_FOV_Y_DEG: f32 = 45.0;

    pub fn new() -> Self {
        Self {
            position: Vec3::new(-5.0, 3.0, -10.0),
            target: Vec3::ZERO,
            up: Vec3::NEG_Y,
            fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn get_view_mat(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Square projection. For wide targets the field of view is narrowed by
    /// `height / width` instead of widening the aspect ratio.
    pub fn get_proj_mat(&self, extent: vk::Extent2D) -> Mat4 {
        let mut fov = self.fov_y_deg.to_radians();
        if extent.width > extent.height {
            fov *= extent.height as f32 / extent.width as f32;
        }
        Mat4::perspective_rh_gl(fov, 1.0, self.near, self.far)
    }

    /// Maps OpenGL clip space to Vulkan's: y flipped, z from [-1, 1] to [0, 1]
    pub fn get_clip_mat() -> Mat4 {
        Mat4::from_cols(
            Vec4::new(1.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, -1.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 0.5, 0.0),
            Vec4::new(0.0, 0.0, 0.5, 1.0),
        )
    }

    pub fn get_render_mat(&self, extent: vk::Extent2D) -> Mat4 {
        let model = Mat4::IDENTITY;
        Self::get_clip_mat() * self.get_proj_mat(extent) * self.get_view_mat() * model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: vk::Extent2D = vk::Extent2D { width: 1080, height: 1080 };

    fn project(m: Mat4, p: Vec3) -> Vec3 {
        let clip = m * p.extend(1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn origin_projects_to_screen_center() {
        let ndc = project(Camera::new().get_render_mat(SQUARE), Vec3::ZERO);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn whole_cube_is_in_view_depth_range() {
        let render = Camera::new().get_render_mat(SQUARE);
        let corners = (0..8).map(|i| {
            let sign = |bit: i32| if i & bit == 0 { -1.0 } else { 1.0 };
            Vec3::new(sign(1), sign(2), sign(4))
        });
        for corner in corners {
            let ndc = project(render, corner);
            assert!(ndc.z > 0.0 && ndc.z < 1.0, "{corner} -> {ndc}");
            assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0, "{corner} -> {ndc}");
        }
    }

    #[test]
    fn wide_targets_narrow_the_field_of_view() {
        let camera = Camera::new();
        let square = camera.get_proj_mat(SQUARE);
        let wide = camera.get_proj_mat(vk::Extent2D { width: 1600, height: 900 });
        let tall = camera.get_proj_mat(vk::Extent2D { width: 900, height: 1600 });
        // Narrower field of view means a larger focal scale
        assert!(wide.x_axis.x > square.x_axis.x);
        assert_eq!(tall, square);
    }

    #[test]
    fn clip_matrix_flips_y_and_halves_z() {
        let clip = Camera::get_clip_mat();
        assert_eq!(clip * Vec4::new(0.0, 1.0, -1.0, 1.0), Vec4::new(0.0, -1.0, 0.0, 1.0));
        assert_eq!(clip * Vec4::new(0.0, 0.0, 1.0, 1.0), Vec4::new(0.0, 0.0, 1.0, 1.0));
    }
}
