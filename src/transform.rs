// Per-frame transform block
//
// Written into the slot's uniform buffer right before each submission.
// The projection carries the pre-rotation so the scene stays upright while
// the presentation chain keeps its un-rotated ("identity") extent.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::f32::consts::{FRAC_PI_2, PI};

const SPIN_DEGREES_PER_SECOND: f32 = 60.0;

/// Uniform block consumed by the vertex stage at set 0, binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl FrameUniforms {
    /// Build the transforms for a frame `elapsed_secs` after engine start.
    pub fn new(
        elapsed_secs: f32,
        extent: vk::Extent2D,
        pre_transform: vk::SurfaceTransformFlagsKHR,
    ) -> Self {
        let angle = elapsed_secs * SPIN_DEGREES_PER_SECOND.to_radians();
        let model = Mat4::from_rotation_x(angle)
            * Mat4::from_rotation_y(angle)
            * Mat4::from_rotation_z(angle);

        let view = Mat4::look_at_rh(Vec3::splat(4.0), Vec3::ZERO, Vec3::Z);

        // Quarter turns swap the axes the projection is displayed along
        let (width, height) = (extent.width.max(1) as f32, extent.height.max(1) as f32);
        let aspect = if pre_transform.intersects(
            vk::SurfaceTransformFlagsKHR::ROTATE_90 | vk::SurfaceTransformFlagsKHR::ROTATE_270,
        ) {
            height / width
        } else {
            width / height
        };
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        // Vulkan clip space Y points down
        proj.y_axis.y *= -1.0;

        Self {
            model,
            view,
            proj: prerotation(pre_transform) * proj,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Rotation that undoes the display's current transform.
pub fn prerotation(transform: vk::SurfaceTransformFlagsKHR) -> Mat4 {
    if transform.contains(vk::SurfaceTransformFlagsKHR::ROTATE_90) {
        Mat4::from_rotation_z(FRAC_PI_2)
    } else if transform.contains(vk::SurfaceTransformFlagsKHR::ROTATE_180) {
        Mat4::from_rotation_z(PI)
    } else if transform.contains(vk::SurfaceTransformFlagsKHR::ROTATE_270) {
        Mat4::from_rotation_z(-FRAC_PI_2)
    } else {
        Mat4::IDENTITY
    }
}
