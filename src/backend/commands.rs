// Command pool + per-slot command buffers
//
// Buffers are re-recorded every frame: the pool allows resetting them one at
// a time, and a buffer is only reset after its slot's fence has signaled.

use anyhow::{anyhow, Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::frame::FRAMES_IN_FLIGHT;

/// Everything one draw needs, resolved for the current slot and image.
pub struct DrawParams {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub clear_color: [f32; 4],
    pub clear_depth: bool,
    pub vertex_count: u32,
}

pub struct CommandResources {
    pool: vk::CommandPool,
    pub buffers: [vk::CommandBuffer; FRAMES_IN_FLIGHT],
    device: Arc<VulkanDevice>,
}

impl CommandResources {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let mut commands = Self {
            pool,
            buffers: [vk::CommandBuffer::null(); FRAMES_IN_FLIGHT],
            device: Arc::clone(device),
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(FRAMES_IN_FLIGHT as u32);

        let buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;
        commands.buffers = buffers
            .try_into()
            .map_err(|b: Vec<_>| anyhow!("Expected {} command buffers, got {}", FRAMES_IN_FLIGHT, b.len()))?;

        Ok(commands)
    }

    /// Reset and record the slot's command buffer.
    pub fn record_draw(&self, slot: usize, params: &DrawParams) -> Result<vk::CommandBuffer> {
        let cmd = self.buffers[slot];
        let device = &self.device.device;

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            let mut clear_values = vec![vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: params.clear_color,
                },
            }];
            if params.clear_depth {
                clear_values.push(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                });
            }

            let render_area = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: params.extent,
            };

            let render_pass_begin = vk::RenderPassBeginInfo::default()
                .render_pass(params.render_pass)
                .framebuffer(params.framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: params.extent.width as f32,
                height: params.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);

            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, params.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                params.layout,
                0,
                &[params.descriptor_set],
                &[],
            );
            device.cmd_draw(cmd, params.vertex_count, 1, 0, 0);

            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .context("Failed to end command buffer")?;
        }

        Ok(cmd)
    }
}

impl Drop for CommandResources {
    fn drop(&mut self) {
        unsafe {
            // Also frees the command buffers
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}
