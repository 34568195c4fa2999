// Descriptor set layout, pool and the per-frame sets
//
// One uniform-buffer binding visible to the vertex stage. Each frame slot gets
// its own set pointing at its own uniform buffer so a frame in flight never
// sees the next frame's write.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::frame::FRAMES_IN_FLIGHT;

const UNIFORM_BINDING: u32 = 0;

pub struct Descriptor {
    pub layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pub sets: [vk::DescriptorSet; FRAMES_IN_FLIGHT],
    device: Arc<VulkanDevice>,
}

impl Descriptor {
    /// `buffers[i]` backs `sets[i]` over `range` bytes.
    pub fn new(
        device: &Arc<VulkanDevice>,
        buffers: [vk::Buffer; FRAMES_IN_FLIGHT],
        range: vk::DeviceSize,
    ) -> Result<Self> {
        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(UNIFORM_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)];

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
            .context("Failed to create descriptor set layout")?;

        let mut descriptor = Self {
            layout,
            pool: vk::DescriptorPool::null(),
            sets: [vk::DescriptorSet::null(); FRAMES_IN_FLIGHT],
            device: Arc::clone(device),
        };

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(FRAMES_IN_FLIGHT as u32)];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(FRAMES_IN_FLIGHT as u32);

        descriptor.pool = unsafe { device.device.create_descriptor_pool(&pool_info, None) }
            .context("Failed to create descriptor pool")?;

        let layouts = [layout; FRAMES_IN_FLIGHT];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(descriptor.pool)
            .set_layouts(&layouts);

        let sets = unsafe { device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor sets")?;

        for (slot, (&set, &buffer)) in sets.iter().zip(buffers.iter()).enumerate() {
            let buffer_info = [vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(0)
                .range(range)];

            let write = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(UNIFORM_BINDING)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info);

            unsafe { device.device.update_descriptor_sets(&[write], &[]) };
            descriptor.sets[slot] = set;
        }

        log::debug!("Bound {} uniform buffers to descriptor sets", FRAMES_IN_FLIGHT);
        Ok(descriptor)
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees its sets
            if self.pool != vk::DescriptorPool::null() {
                self.device.device.destroy_descriptor_pool(self.pool, None);
            }
            self.device.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}
