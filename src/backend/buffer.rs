// Buffer and image memory
//
// Uniform buffers live in host-visible, coherent memory and are mapped only
// for the duration of each write. The depth image lives in device-local
// memory.

use anyhow::{ensure, Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Helper to create a GPU buffer with specified usage and memory properties
fn create_buffer(
    device: &VulkanDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
        .context("Failed to create buffer")?;

    let mem_requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

    let memory = allocate(device, mem_requirements, memory_properties).inspect_err(|_| unsafe {
        device.device.destroy_buffer(buffer, None);
    })?;

    unsafe { device.device.bind_buffer_memory(buffer, memory, 0) }
        .context("Failed to bind buffer memory")
        .inspect_err(|_| unsafe {
            device.device.destroy_buffer(buffer, None);
            device.device.free_memory(memory, None);
        })?;

    Ok((buffer, memory))
}

fn allocate(
    device: &VulkanDevice,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let memory_type_index = device.find_memory_type(requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    unsafe { device.device.allocate_memory(&alloc_info, None) }
        .context("Failed to allocate device memory")
}

/// Per-frame uniform buffer
pub struct UniformBuffer {
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    device: Arc<VulkanDevice>,
}

impl UniformBuffer {
    pub fn new(device: &Arc<VulkanDevice>, size: vk::DeviceSize) -> Result<Self> {
        let (buffer, memory) = create_buffer(
            device,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self {
            buffer,
            memory,
            size,
            device: Arc::clone(device),
        })
    }

    /// Map, copy, unmap. Coherent memory needs no flush.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        ensure!(
            bytes.len() as vk::DeviceSize <= self.size,
            "Uniform write of {} bytes exceeds buffer size {}",
            bytes.len(),
            self.size
        );

        unsafe {
            let ptr = self
                .device
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .context("Failed to map uniform buffer")? as *mut u8;

            ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            self.device.device.unmap_memory(self.memory);
        }

        Ok(())
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

/// Depth image, memory and view sharing the swapchain's extent
pub struct DepthBuffer {
    pub image: vk::Image,
    memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
    device: Arc<VulkanDevice>,
}

impl DepthBuffer {
    pub fn new(device: &Arc<VulkanDevice>, format: vk::Format, extent: vk::Extent2D) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .context("Failed to create depth image")?;

        let mem_requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let memory = allocate(device, mem_requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .inspect_err(|_| unsafe {
                device.device.destroy_image(image, None);
            })?;

        // Owned from here; Drop tolerates a null view
        let mut depth = Self {
            image,
            memory,
            view: vk::ImageView::null(),
            format,
            device: Arc::clone(device),
        };

        unsafe { device.device.bind_image_memory(image, memory, 0) }
            .context("Failed to bind depth image memory")?;

        let aspect_mask = if has_stencil(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        depth.view = unsafe { device.device.create_image_view(&view_info, None) }
            .context("Failed to create depth image view")?;

        Ok(depth)
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.device.destroy_image_view(self.view, None);
            }
            self.device.device.destroy_image(self.image, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_formats_get_both_aspects() {
        assert!(has_stencil(vk::Format::D24_UNORM_S8_UINT));
        assert!(has_stencil(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(!has_stencil(vk::Format::D32_SFLOAT));
    }
}
