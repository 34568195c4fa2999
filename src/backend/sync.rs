// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync
// Critical for correct and efficient multi-frame rendering

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    /// Signaled by acquire, waited on by submit
    pub image_available: vk::Semaphore,
    /// Signaled by submit, waited on by present
    pub render_finished: vk::Semaphore,
    /// Signaled when the slot's submission has finished on the GPU
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Start signaled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            let image_available = device
                .device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create semaphore")?;
            let render_finished = device
                .device
                .create_semaphore(&semaphore_info, None)
                .inspect_err(|_| device.device.destroy_semaphore(image_available, None))
                .context("Failed to create semaphore")?;
            let in_flight_fence = device
                .device
                .create_fence(&fence_info, None)
                .inspect_err(|_| {
                    device.device.destroy_semaphore(image_available, None);
                    device.device.destroy_semaphore(render_finished, None);
                })
                .context("Failed to create fence")?;

            Ok(Self {
                image_available,
                render_finished,
                in_flight_fence,
                device: Arc::clone(device),
            })
        }
    }

    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.in_flight_fence], true, u64::MAX)
        }
        .context("Failed to wait for in-flight fence")
    }

    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.device.reset_fences(&[self.in_flight_fence]) }
            .context("Failed to reset in-flight fence")
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
