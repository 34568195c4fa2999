// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. The bytes come from the asset source and
// may not be 4-byte aligned, so they are re-read as words first.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::sync::Arc;

use super::VulkanDevice;

/// Shader module that lives only as long as pipeline creation needs it.
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    device: Arc<VulkanDevice>,
}

impl ShaderModule {
    pub fn from_spirv(device: &Arc<VulkanDevice>, name: &str, bytes: &[u8]) -> Result<Self> {
        let words = ash::util::read_spv(&mut Cursor::new(bytes))
            .with_context(|| format!("Shader '{}' is not valid SPIR-V", name))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .with_context(|| format!("Failed to create shader module '{}'", name))?;

        Ok(Self {
            module,
            device: Arc::clone(device),
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_shader_module(self.module, None);
        }
    }
}
