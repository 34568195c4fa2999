// Backend module - Vulkan abstraction layer
//
// Every GPU object is wrapped in a type whose Drop releases it. Children hold
// an Arc<VulkanDevice> so the device outlives everything created from it.

pub mod buffer;
pub mod commands;
pub mod descriptor;
pub mod device;
pub mod pipeline;
pub mod renderer;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::{VulkanDevice, VulkanInstance};
pub use renderer::VulkanRenderer;
pub use surface::Surface;
pub use swapchain::Swapchain;
