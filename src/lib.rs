// =============================================================================
// MOBILE RENDERER - Vulkan presentation engine for rotating display surfaces
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Host shell (window lifecycle, asset source)                    │
// │    └── Backend facade (init / render / rebind / shutdown)       │
// │          └── FrameLoop (frame slots, stale-surface handling)    │
// │                └── VulkanRenderer (owns every GPU object)       │
// │                      └── Device → Surface → Swapchain → ...     │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

pub mod assets;
pub mod backend;
pub mod config;
pub mod error;
pub mod facade;
pub mod frame;
pub mod transform;
pub mod window;

#[cfg(test)]
mod mock_device;

pub use assets::{AssetDir, AssetSource};
pub use config::{Config, EngineConfig};
pub use facade::{Backend, DeviceFactory, VulkanFactory};
pub use frame::{
    AcquireOutcome, FrameLoop, FrameStatus, PresentOutcome, PresentationInfo, RenderDevice,
    FRAMES_IN_FLIGHT,
};
pub use window::NativeWindow;
