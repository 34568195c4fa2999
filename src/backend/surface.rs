use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use super::VulkanInstance;
use crate::window::NativeWindow;

/// A `VkSurfaceKHR` bound to a native window.
///
/// Holds the window so the native handle stays valid until the surface is
/// destroyed.
pub struct Surface {
    pub handle: vk::SurfaceKHR,
    window: Arc<dyn NativeWindow>,
    instance: Arc<VulkanInstance>,
}

impl Surface {
    pub fn new(instance: Arc<VulkanInstance>, window: Arc<dyn NativeWindow>) -> Result<Self> {
        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?;
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?;

        let handle = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .context("Failed to create surface")?;

        let (width, height) = window.pixel_size();
        log::info!("Created surface for {}x{} window", width, height);

        Ok(Self {
            handle,
            window,
            instance,
        })
    }

    pub fn window(&self) -> &Arc<dyn NativeWindow> {
        &self.window
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.instance.surface_loader.destroy_surface(self.handle, None);
        }
    }
}
