use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Native drawable handed in by the host shell.
///
/// The engine holds the handle for as long as a surface is bound to it and
/// releases it when the surface is replaced or the engine shuts down.
pub trait NativeWindow: HasWindowHandle + HasDisplayHandle + Send + Sync {
    /// Current drawable size in physical pixels.
    fn pixel_size(&self) -> (u32, u32);
}

impl NativeWindow for winit::window::Window {
    fn pixel_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}
