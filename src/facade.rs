// Backend facade - the host's only entry point
//
// LIFECYCLE:
// ┌─────────────────────────────────────────────────────────────────┐
// │  rebind_surface ─> initialize ─> render_frame* ─> shutdown      │
// │        ▲                             │                          │
// │        └──── (new native window) ────┘                          │
// └─────────────────────────────────────────────────────────────────┘
//
// "Initialized" means a frame loop exists. Every entry point is safe to call
// in either state; the ones that make no sense for the current state do
// nothing.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::assets::AssetSource;
use crate::backend::VulkanRenderer;
use crate::config::EngineConfig;
use crate::error::fatal;
use crate::frame::{FrameLoop, FrameStatus, RenderDevice};
use crate::window::NativeWindow;

/// Builds the render device once the host has provided its handles.
pub trait DeviceFactory {
    type Device: RenderDevice;

    fn create(
        &self,
        window: &Arc<dyn NativeWindow>,
        assets: &dyn AssetSource,
    ) -> Result<Self::Device>;
}

/// Production factory: a full Vulkan renderer.
pub struct VulkanFactory {
    config: EngineConfig,
}

impl VulkanFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl DeviceFactory for VulkanFactory {
    type Device = VulkanRenderer;

    fn create(
        &self,
        window: &Arc<dyn NativeWindow>,
        assets: &dyn AssetSource,
    ) -> Result<VulkanRenderer> {
        VulkanRenderer::new(&self.config, Arc::clone(window), assets)
    }
}

pub struct Backend<F: DeviceFactory = VulkanFactory> {
    factory: F,
    window: Option<Arc<dyn NativeWindow>>,
    assets: Option<Arc<dyn AssetSource>>,
    engine: Option<FrameLoop<F::Device>>,
}

impl Backend<VulkanFactory> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_factory(VulkanFactory::new(config))
    }
}

impl<F: DeviceFactory> Backend<F> {
    pub fn with_factory(factory: F) -> Self {
        Self {
            factory,
            window: None,
            assets: None,
            engine: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// Build the engine against the bound window. Failure is fatal.
    pub fn initialize(&mut self) {
        if let Err(e) = self.try_initialize() {
            fatal(e);
        }
    }

    /// Render one frame if initialized. Failure is fatal.
    pub fn render_frame(&mut self) {
        if let Err(e) = self.try_render_frame() {
            fatal(e);
        }
    }

    /// Release every GPU object. Failure is fatal.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.try_shutdown() {
            fatal(e);
        }
    }

    /// Store new host handles, replacing the surface if already running.
    /// Failure is fatal.
    pub fn rebind_surface(&mut self, window: Arc<dyn NativeWindow>, assets: Arc<dyn AssetSource>) {
        if let Err(e) = self.try_rebind_surface(window, assets) {
            fatal(e);
        }
    }

    /// Ask for the presentation chain to be rebuilt before the next frame.
    pub fn request_rebuild(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.request_rebuild();
        }
    }

    pub fn try_initialize(&mut self) -> Result<()> {
        if self.engine.is_some() {
            return Ok(());
        }

        let window = self
            .window
            .as_ref()
            .context("Cannot initialize renderer: no native window bound")?;
        let assets = self
            .assets
            .as_deref()
            .context("Cannot initialize renderer: no asset source bound")?;

        let device = self
            .factory
            .create(window, assets)
            .context("Failed to initialize renderer")?;
        self.engine = Some(FrameLoop::new(device));

        log::info!("Renderer initialized");
        Ok(())
    }

    /// Returns `None` when there is nothing to render to.
    pub fn try_render_frame(&mut self) -> Result<Option<FrameStatus>> {
        match self.engine.as_mut() {
            Some(engine) => engine.render_frame().map(Some),
            None => Ok(None),
        }
    }

    pub fn try_shutdown(&mut self) -> Result<()> {
        match self.engine.take() {
            Some(engine) => {
                engine.shutdown()?;
                log::info!("Renderer shut down");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn try_rebind_surface(
        &mut self,
        window: Arc<dyn NativeWindow>,
        assets: Arc<dyn AssetSource>,
    ) -> Result<()> {
        if let Some(engine) = self.engine.as_mut() {
            log::info!("Native window replaced, rebuilding surface");
            engine
                .replace_surface(Arc::clone(&window))
                .context("Failed to bind new native window")?;
        }

        self.window = Some(window);
        self.assets = Some(assets);
        Ok(())
    }
}

impl<F: DeviceFactory> Drop for Backend<F> {
    fn drop(&mut self) {
        if let Err(e) = self.try_shutdown() {
            log::error!("Renderer shutdown failed: {:?}", e);
        }
    }
}
