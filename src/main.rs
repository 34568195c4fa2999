// =============================================================================
// DESKTOP HOST - drives the renderer from a winit window
// =============================================================================
//
// Stands in for a mobile activity: it owns the window lifecycle and calls the
// backend only at lifecycle points.
//
// EVENT FLOW:
// 1. resumed          → create window, bind it, initialize
// 2. Resized          → flag a presentation rebuild
// 3. RedrawRequested  → render one frame (skipped while minimized)
// 4. CloseRequested   → shut down, exit
//
// =============================================================================

use anyhow::Result;
use mobile_renderer::{AssetDir, Backend, Config, NativeWindow};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting mobile renderer");
    log::info!(
        "Window: {}x{}, assets from {:?}",
        config.window.width,
        config.window.height,
        config.assets.root
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Configured level, overridable through RUST_LOG
fn init_logging(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();
}

struct App {
    config: Config,
    backend: Backend,
    window: Option<Arc<Window>>,
}

impl App {
    fn new(config: Config) -> Self {
        let backend = Backend::new(config.engine.clone());
        Self {
            config,
            backend,
            window: None,
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.backend.shutdown();
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    /// Called at startup and whenever the platform gives the surface back.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window = match &self.window {
            Some(window) => Arc::clone(window),
            None => {
                let attributes = WindowAttributes::default()
                    .with_title(&self.config.window.title)
                    .with_inner_size(winit::dpi::PhysicalSize::new(
                        self.config.window.width,
                        self.config.window.height,
                    ));

                match event_loop.create_window(attributes) {
                    Ok(w) => Arc::new(w),
                    Err(e) => {
                        log::error!("Failed to create window: {:?}", e);
                        event_loop.exit();
                        return;
                    }
                }
            }
        };

        let native: Arc<dyn NativeWindow> = window.clone();
        self.backend.rebind_surface(
            native,
            Arc::new(AssetDir::new(&self.config.assets.root)),
        );
        self.backend.initialize();

        self.window = Some(window);
    }

    /// The native window may be destroyed after this; the engine keeps its
    /// own handle until the next rebind.
    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("Suspended");
        self.window = None;
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.backend.request_rebuild();
            }

            WindowEvent::RedrawRequested => {
                let minimized = self
                    .window
                    .as_ref()
                    .map_or(true, |w| {
                        let size = w.inner_size();
                        size.width == 0 || size.height == 0
                    });
                if !minimized {
                    self.backend.render_frame();
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
