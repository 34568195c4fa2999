// Vulkan renderer - owns every GPU object and performs the frame steps
//
// CREATION ORDER (destruction runs backwards, encoded in field order):
// ┌─────────────────────────────────────────────────────────────────┐
// │ instance → surface → device → swapchain (+depth) → render pass  │
// │   → uniform buffers → descriptors → pipeline → framebuffers     │
// │   → command pool/buffers → sync objects                         │
// └─────────────────────────────────────────────────────────────────┘
//
// Only the swapchain and framebuffers (the "presentation" state) are rebuilt
// when the surface goes stale. The surface itself is replaced only when the
// host hands over a new native window.

use anyhow::{ensure, Context, Result};
use ash::vk;
use raw_window_handle::HasDisplayHandle;
use std::sync::Arc;

use super::buffer::UniformBuffer;
use super::commands::{CommandResources, DrawParams};
use super::descriptor::Descriptor;
use super::pipeline::{Framebuffers, GraphicsPipeline, RenderPass};
use super::shader::ShaderModule;
use super::swapchain::identity_extent;
use super::sync::FrameSync;
use super::{Surface, Swapchain, VulkanDevice, VulkanInstance};
use crate::assets::AssetSource;
use crate::config::EngineConfig;
use crate::frame::{
    AcquireOutcome, PresentOutcome, PresentationInfo, RenderDevice, FRAMES_IN_FLIGHT,
};
use crate::transform::FrameUniforms;
use crate::window::NativeWindow;

/// State that is thrown away and rebuilt whenever the surface changes.
struct Presentation {
    framebuffers: Framebuffers,
    swapchain: Swapchain,
}

pub struct VulkanRenderer {
    // Field order is drop order: reverse of creation
    sync: Vec<FrameSync>,
    commands: CommandResources,
    presentation: Option<Presentation>,
    pipeline: GraphicsPipeline,
    descriptor: Descriptor,
    uniforms: Vec<UniformBuffer>,
    render_pass: RenderPass,
    surface: Option<Surface>,
    device: Arc<VulkanDevice>,

    info: PresentationInfo,
    clear_color: [f32; 4],
    vertex_count: u32,
    // Stage that waits on the image-acquired semaphore
    wait_stages: [vk::PipelineStageFlags; 1],
}

impl VulkanRenderer {
    pub fn new(
        config: &EngineConfig,
        window: Arc<dyn NativeWindow>,
        assets: &dyn AssetSource,
    ) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let display = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let instance = VulkanInstance::new(&config.app_name, config.validation_layers, display)?;

        let surface = Surface::new(Arc::clone(&instance), window)?;
        let device = VulkanDevice::new(instance, surface.handle)?;

        let depth_format = if config.depth_buffer {
            Some(device.find_depth_format()?)
        } else {
            None
        };

        let swapchain = Swapchain::new(Arc::clone(&device), &surface, depth_format)?;
        let render_pass = RenderPass::new(&device, swapchain.format, depth_format)?;

        let uniform_size = std::mem::size_of::<FrameUniforms>() as vk::DeviceSize;
        let uniforms = (0..FRAMES_IN_FLIGHT)
            .map(|_| UniformBuffer::new(&device, uniform_size))
            .collect::<Result<Vec<_>>>()?;
        let descriptor = Descriptor::new(
            &device,
            std::array::from_fn(|slot| uniforms[slot].buffer),
            uniform_size,
        )?;

        let pipeline = {
            let vert = load_shader(&device, assets, &config.vertex_shader)?;
            let frag = load_shader(&device, assets, &config.fragment_shader)?;
            GraphicsPipeline::new(&device, &render_pass, descriptor.layout, &vert, &frag)?
        };

        let framebuffers = Framebuffers::new(&device, &render_pass, &swapchain)?;
        let info = PresentationInfo {
            format: swapchain.format,
            extent: swapchain.extent,
            pre_transform: swapchain.pre_transform,
        };

        let commands = CommandResources::new(&device)?;
        let sync = (0..FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            sync,
            commands,
            presentation: Some(Presentation {
                framebuffers,
                swapchain,
            }),
            pipeline,
            descriptor,
            uniforms,
            render_pass,
            surface: Some(surface),
            device,
            info,
            clear_color: config.clear_color,
            vertex_count: config.vertex_count,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
        })
    }

    fn presentation_state(&self) -> Result<&Presentation> {
        self.presentation
            .as_ref()
            .context("Presentation state missing after a failed rebuild")
    }

    fn build_presentation(&mut self) -> Result<()> {
        let surface = self.surface.as_ref().context("No surface bound")?;

        let swapchain = Swapchain::new(
            Arc::clone(&self.device),
            surface,
            self.render_pass.depth_format,
        )?;
        // The render pass and pipeline are kept across rebuilds
        ensure!(
            swapchain.format == self.render_pass.color_format,
            "Surface format changed from {:?} to {:?} across a rebuild",
            self.render_pass.color_format,
            swapchain.format
        );

        let framebuffers = Framebuffers::new(&self.device, &self.render_pass, &swapchain)?;

        self.info = PresentationInfo {
            format: swapchain.format,
            extent: swapchain.extent,
            pre_transform: swapchain.pre_transform,
        };
        self.presentation = Some(Presentation {
            framebuffers,
            swapchain,
        });
        Ok(())
    }
}

impl RenderDevice for VulkanRenderer {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.sync[slot].wait()
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        self.presentation_state()?
            .swapchain
            .acquire_next_image(self.sync[slot].image_available)
    }

    fn write_uniforms(&mut self, slot: usize, uniforms: &FrameUniforms) -> Result<()> {
        self.uniforms[slot].write(uniforms.as_bytes())
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let presentation = self.presentation_state()?;
        let params = DrawParams {
            render_pass: self.render_pass.render_pass,
            framebuffer: presentation.framebuffers.get(image_index)?,
            extent: presentation.swapchain.extent,
            pipeline: self.pipeline.pipeline,
            layout: self.pipeline.layout,
            descriptor_set: self.descriptor.sets[slot],
            clear_color: self.clear_color,
            clear_depth: self.render_pass.depth_format.is_some(),
            vertex_count: self.vertex_count,
        };

        // Only reset once we know this frame will be submitted
        self.sync[slot].reset()?;
        self.commands.record_draw(slot, &params)?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let sync = &self.sync[slot];
        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [self.commands.buffers[slot]];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info],
                sync.in_flight_fence,
            )
        }
        .context("Failed to submit draw commands")
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        self.presentation_state()?.swapchain.present(
            self.device.present_queue,
            image_index,
            &[self.sync[slot].render_finished],
        )
    }

    fn surface_extent(&self) -> Result<vk::Extent2D> {
        let surface = self.surface.as_ref().context("No surface bound")?;
        let caps = self.device.query_surface_support(surface.handle)?.capabilities;
        Ok(identity_extent(&caps, surface.window().pixel_size()))
    }

    fn rebuild_presentation(&mut self) -> Result<()> {
        self.device.wait_idle()?;

        // Framebuffers, views, depth and chain go before the new chain is made
        self.presentation = None;
        self.build_presentation()
            .context("Failed to rebuild presentation state")?;

        log::info!(
            "Presentation rebuilt: {}x{}, transform {:?}",
            self.info.extent.width,
            self.info.extent.height,
            self.info.pre_transform
        );
        Ok(())
    }

    fn replace_surface(&mut self, window: Arc<dyn NativeWindow>) -> Result<()> {
        self.device.wait_idle()?;

        self.presentation = None;
        self.surface = None;

        let surface = Surface::new(Arc::clone(&self.device.instance), window)?;
        ensure!(
            self.device.supports_present(surface.handle)?,
            "Selected GPU cannot present to the new surface"
        );
        self.surface = Some(surface);
        Ok(())
    }

    fn presentation(&self) -> PresentationInfo {
        self.info
    }

    fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.device.wait_idle() {
            log::error!("Wait idle before cleanup failed: {:#}", e);
        }
    }
}

fn load_shader(
    device: &Arc<VulkanDevice>,
    assets: &dyn AssetSource,
    name: &str,
) -> Result<ShaderModule> {
    let bytes = assets.load_binary_asset(name)?;
    ShaderModule::from_spirv(device, name, &bytes)
}
