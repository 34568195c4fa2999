// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// The extent is always the display's un-rotated ("identity") extent; the
// current surface transform becomes the chain's pre-transform and the
// projection compensates for it.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::buffer::DepthBuffer;
use super::{Surface, VulkanDevice};
use crate::frame::{AcquireOutcome, PresentOutcome};

const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

const COMPOSITE_ALPHA_PREFERENCE: [vk::CompositeAlphaFlagsKHR; 4] = [
    vk::CompositeAlphaFlagsKHR::OPAQUE,
    vk::CompositeAlphaFlagsKHR::INHERIT,
    vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
];

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    /// Rotation-normalized extent
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub depth: Option<DepthBuffer>,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    /// Build a chain matching the surface's current state.
    ///
    /// `depth_format` adds a depth image of the same extent when set.
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: &Surface,
        depth_format: Option<vk::Format>,
    ) -> Result<Self> {
        let support = device.query_surface_support(surface.handle)?;
        let caps = support.capabilities;

        let surface_format = choose_surface_format(&support.formats)?;

        // FIFO is vsync and always available
        let present_mode = vk::PresentModeKHR::FIFO;

        let image_count = choose_image_count(&caps);
        let extent = identity_extent(&caps, surface.window().pixel_size());
        let pre_transform = caps.current_transform;

        let queue_families = [device.graphics_queue_family, device.present_queue_family];
        let (sharing_mode, family_indices) =
            if device.graphics_queue_family != device.present_queue_family {
                (vk::SharingMode::CONCURRENT, &queue_families[..])
            } else {
                (vk::SharingMode::EXCLUSIVE, &queue_families[..0])
            };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(pre_transform)
            .composite_alpha(choose_composite_alpha(caps.supported_composite_alpha))
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        // From here on the chain is owned; partial failures drop it
        let mut chain = Self {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            pre_transform,
            depth: None,
            device,
        };

        chain.images = unsafe { chain.device.swapchain_loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;

        for &image in &chain.images {
            let view = create_color_view(&chain.device, image, chain.format)?;
            chain.image_views.push(view);
        }

        if let Some(format) = depth_format {
            chain.depth = Some(DepthBuffer::new(&chain.device, format, extent)?);
        }

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}, transform {:?}",
            extent.width,
            extent.height,
            chain.images.len(),
            chain.format,
            pre_transform
        );

        Ok(chain)
    }

    pub fn depth_view(&self) -> Option<vk::ImageView> {
        self.depth.as_ref().map(|depth| depth.view)
    }

    /// Acquire next image, signaling `semaphore` once it is ready.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.device.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e).context("Failed to acquire swapchain image"),
        }
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.device.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e).context("Failed to present swapchain image"),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.depth = None;
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.device.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn create_color_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.device.create_image_view(&create_info, None) }
        .context("Failed to create image view")
}

/// sRGB BGRA8 when offered, otherwise whatever the surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space)
        .or_else(|| formats.first().copied())
        .context("Surface reports no formats")
}

/// One more than the minimum, capped by the maximum (0 means no cap).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// The extent the chain is created with: the surface extent in the
/// display's native orientation.
///
/// Surfaces that leave the extent to the swapchain (`u32::MAX`) get the
/// window's pixel size.
pub fn identity_extent(caps: &vk::SurfaceCapabilitiesKHR, window_size: (u32, u32)) -> vk::Extent2D {
    let (width, height) = if caps.current_extent.width != u32::MAX {
        (caps.current_extent.width, caps.current_extent.height)
    } else {
        window_size
    };

    let rotated = caps.current_transform.intersects(
        vk::SurfaceTransformFlagsKHR::ROTATE_90 | vk::SurfaceTransformFlagsKHR::ROTATE_270,
    );
    let (width, height) = if rotated { (height, width) } else { (width, height) };

    if caps.current_extent.width != u32::MAX {
        return vk::Extent2D { width, height };
    }

    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

pub fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    COMPOSITE_ALPHA_PREFERENCE
        .iter()
        .copied()
        .find(|&mode| supported.contains(mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}
