// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with the display's surface extensions
// - Optional validation layer + debug messenger routed to `log`
// - Physical device selection (graphics + present + swapchain, prefer discrete)
// - Logical device + queue creation (one queue per distinct family)
// - Memory type, depth format and surface capability queries

use anyhow::{bail, Context, Result};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Loaded Vulkan library + instance, shared by the device and every surface.
pub struct VulkanInstance {
    pub surface_loader: ash::khr::surface::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    pub entry: Entry,
}

impl VulkanInstance {
    /// Create the instance with the surface extensions `display` needs.
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers (layer must be installed)
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display: RawDisplayHandle,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        if enable_validation && !Self::validation_layer_present(&entry)? {
            bail!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }

        let app_name_cstr = CString::new(app_name)?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"mobile-renderer")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .context("Display has no Vulkan surface support")?
            .to_vec();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        Ok(Arc::new(Self {
            surface_loader,
            debug_utils,
            instance,
            entry,
        }))
    }

    fn validation_layer_present(entry: &Entry) -> Result<bool> {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }
            .context("Failed to enumerate instance layers")?;

        Ok(layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER)))
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Surface properties, always queried fresh.
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub physical_device: vk::PhysicalDevice,

    // Queue handles (may be the same queue)
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,

    // Device properties (cached for performance)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,

    pub instance: Arc<VulkanInstance>,
}

struct Candidate {
    physical_device: vk::PhysicalDevice,
    graphics_family: u32,
    present_family: u32,
    score: u32,
}

impl VulkanDevice {
    /// Pick a GPU that can draw and present to `surface`, then open it.
    pub fn new(instance: Arc<VulkanInstance>, surface: vk::SurfaceKHR) -> Result<Arc<Self>> {
        let candidate = Self::pick_physical_device(&instance, surface)?;
        let physical_device = candidate.physical_device;

        let (device, graphics_queue, present_queue) = Self::create_logical_device(
            &instance.instance,
            physical_device,
            candidate.graphics_family,
            candidate.present_family,
        )?;

        let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        let memory_properties = unsafe {
            instance.instance.get_physical_device_memory_properties(physical_device)
        };

        log::info!(
            "Selected GPU: {}",
            properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: graphics {}, present {}",
            candidate.graphics_family,
            candidate.present_family
        );

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance.instance, &device);

        Ok(Arc::new(Self {
            device,
            swapchain_loader,
            physical_device,
            graphics_queue,
            graphics_queue_family: candidate.graphics_family,
            present_queue,
            present_queue_family: candidate.present_family,
            properties,
            memory_properties,
            instance,
        }))
    }

    fn pick_physical_device(instance: &VulkanInstance, surface: vk::SurfaceKHR) -> Result<Candidate> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            bail!("No Vulkan-capable GPU found");
        }

        let mut best: Option<Candidate> = None;
        for physical_device in devices {
            match Self::rate_device(instance, physical_device, surface) {
                Ok(Some(candidate)) => {
                    if best.as_ref().map_or(true, |b| candidate.score > b.score) {
                        best = Some(candidate);
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("Skipping GPU that failed capability queries: {:#}", e),
            }
        }

        best.context("No suitable GPU found (need graphics, present and swapchain support)")
    }

    fn rate_device(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Option<Candidate>> {
        let vk_instance = &instance.instance;
        let props = unsafe { vk_instance.get_physical_device_properties(physical_device) };

        let extensions =
            unsafe { vk_instance.enumerate_device_extension_properties(physical_device) }?;
        let has_swapchain = extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME));
        if !has_swapchain {
            return Ok(None);
        }

        let queue_families =
            unsafe { vk_instance.get_physical_device_queue_family_properties(physical_device) };

        let mut graphics_family = None;
        let mut present_family = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = unsafe {
                instance.surface_loader.get_physical_device_surface_support(
                    physical_device,
                    index,
                    surface,
                )
            }?;

            // One family doing both wins outright
            if graphics && present {
                graphics_family = Some(index);
                present_family = Some(index);
                break;
            }
            if graphics && graphics_family.is_none() {
                graphics_family = Some(index);
            }
            if present && present_family.is_none() {
                present_family = Some(index);
            }
        }

        let (Some(graphics_family), Some(present_family)) = (graphics_family, present_family) else {
            return Ok(None);
        };

        let formats = unsafe {
            instance
                .surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
        }?;
        let present_modes = unsafe {
            instance
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
        }?;
        if formats.is_empty() || present_modes.is_empty() {
            return Ok(None);
        }

        // Score device (prefer discrete GPU)
        let score = match props.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            _ => 1,
        };

        Ok(Some(Candidate {
            physical_device,
            graphics_family,
            present_family,
            score,
        }))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_family: u32,
        present_family: u32,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];
        let mut families = vec![graphics_family];
        if present_family != graphics_family {
            families.push(present_family);
        }

        let queue_create_infos: Vec<_> = families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extensions = [ash::khr::swapchain::NAME.as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok((device, graphics_queue, present_queue))
    }

    /// First memory type allowed by `type_filter` with all of `properties`.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        find_memory_type(&self.memory_properties, type_filter, properties)
    }

    pub fn query_surface_support(&self, surface: vk::SurfaceKHR) -> Result<SurfaceSupport> {
        let loader = &self.instance.surface_loader;
        unsafe {
            Ok(SurfaceSupport {
                capabilities: loader
                    .get_physical_device_surface_capabilities(self.physical_device, surface)
                    .context("Failed to query surface capabilities")?,
                formats: loader
                    .get_physical_device_surface_formats(self.physical_device, surface)
                    .context("Failed to query surface formats")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(self.physical_device, surface)
                    .context("Failed to query surface present modes")?,
            })
        }
    }

    /// Can the chosen present family present to this (possibly new) surface?
    pub fn supports_present(&self, surface: vk::SurfaceKHR) -> Result<bool> {
        unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_support(
                    self.physical_device,
                    self.present_queue_family,
                    surface,
                )
                .context("Failed to query surface present support")
        }
    }

    pub fn find_depth_format(&self) -> Result<vk::Format> {
        DEPTH_FORMAT_CANDIDATES
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe {
                    self.instance
                        .instance
                        .get_physical_device_format_properties(self.physical_device, format)
                };
                props
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .context("No supported depth format")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            let has_type = (type_filter & (1 << i)) != 0;
            let has_properties = memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties);
            has_type && has_properties
        })
        .with_context(|| {
            format!(
                "Failed to find memory type (filter {:#b}, properties {:?})",
                type_filter, properties
            )
        })
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
