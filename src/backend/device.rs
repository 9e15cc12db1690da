// Vulkan Device - logical device and its queues
//
// Responsibilities:
// - One queue request per distinct family (graphics, present)
// - Enable required extensions/features, mirror instance layers
// - Hand out graphics/present queue handles

use super::error::{ContextError, Result};
use super::instance::{as_ptrs, Instance};
use super::queue::ResolvedQueueFamilies;
use super::selector::{DeviceRequirements, PhysicalDevice};
use ash::vk;
use std::sync::Arc;

static QUEUE_PRIORITY: [f32; 1] = [1.0];

/// Logical device with automatic cleanup.
///
/// Queue handles are plain copies; they stay valid as long as this device
/// lives and may be the same queue when both roles share a family.
pub struct LogicalDevice {
    handle: ash::Device,
    physical_device: vk::PhysicalDevice,
    queue_families: ResolvedQueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    _instance: Arc<Instance>,
}

impl LogicalDevice {
    /// Create the device for `physical`, reusing the queue families it was
    /// selected with. Nothing is created if the families are incomplete or
    /// the driver refuses the request.
    pub fn new(
        instance: &Arc<Instance>,
        physical: &PhysicalDevice,
        requirements: &DeviceRequirements,
    ) -> Result<Self> {
        let queue_families = physical.queue_families().resolve()?;
        let queue_create_infos = queue_create_infos(&queue_families);

        let extension_ptrs = as_ptrs(&requirements.extensions);
        let features = requirements.enabled_features();

        // Device layers are deprecated, but older loaders still expect them
        let layers = if instance.validation_enabled() {
            instance.enabled_layers()
        } else {
            &[]
        };
        let layer_ptrs = as_ptrs(layers);

        #[allow(deprecated)]
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&features);

        let handle = unsafe {
            instance
                .handle()
                .create_device(physical.handle(), &create_info, None)
        }
        .map_err(ContextError::DeviceCreationFailed)?;

        let (graphics_queue, present_queue) = unsafe {
            (
                handle.get_device_queue(queue_families.graphics, 0),
                handle.get_device_queue(queue_families.present, 0),
            )
        };

        log::info!(
            "Logical device created on {} (graphics family {}, present family {})",
            physical.name(),
            queue_families.graphics,
            queue_families.present
        );

        Ok(Self {
            handle,
            physical_device: physical.handle(),
            queue_families,
            graphics_queue,
            present_queue,
            _instance: instance.clone(),
        })
    }

    pub fn handle(&self) -> &ash::Device {
        &self.handle
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn graphics_family(&self) -> u32 {
        self.queue_families.graphics
    }

    pub fn present_family(&self) -> u32 {
        self.queue_families.present
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.handle.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        log::debug!("Destroying logical device");
        let _ = self.wait_idle();
        unsafe { self.handle.destroy_device(None) };
    }
}

/// One request per distinct family, one queue each, at full priority
fn queue_create_infos(families: &ResolvedQueueFamilies) -> Vec<vk::DeviceQueueCreateInfo> {
    families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITY)
                .build()
        })
        .collect()
}
