// Physical device selection
//
// Every enumerated GPU is snapshotted into a `DeviceCandidate`, scored,
// and the best-scoring one above zero is kept along with the queue
// families it was scored with.

use super::error::{ContextError, Result};
use super::instance::{extension_names, Instance};
use super::queue::{find_queue_families, QueueFamilyIndices};
use super::surface::Surface;
use ash::extensions::khr;
use ash::vk;
use std::ffi::{CStr, CString};

/// Score bonus for discrete GPUs
pub const DISCRETE_GPU_BONUS: u32 = 1000;

/// What a device must offer to be considered at all
#[derive(Debug, Clone)]
pub struct DeviceRequirements {
    pub extensions: Vec<CString>,
    pub geometry_shader: bool,
    pub sampler_anisotropy: bool,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            extensions: vec![khr::Swapchain::name().to_owned()],
            geometry_shader: true,
            sampler_anisotropy: true,
        }
    }
}

impl DeviceRequirements {
    /// First required feature the device does not support
    pub fn missing_feature(&self, features: &vk::PhysicalDeviceFeatures) -> Option<&'static str> {
        if self.geometry_shader && features.geometry_shader != vk::TRUE {
            return Some("geometryShader");
        }
        if self.sampler_anisotropy && features.sampler_anisotropy != vk::TRUE {
            return Some("samplerAnisotropy");
        }
        None
    }

    /// Feature set to enable on the logical device
    pub fn enabled_features(&self) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures {
            geometry_shader: self.geometry_shader.into(),
            sampler_anisotropy: self.sampler_anisotropy.into(),
            ..Default::default()
        }
    }
}

/// Everything the scoring rubric looks at, captured from the driver once
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub features: vk::PhysicalDeviceFeatures,
    pub max_image_dimension_2d: u32,
    pub queue_families: QueueFamilyIndices,
    pub extensions: Vec<CString>,
}

impl DeviceCandidate {
    fn query(instance: &Instance, surface: &Surface, device: vk::PhysicalDevice) -> Self {
        let handle = instance.handle();
        let (properties, features, families) = unsafe {
            (
                handle.get_physical_device_properties(device),
                handle.get_physical_device_features(device),
                handle.get_physical_device_queue_family_properties(device),
            )
        };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        // A device whose extensions can't be listed simply won't qualify
        let extensions = unsafe { handle.enumerate_device_extension_properties(device) }
            .unwrap_or_else(|e| {
                log::debug!("Could not list extensions of {}: {}", name, e);
                Vec::new()
            });

        Self {
            name,
            device_type: properties.device_type,
            features,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            queue_families: find_queue_families(&families, |index| {
                surface.supports_present(device, index)
            }),
            extensions: extension_names(&extensions),
        }
    }

    pub fn has_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|e| e.as_c_str() == name)
    }
}

/// Suitability score; 0 means unusable
pub fn rate_device(candidate: &DeviceCandidate, requirements: &DeviceRequirements) -> u32 {
    if let Some(feature) = requirements.missing_feature(&candidate.features) {
        log::warn!("{} does not support {}", candidate.name, feature);
        return 0;
    }

    if !candidate.queue_families.is_complete() {
        log::debug!("{} has no graphics + present queue families", candidate.name);
        return 0;
    }

    if let Some(missing) = requirements
        .extensions
        .iter()
        .find(|ext| !candidate.has_extension(ext))
    {
        log::debug!("{} is missing {}", candidate.name, missing.to_string_lossy());
        return 0;
    }

    let mut score = 0;
    if candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += DISCRETE_GPU_BONUS;
    }
    score + candidate.max_image_dimension_2d
}

/// Index of the winning score. Strictly higher scores replace the current
/// best, so on a tie the earliest-enumerated device wins. `None` when no
/// score is above zero.
pub fn select_best(scores: &[u32]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}

/// The chosen GPU and the queue families it was scored with
#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    handle: vk::PhysicalDevice,
    candidate: DeviceCandidate,
    score: u32,
}

impl PhysicalDevice {
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.candidate.name
    }

    pub fn candidate(&self) -> &DeviceCandidate {
        &self.candidate
    }

    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.candidate.queue_families
    }

    pub fn score(&self) -> u32 {
        self.score
    }
}

/// Enumerate, score and pick the best GPU able to present to `surface`
pub fn pick_physical_device(
    instance: &Instance,
    surface: &Surface,
    requirements: &DeviceRequirements,
) -> Result<PhysicalDevice> {
    let devices = unsafe { instance.handle().enumerate_physical_devices() }?;
    if devices.is_empty() {
        return Err(ContextError::NoDevicesFound);
    }

    let mut candidates: Vec<DeviceCandidate> = devices
        .iter()
        .map(|&device| DeviceCandidate::query(instance, surface, device))
        .collect();

    let scores: Vec<u32> = candidates
        .iter()
        .map(|candidate| rate_device(candidate, requirements))
        .collect();

    for (candidate, score) in candidates.iter().zip(&scores) {
        log::debug!("GPU {:?} ({:?}) scored {}", candidate.name, candidate.device_type, score);
    }

    let best = select_best(&scores).ok_or(ContextError::NoSuitableDevice)?;
    let candidate = candidates.swap_remove(best);

    log::info!("Selected GPU: {} (score {})", candidate.name, scores[best]);

    Ok(PhysicalDevice {
        handle: devices[best],
        candidate,
        score: scores[best],
    })
}
