// Vulkan Instance - driver connection
//
// Responsibilities:
// - Load the Vulkan library
// - Verify every requested layer and extension before creating anything
// - Own the instance handle and destroy it last

use super::descriptor::CapabilityDescriptor;
use super::error::{ContextError, Result};
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

/// Owned Vulkan instance plus the loader it came from.
///
/// Everything derived from the instance (surface, debug messenger, logical
/// device) holds an `Arc<Instance>`, so the instance is destroyed only once
/// all of them are gone.
pub struct Instance {
    handle: ash::Instance,
    entry: Entry,
    enabled_layers: Vec<CString>,
    validation: bool,
    api_version: u32,
}

impl Instance {
    /// Create the instance described by `descriptor`.
    ///
    /// Fails with `MissingLayer`/`MissingExtension` naming the first
    /// unsupported entry; nothing is created in that case.
    pub fn new(descriptor: &CapabilityDescriptor) -> Result<Self> {
        log::info!(
            "Creating Vulkan instance for {}",
            descriptor.application_name().to_string_lossy()
        );

        let entry = unsafe { Entry::load() }?;

        let layers = descriptor.layers().to_vec();
        let available_layers = layer_names(&entry.enumerate_instance_layer_properties()?);
        if let Some(missing) = first_missing(&layers, &available_layers) {
            return Err(ContextError::MissingLayer(missing.to_string_lossy().into_owned()));
        }

        let extensions = requested_extensions(descriptor);
        let available_extensions =
            extension_names(&entry.enumerate_instance_extension_properties(None)?);
        if let Some(missing) = first_missing(&extensions, &available_extensions) {
            return Err(ContextError::MissingExtension(
                missing.to_string_lossy().into_owned(),
            ));
        }

        let app_info = vk::ApplicationInfo::builder()
            .application_name(descriptor.application_name())
            .application_version(descriptor.application_version())
            .engine_name(descriptor.engine_name())
            .engine_version(descriptor.engine_version())
            .api_version(descriptor.api_version());

        let layer_ptrs = as_ptrs(&layers);
        let extension_ptrs = as_ptrs(&extensions);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let handle = unsafe { entry.create_instance(&create_info, None) }
            .map_err(ContextError::InstanceCreationFailed)?;

        log::info!(
            "Vulkan instance created (API {}.{}, {} layers, {} extensions)",
            vk::api_version_major(descriptor.api_version()),
            vk::api_version_minor(descriptor.api_version()),
            layers.len(),
            extensions.len()
        );

        Ok(Self {
            handle,
            entry,
            enabled_layers: layers,
            validation: descriptor.validation_enabled(),
            api_version: descriptor.api_version(),
        })
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn handle(&self) -> &ash::Instance {
        &self.handle
    }

    /// Layers the instance was created with, reused at device level
    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan instance");
        unsafe { self.handle.destroy_instance(None) };
    }
}

/// Requested extensions, with debug utils appended when validation is on
fn requested_extensions(descriptor: &CapabilityDescriptor) -> Vec<CString> {
    let mut extensions = descriptor.extensions().to_vec();
    let debug_utils = ash::extensions::ext::DebugUtils::name();
    if descriptor.validation_enabled() && !extensions.iter().any(|e| e.as_c_str() == debug_utils) {
        extensions.push(debug_utils.to_owned());
    }
    extensions
}

/// First entry of `required` that does not appear in `available`
pub(crate) fn first_missing<'a>(required: &'a [CString], available: &[CString]) -> Option<&'a CStr> {
    required
        .iter()
        .find(|name| !available.contains(name))
        .map(CString::as_c_str)
}

pub(crate) fn layer_names(props: &[vk::LayerProperties]) -> Vec<CString> {
    props.iter().map(|p| fixed_name(&p.layer_name)).collect()
}

pub(crate) fn extension_names(props: &[vk::ExtensionProperties]) -> Vec<CString> {
    props.iter().map(|p| fixed_name(&p.extension_name)).collect()
}

/// Read a NUL-terminated name out of a fixed-size Vulkan char array
pub(crate) fn fixed_name(raw: &[c_char]) -> CString {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    // no interior NUL: we stopped at the first one
    CString::new(bytes).unwrap_or_default()
}

pub(crate) fn as_ptrs(names: &[CString]) -> Vec<*const c_char> {
    names.iter().map(|n| n.as_ptr()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<CString> {
        list.iter().map(|s| CString::new(*s).unwrap()).collect()
    }

    fn raw_name<const N: usize>(name: &str) -> [c_char; N] {
        let mut out = [0 as c_char; N];
        for (dst, src) in out.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        out
    }

    #[test]
    fn missing_layer_is_reported_by_name() {
        let available = names(&["VK_LAYER_KHRONOS_validation", "VK_LAYER_MESA_overlay"]);
        let required = names(&["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_api_dump"]);
        assert_eq!(
            first_missing(&required, &available),
            Some(c"VK_LAYER_LUNARG_api_dump")
        );
    }

    #[test]
    fn first_unmatched_entry_wins() {
        let available = names(&["VK_KHR_surface"]);
        let required = names(&["VK_KHR_xlib_surface", "VK_KHR_surface", "VK_EXT_debug_utils"]);
        assert_eq!(first_missing(&required, &available), Some(c"VK_KHR_xlib_surface"));
    }

    #[test]
    fn empty_request_always_satisfied() {
        assert_eq!(first_missing(&[], &[]), None);
        assert_eq!(first_missing(&[], &names(&["VK_KHR_surface"])), None);
    }

    #[test]
    fn subset_is_satisfied() {
        let available = names(&["VK_KHR_surface", "VK_KHR_win32_surface", "VK_EXT_debug_utils"]);
        let required = names(&["VK_EXT_debug_utils", "VK_KHR_surface"]);
        assert_eq!(first_missing(&required, &available), None);
    }

    #[test]
    fn fixed_size_names_are_trimmed_at_nul() {
        let props = vk::ExtensionProperties {
            extension_name: raw_name("VK_KHR_swapchain"),
            spec_version: 70,
        };
        assert_eq!(extension_names(&[props]), names(&["VK_KHR_swapchain"]));

        let layer = vk::LayerProperties {
            layer_name: raw_name("VK_LAYER_KHRONOS_validation"),
            ..Default::default()
        };
        assert_eq!(layer_names(&[layer]), names(&["VK_LAYER_KHRONOS_validation"]));
    }

    #[test]
    fn validation_appends_debug_utils_once() {
        let desc = CapabilityDescriptor::builder("app")
            .validation(true)
            .extension("VK_KHR_surface")
            .build()
            .unwrap();
        assert_eq!(
            requested_extensions(&desc),
            names(&["VK_KHR_surface", "VK_EXT_debug_utils"])
        );

        let desc = CapabilityDescriptor::builder("app")
            .validation(true)
            .extension("VK_EXT_debug_utils")
            .build()
            .unwrap();
        assert_eq!(requested_extensions(&desc), names(&["VK_EXT_debug_utils"]));
    }

    #[test]
    fn no_debug_utils_without_validation() {
        let desc = CapabilityDescriptor::builder("app").build().unwrap();
        assert!(requested_extensions(&desc).is_empty());
    }
}
