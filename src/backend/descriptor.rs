// Capability descriptor - what the instance should look like
//
// Identity, API version, instance layers/extensions and the validation
// toggle. Built once, handed to the context, never changed afterwards.

use super::error::{ContextError, Result};
use ash::vk;
use std::ffi::{CStr, CString};

/// Khronos validation layer, enabled by default when validation is on
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    application_name: CString,
    application_version: u32,
    engine_name: CString,
    engine_version: u32,
    api_version: u32,
    enable_validation: bool,
    layers: Vec<CString>,
    extensions: Vec<CString>,
}

impl CapabilityDescriptor {
    pub fn builder(application_name: impl Into<String>) -> CapabilityDescriptorBuilder {
        CapabilityDescriptorBuilder::new(application_name)
    }

    pub fn application_name(&self) -> &CStr {
        &self.application_name
    }

    pub fn application_version(&self) -> u32 {
        self.application_version
    }

    pub fn engine_name(&self) -> &CStr {
        &self.engine_name
    }

    pub fn engine_version(&self) -> u32 {
        self.engine_version
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    pub fn validation_enabled(&self) -> bool {
        self.enable_validation
    }

    /// Layers to request. Empty when validation is disabled.
    pub fn layers(&self) -> &[CString] {
        if self.enable_validation {
            &self.layers
        } else {
            &[]
        }
    }

    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }
}

/// Builder for [`CapabilityDescriptor`].
///
/// Names are checked in [`build`](Self::build): empty names and names with
/// interior NUL bytes are rejected, duplicates are dropped keeping the first
/// occurrence.
#[derive(Debug, Clone)]
pub struct CapabilityDescriptorBuilder {
    application_name: String,
    application_version: u32,
    engine_name: String,
    engine_version: u32,
    api_version: u32,
    enable_validation: bool,
    layers: Vec<String>,
    extensions: Vec<String>,
}

impl CapabilityDescriptorBuilder {
    fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            application_version: vk::make_api_version(0, 0, 1, 0),
            engine_name: "No Engine".to_string(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_2,
            enable_validation: false,
            layers: Vec::new(),
            extensions: Vec::new(),
        }
    }

    pub fn application_version(mut self, version: u32) -> Self {
        self.application_version = version;
        self
    }

    pub fn engine(mut self, name: impl Into<String>, version: u32) -> Self {
        self.engine_name = name.into();
        self.engine_version = version;
        self
    }

    pub fn api_version(mut self, version: u32) -> Self {
        self.api_version = version;
        self
    }

    /// Turn validation on or off. With validation on and no explicit layer,
    /// the Khronos validation layer is requested.
    pub fn validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    pub fn layer(mut self, name: impl Into<String>) -> Self {
        self.layers.push(name.into());
        self
    }

    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    /// Add extensions reported by a loader or surface provider
    pub fn extensions<'a>(mut self, names: impl IntoIterator<Item = &'a CStr>) -> Self {
        self.extensions
            .extend(names.into_iter().map(|n| n.to_string_lossy().into_owned()));
        self
    }

    pub fn build(self) -> Result<CapabilityDescriptor> {
        let mut layers = to_cstrings("layer", self.layers)?;
        if self.enable_validation && layers.is_empty() {
            layers.push(VALIDATION_LAYER.to_owned());
        }

        Ok(CapabilityDescriptor {
            application_name: to_cstring("application", self.application_name)?,
            application_version: self.application_version,
            engine_name: to_cstring("engine", self.engine_name)?,
            engine_version: self.engine_version,
            api_version: self.api_version,
            enable_validation: self.enable_validation,
            layers,
            extensions: to_cstrings("extension", self.extensions)?,
        })
    }
}

fn to_cstring(kind: &'static str, name: String) -> Result<CString> {
    if name.is_empty() {
        return Err(ContextError::InvalidName { kind, name });
    }
    CString::new(name).map_err(|e| ContextError::InvalidName {
        kind,
        name: String::from_utf8_lossy(&e.into_vec()).into_owned(),
    })
}

fn to_cstrings(kind: &'static str, names: Vec<String>) -> Result<Vec<CString>> {
    let mut out: Vec<CString> = Vec::with_capacity(names.len());
    for name in names {
        let name = to_cstring(kind, name)?;
        if !out.contains(&name) {
            out.push(name);
        }
    }
    Ok(out)
}

/// Parse "major.minor" or "major.minor.patch" into a packed API version
pub fn parse_api_version(text: &str) -> Option<u32> {
    let mut parts = text.trim().split('.').map(|p| p.parse::<u32>());
    let major = parts.next()?.ok()?;
    let minor = parts.next()?.ok()?;
    let patch = match parts.next() {
        Some(p) => p.ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(vk::make_api_version(0, major, minor, patch))
}
