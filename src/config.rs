// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Application/engine identity, API version, extra layers/extensions and the
// validation toggle. Missing file or missing keys fall back to defaults.

use crate::backend::descriptor::{parse_api_version, CapabilityDescriptor};
use crate::backend::error::Result as ContextResult;
use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::ffi::CStr;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub application: IdentityConfig,
    pub engine: IdentityConfig,
    pub vulkan: VulkanConfig,
    pub window: WindowConfig,
    pub debug: DebugConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application: IdentityConfig::default(),
            engine: IdentityConfig {
                name: "No Engine".to_string(),
                version: "1.0.0".to_string(),
            },
            vulkan: VulkanConfig::default(),
            window: WindowConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

/// Name and "major.minor.patch" version
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    pub version: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "Vulkan Renderer".to_string(),
            version: "0.1.0".to_string(),
        }
    }
}

/// Instance settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VulkanConfig {
    pub api_version: String,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            api_version: "1.2".to_string(),
            layers: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Renderer".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validation on in debug builds when the config allows it, always off
    /// in release builds
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', defaulting to info", self.debug.log_level);
            log::LevelFilter::Info
        })
    }

    /// Descriptor for this configuration plus the extensions the window
    /// system needs for presentation
    pub fn descriptor(&self, surface_extensions: &[&CStr]) -> ContextResult<CapabilityDescriptor> {
        let mut builder = CapabilityDescriptor::builder(self.application.name.clone())
            .application_version(packed_version(&self.application.version))
            .engine(self.engine.name.clone(), packed_version(&self.engine.version))
            .api_version(api_version(&self.vulkan.api_version))
            .validation(self.validation_enabled())
            .extensions(surface_extensions.iter().copied());

        for layer in &self.vulkan.layers {
            builder = builder.layer(layer.clone());
        }
        for extension in &self.vulkan.extensions {
            builder = builder.extension(extension.clone());
        }

        builder.build()
    }
}

fn api_version(text: &str) -> u32 {
    parse_api_version(text).unwrap_or_else(|| {
        log::warn!("Invalid API version '{}', defaulting to 1.2", text);
        vk::API_VERSION_1_2
    })
}

fn packed_version(text: &str) -> u32 {
    parse_api_version(text).unwrap_or_else(|| {
        log::warn!("Invalid version '{}', defaulting to 0.1.0", text);
        vk::make_api_version(0, 0, 1, 0)
    })
}
