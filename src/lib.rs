// Vulkan render context core
//
// Stands up a Vulkan backend: instance, optional validation messenger,
// surface, GPU selection, logical device and a command pool with a
// blocking one-shot submission helper.

pub mod backend;
pub mod config;
pub mod logging;

pub use backend::{CapabilityDescriptor, ContextError, RenderContext};
pub use logging::{LogLevel, LogSink, ModuleName};
