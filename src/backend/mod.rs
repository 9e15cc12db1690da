// Backend module - Vulkan device initialization core
//
// Design: thin RAII wrappers around ash, one per setup stage, tied
// together by `RenderContext`

pub mod command;
pub mod context;
pub mod debug;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod instance;
pub mod queue;
pub mod selector;
pub mod surface;

pub use command::{CommandPool, SingleTimeCommands};
pub use context::RenderContext;
pub use descriptor::{CapabilityDescriptor, VALIDATION_LAYER};
pub use device::LogicalDevice;
pub use error::{ContextError, Result};
pub use instance::Instance;
pub use queue::QueueFamilyIndices;
pub use selector::{DeviceRequirements, PhysicalDevice};
pub use surface::{HeadlessSurface, Surface, SurfaceProvider, SwapChainSupportDetails, WindowSurface};
