// Error type for the render context
//
// Every setup stage fails fast with one of these. Variants carry the detail
// a user needs to act on (the missing layer name, the driver result code).

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Could not load the Vulkan library: {0}")]
    LoaderUnavailable(#[from] ash::LoadingError),
    #[error("Required instance layer not found: {0}")]
    MissingLayer(String),
    #[error("Required instance extension not found: {0}")]
    MissingExtension(String),
    #[error("Invalid {kind} name {name:?}")]
    InvalidName { kind: &'static str, name: String },
    #[error("Failed to create Vulkan instance: {0}")]
    InstanceCreationFailed(vk::Result),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Invalid handle: {0}")]
    InvalidHandle(&'static str),
    #[error("No Vulkan-capable GPU found")]
    NoDevicesFound,
    #[error("No suitable GPU found")]
    NoSuitableDevice,
    #[error("Queue family indices are incomplete (graphics: {graphics:?}, present: {present:?})")]
    IncompleteQueueFamilies {
        graphics: Option<u32>,
        present: Option<u32>,
    },
    #[error("Failed to create logical device: {0}")]
    DeviceCreationFailed(vk::Result),
    #[error("Failed to create command pool: {0}")]
    CommandPoolCreationFailed(vk::Result),
    #[error("Command pool must use the graphics family {graphics}, got {requested}")]
    QueueFamilyMismatch { requested: u32, graphics: u32 },
    #[error("Failed to submit single-time commands: {0}")]
    CommandSubmissionFailed(vk::Result),
    #[error("{stage} called before {requires}")]
    StageOutOfOrder {
        stage: &'static str,
        requires: &'static str,
    },
    #[error("{0} already exists on this context")]
    AlreadyInitialized(&'static str),
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),
}

pub type Result<T, E = ContextError> = std::result::Result<T, E>;
