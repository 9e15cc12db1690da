// Render context - ordered setup of the Vulkan core
//
// Stages run strictly in this order:
//   instance -> debug messenger -> surface -> physical device
//   -> logical device -> command pool
//
// Each stage stores its result only on success. Failures are reported to
// the log sink before being returned, and never undo earlier stages.
// Drop releases everything in reverse order.

use super::command::{CommandPool, SingleTimeCommands};
use super::debug::DebugMessenger;
use super::descriptor::CapabilityDescriptor;
use super::device::LogicalDevice;
use super::error::{ContextError, Result};
use super::instance::Instance;
use super::queue::QueueFamilyIndices;
use super::selector::{self, DeviceRequirements, PhysicalDevice};
use super::surface::{Surface, SurfaceProvider, SwapChainSupportDetails};
use crate::logging::{self, LogLevel, LogSink, ModuleName};
use ash::vk;
use std::sync::{Arc, Weak};

pub struct RenderContext {
    descriptor: CapabilityDescriptor,
    requirements: DeviceRequirements,
    sink: Weak<dyn LogSink>,
    // Set once the diagnostics stage ran, messenger or not
    diagnostics_attached: bool,

    // Reverse creation order, so fields also drop correctly
    command_pool: Option<CommandPool>,
    device: Option<Arc<LogicalDevice>>,
    physical_device: Option<PhysicalDevice>,
    surface: Option<Surface>,
    debug_messenger: Option<DebugMessenger>,
    instance: Option<Arc<Instance>>,
}

impl RenderContext {
    pub fn new(descriptor: CapabilityDescriptor, sink: Weak<dyn LogSink>) -> Self {
        Self::with_requirements(descriptor, DeviceRequirements::default(), sink)
    }

    pub fn with_requirements(
        descriptor: CapabilityDescriptor,
        requirements: DeviceRequirements,
        sink: Weak<dyn LogSink>,
    ) -> Self {
        Self {
            descriptor,
            requirements,
            sink,
            diagnostics_attached: false,
            command_pool: None,
            device: None,
            physical_device: None,
            surface: None,
            debug_messenger: None,
            instance: None,
        }
    }

    /// Run every stage in order against `provider`'s surface
    pub fn initialize(&mut self, provider: &dyn SurfaceProvider) -> Result<()> {
        self.create_instance()?;
        self.attach_diagnostics()?;
        self.bind_surface(provider)?;
        self.pick_physical_device()?;
        self.create_logical_device()?;
        self.create_command_pool()?;
        self.log(LogLevel::Info, "Render context initialized");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // STAGES
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_instance(&mut self) -> Result<()> {
        if self.instance.is_some() {
            return self.fail(ContextError::AlreadyInitialized("instance"));
        }
        let instance = self.report(Instance::new(&self.descriptor))?;
        self.instance = Some(Arc::new(instance));
        Ok(())
    }

    /// Attach the debug messenger. Does nothing when validation is off.
    pub fn attach_diagnostics(&mut self) -> Result<()> {
        let instance = self.require_instance("attach_diagnostics")?;
        if self.diagnostics_attached {
            return self.fail(ContextError::AlreadyInitialized("debug messenger"));
        }
        self.debug_messenger = self.report(DebugMessenger::attach(&instance, self.sink.clone()))?;
        self.diagnostics_attached = true;
        Ok(())
    }

    pub fn bind_surface(&mut self, provider: &dyn SurfaceProvider) -> Result<()> {
        let instance = self.require_instance("bind_surface")?;
        if !self.diagnostics_attached {
            return self.out_of_order("bind_surface", "attach_diagnostics");
        }
        if self.surface.is_some() {
            return self.fail(ContextError::AlreadyInitialized("surface"));
        }
        let surface = self.report(Surface::new(&instance, provider))?;
        self.surface = Some(surface);
        Ok(())
    }

    pub fn pick_physical_device(&mut self) -> Result<()> {
        let instance = self.require_instance("pick_physical_device")?;
        let Some(surface) = self.surface.as_ref() else {
            return self.out_of_order("pick_physical_device", "bind_surface");
        };
        if self.physical_device.is_some() {
            return self.fail(ContextError::AlreadyInitialized("physical device"));
        }

        let picked = selector::pick_physical_device(&instance, surface, &self.requirements);
        let physical = self.report(picked)?;
        self.log(LogLevel::Info, &format!("Selected GPU: {}", physical.name()));
        self.physical_device = Some(physical);
        Ok(())
    }

    pub fn create_logical_device(&mut self) -> Result<()> {
        let instance = self.require_instance("create_logical_device")?;
        let Some(physical) = self.physical_device.as_ref() else {
            return self.out_of_order("create_logical_device", "pick_physical_device");
        };
        if self.device.is_some() {
            return self.fail(ContextError::AlreadyInitialized("logical device"));
        }

        let device = LogicalDevice::new(&instance, physical, &self.requirements);
        let device = self.report(device)?;
        self.device = Some(Arc::new(device));
        Ok(())
    }

    pub fn create_command_pool(&mut self) -> Result<()> {
        let Some(device) = self.device.clone() else {
            return self.out_of_order("create_command_pool", "create_logical_device");
        };
        if self.command_pool.is_some() {
            return self.fail(ContextError::AlreadyInitialized("command pool"));
        }

        let pool = self.report(CommandPool::new(&device, device.graphics_family()))?;
        self.command_pool = Some(pool);
        Ok(())
    }

    pub fn begin_single_time_commands(&self) -> Result<SingleTimeCommands> {
        let pool = self.require_pool("begin_single_time_commands")?;
        self.report(pool.begin_single_time_commands())
    }

    /// Submit and block until the graphics queue is idle. The returned
    /// buffer belongs to the caller; give it back with [`free_command_buffers`].
    ///
    /// [`free_command_buffers`]: Self::free_command_buffers
    pub fn end_single_time_commands(&self, commands: SingleTimeCommands) -> Result<vk::CommandBuffer> {
        let pool = self.require_pool("end_single_time_commands")?;
        self.report(pool.end_single_time_commands(commands))
    }

    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if let Some(pool) = &self.command_pool {
            pool.free(buffers);
        }
    }

    /// Presentation support of the chosen device for the bound surface
    pub fn swap_chain_support(&self) -> Result<SwapChainSupportDetails> {
        let (Some(surface), Some(physical)) = (&self.surface, &self.physical_device) else {
            return self.out_of_order("swap_chain_support", "pick_physical_device");
        };
        self.report(surface.swap_chain_support(physical.handle()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // ACCESSORS
    // ─────────────────────────────────────────────────────────────────────────

    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    pub fn requirements(&self) -> &DeviceRequirements {
        &self.requirements
    }

    pub fn instance(&self) -> Option<&Arc<Instance>> {
        self.instance.as_ref()
    }

    pub fn has_debug_messenger(&self) -> bool {
        self.debug_messenger.is_some()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn physical_device(&self) -> Option<&PhysicalDevice> {
        self.physical_device.as_ref()
    }

    pub fn queue_families(&self) -> Option<QueueFamilyIndices> {
        self.physical_device.as_ref().map(PhysicalDevice::queue_families)
    }

    pub fn device(&self) -> Option<&Arc<LogicalDevice>> {
        self.device.as_ref()
    }

    pub fn graphics_queue(&self) -> Option<vk::Queue> {
        self.device.as_ref().map(|d| d.graphics_queue())
    }

    pub fn present_queue(&self) -> Option<vk::Queue> {
        self.device.as_ref().map(|d| d.present_queue())
    }

    pub fn graphics_family(&self) -> Option<u32> {
        self.device.as_ref().map(|d| d.graphics_family())
    }

    pub fn command_pool(&self) -> Option<&CommandPool> {
        self.command_pool.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // HELPERS
    // ─────────────────────────────────────────────────────────────────────────

    fn log(&self, level: LogLevel, message: &str) {
        logging::write_weak(&self.sink, ModuleName::Render, level, message);
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.log(LogLevel::Error, &e.to_string());
        }
        result
    }

    fn fail<T>(&self, error: ContextError) -> Result<T> {
        self.report(Err(error))
    }

    fn out_of_order<T>(&self, stage: &'static str, requires: &'static str) -> Result<T> {
        self.fail(ContextError::StageOutOfOrder { stage, requires })
    }

    fn require_instance(&self, stage: &'static str) -> Result<Arc<Instance>> {
        match &self.instance {
            Some(instance) => Ok(instance.clone()),
            None => self.out_of_order(stage, "create_instance"),
        }
    }

    fn require_pool(&self, stage: &'static str) -> Result<&CommandPool> {
        match &self.command_pool {
            Some(pool) => Ok(pool),
            None => self.out_of_order(stage, "create_command_pool"),
        }
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Some(device) = &self.device {
            let _ = device.wait_idle();
        }

        self.command_pool = None;
        self.device = None;
        self.physical_device = None;
        self.surface = None;
        self.debug_messenger = None;
        self.diagnostics_attached = false;
        self.instance = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::surface::HeadlessSurface;
    use crate::logging::MemorySink;

    fn descriptor(provider: &dyn SurfaceProvider) -> CapabilityDescriptor {
        CapabilityDescriptor::builder("context-tests")
            .extensions(provider.required_instance_extensions().unwrap())
            .build()
            .unwrap()
    }

    /// True when the error means this machine cannot run Vulkan headless at
    /// all. Anything else is a real failure.
    fn no_headless_driver(error: &ContextError) -> bool {
        match error {
            ContextError::LoaderUnavailable(_) | ContextError::NoDevicesFound => true,
            ContextError::InstanceCreationFailed(vk::Result::ERROR_INCOMPATIBLE_DRIVER) => true,
            ContextError::MissingExtension(name) => {
                name == "VK_EXT_headless_surface" || name == "VK_KHR_surface"
            }
            _ => false,
        }
    }

    /// Context with instance, surface and physical device ready, or `None`
    /// when this machine has no Vulkan driver able to run headless.
    fn headless(sink: &Arc<MemorySink>) -> Option<RenderContext> {
        fn prepare(context: &mut RenderContext) -> Result<()> {
            context.create_instance()?;
            context.attach_diagnostics()?;
            context.bind_surface(&HeadlessSurface)?;
            context.pick_physical_device()
        }

        let mut context = RenderContext::new(descriptor(&HeadlessSurface), logging::downgrade(sink));
        match prepare(&mut context) {
            Ok(()) => Some(context),
            Err(e) if no_headless_driver(&e) => {
                eprintln!("skipping: no usable headless Vulkan device ({e})");
                None
            }
            Err(e) => panic!("headless setup failed: {e}"),
        }
    }

    #[test]
    fn only_missing_drivers_are_skipped() {
        assert!(no_headless_driver(&ContextError::NoDevicesFound));
        assert!(no_headless_driver(&ContextError::MissingExtension(
            "VK_EXT_headless_surface".to_string()
        )));
        assert!(!no_headless_driver(&ContextError::NoSuitableDevice));
        assert!(!no_headless_driver(&ContextError::MissingExtension(
            "VK_KHR_swapchain".to_string()
        )));
        assert!(!no_headless_driver(&ContextError::DeviceCreationFailed(
            vk::Result::ERROR_FEATURE_NOT_PRESENT
        )));
    }

    #[test]
    fn each_failure_is_reported_once() {
        let sink = MemorySink::new();
        let mut context = RenderContext::new(descriptor(&HeadlessSurface), logging::downgrade(&sink));

        assert!(context.create_logical_device().is_err());
        let records = sink.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Error);
        assert_eq!(records[0].module, ModuleName::Render);
    }

    #[test]
    fn surface_waits_for_diagnostics() {
        let sink = MemorySink::new();
        let mut context = RenderContext::new(descriptor(&HeadlessSurface), logging::downgrade(&sink));

        match context.create_instance() {
            Ok(()) => {}
            Err(e) if no_headless_driver(&e) => {
                eprintln!("skipping: no usable headless Vulkan instance ({e})");
                return;
            }
            Err(e) => panic!("instance creation failed: {e}"),
        }

        assert!(matches!(
            context.bind_surface(&HeadlessSurface),
            Err(ContextError::StageOutOfOrder {
                stage: "bind_surface",
                requires: "attach_diagnostics"
            })
        ));
        assert!(context.surface().is_none());

        context.attach_diagnostics().unwrap();
        context.bind_surface(&HeadlessSurface).unwrap();
        assert!(matches!(
            context.attach_diagnostics(),
            Err(ContextError::AlreadyInitialized("debug messenger"))
        ));
    }

    #[test]
    fn stages_require_their_predecessors() {
        let sink = MemorySink::new();
        let mut context = RenderContext::new(descriptor(&HeadlessSurface), logging::downgrade(&sink));

        assert!(matches!(
            context.pick_physical_device(),
            Err(ContextError::StageOutOfOrder { requires: "create_instance", .. })
        ));
        assert!(matches!(
            context.create_command_pool(),
            Err(ContextError::StageOutOfOrder { requires: "create_logical_device", .. })
        ));
        assert!(matches!(
            context.begin_single_time_commands(),
            Err(ContextError::StageOutOfOrder { requires: "create_command_pool", .. })
        ));
        assert!(context.device().is_none());
        assert!(sink.contains(LogLevel::Error, "pick_physical_device called before create_instance"));
    }

    #[test]
    fn missing_layer_produces_no_instance() {
        let sink = MemorySink::new();
        let descriptor = CapabilityDescriptor::builder("context-tests")
            .validation(true)
            .layer("VK_LAYER_definitely_not_installed")
            .build()
            .unwrap();
        let mut context = RenderContext::new(descriptor, logging::downgrade(&sink));

        match context.create_instance() {
            Err(ContextError::MissingLayer(name)) => {
                assert_eq!(name, "VK_LAYER_definitely_not_installed");
                assert!(sink.contains(LogLevel::Error, "VK_LAYER_definitely_not_installed"));
            }
            Err(ContextError::LoaderUnavailable(_)) => eprintln!("skipping: no Vulkan loader"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert!(context.instance().is_none());
    }

    #[test]
    fn missing_extension_produces_no_instance() {
        let sink = MemorySink::new();
        let descriptor = CapabilityDescriptor::builder("context-tests")
            .extension("VK_EXT_definitely_not_supported")
            .build()
            .unwrap();
        let mut context = RenderContext::new(descriptor, logging::downgrade(&sink));

        match context.create_instance() {
            Err(ContextError::MissingExtension(name)) => {
                assert_eq!(name, "VK_EXT_definitely_not_supported");
            }
            Err(ContextError::LoaderUnavailable(_)) => eprintln!("skipping: no Vulkan loader"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert!(context.instance().is_none());
    }

    #[test]
    fn no_messenger_without_validation() {
        let sink = MemorySink::new();
        let Some(context) = headless(&sink) else { return };
        assert!(!context.has_debug_messenger());
    }

    #[test]
    fn selected_device_keeps_complete_queue_families() {
        let sink = MemorySink::new();
        let Some(context) = headless(&sink) else { return };

        let physical = context.physical_device().unwrap();
        assert!(physical.score() > 0);
        assert!(physical.queue_families().is_complete());
        assert!(sink.contains(LogLevel::Info, "Selected GPU"));
    }

    #[test]
    fn failed_device_creation_leaves_context_untouched() {
        let sink = MemorySink::new();
        let Some(mut context) = headless(&sink) else { return };

        let instance = context.instance().unwrap().clone();
        let mut requirements = context.requirements().clone();
        requirements
            .extensions
            .push(std::ffi::CString::new("VK_EXT_definitely_not_supported").unwrap());

        let failed = LogicalDevice::new(&instance, context.physical_device().unwrap(), &requirements);
        assert!(matches!(failed, Err(ContextError::DeviceCreationFailed(_))));
        assert!(context.device().is_none());
        drop(instance);

        context.create_logical_device().unwrap();
        assert!(context.device().is_some());
    }

    #[test]
    fn command_pool_uses_graphics_family() {
        let sink = MemorySink::new();
        let Some(mut context) = headless(&sink) else { return };
        context.create_logical_device().unwrap();
        context.create_command_pool().unwrap();

        let families = context.queue_families().unwrap();
        assert_eq!(context.command_pool().unwrap().queue_family(), families.graphics_family.unwrap());
        assert_eq!(context.graphics_family(), families.graphics_family);
        if families.graphics_family == families.present_family {
            assert_eq!(context.graphics_queue(), context.present_queue());
        } else {
            let device = context.device().unwrap();
            assert!(matches!(
                CommandPool::new(device, device.present_family()),
                Err(ContextError::QueueFamilyMismatch { .. })
            ));
        }
    }

    #[test]
    fn empty_single_time_submission_completes() {
        let sink = MemorySink::new();
        let Some(mut context) = headless(&sink) else { return };
        context.create_logical_device().unwrap();
        context.create_command_pool().unwrap();

        let commands = context.begin_single_time_commands().unwrap();
        let buffer = context.end_single_time_commands(commands).unwrap();
        assert_ne!(buffer, vk::CommandBuffer::null());

        let device = context.device().unwrap();
        unsafe { device.handle().queue_wait_idle(device.graphics_queue()) }.unwrap();
        context.free_command_buffers(&[buffer]);
    }

    #[test]
    fn stages_cannot_run_twice() {
        let sink = MemorySink::new();
        let Some(mut context) = headless(&sink) else { return };
        assert!(matches!(
            context.create_instance(),
            Err(ContextError::AlreadyInitialized("instance"))
        ));
        assert!(matches!(
            context.bind_surface(&HeadlessSurface),
            Err(ContextError::AlreadyInitialized("surface"))
        ));
    }

    #[test]
    fn swap_chain_support_for_headless_surface() {
        let sink = MemorySink::new();
        let Some(context) = headless(&sink) else { return };
        let details = context.swap_chain_support().unwrap();
        assert!(details.is_adequate());
    }
}
