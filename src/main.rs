// =============================================================================
// VULKAN CONTEXT SANDBOX
// =============================================================================
//
// Opens a window, brings the render context up stage by stage, pushes one
// empty single-time submission through the graphics queue, then idles
// until the window is closed.
//
// SETUP FLOW:
// 1. Load config.toml, start logging
// 2. Create window (winit)
// 3. Instance -> debug messenger -> surface -> GPU -> device -> command pool
// 4. One blocking single-time submission as a smoke test
//
// =============================================================================

use anyhow::{Context, Result};
use render_context::backend::{RenderContext, SurfaceProvider, WindowSurface};
use render_context::config::Config;
use render_context::logging::{self, LogForwarder, LogSink};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting Vulkan context sandbox");
    log::info!(
        "Window: {}x{}, validation {}",
        config.window.width,
        config.window.height,
        if config.validation_enabled() { "on" } else { "off" }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.result
}

/// Initialize logging; RUST_LOG still overrides the configured level
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.log_filter());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the context (and its surface) must go
/// before the window it presents to.
struct App {
    config: Config,
    context: Option<RenderContext>,
    window: Option<Arc<Window>>,
    sink: Arc<LogForwarder>,
    result: Result<()>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            context: None,
            window: None,
            sink: Arc::new(LogForwarder),
            result: Ok(()),
        }
    }

    fn init_vulkan(&mut self, window: &Arc<Window>) -> Result<()> {
        log::info!("Initializing Vulkan...");

        // SAFETY: the context is dropped before the window (see `App`)
        let provider = unsafe { WindowSurface::new(window.as_ref()) }?;
        let surface_extensions = provider.required_instance_extensions()?;

        let descriptor = self
            .config
            .descriptor(&surface_extensions)
            .context("Invalid capability descriptor")?;

        let mut context = RenderContext::new(descriptor, logging::downgrade(&self.sink));
        context
            .initialize(&provider)
            .context("Failed to initialize render context")?;

        self.smoke_test(&context)?;

        if let Some(physical) = context.physical_device() {
            self.sink.write_log(
                logging::ModuleName::Application,
                logging::LogLevel::Info,
                &format!("Running on {} (score {})", physical.name(), physical.score()),
            );
        }

        self.context = Some(context);
        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    /// Empty single-time submission; proves the graphics queue works
    fn smoke_test(&self, context: &RenderContext) -> Result<()> {
        let commands = context.begin_single_time_commands()?;
        let buffer = context.end_single_time_commands(commands)?;
        context.free_command_buffers(&[buffer]);

        let support = context.swap_chain_support()?;
        log::info!(
            "Surface supports {} formats, {} present modes",
            support.formats.len(),
            support.present_modes.len()
        );
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.context = None;
        self.window = None;
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title(self.config.window.title.clone())
            .with_inner_size(LogicalSize::new(self.config.window.width, self.config.window.height));

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.result = Err(e).context("Failed to create window");
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_vulkan(&window) {
            log::error!("{:#}", e);
            self.result = Err(e);
            self.window = Some(window);
            self.shutdown(event_loop);
            return;
        }

        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let WindowEvent::CloseRequested = event {
            log::info!("Close requested, shutting down");
            self.shutdown(event_loop);
        }
    }
}
