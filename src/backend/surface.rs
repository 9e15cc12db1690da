// Surface - presentation target
//
// The windowing side implements `SurfaceProvider`; the core only keeps the
// resulting handle. `Surface` destroys it and keeps the instance alive
// until then.

use super::error::{ContextError, Result};
use super::instance::Instance;
use ash::extensions::{ext, khr};
use ash::{vk, Entry};
use raw_window_handle::{
    HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use std::ffi::{c_void, CStr};
use std::sync::Arc;

/// Windowing collaborator: knows which instance extensions presentation
/// needs and how to make a surface for its platform.
pub trait SurfaceProvider {
    fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>>;

    fn create_surface(&self, entry: &Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR>;
}

/// Owned surface handle
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: khr::Surface,
    _instance: Arc<Instance>,
}

impl Surface {
    pub fn new(instance: &Arc<Instance>, provider: &dyn SurfaceProvider) -> Result<Self> {
        let handle = provider.create_surface(instance.entry(), instance.handle())?;
        if handle == vk::SurfaceKHR::null() {
            return Err(ContextError::InvalidHandle("surface provider returned a null surface"));
        }

        Ok(Self {
            handle,
            loader: khr::Surface::new(instance.entry(), instance.handle()),
            _instance: instance.clone(),
        })
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    pub fn loader(&self) -> &khr::Surface {
        &self.loader
    }

    /// Whether `queue_family` on `physical_device` can present here.
    /// Driver errors count as "no".
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family: u32) -> bool {
        let result = unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.handle)
        };
        result.unwrap_or_else(|e| {
            log::debug!("Surface support query failed for family {}: {}", queue_family, e);
            false
        })
    }

    pub fn swap_chain_support(&self, physical_device: vk::PhysicalDevice) -> Result<SwapChainSupportDetails> {
        unsafe {
            Ok(SwapChainSupportDetails {
                capabilities: self
                    .loader
                    .get_physical_device_surface_capabilities(physical_device, self.handle)?,
                formats: self
                    .loader
                    .get_physical_device_surface_formats(physical_device, self.handle)?,
                present_modes: self
                    .loader
                    .get_physical_device_surface_present_modes(physical_device, self.handle)?,
            })
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

/// What a device/surface pair supports for presentation
#[derive(Debug, Clone)]
pub struct SwapChainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapChainSupportDetails {
    /// A swapchain can be built only with at least one format and mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Window-backed provider
// ─────────────────────────────────────────────────────────────────────────────

/// Surface provider for any native window exposing raw handles
/// (winit windows included).
pub struct WindowSurface {
    window: RawWindowHandle,
    display: RawDisplayHandle,
}

impl WindowSurface {
    /// # Safety
    /// The window must outlive every surface created from this provider.
    pub unsafe fn new<W: HasWindowHandle + HasDisplayHandle>(window: &W) -> Result<Self> {
        let window_handle = window
            .window_handle()
            .map_err(|e| ContextError::SurfaceCreationFailed(format!("window handle: {e}")))?;
        let display_handle = window
            .display_handle()
            .map_err(|e| ContextError::SurfaceCreationFailed(format!("display handle: {e}")))?;

        Ok(Self {
            window: window_handle.as_raw(),
            display: display_handle.as_raw(),
        })
    }

    pub fn from_raw(window: RawWindowHandle, display: RawDisplayHandle) -> Self {
        Self { window, display }
    }
}

impl SurfaceProvider for WindowSurface {
    fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>> {
        display_extensions(self.display)
    }

    fn create_surface(&self, entry: &Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR> {
        let surface = match (self.display, self.window) {
            (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
                let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const c_void;
                let hwnd = handle.hwnd.get() as *const c_void;
                let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                    .hinstance(hinstance)
                    .hwnd(hwnd);
                let loader = khr::Win32Surface::new(entry, instance);
                unsafe { loader.create_win32_surface(&create_info, None) }
            }

            (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
                let dpy = display
                    .display
                    .ok_or(ContextError::InvalidHandle("Xlib display is null"))?;
                let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                    .dpy(dpy.as_ptr() as *mut _)
                    .window(handle.window);
                let loader = khr::XlibSurface::new(entry, instance);
                unsafe { loader.create_xlib_surface(&create_info, None) }
            }

            (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
                let connection = display
                    .connection
                    .ok_or(ContextError::InvalidHandle("XCB connection is null"))?;
                let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                    .connection(connection.as_ptr() as *mut _)
                    .window(handle.window.get());
                let loader = khr::XcbSurface::new(entry, instance);
                unsafe { loader.create_xcb_surface(&create_info, None) }
            }

            (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
                let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                    .display(display.display.as_ptr() as *mut _)
                    .surface(handle.surface.as_ptr() as *mut _);
                let loader = khr::WaylandSurface::new(entry, instance);
                unsafe { loader.create_wayland_surface(&create_info, None) }
            }

            (display, window) => {
                return Err(ContextError::SurfaceCreationFailed(format!(
                    "unsupported window system: {display:?} / {window:?}"
                )))
            }
        };

        surface.map_err(|e| ContextError::SurfaceCreationFailed(e.to_string()))
    }
}

/// Instance extensions needed to present on the given display
pub fn display_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => {
            return Err(ContextError::SurfaceCreationFailed(format!(
                "unsupported display: {other:?}"
            )))
        }
    };
    Ok(vec![khr::Surface::name(), platform])
}

// ─────────────────────────────────────────────────────────────────────────────
// Headless provider
// ─────────────────────────────────────────────────────────────────────────────

/// Offscreen surface through `VK_EXT_headless_surface`. Lets the whole
/// setup pipeline run without a window (CI, tools, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSurface;

impl SurfaceProvider for HeadlessSurface {
    fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>> {
        Ok(vec![khr::Surface::name(), ext::HeadlessSurface::name()])
    }

    fn create_surface(&self, entry: &Entry, instance: &ash::Instance) -> Result<vk::SurfaceKHR> {
        let loader = ext::HeadlessSurface::new(entry, instance);
        let create_info = vk::HeadlessSurfaceCreateInfoEXT::builder();
        unsafe { loader.create_headless_surface(&create_info, None) }
            .map_err(|e| ContextError::SurfaceCreationFailed(e.to_string()))
    }
}
