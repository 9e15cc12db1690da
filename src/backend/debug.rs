// Diagnostics bridge - validation layer messages into the log sink
//
// The messenger exists only when validation is enabled. Its callback is a
// typed handler bound at registration time; the driver hands it back to
// us through the user-data pointer and may do so from its own threads.

use super::error::Result;
use super::instance::Instance;
use crate::logging::{self, LogLevel, LogSink, ModuleName};
use ash::extensions::ext::DebugUtils;
use ash::vk;
use std::ffi::{c_void, CStr};
use std::sync::{Arc, Weak};

/// Handler invoked for every message the messenger receives
struct DebugHandler {
    forward: Box<dyn Fn(LogLevel, &str) + Send + Sync>,
}

impl DebugHandler {
    fn for_sink(sink: Weak<dyn LogSink>) -> Self {
        Self {
            forward: Box::new(move |level, message| {
                logging::write_weak(&sink, ModuleName::Core, level, message);
            }),
        }
    }

    fn handle(
        &self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT,
        message: &str,
    ) {
        (self.forward)(map_severity(severity), &format_message(message_type, message));
    }
}

/// Registered debug messenger. Destroyed before the instance it borrows.
pub struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
    // Boxed so its address stays stable while the driver holds it
    _handler: Box<DebugHandler>,
    _instance: Arc<Instance>,
}

impl DebugMessenger {
    /// Register a messenger forwarding to `sink`, or do nothing when the
    /// instance was created without validation.
    pub fn attach(instance: &Arc<Instance>, sink: Weak<dyn LogSink>) -> Result<Option<Self>> {
        if !instance.validation_enabled() {
            log::debug!("Validation disabled, no debug messenger");
            return Ok(None);
        }

        let handler = Box::new(DebugHandler::for_sink(sink));
        let loader = DebugUtils::new(instance.entry(), instance.handle());

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(&*handler as *const DebugHandler as *mut c_void);

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }?;
        log::info!("Debug messenger attached");

        Ok(Some(Self {
            loader,
            messenger,
            _handler: handler,
            _instance: instance.clone(),
        }))
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

pub(crate) fn map_severity(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogLevel {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        LogLevel::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        LogLevel::Warning
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE) {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

pub(crate) fn format_message(message_type: vk::DebugUtilsMessageTypeFlagsEXT, message: &str) -> String {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        format!("[Performance] {message}")
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        format!("[Validation] {message}")
    } else {
        message.to_owned()
    }
}

// Always returns FALSE: the call that triggered the message must not abort
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || p_user_data.is_null() {
        return vk::FALSE;
    }
    let p_message = (*p_callback_data).p_message;
    if p_message.is_null() {
        return vk::FALSE;
    }

    let handler = &*(p_user_data as *const DebugHandler);
    let message = CStr::from_ptr(p_message).to_string_lossy();
    handler.handle(message_severity, message_type, &message);

    vk::FALSE
}
