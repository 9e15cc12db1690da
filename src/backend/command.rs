// Command pool and one-shot submissions
//
// `end_single_time_commands` blocks until the graphics queue is idle.
// Fine for uploads during setup, wrong for anything per-frame.

use super::device::LogicalDevice;
use super::error::{ContextError, Result};
use ash::vk;
use std::sync::Arc;

/// Command pool bound to one queue family. Buffers can be reset one by one.
pub struct CommandPool {
    handle: vk::CommandPool,
    queue_family: u32,
    device: Arc<LogicalDevice>,
}

/// A primary command buffer that is currently recording.
///
/// Record into [`buffer`](Self::buffer), then hand it back to
/// [`CommandPool::end_single_time_commands`].
#[must_use = "single-time commands must be submitted with end_single_time_commands"]
#[derive(Debug)]
pub struct SingleTimeCommands {
    buffer: vk::CommandBuffer,
}

impl SingleTimeCommands {
    pub fn buffer(&self) -> vk::CommandBuffer {
        self.buffer
    }
}

/// Where a single-time submission stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmitStage {
    Record,
    Submit,
    Wait,
}

impl SubmitStage {
    /// Once queued, the buffer may still be executing and must not be freed
    fn may_be_pending(self) -> bool {
        self == SubmitStage::Wait
    }
}

/// Pools are tied to the graphics family; submissions go to its queue
fn check_pool_family(requested: u32, graphics: u32) -> Result<()> {
    if requested == graphics {
        Ok(())
    } else {
        Err(ContextError::QueueFamilyMismatch { requested, graphics })
    }
}

impl CommandPool {
    /// Pool for `device`'s graphics family. Any other family is rejected
    /// because single-time commands are submitted to the graphics queue.
    pub fn new(device: &Arc<LogicalDevice>, queue_family: u32) -> Result<Self> {
        check_pool_family(queue_family, device.graphics_family())?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let handle = unsafe { device.handle().create_command_pool(&pool_info, None) }
            .map_err(ContextError::CommandPoolCreationFailed)?;

        log::debug!("Command pool created for queue family {}", queue_family);

        Ok(Self {
            handle,
            queue_family,
            device: device.clone(),
        })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate one primary buffer and start recording it for a single submit
    pub fn begin_single_time_commands(&self) -> Result<SingleTimeCommands> {
        let device = self.device.handle();

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffer = unsafe { device.allocate_command_buffers(&alloc_info) }?
            .into_iter()
            .next()
            .ok_or(ContextError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = unsafe { device.begin_command_buffer(buffer, &begin_info) } {
            self.free(&[buffer]);
            return Err(e.into());
        }

        Ok(SingleTimeCommands { buffer })
    }

    /// Close, submit to the graphics queue and wait for the queue to drain.
    ///
    /// Returns the command buffer; the caller disposes of it (see
    /// [`free`](Self::free)). If recording or submission fails the buffer is
    /// freed here. If only the wait fails it stays allocated, since the queue
    /// may still hold it; the pool reclaims it when dropped.
    pub fn end_single_time_commands(&self, commands: SingleTimeCommands) -> Result<vk::CommandBuffer> {
        let buffer = commands.buffer;

        match self.submit_and_wait(buffer) {
            Ok(()) => Ok(buffer),
            Err((stage, e)) => {
                if !stage.may_be_pending() {
                    self.free(&[buffer]);
                }
                log::debug!("Single-time submission failed at {:?}: {}", stage, e);
                Err(ContextError::CommandSubmissionFailed(e))
            }
        }
    }

    fn submit_and_wait(&self, buffer: vk::CommandBuffer) -> Result<(), (SubmitStage, vk::Result)> {
        let device = self.device.handle();
        let queue = self.device.graphics_queue();

        let buffers = [buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers).build();

        unsafe {
            device
                .end_command_buffer(buffer)
                .map_err(|e| (SubmitStage::Record, e))?;
            device
                .queue_submit(queue, &[submit_info], vk::Fence::null())
                .map_err(|e| (SubmitStage::Submit, e))?;
            device
                .queue_wait_idle(queue)
                .map_err(|e| (SubmitStage::Wait, e))
        }
    }

    /// Return command buffers to the pool
    pub fn free(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe { self.device.handle().free_command_buffers(self.handle, buffers) };
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_command_pool(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_family_must_be_graphics() {
        assert!(check_pool_family(0, 0).is_ok());
        assert!(matches!(
            check_pool_family(1, 0),
            Err(ContextError::QueueFamilyMismatch { requested: 1, graphics: 0 })
        ));
    }

    #[test]
    fn only_wait_failures_keep_the_buffer() {
        assert!(!SubmitStage::Record.may_be_pending());
        assert!(!SubmitStage::Submit.may_be_pending());
        assert!(SubmitStage::Wait.may_be_pending());
    }
}
