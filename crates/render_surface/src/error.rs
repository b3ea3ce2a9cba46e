//! Error types shared by the Vulkan and surface layers
//!
//! Driver failures are never fatal for the process: every fallible operation
//! surfaces as a `Result` or sentinel and the worst outcome is a dropped frame.

use ash::vk;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan loader, instance or device initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },
}

impl VulkanError {
    /// True when the presentation engine reported the swapchain out of date.
    ///
    /// Out-of-date is transient: the caller drops the frame and schedules a
    /// swapchain recreation instead of treating this as a failure.
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, Self::Api(vk::Result::ERROR_OUT_OF_DATE_KHR))
    }

    /// True when the call was short-circuited on an uninitialized handle.
    pub fn is_initialization_failure(&self) -> bool {
        matches!(
            self,
            Self::Api(vk::Result::ERROR_INITIALIZATION_FAILED) | Self::InitializationFailed(_)
        )
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
