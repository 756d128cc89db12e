/*!
# Shared memory command channel

The [Channel] trait is the interface to the shared memory image the DM commands are written into.

The image is a 2D array of `f64` written by a single external process that posts the image
semaphores once a new command has been written.
The channel is only read by the DM control loop.
*/

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to open shared memory image {0}")]
    Open(String),
    #[error("shared memory image {0} is not an array of f64")]
    Datatype(String),
    #[error("failed to wait for shared memory image {0}")]
    Wait(String),
    #[error("expected a command of {expected} samples, found {found}")]
    FrameSize { expected: usize, found: usize },
    #[error("shared memory image {0} was being written")]
    Busy(String),
    #[error("shared memory image {0} is closed")]
    Closed(String),
}
type Result<T> = std::result::Result<T, ChannelError>;

/// Outcome of a wait on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// A new command has been posted
    NewFrame,
    /// No command was posted before the timeout
    TimedOut,
    /// No command will ever be posted
    Closed,
}

/// Shared memory image interface
pub trait Channel: Send {
    /// Image name
    fn name(&self) -> &str;
    /// Image axes size
    fn shape(&self) -> Vec<usize>;
    /// Blocks until a new command is posted or `timeout` has elapsed
    fn wait(&mut self, timeout: Duration) -> Result<Wait>;
    /// Returns the latest command
    ///
    /// Fails with [ChannelError::Busy] if the command could not be read while the writer was idle
    fn frame(&mut self) -> Result<Vec<f64>>;
    /// Image update counter
    fn counter(&self) -> u64;
}
