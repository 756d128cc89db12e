/*!
# Deformable mirror device

The [Device] trait is the interface to the DM vendor SDK.

A [DeviceSession] owns an initialized [Device] and guarantees that the DM is reset and released
exactly once, either explicitly with [DeviceSession::shutdown] or when the session is dropped.
*/

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to initialize DM {0}")]
    Init(String),
    #[error("failed to query {0} from the DM")]
    Query(String),
    #[error("invalid actuator count: {0}")]
    ActuatorCount(f64),
    #[error("expected {expected} DM inputs, found {found}")]
    InputsSize { expected: usize, found: usize },
    #[error("failed to send the command to the DM")]
    Send,
    #[error("failed to reset the DM")]
    Reset,
    #[error("failed to release the DM")]
    Release,
    #[error("the DM has been released already")]
    Released,
}
type Result<T> = std::result::Result<T, DeviceError>;

/// Deformable mirror vendor SDK interface
pub trait Device: Send {
    /// Queries the number of actuators of the DM
    fn actuator_count(&mut self) -> Result<usize>;
    /// Sends the fractional strokes to the DM actuators
    fn send(&mut self, inputs: &[f64]) -> Result<()>;
    /// Sets all the actuators to their rest position
    fn reset(&mut self) -> Result<()>;
    /// Closes the DM session
    fn release(self) -> Result<()>;
}

/// Initialized DM with guaranteed release
#[derive(Debug)]
pub struct DeviceSession<D: Device> {
    serial: String,
    device: Option<D>,
}
impl<D: Device> DeviceSession<D> {
    pub fn new<S: Into<String>>(serial: S, device: D) -> Self {
        Self {
            serial: serial.into(),
            device: Some(device),
        }
    }
    /// DM serial number
    pub fn serial(&self) -> &str {
        &self.serial
    }
    fn device(&mut self) -> Result<&mut D> {
        self.device.as_mut().ok_or(DeviceError::Released)
    }
    /// Queries the number of actuators of the DM
    pub fn actuator_count(&mut self) -> Result<usize> {
        self.device()?.actuator_count()
    }
    /// Sends the fractional strokes to the DM actuators
    pub fn send(&mut self, inputs: &[f64]) -> Result<()> {
        self.device()?.send(inputs)
    }
    /// Resets and releases the DM
    pub fn shutdown(mut self) -> Result<()> {
        self.close()
    }
    fn close(&mut self) -> Result<()> {
        match self.device.take() {
            Some(mut device) => {
                log::info!("ALPAO {}: resetting and releasing DM", self.serial);
                let reset = device.reset();
                let release = device.release();
                reset.and(release)
            }
            None => Ok(()),
        }
    }
}
impl<D: Device> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            interface::print_info(format!("ALPAO {} shutdown failed", self.serial), Some(&e));
        }
    }
}
