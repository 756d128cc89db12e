//! # ALPAO Deformable Mirror Command Server
//!
//! Drives an ALPAO deformable mirror (DM) from commands written into a shared memory image.
//!
//! The commands are 2D grids of actuator displacements in microns.
//! Each new command goes through:
//!  1. **[remapping](mapping::Remap)**: the actuators are picked out of the grid with the [actuator mapping](mapping::ActuatorMapping) of the DM,
//!  2. **[normalization](pipeline::Normalization)**: the actuator commands are converted into the fractional strokes expected by the DM,
//!  3. **[dispatch](dispatch::Dispatcher)**: the fractional strokes are sent to the [DM](device::Device).
//!
//! The [control loop](control::ControlLoop) waits for new commands on the [shared memory image](channel::Channel)
//! until the [shutdown flag](shutdown::ShutdownFlag) is raised, typically by `Ctrl-C`,
//! and then resets and releases the DM.
//!
//! The DM calibration constants and actuator mapping are loaded from the [calibration root](calibration::CalibrationRoot) directory.
//!
//! The ALPAO SDK and milk bindings are enabled with the features `asdk` and `milk`.

use interface::print_info;

pub mod calibration;
pub mod channel;
pub mod control;
pub mod device;
pub mod dispatch;
pub mod fits;
pub mod io;
pub mod mapping;
pub mod pipeline;
pub mod shutdown;
pub mod sim;

#[cfg(feature = "asdk")]
pub mod asdk;
#[cfg(feature = "milk")]
pub mod milk;

#[derive(thiserror::Error, Debug)]
pub enum DmError {
    #[error("DM configuration failed")]
    Configuration(#[from] calibration::ConfigurationError),
    #[error("DM failure")]
    Device(#[from] device::DeviceError),
    #[error("shared memory image {name} is {found:?}, expected {expected:?}")]
    ChannelShape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("shared memory image failure")]
    Channel(#[from] channel::ChannelError),
    #[error("failed to install the interrupt handler")]
    Interrupt(#[from] std::io::Error),
    #[error("no new data produced by {0}")]
    NoData(String),
}
pub type Result<T> = std::result::Result<T, DmError>;

impl DmError {
    /// Logs the error and its sources
    pub fn report(&self) {
        print_info("ALPAO DM control loop failed", Some(self));
    }
}

pub mod prelude {
    pub use crate::{
        calibration::{Calibration, CalibrationRoot},
        channel::Channel,
        control::{ControlLoop, ControlLoopBuilder, State},
        device::{Device, DeviceSession},
        mapping::ActuatorMapping,
        pipeline::Conventions,
        shutdown::{CtrlC, Interrupt, ShutdownFlag},
        DmError,
    };
}
