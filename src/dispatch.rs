//! # Command dispatcher
//!
//! Chains the [Remap] and [Normalization] clients to turn a command grid into
//! DM inputs and sends them to the DM.

use interface::{trim_type_name, Data, Read, Size, Update, Write};

use crate::{
    calibration::Calibration,
    channel::{Channel, ChannelError},
    device::{Device, DeviceSession},
    io::{ActuatorCommand, DmCommand, DmInputs},
    mapping::{ActuatorMapping, Remap},
    pipeline::{Conventions, Normalization},
    DmError, Result,
};

/// Grid command to DM dispatcher
#[derive(Debug)]
pub struct Dispatcher {
    remap: Remap,
    normalization: Normalization,
}
impl Dispatcher {
    pub fn new(mapping: ActuatorMapping, calibration: Calibration, conventions: Conventions) -> Self {
        Self {
            remap: Remap::new(mapping),
            normalization: Normalization::new(calibration, conventions),
        }
    }
    /// Number of DM actuators
    pub fn n_actuator(&self) -> usize {
        <Remap as Size<ActuatorCommand>>::len(&self.remap)
    }
    /// Number of samples in the command grid
    pub fn grid_len(&self) -> usize {
        <Remap as Size<DmCommand>>::len(&self.remap)
    }
    pub fn mapping(&self) -> &ActuatorMapping {
        self.remap.mapping()
    }
    /// Indices of the actuators saturated by the last command
    pub fn saturated(&self) -> &[usize] {
        self.normalization.saturated()
    }
    /// Converts the command grid into DM inputs
    pub fn inputs(&mut self, grid: Data<DmCommand>) -> Result<Data<DmInputs>> {
        if grid.len() != self.grid_len() {
            return Err(ChannelError::FrameSize {
                expected: self.grid_len(),
                found: grid.len(),
            }
            .into());
        }
        self.remap.read(grid);
        self.remap.update();
        let command: Data<ActuatorCommand> = self
            .remap
            .write()
            .ok_or_else(|| DmError::NoData(trim_type_name::<ActuatorCommand>()))?;
        self.normalization.read(command);
        self.normalization.update();
        self.normalization
            .write()
            .ok_or_else(|| DmError::NoData(trim_type_name::<DmInputs>()))
    }
    /// Converts the command grid into DM inputs and sends them to the DM
    pub fn dispatch<D: Device>(
        &mut self,
        device: &mut DeviceSession<D>,
        grid: Data<DmCommand>,
    ) -> Result<Data<DmInputs>> {
        let inputs = self.inputs(grid)?;
        device.send(&inputs)?;
        Ok(inputs)
    }
    /// Reads the latest command from the channel and sends it to the DM
    pub fn dispatch_frame<D: Device, C: Channel>(
        &mut self,
        device: &mut DeviceSession<D>,
        channel: &mut C,
    ) -> Result<Data<DmInputs>> {
        let grid = channel.frame()?;
        log::debug!(
            "ALPAO {}: dispatching {} command #{}",
            device.serial(),
            channel.name(),
            channel.counter()
        );
        self.dispatch(device, Data::new(grid))
    }
}
