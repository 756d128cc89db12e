//! Deformable mirror data identifiers

use interface::UniqueIdentifier;

/// DM command grid as written in the shared memory image (microns, row major)
pub enum DmCommand {}
impl UniqueIdentifier for DmCommand {
    type DataType = Vec<f64>;
}

/// DM command in the actuator ordering of the device
pub enum ActuatorCommand {}
impl UniqueIdentifier for ActuatorCommand {
    type DataType = Vec<f64>;
}

/// DM inputs in fractional stroke, within `[-1,1]`
pub enum DmInputs {}
impl UniqueIdentifier for DmInputs {
    type DataType = Vec<f64>;
}
