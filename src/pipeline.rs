/*!
# Normalization pipeline

Converts the actuators command, given as displacements in microns,
into the fractional stroke the DM expects, applying in order:
 0. non finite samples are set to 0,
 1. volume normalization: `u = volume_factor * u`,
 2. unit conversion: `u = u / max_stroke`,
 3. bias removal: `u = u - mean(u)`,
 4. clipping to `[-1,1]`.

The first 3 stages are optional, see [Conventions], but clipping is always applied last
so that no value outside `[-1,1]` is ever sent to the DM.
*/

use std::sync::Arc;

use interface::{Data, Read, Update, Write};

use crate::{
    calibration::Calibration,
    io::{ActuatorCommand, DmInputs},
};

/// Normalization pipeline switches
///
/// All the stages are enabled by default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conventions {
    /// Scales the command by the volume factor
    pub volume_normalization: bool,
    /// Converts the command from microns to fractional stroke
    pub unit_conversion: bool,
    /// Removes the mean of the command
    pub bias_removal: bool,
}
impl Default for Conventions {
    fn default() -> Self {
        Self {
            volume_normalization: true,
            unit_conversion: true,
            bias_removal: true,
        }
    }
}
impl Conventions {
    /// Disables bias removal
    pub fn nobias(self) -> Self {
        Self {
            bias_removal: false,
            ..self
        }
    }
    /// Disables volume normalization
    pub fn nonorm(self) -> Self {
        Self {
            volume_normalization: false,
            ..self
        }
    }
    /// Declares the command in fractional stroke already, disabling unit conversion
    pub fn fractional(self) -> Self {
        Self {
            unit_conversion: false,
            ..self
        }
    }
}

/// Scales each actuator command by the volume factor
pub fn normalize_volume(command: &mut [f64], volume_factor: f64) {
    command.iter_mut().for_each(|u| *u *= volume_factor);
}

/// Converts microns of stroke into fractional stroke
pub fn microns_to_fractional_stroke(command: &mut [f64], max_stroke: f64) {
    command.iter_mut().for_each(|u| *u /= max_stroke);
}

/// Removes the mean from the command
pub fn remove_bias(command: &mut [f64]) {
    if command.is_empty() {
        return;
    }
    let mean = command.iter().sum::<f64>() / command.len() as f64;
    command.iter_mut().for_each(|u| *u -= mean);
}

/// Sets the non finite samples of the command to 0
///
/// Returns the indices of the faulty actuators
pub fn zero_non_finite(command: &mut [f64]) -> Vec<usize> {
    command
        .iter_mut()
        .enumerate()
        .filter_map(|(idx, u)| {
            if u.is_finite() {
                None
            } else {
                log::warn!("actuator #{} command is {}, set to 0", idx + 1, u);
                *u = 0.;
                Some(idx)
            }
        })
        .collect()
}

/// Clips the command to `[-1,1]`
///
/// NaN samples are set to 0.
/// Returns the indices of the saturated actuators
pub fn clip(command: &mut [f64]) -> Vec<usize> {
    command
        .iter_mut()
        .enumerate()
        .filter_map(|(idx, u)| {
            if u.is_nan() {
                log::warn!("actuator #{} saturated (NaN)", idx + 1);
                *u = 0.;
                Some(idx)
            } else if u.abs() > 1. {
                log::warn!("actuator #{} saturated ({:+.3})", idx + 1, u);
                *u = u.signum();
                Some(idx)
            } else {
                None
            }
        })
        .collect()
}

/// Normalization pipeline client
///
/// Reads the [ActuatorCommand] and writes the [DmInputs]
#[derive(Debug)]
pub struct Normalization {
    calibration: Calibration,
    conventions: Conventions,
    u: Arc<Vec<f64>>,
    y: Vec<f64>,
    saturated: Vec<usize>,
}
impl Normalization {
    pub fn new(calibration: Calibration, conventions: Conventions) -> Self {
        Self {
            calibration,
            conventions,
            u: Default::default(),
            y: Default::default(),
            saturated: Default::default(),
        }
    }
    /// Applies the normalization pipeline to `command`
    ///
    /// Returns the indices of the saturated or non finite actuators
    pub fn normalize(&self, command: &mut [f64]) -> Vec<usize> {
        let Conventions {
            volume_normalization,
            unit_conversion,
            bias_removal,
        } = self.conventions;
        let mut faults = zero_non_finite(command);
        if volume_normalization {
            normalize_volume(command, self.calibration.volume_factor());
        }
        if unit_conversion {
            microns_to_fractional_stroke(command, self.calibration.max_stroke());
        }
        if bias_removal {
            remove_bias(command);
        }
        faults.extend(clip(command));
        faults.sort_unstable();
        faults.dedup();
        faults
    }
    /// Indices of the actuators saturated by the last update
    pub fn saturated(&self) -> &[usize] {
        &self.saturated
    }
    pub fn conventions(&self) -> Conventions {
        self.conventions
    }
}
impl Update for Normalization {
    fn update(&mut self) {
        let mut y = self.u.to_vec();
        self.saturated = self.normalize(&mut y);
        self.y = y;
    }
}
impl Read<ActuatorCommand> for Normalization {
    fn read(&mut self, data: Data<ActuatorCommand>) {
        self.u = data.into_arc();
    }
}
impl Write<DmInputs> for Normalization {
    fn write(&mut self) -> Option<Data<DmInputs>> {
        Some(std::mem::take(&mut self.y).into())
    }
}
