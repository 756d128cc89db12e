/*!
# Actuator mapping

The DM command is written in shared memory as a 2D grid of `width x height` samples,
but the DM expects the actuators in its own 1D ordering.

The actuator mapping file is a 2D FITS image of the same size than the command grid
where the active actuators are the pixels with a strictly positive value.
The grid is scanned from the last row to the first one and, within a row, from left to right:
the `i`th active pixel found is the `i`th actuator of the DM and
the mapping records its index `row * width + column` into the flattened grid.
*/

use std::sync::Arc;

use interface::{Data, Read, Size, Update, Write};

use crate::{
    calibration::{CalibrationRoot, ConfigurationError},
    fits::Image,
    io::{ActuatorCommand, DmCommand},
};

type Result<T> = std::result::Result<T, ConfigurationError>;

/// Permutation from the DM actuators to the command grid
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorMapping {
    indices: Vec<usize>,
    width: usize,
    height: usize,
}
impl ActuatorMapping {
    /// Builds the mapping from a row major `width x height` mask
    ///
    /// Returns `None` if the mask size is not `width x height`
    pub fn from_mask(mask: &[f64], width: usize, height: usize) -> Option<Self> {
        if width.checked_mul(height) != Some(mask.len()) {
            return None;
        }
        let indices = (0..height)
            .rev()
            .flat_map(|row| {
                (0..width)
                    .map(move |column| row * width + column)
                    .filter(|&idx| mask[idx] > 0.)
            })
            .collect();
        Some(Self {
            indices,
            width,
            height,
        })
    }
    /// Builds the mapping from a 2D image
    pub fn from_image(image: &Image) -> Result<Self> {
        match *image.shape() {
            [width, height] => Self::from_mask(image.data(), width, height)
                .ok_or(ConfigurationError::NotTwoD(image.shape().len())),
            _ => Err(ConfigurationError::NotTwoD(image.shape().len())),
        }
    }
    /// Loads the actuator mapping of the DM with serial number `serial`
    ///
    /// The number of active actuators in the mapping must be `n_actuator`
    pub fn load(root: &CalibrationRoot, serial: &str, n_actuator: usize) -> Result<Self> {
        let path = root.actuator_mapping(serial);
        log::info!("loading {serial} actuator mapping from {path:?}");
        let image = Image::open(&path).map_err(|source| ConfigurationError::Fits {
            path: path.clone(),
            source,
        })?;
        let mapping = Self::from_image(&image)?;
        if mapping.len() != n_actuator {
            return Err(ConfigurationError::ActuatorCount {
                expected: n_actuator,
                found: mapping.len(),
            });
        }
        Ok(mapping)
    }
    /// Number of actuators
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
    /// Command grid indices in the DM actuator ordering
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
    /// Command grid size `[width, height]`
    pub fn shape(&self) -> [usize; 2] {
        [self.width, self.height]
    }
    /// Number of samples in the command grid
    pub fn grid_len(&self) -> usize {
        self.width * self.height
    }
    /// Picks the actuators commands out of the command grid
    ///
    /// `grid` must be at least [grid_len](Self::grid_len) long
    pub fn gather(&self, grid: &[f64]) -> Vec<f64> {
        self.indices.iter().map(|&idx| grid[idx]).collect()
    }
}

/// Command grid to actuators client
#[derive(Debug)]
pub struct Remap {
    mapping: ActuatorMapping,
    grid: Arc<Vec<f64>>,
    command: Vec<f64>,
}
impl Remap {
    pub fn new(mapping: ActuatorMapping) -> Self {
        Self {
            grid: Arc::new(vec![0.; mapping.grid_len()]),
            command: vec![0.; mapping.len()],
            mapping,
        }
    }
    pub fn mapping(&self) -> &ActuatorMapping {
        &self.mapping
    }
}
impl Update for Remap {
    fn update(&mut self) {
        self.command = self.mapping.gather(&self.grid);
    }
}
impl Read<DmCommand> for Remap {
    fn read(&mut self, data: Data<DmCommand>) {
        self.grid = data.into_arc();
    }
}
impl Write<ActuatorCommand> for Remap {
    fn write(&mut self) -> Option<Data<ActuatorCommand>> {
        Some(std::mem::take(&mut self.command).into())
    }
}
impl Size<DmCommand> for Remap {
    fn len(&self) -> usize {
        self.mapping.grid_len()
    }
}
impl Size<ActuatorCommand> for Remap {
    fn len(&self) -> usize {
        self.mapping.len()
    }
}
