//! # ALPAO SDK bindings
//!
//! Links to the ALPAO SDK library `libasdk`,
//! the library directory is given by the environment variable `ASDK_LIB_DIR`.

#![allow(non_camel_case_types)]

use std::{
    ffi::{c_char, c_double, c_int, CString},
    ptr::NonNull,
};

use crate::device::{Device, DeviceError};

type Result<T> = std::result::Result<T, DeviceError>;

#[repr(C)]
struct asdkDM {
    _private: [u8; 0],
}
type Scalar = c_double;
type COMPL_STAT = c_int;
const SUCCESS: COMPL_STAT = 0;

#[link(name = "asdk")]
extern "C" {
    fn asdkInit(serial_name: *const c_char) -> *mut asdkDM;
    fn asdkGet(dm: *mut asdkDM, command: *const c_char, value: *mut Scalar) -> COMPL_STAT;
    fn asdkSend(dm: *mut asdkDM, value: *const Scalar) -> COMPL_STAT;
    fn asdkReset(dm: *mut asdkDM) -> COMPL_STAT;
    fn asdkRelease(dm: *mut asdkDM) -> COMPL_STAT;
    fn asdkPrintLastError();
}

/// ALPAO DM
#[derive(Debug)]
pub struct Asdk {
    dm: NonNull<asdkDM>,
    n_actuator: Option<usize>,
}
// the DM handle is only used by its owner
unsafe impl Send for Asdk {}

impl Asdk {
    /// Initializes the DM with serial number `serial`
    pub fn init(serial: &str) -> Result<Self> {
        let c_serial = CString::new(serial).map_err(|_| DeviceError::Init(serial.into()))?;
        let dm = unsafe { asdkInit(c_serial.as_ptr()) };
        NonNull::new(dm)
            .map(|dm| Self {
                dm,
                n_actuator: None,
            })
            .ok_or_else(|| DeviceError::Init(serial.into()))
    }
    /// Prints the last error reported by the SDK
    pub fn print_last_error() {
        unsafe { asdkPrintLastError() }
    }
    fn get(&mut self, parameter: &str) -> Result<f64> {
        let command = CString::new(parameter).map_err(|_| DeviceError::Query(parameter.into()))?;
        let mut value: Scalar = 0.;
        match unsafe { asdkGet(self.dm.as_ptr(), command.as_ptr(), &mut value) } {
            SUCCESS => Ok(value),
            _ => Err(DeviceError::Query(parameter.into())),
        }
    }
}

impl Device for Asdk {
    fn actuator_count(&mut self) -> Result<usize> {
        let value = self.get("NbOfActuator")?;
        if !value.is_finite() || value < 1. || value.fract() != 0. {
            return Err(DeviceError::ActuatorCount(value));
        }
        let n_actuator = value as usize;
        self.n_actuator = Some(n_actuator);
        Ok(n_actuator)
    }
    fn send(&mut self, inputs: &[f64]) -> Result<()> {
        let n_actuator = match self.n_actuator {
            Some(n_actuator) => n_actuator,
            None => self.actuator_count()?,
        };
        // the SDK reads exactly as many values as there are actuators
        if inputs.len() != n_actuator {
            return Err(DeviceError::InputsSize {
                expected: n_actuator,
                found: inputs.len(),
            });
        }
        match unsafe { asdkSend(self.dm.as_ptr(), inputs.as_ptr()) } {
            SUCCESS => Ok(()),
            _ => Err(DeviceError::Send),
        }
    }
    fn reset(&mut self) -> Result<()> {
        match unsafe { asdkReset(self.dm.as_ptr()) } {
            SUCCESS => Ok(()),
            _ => Err(DeviceError::Reset),
        }
    }
    fn release(self) -> Result<()> {
        match unsafe { asdkRelease(self.dm.as_ptr()) } {
            SUCCESS => Ok(()),
            _ => Err(DeviceError::Release),
        }
    }
}
