/*!
# DM control loop

The control loop owns the DM and the shared memory image and goes through the following states:

`Initializing → WaitingForFrame → Dispatching → (WaitingForFrame | ShuttingDown) → Terminated`

 * Initializing: [ControlLoopBuilder::build] loads the calibration, initializes the DM,
 loads the actuator mapping, opens the shared memory image and checks its shape against the mapping,
 * WaitingForFrame: blocks until a new command is posted to the shared memory image,
 * Dispatching: sends the new command to the DM unless a shutdown has been requested,
 * ShuttingDown: resets and releases the DM,
 * Terminated: the loop has returned.

[ControlLoop::run] sends an all-zero command to the DM before arming the interrupt handler and entering the loop.
The wait on the shared memory image times out periodically to check the [ShutdownFlag]
so the loop stops even if no new command is ever posted.

# Example

```no_run
use alpao_dm::prelude::*;
use alpao_dm::sim::{MemoryChannel, SimDevice};
use std::time::Duration;

let (device, _calls) = SimDevice::new(97);
let (channel, writer) = MemoryChannel::new("dm97disp", [11, 11]);
let control = ControlLoopBuilder::new("BAX150", "dm97disp")
    .calibration_root(CalibrationRoot::new("/opt/alpao/calib"))
    .conventions(Conventions::default().nobias())
    .poll_interval(Duration::from_millis(50))
    .build(|_| Ok(device), |_, _| Ok(channel))?;
writer.write(vec![0.; 121])?;
// the loop stops once the writer is dropped
drop(writer);
control.run(&mut ())?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use std::{fmt::Display, time::Duration};

use interface::Data;

use crate::{
    calibration::{Calibration, CalibrationRoot},
    channel::{Channel, ChannelError, Wait},
    device::{Device, DeviceError, DeviceSession},
    dispatch::Dispatcher,
    mapping::ActuatorMapping,
    pipeline::Conventions,
    shutdown::{Interrupt, ShutdownFlag},
    DmError, Result,
};

/// Default period of the shutdown checks while waiting for a command
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Control loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initializing,
    WaitingForFrame,
    Dispatching,
    ShuttingDown,
    Terminated,
}
impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Initializing => write!(f, "initializing"),
            State::WaitingForFrame => write!(f, "waiting on commands"),
            State::Dispatching => write!(f, "dispatching"),
            State::ShuttingDown => write!(f, "shutting down"),
            State::Terminated => write!(f, "terminated"),
        }
    }
}

/// [ControlLoop] builder
#[derive(Debug, Clone)]
pub struct ControlLoopBuilder {
    serial: String,
    shm_name: String,
    calibration_root: Option<CalibrationRoot>,
    conventions: Conventions,
    poll_interval: Duration,
}
impl ControlLoopBuilder {
    /// Creates a [ControlLoop] builder for the DM `serial` and the shared memory image `shm_name`
    pub fn new<S: Into<String>, N: Into<String>>(serial: S, shm_name: N) -> Self {
        Self {
            serial: serial.into(),
            shm_name: shm_name.into(),
            calibration_root: None,
            conventions: Default::default(),
            poll_interval: POLL_INTERVAL,
        }
    }
    /// Sets the calibration root directory, otherwise given by the `ALPAO_CALIB` environment variable
    pub fn calibration_root(mut self, root: CalibrationRoot) -> Self {
        self.calibration_root = Some(root);
        self
    }
    /// Sets the normalization pipeline switches
    pub fn conventions(mut self, conventions: Conventions) -> Self {
        self.conventions = conventions;
        self
    }
    /// Sets the period of the shutdown checks
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
    /// Initializes the DM and the shared memory image
    ///
    /// `init_device` initializes the DM given its serial number and
    /// `open_channel` creates or attaches the shared memory image given its name and `[width, height]`
    pub fn build<D, C, FD, FC>(self, init_device: FD, open_channel: FC) -> Result<ControlLoop<D, C>>
    where
        D: Device,
        C: Channel,
        FD: FnOnce(&str) -> std::result::Result<D, DeviceError>,
        FC: FnOnce(&str, [usize; 2]) -> std::result::Result<C, ChannelError>,
    {
        let Self {
            serial,
            shm_name,
            calibration_root,
            conventions,
            poll_interval,
        } = self;
        log::debug!("ALPAO {serial}: {}", State::Initializing);

        let root = match calibration_root {
            Some(root) => root,
            None => CalibrationRoot::from_env()?,
        };
        let calibration = Calibration::load(&root, &serial)?;
        log::info!("ALPAO {serial}: {calibration}");

        let mut device = DeviceSession::new(serial.as_str(), init_device(&serial)?);
        let n_actuator = device.actuator_count()?;
        log::info!("ALPAO {serial}: {n_actuator} actuators");

        let mapping = ActuatorMapping::load(&root, &serial, n_actuator)?;
        let expected = mapping.shape();
        let channel = open_channel(&shm_name, expected)?;
        let found = channel.shape();
        if found != expected {
            return Err(DmError::ChannelShape {
                name: shm_name,
                expected: expected.to_vec(),
                found,
            });
        }
        log::info!(
            "ALPAO {serial}: commands from shared memory image {shm_name} {}x{}",
            expected[0],
            expected[1]
        );

        Ok(ControlLoop {
            device,
            channel,
            dispatcher: Dispatcher::new(mapping, calibration, conventions),
            poll_interval,
            shutdown: ShutdownFlag::new(),
        })
    }
}

/// DM control loop
#[derive(Debug)]
pub struct ControlLoop<D: Device, C: Channel> {
    device: DeviceSession<D>,
    channel: C,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    shutdown: ShutdownFlag,
}
impl<D: Device, C: Channel> ControlLoop<D, C> {
    /// Returns the flag that stops the loop
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }
    /// Number of DM actuators
    pub fn n_actuator(&self) -> usize {
        self.dispatcher.n_actuator()
    }
    /// Runs the control loop until a shutdown is requested
    ///
    /// `interrupt` is armed once the DM has been set to all 0s
    pub fn run<I: Interrupt>(self, interrupt: &mut I) -> Result<()> {
        let Self {
            mut device,
            mut channel,
            mut dispatcher,
            poll_interval,
            shutdown,
        } = self;
        let serial = device.serial().to_string();

        log::info!("ALPAO {serial}: initializing all actuators to 0");
        let baseline = Data::new(vec![0.; dispatcher.grid_len()]);
        dispatcher.dispatch(&mut device, baseline)?;
        interrupt.arm(shutdown.clone()).map_err(DmError::Interrupt)?;

        let mut state = State::WaitingForFrame;
        log::info!("ALPAO {serial}: {state}");
        while state != State::ShuttingDown {
            state = match state {
                State::WaitingForFrame => match channel.wait(poll_interval)? {
                    Wait::NewFrame => State::Dispatching,
                    Wait::TimedOut if shutdown.is_requested() => State::ShuttingDown,
                    Wait::TimedOut => State::WaitingForFrame,
                    Wait::Closed => {
                        log::info!("ALPAO {serial}: {} has been closed", channel.name());
                        State::ShuttingDown
                    }
                },
                State::Dispatching if shutdown.is_requested() => State::ShuttingDown,
                State::Dispatching => match dispatcher.dispatch_frame(&mut device, &mut channel) {
                    Ok(_) => State::WaitingForFrame,
                    Err(DmError::Channel(ChannelError::Busy(name))) => {
                        log::warn!("ALPAO {serial}: {name} was being written, command skipped");
                        State::WaitingForFrame
                    }
                    Err(e) => return Err(e),
                },
                _ => State::ShuttingDown,
            };
            log::debug!("ALPAO {serial}: {state}");
        }

        log::info!("ALPAO {serial}: {state}");
        device.shutdown()?;
        log::debug!("ALPAO {serial}: {}", State::Terminated);
        Ok(())
    }
}
