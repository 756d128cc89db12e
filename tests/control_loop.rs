//! DM control loop tests
//!
//! The DM and the shared memory image are replaced by their in-memory counterparts
//! and the calibration files are written in a temporary directory.

use std::{
    env, fs,
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use alpao_dm::{
    calibration::ConfigurationError,
    channel::ChannelError,
    device::{DeviceError, DeviceSession},
    fits::{Bitpix, Image},
    prelude::*,
    sim::{circular_mask, DeviceCall, MemoryChannel, SimDevice},
};

const SERIAL: &str = "BAX150";
const POLL: Duration = Duration::from_millis(10);

/// Calibration root directory with the user configuration and an 11x11 actuator mapping
struct CalibDir(PathBuf);
impl CalibDir {
    fn new(name: &str, userconfig: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let root = env::temp_dir().join(format!("alpao-dm-{}-{name}", std::process::id()));
        let root = CalibDir(root);
        let device_dir = root.root().device_dir(SERIAL);
        fs::create_dir_all(&device_dir).unwrap();
        fs::write(root.root().userconfig(SERIAL), userconfig).unwrap();
        Image::new(vec![11, 11], circular_mask(11))
            .unwrap()
            .save(root.root().actuator_mapping(SERIAL), Bitpix::I16)
            .unwrap();
        root
    }
    fn root(&self) -> CalibrationRoot {
        CalibrationRoot::new(&self.0)
    }
    fn builder(&self) -> ControlLoopBuilder {
        ControlLoopBuilder::new(SERIAL, "dm97disp")
            .calibration_root(self.root())
            .poll_interval(POLL)
    }
}
impl Drop for CalibDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

const USERCONFIG: &str = "3.17 max stroke [micron]\n0.454 volume factor\n";

/// Raises the flag after a delay
struct DelayedInterrupt(Duration);
impl Interrupt for DelayedInterrupt {
    fn arm(&mut self, flag: ShutdownFlag) -> std::io::Result<()> {
        let delay = self.0;
        thread::spawn(move || {
            thread::sleep(delay);
            flag.request();
        });
        Ok(())
    }
}

fn no_device(_: &str) -> Result<SimDevice, DeviceError> {
    unreachable!("the DM must not be initialized")
}

#[test]
fn single_actuator_poke() {
    let calib = CalibDir::new("poke", USERCONFIG);
    let (device, calls) = SimDevice::new(97);
    let (channel, writer) = MemoryChannel::new("dm97disp", [11, 11]);
    let control = calib
        .builder()
        .build(|_| Ok(device), |_, _| Ok(channel))
        .unwrap();
    assert_eq!(control.n_actuator(), 97);

    let first_actuator = ActuatorMapping::from_mask(&circular_mask(11), 11, 11)
        .unwrap()
        .indices()[0];
    let mut grid = vec![0f64; 121];
    grid[first_actuator] = 3.17;
    writer.write(grid).unwrap();
    drop(writer);
    control.run(&mut ()).unwrap();

    let calls: Vec<_> = calls.drain().collect();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0], DeviceCall::Send(vec![0.; 97]));
    let DeviceCall::Send(inputs) = &calls[1] else {
        panic!("expected a command, found {:?}", calls[1])
    };
    let bias = 0.454 / 97.;
    assert!((inputs[0] - (0.454 - bias)).abs() < 1e-12);
    assert!(inputs[1..].iter().all(|u| (u + bias).abs() < 1e-12));
    assert_eq!(&calls[2..], &[DeviceCall::Reset, DeviceCall::Release]);
}

#[test]
fn command_written_during_read_is_skipped() {
    let calib = CalibDir::new("busy", USERCONFIG);
    let (device, calls) = SimDevice::new(97);
    let (channel, writer) = MemoryChannel::new("dm97disp", [11, 11]);
    let control = calib
        .builder()
        .conventions(Conventions::default().nobias().nonorm().fractional())
        .build(|_| Ok(device), |_, _| Ok(channel))
        .unwrap();

    writer.write_partial(vec![0.9; 121]).unwrap();
    writer.write(vec![-0.5; 121]).unwrap();
    drop(writer);
    control.run(&mut ()).unwrap();

    assert_eq!(
        calls.drain().collect::<Vec<_>>(),
        vec![
            DeviceCall::Send(vec![0.; 97]),
            DeviceCall::Send(vec![-0.5; 97]),
            DeviceCall::Reset,
            DeviceCall::Release
        ]
    );
}

#[test]
fn interrupted_while_waiting() {
    let calib = CalibDir::new("interrupted", USERCONFIG);
    let (device, calls) = SimDevice::new(97);
    let (channel, _writer) = MemoryChannel::new("dm97disp", [11, 11]);
    let control = calib
        .builder()
        .build(|_| Ok(device), |_, _| Ok(channel))
        .unwrap();

    let now = Instant::now();
    control
        .run(&mut DelayedInterrupt(Duration::from_millis(50)))
        .unwrap();
    assert!(now.elapsed() < Duration::from_secs(5));

    assert_eq!(
        calls.drain().collect::<Vec<_>>(),
        vec![
            DeviceCall::Send(vec![0.; 97]),
            DeviceCall::Reset,
            DeviceCall::Release
        ]
    );
}

#[test]
fn pending_command_skipped_on_shutdown() {
    let calib = CalibDir::new("pending", USERCONFIG);
    let (device, calls) = SimDevice::new(97);
    let (channel, writer) = MemoryChannel::new("dm97disp", [11, 11]);
    let control = calib
        .builder()
        .build(|_| Ok(device), |_, _| Ok(channel))
        .unwrap();

    writer.write(vec![1.; 121]).unwrap();
    control.shutdown_flag().request();
    control.run(&mut ()).unwrap();

    assert_eq!(
        calls.drain().collect::<Vec<_>>(),
        vec![
            DeviceCall::Send(vec![0.; 97]),
            DeviceCall::Reset,
            DeviceCall::Release
        ]
    );
}

#[test]
fn missing_volume_factor() {
    let calib = CalibDir::new("one-line", "3.17 max stroke [micron]\n");
    let result = calib.builder().build(no_device, |_, _| {
        Ok(MemoryChannel::new("dm97disp", [11, 11]).0)
    });
    assert!(matches!(
        result,
        Err(DmError::Configuration(
            ConfigurationError::MissingConstants { found: 1, .. }
        ))
    ));
}

#[test]
fn missing_calibration_root() {
    let (device, calls) = SimDevice::new(97);
    let result = ControlLoopBuilder::new(SERIAL, "dm97disp")
        .calibration_root(CalibrationRoot::new(
            env::temp_dir().join("alpao-dm-does-not-exist"),
        ))
        .build(|_| Ok(device), |_, _| {
            Ok(MemoryChannel::new("dm97disp", [11, 11]).0)
        });
    assert!(matches!(
        result,
        Err(DmError::Configuration(ConfigurationError::Open { .. }))
    ));
    assert!(calls.is_empty());
}

#[test]
fn actuator_count_mismatch() {
    let calib = CalibDir::new("count", USERCONFIG);
    let (device, calls) = SimDevice::new(96);
    let result = calib.builder().build(|_| Ok(device), |_, _| {
        Ok(MemoryChannel::new("dm97disp", [11, 11]).0)
    });
    assert!(matches!(
        result,
        Err(DmError::Configuration(ConfigurationError::ActuatorCount {
            expected: 96,
            found: 97
        }))
    ));
    assert_eq!(
        calls.drain().collect::<Vec<_>>(),
        vec![DeviceCall::Reset, DeviceCall::Release]
    );
}

#[test]
fn channel_shape_mismatch() {
    let calib = CalibDir::new("shape", USERCONFIG);
    let (device, calls) = SimDevice::new(97);
    let result = calib.builder().build(|_| Ok(device), |name, _| {
        Ok(MemoryChannel::with_shape(name, vec![97, 1]).0)
    });
    let Err(DmError::ChannelShape {
        expected, found, ..
    }) = result
    else {
        panic!("expected a channel shape error")
    };
    assert_eq!(expected, vec![11, 11]);
    assert_eq!(found, vec![97, 1]);
    assert_eq!(
        calls.drain().collect::<Vec<_>>(),
        vec![DeviceCall::Reset, DeviceCall::Release]
    );
}

#[test]
fn channel_open_failure() {
    let calib = CalibDir::new("open", USERCONFIG);
    let (device, calls) = SimDevice::new(97);
    let result = calib.builder().build(|_| Ok(device), |name, _| {
        Err::<MemoryChannel, _>(ChannelError::Open(name.into()))
    });
    assert!(matches!(
        result,
        Err(DmError::Channel(ChannelError::Open(_)))
    ));
    assert_eq!(
        calls.drain().collect::<Vec<_>>(),
        vec![DeviceCall::Reset, DeviceCall::Release]
    );
}

#[test]
fn send_failure_releases_the_dm() {
    let calib = CalibDir::new("send", USERCONFIG);
    let (device, calls) = SimDevice::new(97);
    let (channel, writer) = MemoryChannel::new("dm97disp", [11, 11]);
    let control = calib
        .builder()
        .build(|_| Ok(device.fail_send_after(1)), |_, _| Ok(channel))
        .unwrap();

    writer.write(vec![1.; 121]).unwrap();
    assert!(matches!(
        control.run(&mut ()),
        Err(DmError::Device(DeviceError::Send))
    ));
    assert_eq!(
        calls.drain().collect::<Vec<_>>(),
        vec![
            DeviceCall::Send(vec![0.; 97]),
            DeviceCall::Reset,
            DeviceCall::Release
        ]
    );
}

#[test]
fn explicit_release() {
    let (device, calls) = SimDevice::new(97);
    DeviceSession::new(SERIAL, device).shutdown().unwrap();
    assert_eq!(
        calls.drain().collect::<Vec<_>>(),
        vec![DeviceCall::Reset, DeviceCall::Release]
    );
}
