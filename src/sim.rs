/*!
# In-memory DM and shared memory image

[SimDevice] and [MemoryChannel] stand in for the DM vendor SDK and the shared memory image.
[SimDevice] forwards every call it receives to a [flume] channel
and [MemoryChannel] receives the commands written with its [MemoryWriter].

# Example

```
use alpao_dm::device::Device;
use alpao_dm::sim::{DeviceCall, SimDevice};

let (mut device, calls) = SimDevice::new(3);
device.send(&[0.; 3])?;
device.release()?;
assert_eq!(
    calls.drain().collect::<Vec<_>>(),
    vec![DeviceCall::Send(vec![0.; 3]), DeviceCall::Release]
);
# Ok::<(), alpao_dm::device::DeviceError>(())
```
*/

use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};

use crate::{
    channel::{Channel, ChannelError, Wait},
    device::{Device, DeviceError},
};

/// Calls received by a [SimDevice]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Send(Vec<f64>),
    Reset,
    Release,
}

/// In-memory DM
#[derive(Debug)]
pub struct SimDevice {
    n_actuator: usize,
    calls: Sender<DeviceCall>,
    fail_send_after: Option<usize>,
    n_send: usize,
}
impl SimDevice {
    /// Creates a DM with `n_actuator` actuators and the receiver of the DM calls
    pub fn new(n_actuator: usize) -> (Self, Receiver<DeviceCall>) {
        let (calls, rx) = flume::unbounded();
        (
            Self {
                n_actuator,
                calls,
                fail_send_after: None,
                n_send: 0,
            },
            rx,
        )
    }
    /// Fails all the sends after the first `n` ones
    pub fn fail_send_after(mut self, n: usize) -> Self {
        self.fail_send_after = Some(n);
        self
    }
    fn record(&self, call: DeviceCall) {
        // the receiver may have been dropped by the owner
        let _ = self.calls.send(call);
    }
}
impl Device for SimDevice {
    fn actuator_count(&mut self) -> Result<usize, DeviceError> {
        Ok(self.n_actuator)
    }
    fn send(&mut self, inputs: &[f64]) -> Result<(), DeviceError> {
        if inputs.len() != self.n_actuator {
            return Err(DeviceError::InputsSize {
                expected: self.n_actuator,
                found: inputs.len(),
            });
        }
        if self.fail_send_after.is_some_and(|n| self.n_send >= n) {
            return Err(DeviceError::Send);
        }
        self.n_send += 1;
        self.record(DeviceCall::Send(inputs.to_vec()));
        Ok(())
    }
    fn reset(&mut self) -> Result<(), DeviceError> {
        self.record(DeviceCall::Reset);
        Ok(())
    }
    fn release(self) -> Result<(), DeviceError> {
        self.record(DeviceCall::Release);
        Ok(())
    }
}

/// Command posted to a [MemoryChannel]
#[derive(Debug)]
struct Posted {
    frame: Vec<f64>,
    complete: bool,
}

/// In-memory shared memory image
#[derive(Debug)]
pub struct MemoryChannel {
    name: String,
    shape: Vec<usize>,
    frames: Receiver<Posted>,
    frame: Vec<f64>,
    complete: bool,
    counter: u64,
}
impl MemoryChannel {
    /// Creates a zero filled `[width, height]` image and its writer
    pub fn new<S: Into<String>>(name: S, shape: [usize; 2]) -> (Self, MemoryWriter) {
        Self::with_shape(name, shape.to_vec())
    }
    /// Creates a zero filled image of any shape and its writer
    pub fn with_shape<S: Into<String>>(name: S, shape: Vec<usize>) -> (Self, MemoryWriter) {
        let name = name.into();
        let len = shape.iter().product();
        let (tx, frames) = flume::unbounded();
        (
            Self {
                name: name.clone(),
                shape,
                frames,
                frame: vec![0.; len],
                complete: true,
                counter: 0,
            },
            MemoryWriter {
                name,
                len,
                frames: tx,
            },
        )
    }
}
impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }
    fn shape(&self) -> Vec<usize> {
        self.shape.clone()
    }
    fn wait(&mut self, timeout: Duration) -> Result<Wait, ChannelError> {
        match self.frames.recv_timeout(timeout) {
            Ok(Posted { frame, complete }) => {
                self.frame = frame;
                self.complete = complete;
                self.counter += 1;
                Ok(Wait::NewFrame)
            }
            Err(RecvTimeoutError::Timeout) => Ok(Wait::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Ok(Wait::Closed),
        }
    }
    fn frame(&mut self) -> Result<Vec<f64>, ChannelError> {
        if self.complete {
            Ok(self.frame.clone())
        } else {
            Err(ChannelError::Busy(self.name.clone()))
        }
    }
    fn counter(&self) -> u64 {
        self.counter
    }
}

/// [MemoryChannel] writer
///
/// The channel is closed once the writer is dropped
#[derive(Debug, Clone)]
pub struct MemoryWriter {
    name: String,
    len: usize,
    frames: Sender<Posted>,
}
impl MemoryWriter {
    /// Writes a new command into the image
    pub fn write(&self, frame: Vec<f64>) -> Result<(), ChannelError> {
        self.post(frame, true)
    }
    /// Posts a command the reader will find still being written
    pub fn write_partial(&self, frame: Vec<f64>) -> Result<(), ChannelError> {
        self.post(frame, false)
    }
    fn post(&self, frame: Vec<f64>, complete: bool) -> Result<(), ChannelError> {
        if frame.len() != self.len {
            return Err(ChannelError::FrameSize {
                expected: self.len,
                found: frame.len(),
            });
        }
        self.frames
            .send(Posted { frame, complete })
            .map_err(|_| ChannelError::Closed(self.name.clone()))
    }
}

/// Circular mask of `n x n` pixels with the active pixels within a radius of `n/2`
///
/// An 11x11 mask has 97 active pixels
pub fn circular_mask(n: usize) -> Vec<f64> {
    let c = (n as f64 - 1.) / 2.;
    let r2 = (n as f64 / 2.).powi(2);
    (0..n)
        .flat_map(|i| {
            (0..n).map(move |j| {
                let (x, y) = (j as f64 - c, i as f64 - c);
                if x * x + y * y < r2 {
                    1.
                } else {
                    0.
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_send() {
        let (mut device, calls) = SimDevice::new(2);
        let mut device = {
            device.send(&[0., 0.]).unwrap();
            device.fail_send_after(1)
        };
        assert!(matches!(device.send(&[1., 1.]), Err(DeviceError::Send)));
        assert!(matches!(
            device.send(&[1.]),
            Err(DeviceError::InputsSize {
                expected: 2,
                found: 1
            })
        ));
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn memory_channel() {
        let (mut channel, writer) = MemoryChannel::new("dm", [2, 3]);
        assert_eq!(channel.shape(), vec![2, 3]);
        assert_eq!(channel.frame().unwrap(), vec![0.; 6]);
        assert_eq!(
            channel.wait(Duration::from_millis(1)).unwrap(),
            Wait::TimedOut
        );
        writer.write(vec![1.; 6]).unwrap();
        assert!(writer.write(vec![1.; 5]).is_err());
        assert_eq!(
            channel.wait(Duration::from_millis(1)).unwrap(),
            Wait::NewFrame
        );
        assert_eq!(channel.counter(), 1);
        assert_eq!(channel.frame().unwrap(), vec![1.; 6]);
        writer.write_partial(vec![2.; 6]).unwrap();
        assert_eq!(
            channel.wait(Duration::from_millis(1)).unwrap(),
            Wait::NewFrame
        );
        assert!(matches!(channel.frame(), Err(ChannelError::Busy(_))));
        drop(writer);
        assert_eq!(channel.wait(Duration::from_millis(1)).unwrap(), Wait::Closed);
    }

    #[test]
    fn circular_mask_97() {
        let n = circular_mask(11).into_iter().filter(|&x| x > 0.).count();
        assert_eq!(n, 97);
    }
}
