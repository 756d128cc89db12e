//! # milk shared memory image
//!
//! Binds the ImageStreamIO library of [milk](https://github.com/milk-org/milk)
//! through the C shim `csrc/milk_shim.c`.
//! The milk install directory is given by the environment variable `MILK_ROOT` (default: `$HOME/milk`).

use std::{
    ffi::{c_char, c_int, c_long, CString},
    ptr::NonNull,
    time::Duration,
};

use crate::channel::{Channel, ChannelError, Wait};

type Result<T> = std::result::Result<T, ChannelError>;

#[repr(C)]
struct Image {
    _private: [u8; 0],
}

extern "C" {
    fn milk_open(name: *const c_char, width: u32, height: u32, created: *mut c_int) -> *mut Image;
    fn milk_wait(image: *mut Image, timeout_ns: c_long) -> c_int;
    fn milk_naxis(image: *const Image) -> u8;
    fn milk_size(image: *const Image, axis: c_int) -> u32;
    fn milk_is_double(image: *const Image) -> c_int;
    fn milk_cnt0(image: *const Image) -> u64;
    fn milk_data(image: *const Image) -> *const f64;
    fn milk_read(image: *const Image, dst: *mut f64, len: u64) -> c_int;
    fn milk_close(image: *mut Image);
}

/// milk shared memory image
#[derive(Debug)]
pub struct Milk {
    name: String,
    image: NonNull<Image>,
}
// the image is only read by its owner
unsafe impl Send for Milk {}

impl Milk {
    /// Attaches to the shared memory image `name`
    ///
    /// If the image does not exist, a zero filled `[width, height]` image is created
    pub fn open(name: &str, [width, height]: [usize; 2]) -> Result<Self> {
        let c_name = CString::new(name).map_err(|_| ChannelError::Open(name.into()))?;
        let (width, height) = u32::try_from(width)
            .and_then(|w| u32::try_from(height).map(|h| (w, h)))
            .map_err(|_| ChannelError::Open(name.into()))?;
        let mut created: c_int = 0;
        let image = unsafe { milk_open(c_name.as_ptr(), width, height, &mut created) };
        let image = NonNull::new(image).ok_or_else(|| ChannelError::Open(name.into()))?;
        let milk = Self {
            name: name.into(),
            image,
        };
        if unsafe { milk_is_double(milk.image.as_ptr()) } == 0 {
            return Err(ChannelError::Datatype(name.into()));
        }
        if created == 1 {
            log::info!("created shared memory image {name} ({width}x{height})");
        } else {
            log::info!("attached to shared memory image {name}");
        }
        Ok(milk)
    }
}

impl Channel for Milk {
    fn name(&self) -> &str {
        &self.name
    }
    fn shape(&self) -> Vec<usize> {
        let naxis = unsafe { milk_naxis(self.image.as_ptr()) };
        (0..naxis as c_int)
            .map(|axis| unsafe { milk_size(self.image.as_ptr(), axis) } as usize)
            .collect()
    }
    fn wait(&mut self, timeout: Duration) -> Result<Wait> {
        let timeout_ns = c_long::try_from(timeout.as_nanos()).unwrap_or(c_long::MAX);
        match unsafe { milk_wait(self.image.as_ptr(), timeout_ns) } {
            0 => Ok(Wait::NewFrame),
            1 => Ok(Wait::TimedOut),
            _ => Err(ChannelError::Wait(self.name.clone())),
        }
    }
    fn frame(&mut self) -> Result<Vec<f64>> {
        let len: usize = self.shape().iter().product();
        if unsafe { milk_data(self.image.as_ptr()) }.is_null() {
            return Err(ChannelError::Closed(self.name.clone()));
        }
        let mut frame = vec![0f64; len];
        match unsafe { milk_read(self.image.as_ptr(), frame.as_mut_ptr(), len as u64) } {
            0 => Ok(frame),
            _ => Err(ChannelError::Busy(self.name.clone())),
        }
    }
    fn counter(&self) -> u64 {
        unsafe { milk_cnt0(self.image.as_ptr()) }
    }
}

impl Drop for Milk {
    fn drop(&mut self) {
        unsafe { milk_close(self.image.as_ptr()) }
    }
}
