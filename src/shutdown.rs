//! # Control loop shutdown
//!
//! The control loop is stopped by raising a [ShutdownFlag].
//! The flag is raised asynchronously by an [Interrupt] handler and
//! checked by the control loop each time the wait on the shared memory image returns.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::{
    runtime::Handle,
    signal::unix::{signal, SignalKind},
};

/// Shutdown request shared between an interrupt handler and the control loop
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);
impl ShutdownFlag {
    pub fn new() -> Self {
        Default::default()
    }
    /// Requests the control loop to stop
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }
    /// Checks if a shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Interrupt handler interface
pub trait Interrupt {
    /// Installs the handler that raises `flag` on interrupt
    fn arm(&mut self, flag: ShutdownFlag) -> std::io::Result<()>;
}

/// No interrupt handler, the loop only stops if the flag is raised by another owner
impl Interrupt for () {
    fn arm(&mut self, _flag: ShutdownFlag) -> std::io::Result<()> {
        Ok(())
    }
}

/// Exit status of the process aborted by a second `SIGINT`
pub const ABORT_STATUS: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnSigint {
    Shutdown,
    Abort,
}
impl OnSigint {
    /// Reaction to the `n`th signal, counting from 1
    fn nth(n: usize) -> Self {
        if n <= 1 {
            OnSigint::Shutdown
        } else {
            OnSigint::Abort
        }
    }
}

/// `SIGINT` handler running on a tokio runtime
///
/// The first signal raises the shutdown flag.
/// A second signal exits the process with status [ABORT_STATUS] without releasing the DM,
/// for a loop stuck in a DM call.
#[derive(Debug, Clone)]
pub struct CtrlC {
    handle: Handle,
}
impl CtrlC {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}
impl Interrupt for CtrlC {
    fn arm(&mut self, flag: ShutdownFlag) -> std::io::Result<()> {
        // the signal is registered before returning, not when the task is first polled
        let mut sigint = {
            let _guard = self.handle.enter();
            signal(SignalKind::interrupt())?
        };
        self.handle.spawn(async move {
            let mut n = 0;
            while sigint.recv().await.is_some() {
                n += 1;
                match OnSigint::nth(n) {
                    OnSigint::Shutdown => {
                        log::info!("exiting the ALPAO control loop");
                        flag.request();
                    }
                    OnSigint::Abort => {
                        log::warn!("interrupted again, aborting without releasing the DM");
                        std::process::exit(ABORT_STATUS);
                    }
                }
            }
        });
        Ok(())
    }
}
