//! ALPAO DM COMMAND LOOP
//!
//! Connects to the ALPAO DM with the given serial number, attaches to the milk shared memory image
//! (it is created if it doesn't exist yet) and commands the DM each time a new command is posted to the image.
//! `Ctrl-C` resets and releases the DM.
//!
//! ```shell
//! ALPAO_CALIB=/opt/alpao/calib RUST_LOG=info cargo run -r --features asdk,milk --bin run-alpao -- BAX150 dm97disp
//! ```

use std::{path::PathBuf, time::Duration};

use alpao_dm::{asdk::Asdk, milk::Milk, prelude::*};
use clap::Parser;
use tokio::runtime::Handle;

#[derive(Parser, Debug)]
#[command(about = "Enters the ALPAO DM command loop and waits for commands posted to a milk shared memory image")]
pub struct Cli {
    /// DM serial number
    serial: String,
    /// shared memory image name
    shm_name: String,
    /// disables the removal of the mean of the actuator commands
    #[arg(long)]
    nobias: bool,
    /// disables the volume normalization of the actuator commands
    #[arg(long)]
    nonorm: bool,
    /// actuator commands are already fractional strokes
    #[arg(long)]
    fractional: bool,
    /// DM calibration root directory
    #[arg(long, env = "ALPAO_CALIB")]
    calib_root: Option<PathBuf>,
    /// period in milliseconds of the interrupt checks while waiting for commands
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
}
impl Cli {
    fn conventions(&self) -> Conventions {
        let mut conventions = Conventions::default();
        if self.nobias {
            conventions = conventions.nobias();
        }
        if self.nonorm {
            conventions = conventions.nonorm();
        }
        if self.fractional {
            conventions = conventions.fractional();
        }
        conventions
    }
}

fn control_loop(args: Cli, handle: Handle) -> alpao_dm::Result<()> {
    let conventions = args.conventions();
    log::info!(
        "ALPAO {}: nobias={} nonorm={} fractional={}",
        args.serial,
        args.nobias,
        args.nonorm,
        args.fractional
    );
    let mut builder = ControlLoopBuilder::new(&args.serial, &args.shm_name)
        .conventions(conventions)
        .poll_interval(Duration::from_millis(args.poll_ms));
    if let Some(root) = args.calib_root {
        builder = builder.calibration_root(CalibrationRoot::new(root));
    }
    builder
        .build(Asdk::init, Milk::open)?
        .run(&mut CtrlC::new(handle))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let handle = Handle::current();
    let result = tokio::task::spawn_blocking(move || control_loop(args, handle)).await?;
    Asdk::print_last_error();
    if let Err(e) = &result {
        e.report();
    }
    Ok(result?)
}
