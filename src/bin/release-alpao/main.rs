//! ALPAO DM RELEASE
//!
//! Resets and releases the ALPAO DM with the given serial number,
//! e.g. after the command loop has been killed without a chance to release the DM.
//!
//! ```shell
//! cargo run -r --features asdk --bin release-alpao -- BAX150
//! ```

use alpao_dm::{
    asdk::Asdk,
    device::{DeviceError, DeviceSession},
};
use clap::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    /// DM serial number
    #[arg(default_value = "BAX150")]
    serial: String,
}

fn release(serial: &str) -> Result<(), DeviceError> {
    DeviceSession::new(serial, Asdk::init(serial)?).shutdown()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let result = release(&args.serial);
    Asdk::print_last_error();
    Ok(result?)
}
