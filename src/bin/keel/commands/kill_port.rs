//! `keel kill-port` command

use anyhow::{bail, Result};

use crate::cli::KillPortArgs;
use keel::util::port::{is_port_in_use, kill_process_on_port};
use keel::util::GlobalContext;

pub fn execute(args: KillPortArgs, ctx: &GlobalContext) -> Result<()> {
    let port = args.port.unwrap_or_else(|| ctx.config().validate.port());

    if !is_port_in_use(port) {
        println!("Port {} is already free", port);
        return Ok(());
    }

    if kill_process_on_port(port) {
        println!("Port {} freed", port);
        Ok(())
    } else {
        bail!("port {} is still in use", port)
    }
}
