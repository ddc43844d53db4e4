use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use libcompute::{ComputeInterface, RestartMode};
use log::info;

use super::{run_verb, GlobalOpts};

#[derive(Parser, Debug)]
pub struct Restart {
    /// Compute Config
    #[arg(short, long, required = true)]
    pub file: PathBuf,

    /// graceful, warm or cold
    #[arg(short, long, default_value_t = RestartMode::Graceful)]
    pub mode: RestartMode,
}

pub fn restart(args: Restart, global_opts: &GlobalOpts) -> Result<()> {
    run_verb(&args.file, global_opts, true, |manager, compute| {
        manager.restart(compute, args.mode)?;
        info!("{} restarted", compute.id);
        Ok(())
    })
}
