use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use libcompute::{ComputeInterface, StopMode};
use log::info;

use super::{run_verb, GlobalOpts};

#[derive(Parser, Debug)]
pub struct Stop {
    /// Compute Config
    #[arg(short, long, required = true)]
    pub file: PathBuf,

    /// poweroff, acpioff or graceful
    #[arg(short, long, default_value_t = StopMode::Graceful)]
    pub mode: StopMode,
}

pub fn stop(args: Stop, global_opts: &GlobalOpts) -> Result<()> {
    run_verb(&args.file, global_opts, true, |manager, compute| {
        manager.stop(compute, args.mode)?;
        info!("{} stopped", compute.id);
        Ok(())
    })
}
