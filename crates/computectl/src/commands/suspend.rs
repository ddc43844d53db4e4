use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use libcompute::{ComputeInterface, SuspendMode};
use log::info;

use super::{run_verb, GlobalOpts};

#[derive(Parser, Debug)]
pub struct Suspend {
    /// Compute Config
    #[arg(short, long, required = true)]
    pub file: PathBuf,

    /// suspend or hibernate
    #[arg(short, long, default_value_t = SuspendMode::Suspend)]
    pub mode: SuspendMode,
}

pub fn suspend(args: Suspend, global_opts: &GlobalOpts) -> Result<()> {
    run_verb(&args.file, global_opts, false, |manager, compute| {
        manager.suspend(compute, args.mode)?;
        info!("{} suspended", compute.id);
        Ok(())
    })
}
