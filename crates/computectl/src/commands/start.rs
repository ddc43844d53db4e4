use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use libcompute::ComputeInterface;
use log::info;

use super::{run_verb, GlobalOpts};

#[derive(Parser, Debug)]
pub struct Start {
    /// Compute Config
    #[arg(short, long, required = true)]
    pub file: PathBuf,
}

pub fn start(args: Start, global_opts: &GlobalOpts) -> Result<()> {
    info!("starting compute...");
    run_verb(&args.file, global_opts, false, |manager, compute| {
        manager.start(compute)?;
        info!("{} started", compute.id);
        Ok(())
    })
}
