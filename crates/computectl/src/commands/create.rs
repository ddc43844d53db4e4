use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use libcompute::ComputeInterface;
use log::info;

use super::{run_verb, GlobalOpts};

#[derive(Parser, Debug)]
pub struct Create {
    /// Compute Config
    #[arg(short, long, required = true)]
    pub file: PathBuf,
}

pub fn create(args: Create, global_opts: &GlobalOpts) -> Result<()> {
    run_verb(&args.file, global_opts, false, |manager, compute| {
        manager.create(compute)?;
        info!("{} created", compute.id);
        Ok(())
    })
}
