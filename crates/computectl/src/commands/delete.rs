use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use libcompute::ComputeInterface;
use log::info;

use super::{run_verb, GlobalOpts};

#[derive(Parser, Debug)]
pub struct Delete {
    /// Compute Config
    #[arg(short, long, required = true)]
    pub file: PathBuf,
}

pub fn delete(args: Delete, global_opts: &GlobalOpts) -> Result<()> {
    run_verb(&args.file, global_opts, false, |manager, compute| {
        manager.delete(compute)?;
        info!("{} removed", compute.id);
        Ok(())
    })
}
