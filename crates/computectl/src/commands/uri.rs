use anyhow::Result;
use clap::Parser;
use libvm::VmManager;

use super::{load_config, GlobalOpts};

#[derive(Parser, Debug)]
pub struct Uri {
    /// Hypervisor family, e.g. qemu
    pub hypervisor: String,
}

pub fn uri(args: Uri, global_opts: &GlobalOpts) -> Result<()> {
    let manager = VmManager::new(load_config(global_opts)?);
    println!("{}", manager.build_uri(&args.hypervisor)?);
    Ok(())
}
