use std::{
    fs,
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc},
    thread,
};

use anyhow::{anyhow, Ok, Result};
use clap::{Args, Subcommand};
use libcompute::Compute;
use libvm::{compute_to_xml, LibvirtConfig, Registry, VmManager};
use log::{debug, warn};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
    iterator::Signals,
};

use crate::config::{DEFAULT_CONFIG, DEFAULT_REGISTRY};

use self::{
    create::Create, delete::Delete, restart::Restart, start::Start, stop::Stop,
    suspend::Suspend, uri::Uri,
};

pub mod create;
pub mod delete;
pub mod restart;
pub mod start;
pub mod stop;
pub mod suspend;
pub mod uri;

#[cfg(test)]
mod test;

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// Libvirt backend config
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Endpoint association snapshot shared between invocations
    #[arg(short, long, global = true, default_value = DEFAULT_REGISTRY)]
    pub registry: PathBuf,

    /// Print the domain description instead of calling libvirt
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum ComputeCmd {
    /// Define Compute without starting it
    Create(Create),

    /// Start Compute
    Start(Start),

    /// Stop Compute
    Stop(Stop),

    /// Suspend or hibernate Compute
    Suspend(Suspend),

    /// Restart Compute
    Restart(Restart),

    /// Delete Compute and its files
    Delete(Delete),

    /// Show the connection uri of a hypervisor
    Uri(Uri),
}

pub fn load_config(global_opts: &GlobalOpts) -> Result<LibvirtConfig> {
    let file = match &global_opts.config {
        Some(path) => path.clone(),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG);
            if !path.exists() {
                debug!("{:?} not found, using default config", path);
                return Ok(LibvirtConfig::default());
            }
            path
        }
    };

    LibvirtConfig::new_from_config(&file)
        .map_err(|e| anyhow!("error parsing config {:#?}: {}", file, e))
}

/// Manager sharing the registry snapshot.
pub fn open_manager(global_opts: &GlobalOpts) -> Result<VmManager> {
    let config = load_config(global_opts)?;
    let registry = Registry::load(&global_opts.registry)
        .map_err(|e| anyhow!("error loading registry {:#?}: {}", global_opts.registry, e))?;
    Ok(VmManager::new(config).with_registry(registry))
}

/// First SIGINT or SIGTERM cancels the waits of `manager`, the next one exits.
pub fn cancel_on_signals(manager: &VmManager) -> Result<()> {
    let term = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        // checked before the flag is raised, so only a repeated signal exits
        flag::register_conditional_shutdown(sig, 128 + sig, term.clone())?;
        flag::register(sig, term.clone())?;
    }

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let canceller = manager.canceller();
    thread::spawn(move || {
        for sig in signals.forever() {
            warn!("received signal {sig}, cancelling, send it again to exit");
            canceller.cancel();
        }
    });
    Ok(())
}

/// Write the association of compute `id` back to the registry snapshot.
///
/// The snapshot is read again first so entries other invocations changed in
/// the meantime survive. Invocations racing on the same compute still do.
pub fn save_registry(manager: &VmManager, global_opts: &GlobalOpts, id: &str) -> Result<()> {
    let file = &global_opts.registry;
    let registry = Registry::load(file)
        .map_err(|e| anyhow!("error loading registry {:#?}: {}", file, e))?;
    match manager.registry().get(id) {
        Some(association) => registry.insert(id, association),
        None => registry.remove(id),
    };

    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    registry.save(file)
}

/// Load the compute from `file`, run `verb` on it and write it back.
///
/// With `cancellable` set, signals cancel the waits of `verb` first.
pub fn run_verb<F>(
    file: &PathBuf,
    global_opts: &GlobalOpts,
    cancellable: bool,
    verb: F,
) -> Result<()>
where
    F: FnOnce(&VmManager, &mut Compute) -> libcompute::Result<()>,
{
    let mut compute = Compute::new_from_config(file)
        .map_err(|e| anyhow!("error parsing compute {:#?}: {}", file, e))?;

    if global_opts.dry_run {
        let config = load_config(global_opts)?;
        let disk = config.storage_file(&compute.id, &compute.disk_format);
        println!("{}", compute_to_xml(&compute, &disk)?);
        return Ok(());
    }

    let manager = open_manager(global_opts)?;
    if cancellable {
        cancel_on_signals(&manager)?;
    }
    let result = verb(&manager, &mut compute);

    save_registry(&manager, global_opts, &compute.id)?;
    compute.sync_to_file(file)?;
    result?;
    Ok(())
}
