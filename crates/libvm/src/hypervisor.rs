//! Seam between the compute manager and the hypervisor control library.
use std::path::Path;

use anyhow::Result;
use log::debug;

/// image extension, hypervisor families able to run it
const EXTENSION_MAP: &[(&str, &[&str])] = &[
    ("raw", &["qemu"]),
    ("qcow", &["qemu"]),
    ("qcow2", &["qemu"]),
];

pub type DHypervisor = Box<dyn Hypervisor + Send + Sync>;
pub type DConnection = Box<dyn HypervisorConnection>;
pub type DDomain = Box<dyn DomainHandle>;

/// First hypervisor family able to run the image at `storage_file`.
pub fn determine_hypervisor(storage_file: &Path) -> Option<&'static str> {
    debug!("vhdd path is {:?}", storage_file);
    let suffix = storage_file.extension()?.to_str()?;
    debug!("extracted file extension of {:?} is {}", storage_file, suffix);

    EXTENSION_MAP
        .iter()
        .find(|(ext, _)| *ext == suffix)
        .and_then(|(_, families)| families.first().copied())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DomainState {
    Running,
    Paused,
    Shutoff,
    Other,
}

pub trait Hypervisor {
    fn connect(&self, uri: &str) -> Result<DConnection>;
}

pub trait HypervisorConnection {
    /// Define, or redefine, a persistent domain without starting it.
    fn define_domain(&self, xml: &str) -> Result<DDomain>;

    /// `None` if the endpoint knows no domain with this uuid.
    fn lookup_domain(&self, uuid: &str) -> Result<Option<DDomain>>;

    fn running_domains(&self) -> Result<Vec<String>>;

    fn close(self: Box<Self>) -> Result<()>;
}

pub trait DomainHandle {
    fn state(&self) -> Result<DomainState>;
    fn is_active(&self) -> Result<bool>;

    fn start(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    fn suspend(&self) -> Result<()>;
    fn save(&self, path: &Path) -> Result<()>;

    /// ACPI shutdown request, the guest may ignore it.
    fn shutdown(&self) -> Result<()>;
    fn destroy(&self) -> Result<()>;
    fn undefine(&self) -> Result<()>;
}
