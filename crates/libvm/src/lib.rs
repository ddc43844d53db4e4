pub mod cancel;
pub mod config;
pub mod hypervisor;
pub mod manager;
pub mod marshaller;
pub mod registry;
pub mod uri;
pub mod virt;

#[cfg(test)]
mod mocker;

pub use cancel::Canceller;
pub use config::LibvirtConfig;
pub use manager::VmManager;
pub use marshaller::{compute_to_xml, XmlMarshaller};
pub use registry::{Association, Registry};
