//! An abstraction on top of the libvirt bindings.
use std::{ffi::CString, path::Path};

use anyhow::{anyhow, Result};
use log::debug;
use virt::{
    connect::Connect,
    domain::Domain,
    error::{Error, ErrorNumber},
    sys,
};

use crate::hypervisor::{
    DConnection, DDomain, DomainHandle, DomainState, Hypervisor, HypervisorConnection,
};

/// Errors from this module.
#[derive(Debug, thiserror::Error)]
pub enum VirtError {
    /// Error connecting to libvirtd.
    #[error("couldn't connect to the libvirt daemon at {0}")]
    Connect(String, #[source] virt::error::Error),

    /// Error closing the connection.
    #[error("couldn't close connection to {0}")]
    Close(String, #[source] virt::error::Error),

    /// Error listing domains.
    #[error("couldn't list all domains")]
    Domains(#[source] virt::error::Error),

    /// Error defining a domain from its XML description.
    #[error("couldn't define domain on {0}")]
    Define(String, #[source] virt::error::Error),

    /// Error looking up a domain.
    #[error("couldn't look up domain {0}")]
    Lookup(String, #[source] virt::error::Error),

    /// Error reading domain state.
    #[error("couldn't get state of domain {0}")]
    State(String, #[source] virt::error::Error),

    /// Error checking if domain is active.
    #[error("couldn't check is domain {0} is active")]
    IsActive(String, #[source] virt::error::Error),

    /// Error powering on a domain.
    #[error("couldn't create domain {0}")]
    Create(String, #[source] virt::error::Error),

    /// Error resuming a paused domain.
    #[error("couldn't resume domain {0}")]
    Resume(String, #[source] virt::error::Error),

    /// Error pausing a domain.
    #[error("couldn't suspend domain {0}")]
    Suspend(String, #[source] virt::error::Error),

    /// Error saving a domain's memory.
    #[error("couldn't save domain {0} to {1}")]
    Save(String, String, #[source] virt::error::Error),

    /// Error shutting down domain
    #[error("couldn't shut down domain {0}")]
    Shutdown(String, #[source] virt::error::Error),

    /// Error destroying domain
    #[error("couldn't destroy domain {0}")]
    Destroy(String, #[source] virt::error::Error),

    /// Error undefining domain
    #[error("couldn't undefine domain {0}")]
    Undefine(String, #[source] virt::error::Error),
}

/// Hypervisor backend talking to libvirtd.
#[derive(Debug, Default)]
pub struct Libvirt {}

impl Hypervisor for Libvirt {
    fn connect(&self, uri: &str) -> Result<DConnection> {
        debug!("connecting to libvirtd {}", uri);
        let conn = Connect::open(Some(uri)).map_err(|e| VirtError::Connect(uri.to_owned(), e))?;
        Ok(Box::new(LibvirtConnection {
            uri: uri.to_owned(),
            conn,
        }))
    }
}

/// Access libvirt for all the things this program needs.
pub struct LibvirtConnection {
    uri: String,
    conn: Connect,
}

impl HypervisorConnection for LibvirtConnection {
    fn define_domain(&self, xml: &str) -> Result<DDomain> {
        let domain =
            Domain::define_xml(&self.conn, xml).map_err(|e| VirtError::Define(self.uri.clone(), e))?;
        let name = domain.get_name().unwrap_or_default();
        Ok(Box::new(DomainWrapper { name, domain }))
    }

    fn lookup_domain(&self, uuid: &str) -> Result<Option<DDomain>> {
        match Domain::lookup_by_uuid_string(&self.conn, uuid) {
            Ok(domain) => Ok(Some(Box::new(DomainWrapper {
                name: uuid.to_owned(),
                domain,
            }))),
            Err(e) if e.code() == ErrorNumber::NoDomain => {
                debug!("no domain {} on {}", uuid, self.uri);
                Ok(None)
            }
            Err(e) => Err(VirtError::Lookup(uuid.to_owned(), e).into()),
        }
    }

    fn running_domains(&self) -> Result<Vec<String>> {
        Ok(self
            .conn
            .list_all_domains(sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE)
            .map_err(VirtError::Domains)?
            .into_iter()
            .filter_map(|domain| domain.get_name().ok())
            .collect())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        debug!("closing connection to {}", self.uri);
        self.conn
            .close()
            .map_err(|e| VirtError::Close(self.uri.clone(), e))?;
        Ok(())
    }
}

pub struct DomainWrapper {
    name: String,
    domain: Domain,
}

impl DomainHandle for DomainWrapper {
    fn state(&self) -> Result<DomainState> {
        let (state, _) = self
            .domain
            .get_state()
            .map_err(|e| VirtError::State(self.name.clone(), e))?;
        Ok(match state {
            sys::VIR_DOMAIN_RUNNING => DomainState::Running,
            sys::VIR_DOMAIN_PAUSED => DomainState::Paused,
            sys::VIR_DOMAIN_SHUTOFF => DomainState::Shutoff,
            _ => DomainState::Other,
        })
    }

    fn is_active(&self) -> Result<bool> {
        Ok(self
            .domain
            .is_active()
            .map_err(|e| VirtError::IsActive(self.name.clone(), e))?)
    }

    fn start(&self) -> Result<()> {
        self.domain
            .create()
            .map_err(|e| VirtError::Create(self.name.clone(), e))?;
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.domain
            .resume()
            .map_err(|e| VirtError::Resume(self.name.clone(), e))?;
        Ok(())
    }

    fn suspend(&self) -> Result<()> {
        self.domain
            .suspend()
            .map_err(|e| VirtError::Suspend(self.name.clone(), e))?;
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let to = path
            .to_str()
            .ok_or(anyhow!("snapshot path {:?} is not utf-8", path))?;
        let c_to = CString::new(to)?;

        // Not wrapped by the bindings, only managed saves are.
        let ret = unsafe { sys::virDomainSave(self.domain.as_ptr(), c_to.as_ptr()) };
        if ret == -1 {
            let e = Error::last_error();
            return Err(VirtError::Save(self.name.clone(), to.to_owned(), e).into());
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        self.domain
            .shutdown()
            .map_err(|e| VirtError::Shutdown(self.name.clone(), e))?;
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.domain
            .destroy()
            .map_err(|e| VirtError::Destroy(self.name.clone(), e))?;
        Ok(())
    }

    fn undefine(&self) -> Result<()> {
        self.domain
            .undefine()
            .map_err(|e| VirtError::Undefine(self.name.clone(), e))?;
        Ok(())
    }
}
