//! Lifecycle verbs mapped onto hypervisor calls.
use std::{
    fs, io,
    path::Path,
    sync::PoisonError,
    time::{Duration, Instant},
};

use anyhow::anyhow;
use libcompute::{
    Compute, ComputeError, ComputeInterface, Result, State, StopMode, SuspendMode,
};
use log::{debug, info, warn};

use crate::{
    cancel::Canceller,
    config::LibvirtConfig,
    hypervisor::{
        determine_hypervisor, DConnection, DDomain, DHypervisor, DomainState,
        HypervisorConnection,
    },
    marshaller::{DMarshaller, XmlMarshaller},
    registry::{Association, Registry},
    uri::UriTable,
    virt::Libvirt,
};

/// lower bound of the shutdown poll interval
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[inline]
fn conn_err(uri: &str) -> impl Fn(anyhow::Error) -> ComputeError + '_ {
    move |source| ComputeError::Connection {
        uri: uri.to_owned(),
        source,
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("removed {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ComputeError::Filesystem {
            path: path.to_owned(),
            source,
        }),
    }
}

/// Compute backend managing QEMU domains through libvirt.
pub struct VmManager {
    config: LibvirtConfig,
    uris: UriTable,
    registry: Registry,
    hypervisor: DHypervisor,
    marshaller: DMarshaller,
    canceller: Canceller,
}

impl VmManager {
    /// Manager talking to libvirtd, writing XML with [`XmlMarshaller`].
    pub fn new(config: LibvirtConfig) -> Self {
        let marshaller = Box::new(XmlMarshaller::new(&config.xml_directory));
        Self::with_backend(config, Box::new(Libvirt::default()), marshaller)
    }

    pub fn with_backend(
        config: LibvirtConfig,
        hypervisor: DHypervisor,
        marshaller: DMarshaller,
    ) -> Self {
        VmManager {
            uris: UriTable::with_overrides(&config.hypervisors),
            config,
            registry: Registry::new(),
            hypervisor,
            marshaller,
            canceller: Canceller::new(),
        }
    }

    /// Replace the empty registry, e.g. with one loaded from disk.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &LibvirtConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Canceller aborting the waits of the [`ComputeInterface`] calls in flight.
    ///
    /// Calls made after a cancellation are not affected by it.
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Hypervisor family able to run the compute's disk image.
    pub fn determine_hypervisor(&self, compute: &Compute) -> Option<&'static str> {
        let storage = self
            .config
            .storage_file(&compute.id, &compute.disk_format);
        determine_hypervisor(&storage)
    }

    /// Endpoint of `hypervisor` honoring the scope preference and remote host.
    pub fn build_uri(&self, hypervisor: &str) -> Result<String> {
        if self.config.prefer_system_connection {
            info!("system connection preferred, checking system access first");
        } else {
            info!("session connection preferred, checking session access first");
        }
        let remote_host = self
            .config
            .remote_host
            .as_deref()
            .filter(|host| !host.is_empty());
        self.uris
            .build(hypervisor, self.config.prefer_system_connection, remote_host)
    }

    fn resolve(&self, compute: &Compute) -> Result<(&'static str, String)> {
        let Some(hypervisor) = self.determine_hypervisor(compute) else {
            warn!("cannot run compute {} on this machine", compute.id);
            return Err(ComputeError::HypervisorUnresolved(
                compute.disk_format.clone(),
            ));
        };
        debug!("hypervisor will be {}", hypervisor);
        Ok((hypervisor, self.build_uri(hypervisor)?))
    }

    fn connect(&self, uri: &str) -> Result<DConnection> {
        debug!("opening connection to libvirt using uri {}", uri);
        self.hypervisor.connect(uri).map_err(conn_err(uri))
    }

    /// Close `conn`, a close failure only matters if `result` is fine.
    fn finish<T>(&self, uri: &str, conn: DConnection, result: Result<T>) -> Result<T> {
        match (conn.close(), result) {
            (Ok(()), result) => result,
            (Err(e), Ok(_)) => Err(conn_err(uri)(e)),
            (Err(e), Err(err)) => {
                warn!("closing connection to {} failed: {:#}", uri, e);
                Err(err)
            }
        }
    }

    /// Run `f` on a fresh connection to `uri` and close it afterwards.
    fn with_connection<T>(
        &self,
        uri: &str,
        f: impl FnOnce(&dyn HypervisorConnection) -> Result<T>,
    ) -> Result<T> {
        let conn = self.connect(uri)?;
        let result = f(&*conn);
        self.finish(uri, conn, result)
    }

    fn lookup(&self, conn: &dyn HypervisorConnection, uri: &str, id: &str) -> Result<DDomain> {
        conn.lookup_domain(id)
            .map_err(conn_err(uri))?
            .ok_or_else(|| conn_err(uri)(anyhow!("no domain {} on {}", id, uri)))
    }

    fn define(
        &self,
        conn: &dyn HypervisorConnection,
        uri: &str,
        compute: &Compute,
    ) -> Result<DDomain> {
        debug!("creating domain description of {}", compute.id);
        let storage = self
            .config
            .storage_file(&compute.id, &compute.disk_format);
        self.marshaller.create_description(compute, &storage)?;
        let description = self.marshaller.description(&compute.id)?;
        debug!("domain description: {}", description);

        let domain = conn.define_domain(&description).map_err(conn_err(uri))?;
        info!("compute {} has been configured on {}", compute.id, uri);
        Ok(domain)
    }

    fn boot(&self, conn: &dyn HypervisorConnection, uri: &str, compute: &Compute) -> Result<()> {
        let domain = self.define(conn, uri, compute)?;

        match domain.state().map_err(conn_err(uri))? {
            DomainState::Paused => {
                info!("compute {} is paused, resuming it", compute.id);
                return domain.resume().map_err(conn_err(uri));
            }
            DomainState::Running => {
                info!("compute {} is already running", compute.id);
                return Ok(());
            }
            _ => {}
        }

        let saved_ram = self.config.saved_ram_file(&compute.id);
        if saved_ram.exists() {
            return Err(ComputeError::Unsupported(format!(
                "restoring compute {} from hibernation snapshot {:?}",
                compute.id, saved_ram
            )));
        }

        debug!("compute {} will start now", compute.id);
        domain.start().map_err(conn_err(uri))?;

        if let Ok(names) = conn.running_domains() {
            debug!("running domains on {}: {:?}", uri, names);
        }
        Ok(())
    }

    /// Whether domain `id` still exists and is running.
    fn is_alive(&self, conn: &dyn HypervisorConnection, uri: &str, id: &str) -> Result<bool> {
        match conn.lookup_domain(id).map_err(conn_err(uri))? {
            Some(domain) => domain.is_active().map_err(conn_err(uri)),
            None => Ok(false),
        }
    }

    /// Poll until the domain is gone or the shutdown timeout passes.
    ///
    /// Returns `false` on timeout.
    fn await_shutdown(
        &self,
        conn: &dyn HypervisorConnection,
        uri: &str,
        id: &str,
        canceller: &Canceller,
    ) -> Result<bool> {
        let timeout = self.config.shutdown_timeout();
        let interval = self.config.poll_interval().max(MIN_POLL_INTERVAL);
        debug!("waiting up to {:?} for {} to shut down", timeout, id);

        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive(conn, uri, id)? {
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }

            if canceller.wait_timeout(interval.min(deadline - now)) {
                return Err(ComputeError::Cancelled(id.to_owned()));
            }
        }
    }

    fn halt(
        &self,
        conn: &dyn HypervisorConnection,
        uri: &str,
        id: &str,
        mode: StopMode,
        canceller: &Canceller,
    ) -> Result<()> {
        let Some(domain) = conn.lookup_domain(id).map_err(conn_err(uri))? else {
            warn!("compute {} is not defined on {}, nothing to stop", id, uri);
            return Ok(());
        };

        if !mode.is_cooperative() {
            debug!("going to destroy compute {}", id);
            return domain.destroy().map_err(conn_err(uri));
        }

        debug!("going to shut down compute {} through acpi event", id);
        domain.shutdown().map_err(conn_err(uri))?;
        if self.await_shutdown(conn, uri, id, canceller)? {
            info!("compute {} has been shut down by acpi event", id);
            return Ok(());
        }

        warn!("compute {} still active, destroying it", id);
        domain.destroy().map_err(conn_err(uri))?;
        if canceller.wait_timeout(self.config.destroy_grace()) {
            return Err(ComputeError::Cancelled(id.to_owned()));
        }
        info!("compute {} has been destroyed", id);
        Ok(())
    }

    fn pause(
        &self,
        conn: &dyn HypervisorConnection,
        uri: &str,
        id: &str,
        mode: SuspendMode,
    ) -> Result<()> {
        let domain = self.lookup(conn, uri, id)?;
        debug!("going to {} compute {}", mode, id);
        match mode {
            SuspendMode::Suspend => domain.suspend().map_err(conn_err(uri)),
            SuspendMode::Hibernate => {
                let ram_dir = &self.config.ram_directory;
                fs::create_dir_all(ram_dir).map_err(|source| ComputeError::Filesystem {
                    path: ram_dir.clone(),
                    source,
                })?;
                let saved_ram = self.config.saved_ram_file(id);
                domain.save(&saved_ram).map_err(conn_err(uri))?;
                debug!("compute {} saved to {:?}", id, saved_ram);
                Ok(())
            }
        }
    }

    fn purge(&self, conn: &dyn HypervisorConnection, uri: &str, id: &str) -> Result<()> {
        let Some(domain) = conn.lookup_domain(id).map_err(conn_err(uri))? else {
            debug!("compute {} is not defined on {}", id, uri);
            return Ok(());
        };

        if domain.is_active().map_err(conn_err(uri))? {
            debug!("destroying active compute {}", id);
            domain.destroy().map_err(conn_err(uri))?;
        }
        domain.undefine().map_err(conn_err(uri))
    }

    /// Stop `compute`, aborting any wait once `canceller` fires.
    ///
    /// A cancelled stop keeps the endpoint association so it can be retried.
    pub fn stop_with(
        &self,
        compute: &mut Compute,
        mode: StopMode,
        canceller: &Canceller,
    ) -> Result<()> {
        let id = compute.id.clone();
        let op_lock = self.registry.op_lock(&id);
        let _guard = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(association) = self.registry.get(&id) else {
            return Err(ComputeError::NotAssociated(id));
        };
        debug!("trying to connect to hypervisor {:?}", association);

        let uri = &association.uri;
        let result =
            self.with_connection(uri, |conn| self.halt(conn, uri, &id, mode, canceller));
        if let Err(ComputeError::Cancelled(_)) = result {
            return result;
        }

        info!("remove {} from running computes", id);
        self.registry.remove(&id);
        result?;

        compute.state = State::Inactive;
        info!("compute {} stopped ({})", id, mode);
        Ok(())
    }
}

impl ComputeInterface for VmManager {
    fn create(&self, compute: &mut Compute) -> Result<()> {
        debug!("creating compute {}", compute.id);
        let op_lock = self.registry.op_lock(&compute.id);
        let _guard = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (_, uri) = self.resolve(compute)?;
        self.with_connection(&uri, |conn| self.define(conn, &uri, compute).map(|_| ()))?;
        info!("compute {} created, next command will start it", compute.id);
        Ok(())
    }

    fn start(&self, compute: &mut Compute) -> Result<()> {
        debug!("trying to start compute {}", compute.id);
        let op_lock = self.registry.op_lock(&compute.id);
        let _guard = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (hypervisor, uri) = self.resolve(compute)?;
        let result = self.with_connection(&uri, |conn| self.boot(conn, &uri, compute));
        if let Err(e) = result {
            if let ComputeError::Connection { .. } = e {
                warn!("setting compute {} inactive: {:#}", compute.id, e);
                compute.state = State::Inactive;
            }
            return Err(e);
        }

        self.registry.insert(
            &compute.id,
            Association {
                hypervisor: hypervisor.to_owned(),
                uri,
            },
        );
        compute.state = State::Active;
        info!("compute {} is running", compute.id);
        Ok(())
    }

    fn stop(&self, compute: &mut Compute, mode: StopMode) -> Result<()> {
        self.stop_with(compute, mode, &self.canceller.renew())
    }

    fn suspend(&self, compute: &mut Compute, mode: SuspendMode) -> Result<()> {
        let id = compute.id.clone();
        let op_lock = self.registry.op_lock(&id);
        let _guard = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(association) = self.registry.get(&id) else {
            return Err(ComputeError::NotAssociated(id));
        };
        debug!("trying to connect to hypervisor {:?}", association);

        let uri = &association.uri;
        let result = self.with_connection(uri, |conn| self.pause(conn, uri, &id, mode));

        info!("remove {} from running computes", id);
        self.registry.remove(&id);
        result?;

        compute.state = State::Suspended;
        info!("compute {} suspended ({})", id, mode);
        Ok(())
    }

    fn delete(&self, compute: &mut Compute) -> Result<()> {
        debug!("deleting compute {}", compute.id);
        let id = compute.id.clone();
        let op_lock = self.registry.op_lock(&id);
        let _guard = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (_, uri) = self.resolve(compute)?;
        self.with_connection(&uri, |conn| self.purge(conn, &uri, &id))?;
        self.registry.remove(&id);

        remove_if_exists(&self.config.xml_file(&id))?;
        remove_if_exists(&self.config.storage_file(&id, &compute.disk_format))?;
        remove_if_exists(&self.config.saved_ram_file(&id))?;

        compute.state = State::Inactive;
        info!("compute {} deleted", id);
        Ok(())
    }
}
