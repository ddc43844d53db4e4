//! In-memory hypervisor for tests.
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, bail, Result};

use crate::hypervisor::{
    DConnection, DDomain, DomainHandle, DomainState, Hypervisor, HypervisorConnection,
};

#[derive(Default)]
pub struct Backend {
    pub domains: HashMap<String, DomainState>,
    pub calls: Vec<String>,
    /// domains ignoring ACPI shutdown requests
    pub stubborn: HashSet<String>,
    pub fail_connect: bool,
}

#[derive(Clone, Default)]
pub struct MockHypervisor {
    pub backend: Arc<Mutex<Backend>>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stubborn(&self, id: &str) {
        self.backend.lock().unwrap().stubborn.insert(id.to_owned());
    }

    pub fn fail_connect(&self) {
        self.backend.lock().unwrap().fail_connect = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.backend.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.backend.lock().unwrap().calls.clear();
    }

    pub fn state(&self, id: &str) -> Option<DomainState> {
        self.backend.lock().unwrap().domains.get(id).copied()
    }
}

impl Hypervisor for MockHypervisor {
    fn connect(&self, uri: &str) -> Result<DConnection> {
        let mut backend = self.backend.lock().unwrap();
        backend.calls.push(format!("connect:{uri}"));
        if backend.fail_connect {
            bail!("couldn't connect to {uri}")
        }
        Ok(Box::new(MockConnection {
            backend: self.backend.clone(),
        }))
    }
}

struct MockConnection {
    backend: Arc<Mutex<Backend>>,
}

fn uuid_of(xml: &str) -> Option<&str> {
    let start = xml.find("<uuid>")? + "<uuid>".len();
    let end = xml[start..].find("</uuid>")? + start;
    Some(&xml[start..end])
}

impl HypervisorConnection for MockConnection {
    fn define_domain(&self, xml: &str) -> Result<DDomain> {
        let uuid = uuid_of(xml).ok_or(anyhow!("domain xml without uuid"))?;
        let mut backend = self.backend.lock().unwrap();
        backend.calls.push(format!("define:{uuid}"));
        backend
            .domains
            .entry(uuid.to_owned())
            .or_insert(DomainState::Shutoff);
        Ok(Box::new(MockDomain {
            uuid: uuid.to_owned(),
            backend: self.backend.clone(),
        }))
    }

    fn lookup_domain(&self, uuid: &str) -> Result<Option<DDomain>> {
        let backend = self.backend.lock().unwrap();
        if !backend.domains.contains_key(uuid) {
            return Ok(None);
        }
        Ok(Some(Box::new(MockDomain {
            uuid: uuid.to_owned(),
            backend: self.backend.clone(),
        })))
    }

    fn running_domains(&self) -> Result<Vec<String>> {
        let backend = self.backend.lock().unwrap();
        Ok(backend
            .domains
            .iter()
            .filter(|(_, state)| **state == DomainState::Running)
            .map(|(uuid, _)| uuid.clone())
            .collect())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.backend.lock().unwrap().calls.push("close".to_owned());
        Ok(())
    }
}

struct MockDomain {
    uuid: String,
    backend: Arc<Mutex<Backend>>,
}

impl MockDomain {
    /// Record `op` and move the domain from one of `from` to `to`.
    fn transit(&self, op: &str, from: &[DomainState], to: DomainState) -> Result<()> {
        let mut backend = self.backend.lock().unwrap();
        backend.calls.push(format!("{op}:{}", self.uuid));
        let Some(state) = backend.domains.get_mut(&self.uuid) else {
            bail!("Domain not found: {}", self.uuid)
        };
        if !from.contains(state) {
            bail!("can't {op} domain {} in state {:?}", self.uuid, state)
        }
        *state = to;
        Ok(())
    }
}

impl DomainHandle for MockDomain {
    fn state(&self) -> Result<DomainState> {
        let backend = self.backend.lock().unwrap();
        backend
            .domains
            .get(&self.uuid)
            .copied()
            .ok_or(anyhow!("Domain not found: {}", self.uuid))
    }

    fn is_active(&self) -> Result<bool> {
        Ok(matches!(
            self.state()?,
            DomainState::Running | DomainState::Paused
        ))
    }

    fn start(&self) -> Result<()> {
        self.transit("start", &[DomainState::Shutoff], DomainState::Running)
    }

    fn resume(&self) -> Result<()> {
        self.transit("resume", &[DomainState::Paused], DomainState::Running)
    }

    fn suspend(&self) -> Result<()> {
        self.transit("suspend", &[DomainState::Running], DomainState::Paused)
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.transit(
            "save",
            &[DomainState::Running, DomainState::Paused],
            DomainState::Shutoff,
        )?;
        fs::write(path, "ram")?;
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        let stubborn = self.backend.lock().unwrap().stubborn.contains(&self.uuid);
        if stubborn {
            let mut backend = self.backend.lock().unwrap();
            backend.calls.push(format!("shutdown:{}", self.uuid));
            return Ok(());
        }
        self.transit("shutdown", &[DomainState::Running], DomainState::Shutoff)
    }

    fn destroy(&self) -> Result<()> {
        self.transit(
            "destroy",
            &[DomainState::Running, DomainState::Paused],
            DomainState::Shutoff,
        )
    }

    fn undefine(&self) -> Result<()> {
        let mut backend = self.backend.lock().unwrap();
        backend.calls.push(format!("undefine:{}", self.uuid));
        backend
            .domains
            .remove(&self.uuid)
            .map(|_| ())
            .ok_or(anyhow!("Domain not found: {}", self.uuid))
    }
}
