//! Which endpoint manages which compute.
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
    process,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::debug;
use serde::{Deserialize, Serialize};

/// Endpoint a started compute was booted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub hypervisor: String,
    pub uri: String,
}

/// Compute id to endpoint association, shared by all lifecycle calls.
///
/// Besides the map itself every compute id owns an operation lock, so calls
/// on one compute run one at a time while other computes are not held up.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<String, Association>>,
    op_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Association>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, id: &str, association: Association) -> Option<Association> {
        debug!("associate {} with {}", id, association.uri);
        self.entries().insert(id.to_owned(), association)
    }

    pub fn get(&self, id: &str) -> Option<Association> {
        self.entries().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Association> {
        debug!("remove {} from running computes", id);
        self.entries().remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Lock serializing lifecycle calls on `id`.
    ///
    /// Locks nobody holds any more are dropped on the way.
    pub fn op_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut op_locks = self.op_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // only cloned under this guard, so a count of one means unused
        op_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        op_locks.entry(id.to_owned()).or_default().clone()
    }

    /// Number of operation locks currently kept.
    pub fn op_locks(&self) -> usize {
        self.op_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Read a snapshot written by [`Registry::save`], missing file means empty.
    pub fn load<P: AsRef<Path>>(file: P) -> anyhow::Result<Self> {
        let file = file.as_ref();
        let registry = Self::new();
        if !file.exists() {
            return Ok(registry);
        }

        let entries: BTreeMap<String, Association> =
            serde_yaml::from_str(&fs::read_to_string(file)?)?;
        debug!("loaded {} associations from {:?}", entries.len(), file);
        registry.entries().extend(entries);
        Ok(registry)
    }

    /// Write a snapshot, replacing `file` in one rename.
    pub fn save<P: AsRef<Path>>(&self, file: P) -> anyhow::Result<()> {
        let file = file.as_ref();
        let entries: BTreeMap<String, Association> = self
            .entries()
            .iter()
            .map(|(id, association)| (id.clone(), association.clone()))
            .collect();

        let name = file.file_name().unwrap_or_default().to_string_lossy();
        let tmp = file.with_file_name(format!(".{}.{}", name, process::id()));
        fs::write(&tmp, serde_yaml::to_string(&entries)?)?;
        if let Err(e) = fs::rename(&tmp, file) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!("saved {} associations to {:?}", entries.len(), file);
        Ok(())
    }
}
