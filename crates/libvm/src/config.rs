use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::uri::UriTemplates;

pub const DEFAULT_STORAGE_DIR: &str = "/var/lib/libvirt/images";
pub const DEFAULT_XML_DIR: &str = "/var/lib/occi/xml";
pub const DEFAULT_RAM_DIR: &str = "/var/lib/occi/ram";

// stop
pub const SHUTDOWN_TIMEOUT_MS: u64 = 60 * 1000;
pub const DESTROY_GRACE_MS: u64 = 500;
pub const POLL_INTERVAL_MS: u64 = 1000;

// file names
pub const XML_SUFFIX: &str = "xml";
pub const SAVED_RAM_SUFFIX: &str = "-saved.ram";

fn default_storage_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_DIR)
}

fn default_xml_dir() -> PathBuf {
    PathBuf::from(DEFAULT_XML_DIR)
}

fn default_ram_dir() -> PathBuf {
    PathBuf::from(DEFAULT_RAM_DIR)
}

fn default_shutdown_timeout() -> u64 {
    SHUTDOWN_TIMEOUT_MS
}

fn default_destroy_grace() -> u64 {
    DESTROY_GRACE_MS
}

fn default_poll_interval() -> u64 {
    POLL_INTERVAL_MS
}

/// Settings of the libvirt compute backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibvirtConfig {
    /// Disk images live here as `<id>.<disk_format>`.
    #[serde(default = "default_storage_dir")]
    pub storage_directory: PathBuf,

    /// Domain descriptions live here as `<id>.xml`.
    #[serde(default = "default_xml_dir")]
    pub xml_directory: PathBuf,

    /// Hibernation snapshots live here as `<id>-saved.ram`.
    #[serde(default = "default_ram_dir")]
    pub ram_directory: PathBuf,

    #[serde(default)]
    pub prefer_system_connection: bool,

    /// Empty or missing means the local hypervisor.
    #[serde(default)]
    pub remote_host: Option<String>,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,

    #[serde(default = "default_destroy_grace")]
    pub destroy_grace_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Extra or replacing URI templates per hypervisor family.
    #[serde(default)]
    pub hypervisors: HashMap<String, UriTemplates>,
}

impl Default for LibvirtConfig {
    fn default() -> Self {
        LibvirtConfig {
            storage_directory: default_storage_dir(),
            xml_directory: default_xml_dir(),
            ram_directory: default_ram_dir(),
            prefer_system_connection: false,
            remote_host: None,
            shutdown_timeout_ms: SHUTDOWN_TIMEOUT_MS,
            destroy_grace_ms: DESTROY_GRACE_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            hypervisors: HashMap::new(),
        }
    }
}

impl LibvirtConfig {
    pub fn new_from_config<P: AsRef<Path>>(file: P) -> anyhow::Result<Self> {
        let config = fs::read_to_string(file.as_ref())?;
        let cfg: LibvirtConfig = serde_yaml::from_str(&config)?;
        debug!("loaded libvirt config from {:?}: {:?}", file.as_ref(), cfg);
        Ok(cfg)
    }

    #[inline]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    #[inline]
    pub fn destroy_grace(&self) -> Duration {
        Duration::from_millis(self.destroy_grace_ms)
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `<storage_directory>/<id>.<disk_format>`
    #[inline]
    pub fn storage_file(&self, id: &str, disk_format: &str) -> PathBuf {
        self.storage_directory.join(format!("{id}.{disk_format}"))
    }

    /// `<xml_directory>/<id>.xml`
    #[inline]
    pub fn xml_file(&self, id: &str) -> PathBuf {
        self.xml_directory.join(format!("{id}.{XML_SUFFIX}"))
    }

    /// `<ram_directory>/<id>-saved.ram`
    #[inline]
    pub fn saved_ram_file(&self, id: &str) -> PathBuf {
        self.ram_directory.join(format!("{id}{SAVED_RAM_SUFFIX}"))
    }
}
