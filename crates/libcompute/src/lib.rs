use log::debug;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use strum::{Display, EnumString};

pub use self::{
    action::{RestartMode, StopMode, SuspendMode},
    error::{ComputeError, Result},
    state::State,
};

pub mod action;
pub mod error;
pub mod state;


pub const DEFAULT_DISK_FORMAT: &str = "raw";

#[derive(Debug, EnumString, Display, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    #[strum(serialize = "x86")]
    X86,
    #[strum(serialize = "x64")]
    X64,
}

impl Default for Architecture {
    fn default() -> Self {
        Self::X64
    }
}

fn default_disk_format() -> String {
    DEFAULT_DISK_FORMAT.to_owned()
}

/// Compute resource owned by the host framework.
///
/// Backends only read `id` and `disk_format`, everything else is passed
/// through to the domain description. `state` is written as a side effect of
/// lifecycle calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compute {
    pub id: String,

    #[serde(default)]
    pub architecture: Architecture,
    pub cores: u32,

    #[serde(default)]
    pub hostname: String,

    /// GHz
    #[serde(default)]
    pub speed: f32,

    /// GiB
    pub memory: f32,

    /// Declared image format, also the image file extension.
    #[serde(default = "default_disk_format")]
    pub disk_format: String,

    #[serde(default)]
    pub state: State,
}

impl Compute {
    pub fn new(id: &str, cores: u32, memory: f32) -> Self {
        Compute {
            id: id.to_owned(),
            architecture: Architecture::default(),
            cores,
            hostname: String::new(),
            speed: 0.0,
            memory,
            disk_format: default_disk_format(),
            state: State::default(),
        }
    }

    pub fn new_from_config<P: AsRef<Path>>(file: P) -> anyhow::Result<Self> {
        let config = fs::read_to_string(file.as_ref())?;
        let compute: Compute = serde_yaml::from_str(&config)?;
        debug!("loaded compute {} from {:?}", compute.id, file.as_ref());
        Ok(compute)
    }

    pub fn sync_to_file<P: AsRef<Path>>(&self, file: P) -> anyhow::Result<()> {
        fs::write(file, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

/// Lifecycle capability a compute backend offers to the host.
///
/// Every call takes the host's resource by mutable reference and may update
/// its `state`. Failures are returned instead of being absorbed so the host
/// can decide on compensating action.
pub trait ComputeInterface {
    /// Register the compute with its hypervisor without booting it.
    fn create(&self, compute: &mut Compute) -> Result<()>;

    fn start(&self, compute: &mut Compute) -> Result<()>;

    fn stop(&self, compute: &mut Compute, mode: StopMode) -> Result<()>;

    fn suspend(&self, compute: &mut Compute, mode: SuspendMode) -> Result<()>;

    /// Stop with the mode matching `mode`, then start again.
    fn restart(&self, compute: &mut Compute, mode: RestartMode) -> Result<()> {
        debug!("restart {} as {}", compute.id, mode);
        self.stop(compute, mode.stop_mode())?;
        self.start(compute)
    }

    /// Remove the compute and its on-disk artifacts.
    fn delete(&self, compute: &mut Compute) -> Result<()>;
}
