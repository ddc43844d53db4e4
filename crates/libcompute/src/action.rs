//! Modes accepted by the stop, suspend and restart actions.
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, EnumString, Display, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopMode {
    /// Immediate forced termination.
    #[strum(serialize = "poweroff")]
    PowerOff,
    /// ACPI shutdown request, forced termination after the timeout.
    #[strum(serialize = "acpioff")]
    AcpiOff,
    /// Same as `AcpiOff`.
    #[strum(serialize = "graceful")]
    Graceful,
}

impl StopMode {
    #[inline]
    pub fn is_cooperative(&self) -> bool {
        matches!(self, StopMode::AcpiOff | StopMode::Graceful)
    }
}

#[derive(Debug, EnumString, Display, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspendMode {
    /// Pause the vcpus, memory stays resident.
    #[strum(serialize = "suspend")]
    Suspend,
    /// Save memory to a snapshot file.
    #[strum(serialize = "hibernate")]
    Hibernate,
}

#[derive(Debug, EnumString, Display, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    #[strum(serialize = "graceful")]
    Graceful,
    #[strum(serialize = "warm")]
    Warm,
    #[strum(serialize = "cold")]
    Cold,
}

impl RestartMode {
    /// stop mode a restart is composed of
    pub fn stop_mode(&self) -> StopMode {
        match self {
            RestartMode::Graceful | RestartMode::Warm => StopMode::AcpiOff,
            RestartMode::Cold => StopMode::PowerOff,
        }
    }
}
