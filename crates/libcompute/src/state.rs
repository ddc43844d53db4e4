use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a compute resource as the host sees it.
#[derive(
    Debug, EnumString, Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[strum(serialize = "active")]
    Active,
    #[strum(serialize = "inactive")]
    Inactive,
    #[strum(serialize = "suspended")]
    Suspended,
}

impl Default for State {
    fn default() -> Self {
        Self::Inactive
    }
}
