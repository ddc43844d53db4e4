//! Connection endpoints per hypervisor family.
use std::collections::HashMap;

use libcompute::{ComputeError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Placeholder replaced by the remote host, or nothing for local access.
pub const HOST_PLACEHOLDER: &str = "{host}";

/// family, session template, system template
const DEFAULT_URIS: &[(&str, Option<&str>, Option<&str>)] =
    &[("qemu", None, Some("qemu://{host}/system"))];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Scope {
    Session,
    System,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriTemplates {
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
}

impl UriTemplates {
    #[inline]
    pub fn get(&self, scope: Scope) -> Option<&str> {
        match scope {
            Scope::Session => self.session.as_deref(),
            Scope::System => self.system.as_deref(),
        }
    }
}

/// Immutable once the backend is built.
#[derive(Debug, Clone, PartialEq)]
pub struct UriTable {
    uris: HashMap<String, UriTemplates>,
}

impl Default for UriTable {
    fn default() -> Self {
        let uris = DEFAULT_URIS
            .iter()
            .map(|(family, session, system)| {
                (
                    family.to_string(),
                    UriTemplates {
                        session: session.map(str::to_owned),
                        system: system.map(str::to_owned),
                    },
                )
            })
            .collect();
        UriTable { uris }
    }
}

impl UriTable {
    /// Default table with `overrides` replacing whole families.
    pub fn with_overrides(overrides: &HashMap<String, UriTemplates>) -> Self {
        let mut table = Self::default();
        for (family, templates) in overrides {
            table.uris.insert(family.clone(), templates.clone());
        }
        table
    }

    pub fn templates(&self, hypervisor: &str) -> Option<&UriTemplates> {
        self.uris.get(hypervisor)
    }

    /// Pick the preferred scope, fall back to the other one and fill in the host.
    pub fn build(
        &self,
        hypervisor: &str,
        prefer_system: bool,
        remote_host: Option<&str>,
    ) -> Result<String> {
        let Some(templates) = self.templates(hypervisor) else {
            return Err(ComputeError::NoEndpoint(hypervisor.to_owned()));
        };

        let (first, second) = if prefer_system {
            (Scope::System, Scope::Session)
        } else {
            (Scope::Session, Scope::System)
        };

        let template = match templates.get(first) {
            Some(template) => template,
            None => {
                info!("no {first:?} access for hypervisor {hypervisor}, using {second:?}");
                templates
                    .get(second)
                    .ok_or_else(|| ComputeError::NoEndpoint(hypervisor.to_owned()))?
            }
        };
        debug!("unformatted uri for {hypervisor} is {template}");

        let host = remote_host.unwrap_or_default();
        let uri = template.replace(HOST_PLACEHOLDER, host);
        debug!("uri is {uri}");
        Ok(uri)
    }
}
