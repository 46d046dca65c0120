//! JSON payload for the `show ip interfaces` family of commands

use crate::interface::IpInterfaces;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Optional arguments of a show request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowOptions {
    /// Restrict to one namespace
    #[serde(default)]
    pub namespace: Option<String>,
    /// "all" (default) or "frontend"
    #[serde(default)]
    pub display: Option<String>,
}

/// Serialized interface array for `family`
#[instrument(skip(api))]
pub fn ip_interfaces_json(
    api: &IpInterfaces,
    family: &str,
    options: &ShowOptions,
) -> Result<Vec<u8>> {
    let interfaces = api
        .get_ip_interfaces(
            family,
            options.namespace.as_deref(),
            options.display.as_deref(),
        )
        .context("error retrieving interface information")?;
    serde_json::to_vec(&interfaces).context("failed to encode interface information")
}
