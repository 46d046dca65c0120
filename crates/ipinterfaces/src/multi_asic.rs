//! Multi-ASIC namespace inventory
//!
//! Works out how many ASIC namespaces the device has (from `asic.conf`)
//! and which role each one plays (from the per-namespace DEVICE_METADATA
//! `sub_role` field).
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-8: System Component Inventory - Enumerate ASIC namespaces by role

use crate::config::{PlatformPaths, PLATFORM_ENV};
use crate::db::{
    table_key, DbQuery, TableSelector, CFG_DEVICE_METADATA_TABLE, DEVICE_METADATA_LOCALHOST,
};
use crate::error::{IpIntfError, Result};
use crate::types::{asic_namespace, NamespacesByRole};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// machine.conf keys that carry the platform identifier
const MACHINE_CONF_PLATFORM_KEYS: [&str; 2] = ["onie_platform", "aboot_platform"];

const NUM_ASIC_KEY: &str = "num_asic";
const SUB_ROLE_FIELD: &str = "sub_role";
const PLATFORM_FIELD: &str = "platform";

/// Splits a `key=value` line, trimming both halves.
fn split_key_value(line: &str) -> Option<(&str, &str)> {
    line.split_once('=').map(|(k, v)| (k.trim(), v.trim()))
}

/// Answers "how many namespaces exist, and what role does each play"
#[derive(Clone)]
pub struct NamespaceInventory {
    paths: PlatformPaths,
    db: Option<Arc<dyn DbQuery>>,
    platform_env: Option<String>,
}

impl NamespaceInventory {
    /// Captures the `PLATFORM` environment override at construction.
    pub fn new(paths: PlatformPaths, db: Option<Arc<dyn DbQuery>>) -> Self {
        let platform_env = std::env::var(PLATFORM_ENV).ok().filter(|p| !p.is_empty());
        Self {
            paths,
            db,
            platform_env,
        }
    }

    /// Replace the captured environment override
    pub fn with_platform_env(mut self, platform: Option<String>) -> Self {
        self.platform_env = platform.filter(|p| !p.is_empty());
        self
    }

    pub fn paths(&self) -> &PlatformPaths {
        &self.paths
    }

    /// Platform identifier: env override, then machine.conf, then CONFIG_DB.
    pub fn platform(&self) -> Option<String> {
        if let Some(platform) = &self.platform_env {
            return Some(platform.clone());
        }
        if let Some(platform) = self.platform_from_machine_conf() {
            return Some(platform);
        }
        self.platform_from_config_db()
    }

    fn platform_from_machine_conf(&self) -> Option<String> {
        let content = fs::read_to_string(&self.paths.machine_conf).ok()?;
        content
            .lines()
            .filter_map(split_key_value)
            .find(|(key, _)| MACHINE_CONF_PLATFORM_KEYS.contains(key))
            .map(|(_, value)| value.to_string())
    }

    fn platform_from_config_db(&self) -> Option<String> {
        let db = self.db.as_ref()?;
        let selector = TableSelector::config_db("", CFG_DEVICE_METADATA_TABLE)
            .with_key(DEVICE_METADATA_LOCALHOST);
        let rows = db.query(&[selector]).ok()?;
        rows.get(&table_key(CFG_DEVICE_METADATA_TABLE, DEVICE_METADATA_LOCALHOST))?
            .get(PLATFORM_FIELD)?
            .as_str()
            .map(str::to_string)
    }

    /// First existing asic.conf candidate, if any
    pub fn asic_conf_path(&self) -> Option<PathBuf> {
        let container = self.paths.container_asic_conf();
        if container.exists() {
            return Some(container);
        }

        let platform = self.platform()?;
        let device = self.paths.device_asic_conf(&platform);
        device.exists().then_some(device)
    }

    /// Number of ASICs; 1 when no asic.conf is present.
    #[instrument(skip(self))]
    pub fn num_asics(&self) -> Result<usize> {
        let Some(path) = self.asic_conf_path() else {
            debug!("No asic.conf found, assuming single ASIC");
            return Ok(1);
        };

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(1),
            Err(source) => return Err(IpIntfError::AsicConfig { path, source }),
        };

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| IpIntfError::AsicConfig {
                path: path.clone(),
                source,
            })?;
            let Some((key, value)) = split_key_value(&line) else {
                continue;
            };
            if key.eq_ignore_ascii_case(NUM_ASIC_KEY) {
                let parsed = value
                    .parse::<i64>()
                    .map_err(|source| IpIntfError::InvalidAsicCount {
                        value: value.to_string(),
                        source,
                    })?;
                // Zero or negative counts mean a single-ASIC device
                let num = usize::try_from(parsed.max(0)).unwrap_or(usize::MAX);
                debug!(path = %path.display(), num_asics = num, "Read asic.conf");
                return Ok(num);
            }
        }

        Ok(1)
    }

    pub fn is_multi_asic(&self) -> Result<bool> {
        Ok(self.num_asics()? > 1)
    }

    /// All namespaces grouped by role.
    ///
    /// A namespace whose metadata cannot be read is skipped with a warning;
    /// only a failure to read the ASIC count is returned as an error.
    #[instrument(skip(self))]
    pub fn all_namespaces(&self) -> Result<NamespacesByRole> {
        let num_asics = self.num_asics()?;
        if num_asics <= 1 {
            return Ok(NamespacesByRole::single_asic());
        }

        let mut roles = NamespacesByRole::default();
        let metadata_key = table_key(CFG_DEVICE_METADATA_TABLE, DEVICE_METADATA_LOCALHOST);

        for index in 0..num_asics {
            let ns = asic_namespace(index);

            let Some(db) = &self.db else {
                warn!(namespace = %ns, "DBQuery not configured; skipping role detection");
                continue;
            };

            let selector = TableSelector::config_db(&ns, CFG_DEVICE_METADATA_TABLE)
                .with_key(DEVICE_METADATA_LOCALHOST);
            let rows = match db.query(&[selector]) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(namespace = %ns, error = %e, "Could not get metadata for namespace");
                    continue;
                }
            };

            let Some(entry) = rows.get(&metadata_key).and_then(Value::as_object) else {
                warn!(namespace = %ns, "Could not parse metadata for namespace");
                continue;
            };

            match entry.get(SUB_ROLE_FIELD).and_then(Value::as_str) {
                Some("Frontend") => roles.frontend.push(ns),
                Some("Backend") => roles.backend.push(ns),
                Some("Fabric") => roles.fabric.push(ns),
                other => debug!(namespace = %ns, sub_role = ?other, "Ignoring namespace role"),
            }
        }

        debug!(?roles, "Discovered namespace roles");
        Ok(roles)
    }
}

impl std::fmt::Debug for NamespaceInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceInventory")
            .field("paths", &self.paths)
            .field("db_configured", &self.db.is_some())
            .field("platform_env", &self.platform_env)
            .finish()
    }
}
