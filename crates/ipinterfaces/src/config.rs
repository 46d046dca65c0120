//! Platform file locations used by namespace discovery
//!
//! Defaults match a SONiC device layout. A TOML file may override any
//! subset of them, which is how tests and non-standard images relocate
//! `asic.conf` and the netns directory.

use crate::error::{IpIntfError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable that overrides platform detection
pub const PLATFORM_ENV: &str = "PLATFORM";

/// Filesystem paths consulted during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformPaths {
    /// Host machine configuration (`onie_platform=...`)
    #[serde(default = "default_machine_conf")]
    pub machine_conf: PathBuf,

    /// Platform directory mounted into containers
    #[serde(default = "default_platform_dir")]
    pub platform_dir: PathBuf,

    /// Per-platform device data directory on the host
    #[serde(default = "default_device_dir")]
    pub device_dir: PathBuf,

    /// Name of the ASIC count file inside either directory
    #[serde(default = "default_asic_conf_filename")]
    pub asic_conf_filename: String,

    /// Directory holding named network namespace handles
    #[serde(default = "default_netns_dir")]
    pub netns_dir: PathBuf,

    /// Handle to the calling thread's own network namespace
    #[serde(default = "default_self_netns")]
    pub self_netns: PathBuf,
}

fn default_machine_conf() -> PathBuf {
    PathBuf::from("/host/machine.conf")
}

fn default_platform_dir() -> PathBuf {
    PathBuf::from("/usr/share/sonic/platform")
}

fn default_device_dir() -> PathBuf {
    PathBuf::from("/usr/share/sonic/device")
}

fn default_asic_conf_filename() -> String {
    "asic.conf".to_string()
}

fn default_netns_dir() -> PathBuf {
    PathBuf::from("/var/run/netns")
}

fn default_self_netns() -> PathBuf {
    PathBuf::from("/proc/self/ns/net")
}

impl Default for PlatformPaths {
    fn default() -> Self {
        Self {
            machine_conf: default_machine_conf(),
            platform_dir: default_platform_dir(),
            device_dir: default_device_dir(),
            asic_conf_filename: default_asic_conf_filename(),
            netns_dir: default_netns_dir(),
            self_netns: default_self_netns(),
        }
    }
}

impl PlatformPaths {
    /// Load overrides from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let paths: Self = toml::from_str(&content).map_err(|e| {
            IpIntfError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), "Loaded platform paths");
        Ok(paths)
    }

    /// `<platform_dir>/asic.conf`
    pub fn container_asic_conf(&self) -> PathBuf {
        self.platform_dir.join(&self.asic_conf_filename)
    }

    /// `<device_dir>/<platform>/asic.conf`
    pub fn device_asic_conf(&self, platform: &str) -> PathBuf {
        self.device_dir.join(platform).join(&self.asic_conf_filename)
    }

    /// Handle path for a named namespace
    pub fn netns_path(&self, namespace: &str) -> PathBuf {
        self.netns_dir.join(namespace)
    }
}
