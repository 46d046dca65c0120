//! Network namespace switching
//!
//! Entering a namespace changes the calling OS thread's network stack,
//! which every later socket on that thread inherits. [`NetnsGuard`] ties
//! the switch to a scope: dropping it always re-enters the original
//! namespace and closes both handles.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-7: Boundary Protection - Threads never stay in a foreign namespace
//! - SC-39: Process Isolation - Switches are confined to one OS thread

use crate::config::PlatformPaths;
use crate::error::{IpIntfError, Result};
use crate::types::DEFAULT_NAMESPACE;
use std::io;
use std::path::Path;
use tracing::{error, trace};

/// OS primitives needed to move a thread between network namespaces
pub trait NetnsOps: Send + Sync {
    /// Open namespace handle; closed when dropped
    type Handle;

    fn open(&self, path: &Path) -> io::Result<Self::Handle>;

    /// Switch the calling thread into the namespace behind `handle`
    fn enter(&self, handle: &Self::Handle) -> io::Result<()>;
}

/// `setns(2)` on namespace files
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNetns;

#[cfg(target_os = "linux")]
impl NetnsOps for SystemNetns {
    type Handle = std::fs::File;

    fn open(&self, path: &Path) -> io::Result<Self::Handle> {
        std::fs::File::open(path)
    }

    fn enter(&self, handle: &Self::Handle) -> io::Result<()> {
        use nix::sched::{setns, CloneFlags};
        setns(handle, CloneFlags::CLONE_NEWNET).map_err(io::Error::from)
    }
}

/// Namespace switching is Linux-only; other platforms fail every open
#[cfg(not(target_os = "linux"))]
impl NetnsOps for SystemNetns {
    type Handle = ();

    fn open(&self, path: &Path) -> io::Result<Self::Handle> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("network namespaces unsupported: {}", path.display()),
        ))
    }

    fn enter(&self, _handle: &Self::Handle) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "network namespaces unsupported",
        ))
    }
}

/// Scoped residence in a network namespace
///
/// For the default namespace nothing is opened and nothing is switched.
pub struct NetnsGuard<'a, O: NetnsOps> {
    ops: &'a O,
    namespace: String,
    /// (original, target); `None` for the default namespace or once restored
    handles: Option<(O::Handle, O::Handle)>,
}

impl<'a, O: NetnsOps> NetnsGuard<'a, O> {
    /// Switch the calling thread into `namespace`.
    pub fn enter(ops: &'a O, paths: &PlatformPaths, namespace: &str) -> Result<Self> {
        if namespace == DEFAULT_NAMESPACE {
            return Ok(Self {
                ops,
                namespace: namespace.to_string(),
                handles: None,
            });
        }

        let original = ops
            .open(&paths.self_netns)
            .map_err(|e| IpIntfError::namespace(namespace, "open current namespace", e))?;
        let target = ops
            .open(&paths.netns_path(namespace))
            .map_err(|e| IpIntfError::namespace(namespace, "open target namespace", e))?;

        if let Err(e) = ops.enter(&target) {
            if let Err(restore_err) = ops.enter(&original) {
                error!(
                    namespace,
                    error = %restore_err,
                    "Failed to restore original namespace after failed switch"
                );
            }
            return Err(IpIntfError::namespace(namespace, "enter namespace", e));
        }

        trace!(namespace, "Entered network namespace");
        Ok(Self {
            ops,
            namespace: namespace.to_string(),
            handles: Some((original, target)),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// True when a namespace switch is in effect
    pub fn is_switched(&self) -> bool {
        self.handles.is_some()
    }

    /// Restore the original namespace, reporting failure to the caller.
    pub fn restore(mut self) -> Result<()> {
        self.do_restore()
    }

    fn do_restore(&mut self) -> Result<()> {
        let Some((original, target)) = self.handles.take() else {
            return Ok(());
        };
        let result = self
            .ops
            .enter(&original)
            .map_err(|e| IpIntfError::namespace(&self.namespace, "restore original namespace", e));
        drop(target);
        drop(original);
        if result.is_ok() {
            trace!(namespace = %self.namespace, "Restored original network namespace");
        }
        result
    }
}

impl<O: NetnsOps> Drop for NetnsGuard<'_, O> {
    fn drop(&mut self) {
        if let Err(e) = self.do_restore() {
            // The thread is now stuck in the target namespace.
            error!(error = %e, "Failed to restore network namespace");
        }
    }
}

impl<O: NetnsOps> std::fmt::Debug for NetnsGuard<'_, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetnsGuard")
            .field("namespace", &self.namespace)
            .field("switched", &self.is_switched())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// Records every open/enter/close as a string event
    #[derive(Debug, Default, Clone)]
    pub struct FakeNetns {
        pub log: Arc<Mutex<Vec<String>>>,
        pub fail_open: Vec<PathBuf>,
        pub fail_enter: Vec<PathBuf>,
    }

    pub struct FakeHandle {
        pub path: PathBuf,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Drop for FakeHandle {
        fn drop(&mut self) {
            self.log
                .lock()
                .unwrap()
                .push(format!("close {}", self.path.display()));
        }
    }

    impl FakeNetns {
        pub fn events(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl NetnsOps for FakeNetns {
        type Handle = FakeHandle;

        fn open(&self, path: &Path) -> io::Result<FakeHandle> {
            if self.fail_open.iter().any(|p| p == path) {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("open {}", path.display()));
            Ok(FakeHandle {
                path: path.to_path_buf(),
                log: self.log.clone(),
            })
        }

        fn enter(&self, handle: &FakeHandle) -> io::Result<()> {
            if self.fail_enter.iter().any(|p| p == &handle.path) {
                return Err(io::Error::from_raw_os_error(1));
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("enter {}", handle.path.display()));
            Ok(())
        }
    }
}
