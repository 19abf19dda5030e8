//! Access to the external tools consulted during a selection run

use camino::Utf8Path;
use color_eyre::eyre::Context;
use color_eyre::Result;
use std::process::Command;

use crate::cmdext::CommandRunExt;
use crate::pvesh::{self, StorageRecord};
use crate::qemu_img;

/// The external tools a selection run consults, grouped as one capability.
///
/// The selection pipeline only sees this trait, which keeps it testable
/// without spawning real processes.
pub trait NodeTools {
    /// Resolve the local node name.
    fn hostname(&self) -> Result<String>;
    /// List the storage pools visible on `node`.
    fn storage_pools(&self, node: &str) -> Result<Vec<StorageRecord>>;
    /// Virtual size in bytes of the image at `path`; 0 when undeterminable.
    fn image_virtual_size(&self, path: &Utf8Path) -> Result<u64>;
}

/// Tool access on the current host via subprocess invocation.
#[derive(Debug, Default)]
pub struct LocalNode;

impl NodeTools for LocalNode {
    fn hostname(&self) -> Result<String> {
        let out = Command::new("hostname")
            .run_capture_stdout()
            .context("Failed to resolve the node name")?;
        Ok(out.trim().to_string())
    }

    fn storage_pools(&self, node: &str) -> Result<Vec<StorageRecord>> {
        pvesh::node_storage(node)
    }

    fn image_virtual_size(&self, path: &Utf8Path) -> Result<u64> {
        qemu_img::virtual_size(path)
    }
}
