//! Disk image inspection via qemu-img

use camino::Utf8Path;
use color_eyre::eyre::Context;
use color_eyre::Result;
use serde::Deserialize;
use std::process::Command;
use tracing::debug;

use crate::cmdext::CommandRunExt;

/// Subset of `qemu-img info --output=json` that we consume.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QemuImgInfo {
    /// Virtual size of the disk image in bytes.
    pub virtual_size: u64,
}

/// Determine the virtual size of the disk image at `path`.
///
/// A missing file or a missing qemu-img binary degrades to a size of zero
/// so callers can still offer a selection; genuine inspection failures are
/// propagated.
pub fn virtual_size(path: &Utf8Path) -> Result<u64> {
    if !path.exists() {
        debug!("image {path} does not exist, assuming size 0");
        return Ok(0);
    }
    let info: Result<QemuImgInfo, _> = Command::new("qemu-img")
        .args(["info", "--output=json", path.as_str()])
        .run_and_parse_json();
    match info {
        Ok(info) => Ok(info.virtual_size),
        Err(err) if err.is_not_found() => {
            debug!("qemu-img is not installed, assuming size 0 for {path}");
            Ok(0)
        }
        Err(err) => Err(err).with_context(|| format!("Failed to inspect image {path}")),
    }
}
