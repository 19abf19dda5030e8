//! Storage pool inventory via the Proxmox API client
//!
//! The node storage index comes from `pvesh get /nodes/<node>/storage`.
//! Field encodings vary across Proxmox releases (booleans as 0/1 integers,
//! byte counts as strings, fields omitted entirely), so deserialization
//! here is deliberately tolerant.

use color_eyre::eyre::Context;
use color_eyre::Result;
use serde::{Deserialize, Deserializer};
use std::process::Command;
use tracing::debug;

use crate::cmdext::CommandRunExt;

/// Storage backend types as reported in the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StorageType {
    /// ZFS dataset-backed pool.
    Zfspool,
    /// LVM thin pool.
    Lvmthin,
    /// Plain LVM volume group.
    Lvm,
    /// Everything else (dir, nfs, pbs, ...); never a selection target.
    Other,
}

impl StorageType {
    /// Whether this backend provides block storage for VM disk images.
    pub fn is_block_backend(&self) -> bool {
        matches!(
            self,
            StorageType::Zfspool | StorageType::Lvmthin | StorageType::Lvm
        )
    }
}

/// One storage pool entry from the node storage index.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageRecord {
    /// Pool identifier, unique per node.
    pub storage: String,
    /// Backend type.
    #[serde(rename = "type", deserialize_with = "de_storage_type")]
    pub ty: StorageType,
    /// Administratively enabled. The API omits this field for enabled pools.
    #[serde(default = "default_true", deserialize_with = "de_flag")]
    pub enabled: bool,
    /// Currently activated on this node.
    #[serde(default, deserialize_with = "de_flag")]
    pub active: bool,
    /// Comma-delimited capability list, e.g. "images,rootdir".
    #[serde(default)]
    pub content: String,
    /// Free bytes as last reported; best effort and possibly stale.
    #[serde(default, deserialize_with = "de_bytes")]
    pub avail: u64,
}

impl StorageRecord {
    /// Whether the capability list grants the "images" content type.
    pub fn supports_images(&self) -> bool {
        self.content.split(',').any(|c| c.trim() == "images")
    }

    /// Pools that can hold a VM disk image at all.
    pub fn is_eligible(&self) -> bool {
        self.enabled && self.active && self.ty.is_block_backend() && self.supports_images()
    }
}

fn default_true() -> bool {
    true
}

/// Unknown backend names map to [`StorageType::Other`] rather than failing.
fn de_storage_type<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StorageType, D::Error> {
    let name = String::deserialize(deserializer)?;
    Ok(match name.as_str() {
        "zfspool" => StorageType::Zfspool,
        "lvmthin" => StorageType::Lvmthin,
        "lvm" => StorageType::Lvm,
        _ => StorageType::Other,
    })
}

/// Accept both JSON booleans and the 0/1 integers pvesh emits.
fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
    })
}

/// Accept byte counts as JSON numbers or numeric strings.
fn de_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Bytes {
        Num(u64),
        Str(String),
    }
    match Bytes::deserialize(deserializer)? {
        Bytes::Num(n) => Ok(n),
        Bytes::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Fetch the storage index for `node`.
pub fn node_storage(node: &str) -> Result<Vec<StorageRecord>> {
    let records: Vec<StorageRecord> = Command::new("pvesh")
        .args([
            "get",
            &format!("/nodes/{node}/storage"),
            "--output-format",
            "json",
        ])
        .run_and_parse_json()
        .with_context(|| format!("Failed to list storage pools on node '{node}'"))?;
    debug!("inventory reported {} pools on {node}", records.len());
    Ok(records)
}
