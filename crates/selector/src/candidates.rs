//! Candidate ranking for storage selection
//!
//! Eligible pools are sorted by free space so automatic and interactive
//! selection both see the same ordering.

use crate::pvesh::{StorageRecord, StorageType};

/// Safety margin added on top of an image's virtual size, absorbing
/// filesystem and thin-provisioning overhead.
pub const MARGIN_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// An eligible storage pool, annotated for display and selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Free bytes as reported by the inventory.
    pub avail: u64,
    /// Pool identifier emitted on selection.
    pub storage: String,
    /// Backend type, carried for display.
    pub ty: StorageType,
    /// Whether `avail` covers the requirement.
    pub fits: bool,
}

impl Candidate {
    /// One-line summary used in menus, e.g. `tank (zfspool, free 12.5 GiB)`.
    pub fn label(&self) -> String {
        let free_gib = self.avail as f64 / (1024.0 * 1024.0 * 1024.0);
        let mut label = format!("{} ({}, free {free_gib:.1} GiB)", self.storage, self.ty);
        if !self.fits {
            label.push_str(" [INSUFFICIENT SPACE]");
        }
        label
    }
}

/// Bytes the target pool must provide for an image of the given virtual
/// size; `None` means no image was supplied and nothing is enforced.
pub fn required_bytes(image_virtual_size: Option<u64>) -> u64 {
    match image_virtual_size {
        Some(size) => size + MARGIN_BYTES,
        None => 0,
    }
}

/// Filter the inventory down to eligible pools and rank them by free
/// space, largest first. The sort is stable, so pools reporting identical
/// figures keep their inventory order.
pub fn rank(records: Vec<StorageRecord>, required_bytes: u64) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = records
        .into_iter()
        .filter(StorageRecord::is_eligible)
        .map(|r| Candidate {
            fits: required_bytes == 0 || r.avail >= required_bytes,
            avail: r.avail,
            storage: r.storage,
            ty: r.ty,
        })
        .collect();
    candidates.sort_by(|a, b| b.avail.cmp(&a.avail));
    candidates
}

/// Index taken when nobody chooses: the first candidate that fits, else
/// the largest pool even though it falls short.
pub fn default_index(candidates: &[Candidate]) -> usize {
    candidates.iter().position(|c| c.fits).unwrap_or(0)
}
