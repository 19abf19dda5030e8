//! Storage target selection for Proxmox VE nodes.
//!
//! pvesel inspects the local node's storage inventory and picks the pool a
//! new VM disk image should land on, either automatically or through an
//! interactive menu. Modules are re-exported here so the binary, the xtask
//! docs generator, and the integration tests share one implementation.

pub mod candidates;
pub mod cmdext;
pub mod node;
pub mod prompt;
pub mod pvesh;
pub mod qemu_img;
pub mod select;
