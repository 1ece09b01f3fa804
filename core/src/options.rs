use crate::error::{E2Error, E2Result};
use serde::{Deserialize, Serialize};

/// How large each on-disk inode record is taken to be
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InodeSize {
    /// Fixed 128-byte records, the ext2 revision 0 layout
    Classic,
    /// Use `s_inode_size` from the superblock when the revision is dynamic
    FromSuperblock,
}

/// Options for an inspection session, fixed at open time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InspectOptions {
    pub check_magic: bool,
    pub inode_size: InodeSize,
    pub cache_group_descriptors: bool,
    pub scan_workers: usize,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            check_magic: true,
            inode_size: InodeSize::Classic,
            cache_group_descriptors: false,
            scan_workers: 1,
        }
    }
}

impl InspectOptions {
    /// Load options from a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> E2Result<Self> {
        serde_json::from_str(json).map_err(|e| E2Error::Configuration(e.to_string()))
    }

    /// Worker count clamped to at least one thread
    pub fn workers(&self) -> usize {
        self.scan_workers.max(1)
    }
}
