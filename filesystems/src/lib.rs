// Read-only ext2 image inspection
pub mod ext2;

/// Synthetic image construction for tests and fixtures
#[doc(hidden)]
pub mod test_helpers;

pub use e2probe_core::{E2Error, E2Result, FileImage, ImageDevice, InspectOptions, MemoryImage};
pub use ext2::{
    looks_like_indirect_block, BlockPath, Ext2Reader, FileContent, FileType, GroupDescriptor,
    IndirectCandidate, IndirectKind, Inode, ScanRange, Superblock,
};
