// ext2 metadata engine
// Superblock, group descriptor and inode decoding, block resolution through
// indirect pointers, bitmap queries and pointer-block heuristics.

pub mod constants;
pub mod endian;
pub mod reader;
pub mod structures;

pub use reader::{
    looks_like_indirect_block, BlockPath, Ext2Reader, FileContent, IndirectCandidate,
    IndirectKind, ScanRange,
};
pub use structures::{FileType, GroupDescriptor, Inode, Superblock};
