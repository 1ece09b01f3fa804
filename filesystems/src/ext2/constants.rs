// ext2 on-disk constants (revision 0/1 subset)

/// Byte offset of the primary superblock, independent of block size
pub const SUPERBLOCK_OFFSET: u64 = 1024;
pub const SUPERBLOCK_SIZE: usize = 1024;
pub const EXT2_SUPER_MAGIC: u16 = 0xEF53;

/// Smallest block size; real block size is `BASE_BLOCK_SIZE << s_log_block_size`
pub const BASE_BLOCK_SIZE: u32 = 1024;
/// Largest log block size we accept (64 KiB blocks)
pub const MAX_LOG_BLOCK_SIZE: u32 = 6;

pub const GROUP_DESC_SIZE: usize = 32;
pub const CLASSIC_INODE_SIZE: usize = 128;

pub const DIRECT_BLOCKS: usize = 12;
pub const IND_BLOCK: usize = DIRECT_BLOCKS;
pub const DIND_BLOCK: usize = IND_BLOCK + 1;
pub const TIND_BLOCK: usize = DIND_BLOCK + 1;
pub const N_BLOCKS: usize = TIND_BLOCK + 1;

/// Block pointers are 32-bit
pub const POINTER_SIZE: usize = 4;

pub const STATE_CLEAN: u16 = 1;

pub const GOOD_OLD_REV: u32 = 0;
pub const DYNAMIC_REV: u32 = 1;

pub const ROOT_INO: u32 = 2;

// Superblock field offsets
pub const SB_INODES_COUNT: usize = 0x00;
pub const SB_BLOCKS_COUNT: usize = 0x04;
pub const SB_FIRST_DATA_BLOCK: usize = 0x14;
pub const SB_LOG_BLOCK_SIZE: usize = 0x18;
pub const SB_BLOCKS_PER_GROUP: usize = 0x20;
pub const SB_INODES_PER_GROUP: usize = 0x28;
pub const SB_MAGIC: usize = 0x38;
pub const SB_STATE: usize = 0x3A;
pub const SB_REV_LEVEL: usize = 0x4C;
pub const SB_INODE_SIZE: usize = 0x58;

// Group descriptor field offsets
pub const BG_BLOCK_BITMAP: usize = 0x00;
pub const BG_INODE_BITMAP: usize = 0x04;
pub const BG_INODE_TABLE: usize = 0x08;

// Inode field offsets
pub const I_MODE: usize = 0x00;
pub const I_UID: usize = 0x02;
pub const I_SIZE: usize = 0x04;
pub const I_ATIME: usize = 0x08;
pub const I_CTIME: usize = 0x0C;
pub const I_MTIME: usize = 0x10;
pub const I_DTIME: usize = 0x14;
pub const I_GID: usize = 0x18;
pub const I_LINKS_COUNT: usize = 0x1A;
pub const I_BLOCK: usize = 0x28;

// File type bits of i_mode
pub const S_IFMT: u16 = 0xF000;
pub const S_IFSOCK: u16 = 0xC000;
pub const S_IFLNK: u16 = 0xA000;
pub const S_IFREG: u16 = 0x8000;
pub const S_IFBLK: u16 = 0x6000;
pub const S_IFDIR: u16 = 0x4000;
pub const S_IFCHR: u16 = 0x2000;
pub const S_IFIFO: u16 = 0x1000;

static_assertions::const_assert_eq!(N_BLOCKS, 15);
static_assertions::const_assert!(I_BLOCK + N_BLOCKS * POINTER_SIZE <= CLASSIC_INODE_SIZE);
static_assertions::const_assert!(SB_INODE_SIZE + 2 <= SUPERBLOCK_SIZE);
static_assertions::const_assert!(BG_INODE_TABLE + 4 <= GROUP_DESC_SIZE);
