// ext2 on-disk structures
// Only the fields the resolution engine needs are decoded; everything else in
// the records is skipped by offset.

use super::constants::*;
use super::endian::{le_u16, le_u32, put_le_u16, put_le_u32};
use chrono::{DateTime, Utc};
use e2probe_core::{E2Error, E2Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Filesystem-wide parameters, read once when an image is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub magic: u16,
    pub state: u16,
    pub rev_level: u32,
    /// Only meaningful when `rev_level >= DYNAMIC_REV`
    pub inode_size: u16,
}

impl Superblock {
    /// Decode the 1024-byte superblock region.
    ///
    /// Rejects group sizes of zero (every group computation divides by them),
    /// block sizes the format cannot express, and groups with more blocks
    /// than one bitmap block can describe. The magic number is left to
    /// the caller since forensic images sometimes carry a damaged one.
    pub fn parse(raw: &[u8; SUPERBLOCK_SIZE]) -> E2Result<Self> {
        let sb = Superblock {
            inodes_count: le_u32(raw, SB_INODES_COUNT),
            blocks_count: le_u32(raw, SB_BLOCKS_COUNT),
            first_data_block: le_u32(raw, SB_FIRST_DATA_BLOCK),
            log_block_size: le_u32(raw, SB_LOG_BLOCK_SIZE),
            blocks_per_group: le_u32(raw, SB_BLOCKS_PER_GROUP),
            inodes_per_group: le_u32(raw, SB_INODES_PER_GROUP),
            magic: le_u16(raw, SB_MAGIC),
            state: le_u16(raw, SB_STATE),
            rev_level: le_u32(raw, SB_REV_LEVEL),
            inode_size: le_u16(raw, SB_INODE_SIZE),
        };

        if sb.blocks_per_group == 0 {
            return Err(E2Error::corrupt("blocks per group is zero"));
        }
        if sb.inodes_per_group == 0 {
            return Err(E2Error::corrupt("inodes per group is zero"));
        }
        if sb.log_block_size > MAX_LOG_BLOCK_SIZE {
            return Err(E2Error::corrupt(format!(
                "log block size {} exceeds {}",
                sb.log_block_size, MAX_LOG_BLOCK_SIZE
            )));
        }
        // A group's block bitmap is exactly one block
        let bitmap_bits = sb.block_size() as u64 * 8;
        if sb.blocks_per_group as u64 > bitmap_bits {
            return Err(E2Error::corrupt(format!(
                "{} blocks per group exceeds the {} bits of one bitmap block",
                sb.blocks_per_group, bitmap_bits
            )));
        }

        Ok(sb)
    }

    /// Encode into a superblock region. Fields this type does not carry are zero.
    pub fn encode(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut raw = [0u8; SUPERBLOCK_SIZE];
        put_le_u32(&mut raw, SB_INODES_COUNT, self.inodes_count);
        put_le_u32(&mut raw, SB_BLOCKS_COUNT, self.blocks_count);
        put_le_u32(&mut raw, SB_FIRST_DATA_BLOCK, self.first_data_block);
        put_le_u32(&mut raw, SB_LOG_BLOCK_SIZE, self.log_block_size);
        put_le_u32(&mut raw, SB_BLOCKS_PER_GROUP, self.blocks_per_group);
        put_le_u32(&mut raw, SB_INODES_PER_GROUP, self.inodes_per_group);
        put_le_u16(&mut raw, SB_MAGIC, self.magic);
        put_le_u16(&mut raw, SB_STATE, self.state);
        put_le_u32(&mut raw, SB_REV_LEVEL, self.rev_level);
        put_le_u16(&mut raw, SB_INODE_SIZE, self.inode_size);
        raw
    }

    pub fn block_size(&self) -> u32 {
        BASE_BLOCK_SIZE << self.log_block_size
    }

    /// Number of 32-bit pointers held by one indirect block
    pub fn pointers_per_block(&self) -> u32 {
        self.block_size() / POINTER_SIZE as u32
    }

    /// Block groups implied by the block count
    pub fn group_count(&self) -> u32 {
        let data_blocks = self.blocks_count.saturating_sub(self.first_data_block) as u64;
        let per_group = self.blocks_per_group as u64;
        ((data_blocks + per_group - 1) / per_group) as u32
    }

    /// Number of logical blocks a single inode can address through
    /// direct, singly-, doubly- and triply-indirect pointers
    pub fn max_file_blocks(&self) -> u64 {
        let ppb = self.pointers_per_block() as u64;
        DIRECT_BLOCKS as u64 + ppb + ppb * ppb + ppb * ppb * ppb
    }

    pub fn is_clean(&self) -> bool {
        self.state == STATE_CLEAN
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == EXT2_SUPER_MAGIC
    }

    /// True when `block` can hold data on this filesystem
    pub fn contains_block(&self, block: u64) -> bool {
        block >= self.first_data_block as u64 && block < self.blocks_count as u64
    }
}

impl fmt::Display for Superblock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Inodes: {}", self.inodes_count)?;
        writeln!(f, "Blocks: {}", self.blocks_count)?;
        writeln!(f, "First data block: {}", self.first_data_block)?;
        writeln!(f, "Block size: {}", self.block_size())?;
        writeln!(f, "Blocks/group: {}", self.blocks_per_group)?;
        writeln!(f, "Inodes/group: {}", self.inodes_per_group)?;
        writeln!(f, "State: {}", if self.is_clean() { "Clean" } else { "Dirty" })
    }
}

/// Block group descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub block_bitmap: u32,
    pub inode_bitmap: u32,
    pub inode_table: u32,
}

impl GroupDescriptor {
    pub fn parse(raw: &[u8; GROUP_DESC_SIZE]) -> Self {
        GroupDescriptor {
            block_bitmap: le_u32(raw, BG_BLOCK_BITMAP),
            inode_bitmap: le_u32(raw, BG_INODE_BITMAP),
            inode_table: le_u32(raw, BG_INODE_TABLE),
        }
    }

    pub fn encode(&self) -> [u8; GROUP_DESC_SIZE] {
        let mut raw = [0u8; GROUP_DESC_SIZE];
        put_le_u32(&mut raw, BG_BLOCK_BITMAP, self.block_bitmap);
        put_le_u32(&mut raw, BG_INODE_BITMAP, self.inode_bitmap);
        put_le_u32(&mut raw, BG_INODE_TABLE, self.inode_table);
        raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Unknown,
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Symlink,
}

impl From<u16> for FileType {
    fn from(mode: u16) -> Self {
        match mode & S_IFMT {
            S_IFREG => FileType::Regular,
            S_IFDIR => FileType::Directory,
            S_IFCHR => FileType::CharDevice,
            S_IFBLK => FileType::BlockDevice,
            S_IFIFO => FileType::Fifo,
            S_IFSOCK => FileType::Socket,
            S_IFLNK => FileType::Symlink,
            _ => FileType::Unknown,
        }
    }
}

/// Decoded inode record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub mode: u16,
    pub uid: u16,
    /// Byte length of the file content
    pub size: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    pub gid: u16,
    pub links_count: u16,
    /// Physical blocks of logical blocks 0..12; unused entries are 0
    pub direct_blocks: [u32; DIRECT_BLOCKS],
    pub indirect_1: u32,
    pub indirect_2: u32,
    pub indirect_3: u32,
}

impl Inode {
    pub fn parse(raw: &[u8; CLASSIC_INODE_SIZE]) -> Self {
        let mut direct_blocks = [0u32; DIRECT_BLOCKS];
        for (i, block) in direct_blocks.iter_mut().enumerate() {
            *block = le_u32(raw, I_BLOCK + i * POINTER_SIZE);
        }

        Inode {
            mode: le_u16(raw, I_MODE),
            uid: le_u16(raw, I_UID),
            size: le_u32(raw, I_SIZE),
            atime: le_u32(raw, I_ATIME),
            ctime: le_u32(raw, I_CTIME),
            mtime: le_u32(raw, I_MTIME),
            dtime: le_u32(raw, I_DTIME),
            gid: le_u16(raw, I_GID),
            links_count: le_u16(raw, I_LINKS_COUNT),
            direct_blocks,
            indirect_1: le_u32(raw, I_BLOCK + IND_BLOCK * POINTER_SIZE),
            indirect_2: le_u32(raw, I_BLOCK + DIND_BLOCK * POINTER_SIZE),
            indirect_3: le_u32(raw, I_BLOCK + TIND_BLOCK * POINTER_SIZE),
        }
    }

    pub fn encode(&self) -> [u8; CLASSIC_INODE_SIZE] {
        let mut raw = [0u8; CLASSIC_INODE_SIZE];
        put_le_u16(&mut raw, I_MODE, self.mode);
        put_le_u16(&mut raw, I_UID, self.uid);
        put_le_u32(&mut raw, I_SIZE, self.size);
        put_le_u32(&mut raw, I_ATIME, self.atime);
        put_le_u32(&mut raw, I_CTIME, self.ctime);
        put_le_u32(&mut raw, I_MTIME, self.mtime);
        put_le_u32(&mut raw, I_DTIME, self.dtime);
        put_le_u16(&mut raw, I_GID, self.gid);
        put_le_u16(&mut raw, I_LINKS_COUNT, self.links_count);
        for slot in 0..N_BLOCKS {
            put_le_u32(&mut raw, I_BLOCK + slot * POINTER_SIZE, self.block_slot(slot));
        }
        raw
    }

    /// Entry `slot` of the 15-entry i_block array (12 direct, then 3 indirect roots)
    pub fn block_slot(&self, slot: usize) -> u32 {
        match slot {
            IND_BLOCK => self.indirect_1,
            DIND_BLOCK => self.indirect_2,
            TIND_BLOCK => self.indirect_3,
            _ => self.direct_blocks.get(slot).copied().unwrap_or(0),
        }
    }

    pub fn set_block_slot(&mut self, slot: usize, block: u32) {
        match slot {
            IND_BLOCK => self.indirect_1 = block,
            DIND_BLOCK => self.indirect_2 = block,
            TIND_BLOCK => self.indirect_3 = block,
            _ => {
                if let Some(entry) = self.direct_blocks.get_mut(slot) {
                    *entry = block;
                }
            }
        }
    }

    /// Logical blocks covered by `size`, rounding a partial tail up
    pub fn block_count(&self, block_size: u32) -> u64 {
        (self.size as u64 + block_size as u64 - 1) / block_size as u64
    }

    pub fn file_type(&self) -> FileType {
        FileType::from(self.mode)
    }
}

/// Render a Unix timestamp like C's ctime(3), in UTC
fn format_timestamp(secs: u32) -> String {
    match DateTime::<Utc>::from_timestamp(secs as i64, 0) {
        Some(dt) => dt.format("%a %b %e %H:%M:%S %Y").to_string(),
        None => secs.to_string(),
    }
}

impl fmt::Display for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode: {:o}", self.mode)?;
        writeln!(f, "User ID: {}", self.uid)?;
        writeln!(f, "Size: {}", self.size)?;
        writeln!(f, "Access time: {}", format_timestamp(self.atime))?;
        writeln!(f, "Change time: {}", format_timestamp(self.ctime))?;
        writeln!(f, "Modification time: {}", format_timestamp(self.mtime))?;
        writeln!(f, "Deletion time: {}", format_timestamp(self.dtime))?;
        writeln!(f, "First direct block: {}", self.direct_blocks[0])
    }
}
