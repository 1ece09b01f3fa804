// Test helpers for building synthetic ext2 images in memory
// Layout per group: block bitmap, inode bitmap, inode table, then data.
// Group 0 additionally holds the superblock and a single-block descriptor table.

use crate::ext2::constants::*;
use crate::ext2::endian::{le_u32, put_le_u32};
use crate::ext2::reader::BlockPath;
use crate::ext2::structures::{GroupDescriptor, Inode, Superblock};
use e2probe_core::MemoryImage;

/// Builder for small, well-formed ext2 images
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    superblock: Superblock,
    groups: Vec<GroupDescriptor>,
    image: Vec<u8>,
    next_block: u32,
}

impl ImageBuilder {
    /// Empty filesystem with `group_count` full groups
    pub fn new(block_size: u32, group_count: u32, blocks_per_group: u32, inodes_per_group: u32) -> Self {
        assert!(block_size.is_power_of_two() && block_size >= BASE_BLOCK_SIZE);
        assert!(blocks_per_group <= block_size * 8, "bitmap must fit in one block");
        assert!(
            group_count as usize * GROUP_DESC_SIZE <= block_size as usize,
            "descriptor table must fit in one block"
        );

        let first_data_block = if block_size == BASE_BLOCK_SIZE { 1 } else { 0 };
        let superblock = Superblock {
            inodes_count: group_count * inodes_per_group,
            blocks_count: first_data_block + group_count * blocks_per_group,
            first_data_block,
            log_block_size: (block_size / BASE_BLOCK_SIZE).trailing_zeros(),
            blocks_per_group,
            inodes_per_group,
            magic: EXT2_SUPER_MAGIC,
            state: STATE_CLEAN,
            rev_level: GOOD_OLD_REV,
            inode_size: CLASSIC_INODE_SIZE as u16,
        };

        let mut builder = ImageBuilder {
            superblock,
            groups: Vec::new(),
            image: Vec::new(),
            next_block: 0,
        };
        builder.layout();
        builder
    }

    /// Switch to a dynamic-revision filesystem with larger inode records.
    /// Resets any content written so far.
    pub fn with_inode_size(mut self, inode_size: u16) -> Self {
        self.superblock.rev_level = DYNAMIC_REV;
        self.superblock.inode_size = inode_size;
        self.layout();
        self
    }

    fn layout(&mut self) {
        let sb = self.superblock;
        let block_size = sb.block_size() as usize;
        let record_size = self.record_size();
        let table_blocks =
            ((sb.inodes_per_group as usize * record_size + block_size - 1) / block_size) as u32;

        self.image = vec![0u8; sb.blocks_count as usize * block_size];
        self.groups = (0..sb.group_count())
            .map(|group| {
                let base = if group == 0 {
                    sb.first_data_block + 2
                } else {
                    sb.first_data_block + group * sb.blocks_per_group
                };
                GroupDescriptor {
                    block_bitmap: base,
                    inode_bitmap: base + 1,
                    inode_table: base + 2,
                }
            })
            .collect();

        for block in sb.first_data_block..self.groups[0].block_bitmap {
            self.mark_allocated(block);
        }
        for desc in self.groups.clone() {
            for block in desc.block_bitmap..desc.inode_table + table_blocks {
                self.mark_allocated(block);
            }
        }
        self.next_block = self.groups[0].inode_table + table_blocks;
    }

    fn record_size(&self) -> usize {
        if self.superblock.rev_level >= DYNAMIC_REV {
            self.superblock.inode_size as usize
        } else {
            CLASSIC_INODE_SIZE
        }
    }

    fn block_size(&self) -> usize {
        self.superblock.block_size() as usize
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// Direct access for building deliberately damaged superblocks
    pub fn superblock_mut(&mut self) -> &mut Superblock {
        &mut self.superblock
    }

    pub fn group(&self, group: u32) -> GroupDescriptor {
        self.groups[group as usize]
    }

    fn bitmap_position(&self, block: u32) -> (usize, u8) {
        let sb = &self.superblock;
        let relative = block - sb.first_data_block;
        let desc = self.groups[(relative / sb.blocks_per_group) as usize];
        let index = relative % sb.blocks_per_group;
        let byte = desc.block_bitmap as usize * self.block_size() + (index / 8) as usize;
        (byte, 1 << (index % 8))
    }

    pub fn mark_allocated(&mut self, block: u32) {
        let (byte, mask) = self.bitmap_position(block);
        self.image[byte] |= mask;
    }

    pub fn mark_free(&mut self, block: u32) {
        let (byte, mask) = self.bitmap_position(block);
        self.image[byte] &= !mask;
    }

    pub fn is_allocated(&self, block: u32) -> bool {
        let (byte, mask) = self.bitmap_position(block);
        self.image[byte] & mask != 0
    }

    /// Allocate the next free block in bitmap order
    pub fn alloc_block(&mut self) -> u32 {
        while self.next_block < self.superblock.blocks_count {
            let block = self.next_block;
            self.next_block += 1;
            if !self.is_allocated(block) {
                self.mark_allocated(block);
                return block;
            }
        }
        panic!("synthetic image is full");
    }

    /// Copy `data` (at most one block) to the start of `block`
    pub fn write_block(&mut self, block: u32, data: &[u8]) {
        assert!(data.len() <= self.block_size());
        let start = block as usize * self.block_size();
        self.image[start..start + data.len()].copy_from_slice(data);
    }

    pub fn write_inode(&mut self, inode_num: u32, inode: &Inode) {
        let ipg = self.superblock.inodes_per_group;
        let desc = self.groups[((inode_num - 1) / ipg) as usize];
        let index = ((inode_num - 1) % ipg) as usize;
        let start = desc.inode_table as usize * self.block_size() + index * self.record_size();
        self.image[start..start + CLASSIC_INODE_SIZE].copy_from_slice(&inode.encode());
    }

    /// Point logical block `logical` of `inode` at `phys`, allocating pointer
    /// blocks along the way
    pub fn map_block(&mut self, inode: &mut Inode, logical: u64, phys: u32) {
        let ppb = self.superblock.pointers_per_block() as u64;
        let path = BlockPath::new(logical, ppb).expect("logical block beyond triple indirection");

        if path.depth() == 0 {
            inode.set_block_slot(path.slot, phys);
            return;
        }

        let mut table = inode.block_slot(path.slot);
        if table == 0 {
            table = self.alloc_block();
            inode.set_block_slot(path.slot, table);
        }

        let offsets = path.offsets().to_vec();
        for (level, offset) in offsets.iter().enumerate() {
            let entry = table as usize * self.block_size() + *offset as usize * POINTER_SIZE;
            if level + 1 == offsets.len() {
                put_le_u32(&mut self.image, entry, phys);
            } else {
                let mut next = le_u32(&self.image, entry);
                if next == 0 {
                    next = self.alloc_block();
                    put_le_u32(&mut self.image, entry, next);
                }
                table = next;
            }
        }
    }

    /// Store a regular file with contiguous content as inode `inode_num`
    pub fn add_file(&mut self, inode_num: u32, data: &[u8]) -> Inode {
        let mut inode = Self::regular_inode(data.len() as u32);
        for (logical, chunk) in data.chunks(self.block_size()).enumerate() {
            let phys = self.alloc_block();
            self.write_block(phys, chunk);
            self.map_block(&mut inode, logical as u64, phys);
        }
        self.write_inode(inode_num, &inode);
        inode
    }

    /// Store a file of `size` bytes where only the listed logical blocks exist
    pub fn add_sparse_file(&mut self, inode_num: u32, size: u32, populated: &[(u64, Vec<u8>)]) -> Inode {
        let mut inode = Self::regular_inode(size);
        for (logical, chunk) in populated {
            let phys = self.alloc_block();
            self.write_block(phys, chunk);
            self.map_block(&mut inode, *logical, phys);
        }
        self.write_inode(inode_num, &inode);
        inode
    }

    fn regular_inode(size: u32) -> Inode {
        Inode {
            mode: S_IFREG | 0o644,
            uid: 1000,
            size,
            atime: 1_700_000_000,
            ctime: 1_700_000_000,
            mtime: 1_700_000_000,
            gid: 1000,
            links_count: 1,
            ..Default::default()
        }
    }

    /// Finish the image: write superblock and descriptor table
    pub fn build(mut self) -> MemoryImage {
        let start = SUPERBLOCK_OFFSET as usize;
        self.image[start..start + SUPERBLOCK_SIZE].copy_from_slice(&self.superblock.encode());

        let table = (self.superblock.first_data_block as usize + 1) * self.block_size();
        for (group, desc) in self.groups.iter().enumerate() {
            let offset = table + group * GROUP_DESC_SIZE;
            self.image[offset..offset + GROUP_DESC_SIZE].copy_from_slice(&desc.encode());
        }

        MemoryImage::new(self.image)
    }
}
