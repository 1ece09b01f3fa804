// ext2 image reader
// Decodes superblock, group descriptors and inodes straight from a raw image
// without mounting it. Nothing is ever written back.

use super::constants::*;
use super::structures::{GroupDescriptor, Inode, Superblock};
use e2probe_core::{E2Error, E2Result, FileImage, ImageDevice, InodeSize, InspectOptions};
use log::{debug, info, warn};
use std::path::Path;

mod bitmap;
mod content;
mod heuristics;
mod recovery;
mod resolve;

pub use content::FileContent;
pub use heuristics::looks_like_indirect_block;
pub use recovery::{IndirectCandidate, IndirectKind, ScanRange};
pub use resolve::BlockPath;

/// Read-only view of an ext2 filesystem image
pub struct Ext2Reader<D: ImageDevice> {
    device: D,
    superblock: Superblock,
    options: InspectOptions,
    inode_size: usize,
    // Snapshot of the descriptor table when `cache_group_descriptors` is set
    group_descriptors: Option<Vec<GroupDescriptor>>,
}

impl Ext2Reader<FileImage> {
    /// Open an image file on disk
    pub fn open_path(path: impl AsRef<Path>, options: InspectOptions) -> E2Result<Self> {
        let device = FileImage::open(path)?;
        Self::open(device, options)
    }
}

impl<D: ImageDevice> Ext2Reader<D> {
    /// Open a filesystem session over `device`, decoding the superblock
    pub fn open(device: D, options: InspectOptions) -> E2Result<Self> {
        let info = device.info();
        info!("Opening ext2 image {:?} ({} bytes)", info.path, info.size);

        let superblock = Self::read_superblock(&device)?;

        if !superblock.has_valid_magic() {
            if options.check_magic {
                return Err(E2Error::corrupt(format!(
                    "invalid magic 0x{:04X}, expected 0x{:04X}",
                    superblock.magic, EXT2_SUPER_MAGIC
                )));
            }
            warn!("Superblock magic is 0x{:04X}, continuing anyway", superblock.magic);
        }
        if !superblock.is_clean() {
            warn!("Filesystem state is {} (not cleanly unmounted)", superblock.state);
        }

        let inode_size = Self::inode_record_size(&superblock, options.inode_size)?;

        info!(
            "ext2: {} blocks of {} bytes, {} inodes, {} groups",
            superblock.blocks_count,
            superblock.block_size(),
            superblock.inodes_count,
            superblock.group_count()
        );

        let mut reader = Ext2Reader {
            device,
            superblock,
            options,
            inode_size,
            group_descriptors: None,
        };

        if reader.options.cache_group_descriptors {
            let table = (0..reader.superblock.group_count())
                .map(|group| reader.read_group_descriptor(group))
                .collect::<E2Result<Vec<_>>>()?;
            debug!("Cached {} group descriptors", table.len());
            reader.group_descriptors = Some(table);
        }

        Ok(reader)
    }

    /// Open with default options
    pub fn with_defaults(device: D) -> E2Result<Self> {
        Self::open(device, InspectOptions::default())
    }

    fn read_superblock(device: &D) -> E2Result<Superblock> {
        let mut raw = [0u8; SUPERBLOCK_SIZE];
        device.read_exact_at(SUPERBLOCK_OFFSET, &mut raw)?;
        Superblock::parse(&raw)
    }

    fn inode_record_size(sb: &Superblock, policy: InodeSize) -> E2Result<usize> {
        match policy {
            InodeSize::Classic => Ok(CLASSIC_INODE_SIZE),
            InodeSize::FromSuperblock if sb.rev_level < DYNAMIC_REV => Ok(CLASSIC_INODE_SIZE),
            InodeSize::FromSuperblock => {
                let size = sb.inode_size as usize;
                if size < CLASSIC_INODE_SIZE
                    || !size.is_power_of_two()
                    || size > sb.block_size() as usize
                {
                    return Err(E2Error::corrupt(format!("invalid inode size {}", size)));
                }
                Ok(size)
            }
        }
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn options(&self) -> &InspectOptions {
        &self.options
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn block_size(&self) -> u32 {
        self.superblock.block_size()
    }

    /// Size of one inode table record in bytes
    pub fn inode_size(&self) -> usize {
        self.inode_size
    }

    /// Read `length` bytes starting at an absolute byte offset
    pub fn read_bytes(&self, offset: u64, length: usize) -> E2Result<Vec<u8>> {
        let mut buffer = vec![0u8; length];
        self.device.read_exact_at(offset, &mut buffer)?;
        Ok(buffer)
    }

    fn block_offset(&self, block: u64) -> E2Result<u64> {
        block
            .checked_mul(self.block_size() as u64)
            .ok_or(E2Error::InvalidBlock {
                block,
                first_data_block: self.superblock.first_data_block,
                block_count: self.superblock.blocks_count,
            })
    }

    /// Read one whole block by physical block number
    pub fn read_block(&self, block: u64) -> E2Result<Vec<u8>> {
        let offset = self.block_offset(block)?;
        self.read_bytes(offset, self.block_size() as usize)
    }

    /// Read a block into a caller-provided buffer of one block
    pub fn read_block_into(&self, block: u64, buf: &mut [u8]) -> E2Result<()> {
        let offset = self.block_offset(block)?;
        self.device.read_exact_at(offset, buf)
    }

    /// Decode the descriptor for block group `group`
    pub fn group_descriptor(&self, group: u32) -> E2Result<GroupDescriptor> {
        let group_count = self.superblock.group_count();
        if group >= group_count {
            return Err(E2Error::InvalidGroup {
                group: group as u64,
                group_count,
            });
        }

        match &self.group_descriptors {
            Some(table) => Ok(table[group as usize]),
            None => self.read_group_descriptor(group),
        }
    }

    fn read_group_descriptor(&self, group: u32) -> E2Result<GroupDescriptor> {
        // The table starts in the block after the one holding the superblock
        let table_block = self.superblock.first_data_block as u64 + 1;
        let offset = table_block * self.block_size() as u64
            + group as u64 * GROUP_DESC_SIZE as u64;

        let mut raw = [0u8; GROUP_DESC_SIZE];
        self.device.read_exact_at(offset, &mut raw)?;
        let desc = GroupDescriptor::parse(&raw);

        debug!(
            "Group {}: block bitmap {}, inode bitmap {}, inode table {}",
            group, desc.block_bitmap, desc.inode_bitmap, desc.inode_table
        );
        Ok(desc)
    }

    /// Decode inode `inode_num` (1-based)
    pub fn read_inode(&self, inode_num: u32) -> E2Result<Inode> {
        if inode_num == 0 || inode_num > self.superblock.inodes_count {
            return Err(E2Error::InvalidInode {
                inode: inode_num,
                inode_count: self.superblock.inodes_count,
            });
        }

        let inodes_per_group = self.superblock.inodes_per_group;
        let group = (inode_num - 1) / inodes_per_group;
        let index = (inode_num - 1) % inodes_per_group;

        let desc = self.group_descriptor(group)?;
        let offset = desc.inode_table as u64 * self.block_size() as u64
            + index as u64 * self.inode_size as u64;

        debug!(
            "Inode {}: group {}, index {}, record at offset {:#x}",
            inode_num, group, index, offset
        );

        let mut raw = [0u8; CLASSIC_INODE_SIZE];
        self.device.read_exact_at(offset, &mut raw)?;
        Ok(Inode::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ImageBuilder;
    use e2probe_core::MemoryImage;

    #[test]
    fn test_open_reads_superblock() {
        let image = ImageBuilder::new(1024, 2, 1024, 32).build();
        let reader = Ext2Reader::with_defaults(image).unwrap();

        let sb = reader.superblock();
        assert_eq!(sb.block_size(), 1024);
        assert_eq!(sb.first_data_block, 1);
        assert_eq!(sb.blocks_count, 2049);
        assert_eq!(sb.inodes_count, 64);
        assert_eq!(sb.group_count(), 2);
        assert_eq!(reader.inode_size(), 128);
    }

    #[test]
    fn test_open_rejects_bad_magic_unless_disabled() {
        let mut builder = ImageBuilder::new(1024, 1, 1024, 32);
        builder.superblock_mut().magic = 0x1234;
        let image = builder.build();

        let err = Ext2Reader::with_defaults(image.clone()).err().unwrap();
        assert!(matches!(err, E2Error::CorruptSuperblock(_)));

        let options = InspectOptions {
            check_magic: false,
            ..Default::default()
        };
        assert!(Ext2Reader::open(image, options).is_ok());
    }

    #[test]
    fn test_open_rejects_group_wider_than_bitmap() {
        let mut builder = ImageBuilder::new(1024, 2, 8192, 32);
        builder.mark_allocated(9000);
        // Bit 8999 of group 0 would sit past the end of a 1024-byte bitmap
        builder.superblock_mut().blocks_per_group = 16384;

        let err = Ext2Reader::with_defaults(builder.build()).err().unwrap();
        assert!(matches!(err, E2Error::CorruptSuperblock(_)));
    }

    #[test]
    fn test_open_truncated_image_is_io_error() {
        let image = MemoryImage::new(vec![0u8; 1500]);
        let err = Ext2Reader::with_defaults(image).err().unwrap();
        assert!(err.is_io());
    }

    #[test]
    fn test_group_descriptor_locations() {
        let builder = ImageBuilder::new(1024, 2, 1024, 32);
        let expected: Vec<_> = (0..2).map(|g| builder.group(g)).collect();
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();

        for (g, desc) in expected.iter().enumerate() {
            assert_eq!(&reader.group_descriptor(g as u32).unwrap(), desc);
        }
        let err = reader.group_descriptor(2).unwrap_err();
        assert!(matches!(err, E2Error::InvalidGroup { group: 2, group_count: 2 }));
    }

    #[test]
    fn test_group_descriptors_with_4k_blocks() {
        let builder = ImageBuilder::new(4096, 2, 256, 64);
        let expected = builder.group(1);
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();
        assert_eq!(reader.superblock().first_data_block, 0);
        assert_eq!(reader.group_descriptor(1).unwrap(), expected);
    }

    #[test]
    fn test_cached_descriptors_match_uncached() {
        let builder = ImageBuilder::new(1024, 3, 512, 16);
        let image = builder.build();
        let plain = Ext2Reader::with_defaults(image.clone()).unwrap();
        let cached = Ext2Reader::open(
            image,
            InspectOptions {
                cache_group_descriptors: true,
                ..Default::default()
            },
        )
        .unwrap();

        for g in 0..3 {
            assert_eq!(
                plain.group_descriptor(g).unwrap(),
                cached.group_descriptor(g).unwrap()
            );
        }
        assert!(cached.group_descriptor(3).is_err());
    }

    #[test]
    fn test_read_inode_bounds_and_groups() {
        let mut builder = ImageBuilder::new(1024, 2, 1024, 32);
        let first = Inode {
            mode: 0o100644,
            uid: 7,
            size: 10,
            ..Default::default()
        };
        let in_second_group = Inode {
            mode: 0o100600,
            uid: 9,
            size: 20,
            ..Default::default()
        };
        builder.write_inode(1, &first);
        builder.write_inode(33, &in_second_group);
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();

        assert_eq!(reader.read_inode(1).unwrap(), first);
        assert_eq!(reader.read_inode(33).unwrap(), in_second_group);
        assert_eq!(reader.read_inode(64).unwrap(), Inode::default());

        assert!(matches!(
            reader.read_inode(0).unwrap_err(),
            E2Error::InvalidInode { inode: 0, .. }
        ));
        assert!(matches!(
            reader.read_inode(65).unwrap_err(),
            E2Error::InvalidInode { inode: 65, inode_count: 64 }
        ));
    }

    #[test]
    fn test_dynamic_inode_size() {
        let mut builder = ImageBuilder::new(1024, 1, 1024, 32).with_inode_size(256);
        let inode = Inode {
            mode: 0o100644,
            size: 99,
            ..Default::default()
        };
        builder.write_inode(5, &inode);
        let image = builder.build();

        let reader = Ext2Reader::open(
            image,
            InspectOptions {
                inode_size: InodeSize::FromSuperblock,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(reader.inode_size(), 256);
        assert_eq!(reader.read_inode(5).unwrap(), inode);
    }

    #[test]
    fn test_read_block_and_bytes() {
        let mut builder = ImageBuilder::new(1024, 1, 1024, 32);
        builder.write_block(700, &[0x5A; 1024]);
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();

        let block = reader.read_block(700).unwrap();
        assert_eq!(block.len(), 1024);
        assert!(block.iter().all(|&b| b == 0x5A));
        // Repeated reads see the same bytes
        assert_eq!(reader.read_block(700).unwrap(), block);

        let bytes = reader.read_bytes(700 * 1024 - 2, 4).unwrap();
        assert_eq!(bytes, vec![0, 0, 0x5A, 0x5A]);

        assert!(reader.read_block(5000).unwrap_err().is_io());
    }
}
