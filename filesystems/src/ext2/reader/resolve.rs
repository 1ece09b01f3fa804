// Logical to physical block resolution
// Walks direct, singly-, doubly- and triply-indirect pointers the way the
// inode's i_block array lays them out.

use super::*;
use crate::ext2::endian::decode_pointers;

/// Route from an inode's i_block array to one logical block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPath {
    /// Index into i_block (0..12 direct, then the three indirect roots)
    pub slot: usize,
    offsets: [u32; 3],
    depth: usize,
}

impl BlockPath {
    /// Compute the path for `logical` with `ppb` pointers per block.
    /// Returns `None` past the triply-indirect range.
    pub fn new(logical: u64, ppb: u64) -> Option<Self> {
        let direct = DIRECT_BLOCKS as u64;
        if logical < direct {
            return Some(BlockPath {
                slot: logical as usize,
                offsets: [0; 3],
                depth: 0,
            });
        }

        let mut rem = logical - direct;
        if rem < ppb {
            return Some(BlockPath {
                slot: IND_BLOCK,
                offsets: [rem as u32, 0, 0],
                depth: 1,
            });
        }

        rem -= ppb;
        if rem < ppb * ppb {
            return Some(BlockPath {
                slot: DIND_BLOCK,
                offsets: [(rem / ppb) as u32, (rem % ppb) as u32, 0],
                depth: 2,
            });
        }

        rem -= ppb * ppb;
        if rem < ppb * ppb * ppb {
            return Some(BlockPath {
                slot: TIND_BLOCK,
                offsets: [
                    (rem / (ppb * ppb)) as u32,
                    ((rem / ppb) % ppb) as u32,
                    (rem % ppb) as u32,
                ],
                depth: 3,
            });
        }

        None
    }

    /// Entry index to follow in each pointer block, outermost first
    pub fn offsets(&self) -> &[u32] {
        &self.offsets[..self.depth]
    }

    /// Levels of indirection (0 for a direct block)
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl<D: ImageDevice> Ext2Reader<D> {
    /// Path for `logical`, or `OutOfRange` past triple indirection
    pub fn block_path(&self, logical: u64) -> E2Result<BlockPath> {
        let ppb = self.superblock.pointers_per_block() as u64;
        BlockPath::new(logical, ppb).ok_or(E2Error::OutOfRange {
            index: logical,
            max: self.superblock.max_file_blocks() - 1,
        })
    }

    /// Read a block and decode it as a table of block pointers
    pub fn read_pointer_block(&self, block: u32) -> E2Result<Vec<u32>> {
        self.check_pointer(block)?;
        let raw = self.read_block(block as u64)?;
        Ok(decode_pointers(&raw))
    }

    fn check_pointer(&self, block: u32) -> E2Result<()> {
        if block >= self.superblock.blocks_count {
            return Err(E2Error::InvalidBlock {
                block: block as u64,
                first_data_block: self.superblock.first_data_block,
                block_count: self.superblock.blocks_count,
            });
        }
        Ok(())
    }

    /// Map logical block `logical` of `inode` to its physical block.
    ///
    /// `Ok(None)` is a sparse hole: a zero pointer anywhere on the path.
    /// Block 0 is never reported as data.
    pub fn resolve(&self, inode: &Inode, logical: u64) -> E2Result<Option<u32>> {
        let path = self.block_path(logical)?;
        let mut block = inode.block_slot(path.slot);

        for &offset in path.offsets() {
            if block == 0 {
                return Ok(None);
            }
            let table = self.read_pointer_block(block)?;
            block = table.get(offset as usize).copied().unwrap_or(0);
        }

        if block == 0 {
            return Ok(None);
        }
        self.check_pointer(block)?;

        debug!("Logical block {} -> physical block {}", logical, block);
        Ok(Some(block))
    }

    /// Physical block (or hole) for every logical block covered by the file size
    pub fn block_map(&self, inode: &Inode) -> E2Result<Vec<Option<u32>>> {
        (0..inode.block_count(self.block_size()))
            .map(|logical| self.resolve(inode, logical))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext2::endian::pointer_at;
    use crate::test_helpers::ImageBuilder;

    #[test]
    fn test_block_path_boundaries() {
        let ppb = 256;
        assert_eq!(BlockPath::new(11, ppb).unwrap().slot, 11);
        assert_eq!(BlockPath::new(11, ppb).unwrap().depth(), 0);

        let single = BlockPath::new(12, ppb).unwrap();
        assert_eq!(single.slot, IND_BLOCK);
        assert_eq!(single.offsets(), &[0]);

        let last_single = BlockPath::new(12 + 255, ppb).unwrap();
        assert_eq!(last_single.offsets(), &[255]);

        let double = BlockPath::new(12 + 256, ppb).unwrap();
        assert_eq!(double.slot, DIND_BLOCK);
        assert_eq!(double.offsets(), &[0, 0]);

        let double = BlockPath::new(12 + 256 + 256 * 3 + 7, ppb).unwrap();
        assert_eq!(double.offsets(), &[3, 7]);

        let triple = BlockPath::new(12 + 256 + 65_536, ppb).unwrap();
        assert_eq!(triple.slot, TIND_BLOCK);
        assert_eq!(triple.offsets(), &[0, 0, 0]);

        let last = 12 + 256 + 65_536 + 16_777_216 - 1;
        assert_eq!(BlockPath::new(last, ppb).unwrap().offsets(), &[255, 255, 255]);
        assert!(BlockPath::new(last + 1, ppb).is_none());
    }

    #[test]
    fn test_resolve_direct_single_and_double() {
        let mut builder = ImageBuilder::new(1024, 2, 1024, 32);
        let data: Vec<u8> = (0..(12 + 256 + 10) * 1024).map(|i| (i / 1024) as u8).collect();
        let inode = builder.add_file(12, &data);
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();

        assert_eq!(
            reader.resolve(&inode, 11).unwrap(),
            Some(inode.direct_blocks[11])
        );

        let single = reader.read_block(inode.indirect_1 as u64).unwrap();
        assert_eq!(reader.resolve(&inode, 12).unwrap(), pointer_at(&single, 0));

        let double = reader.read_block(inode.indirect_2 as u64).unwrap();
        let outer = pointer_at(&double, 0).unwrap();
        let inner = reader.read_block(outer as u64).unwrap();
        assert_eq!(reader.resolve(&inode, 12 + 256).unwrap(), pointer_at(&inner, 0));

        // Every resolved block carries the byte pattern of its logical index
        for logical in [0u64, 11, 12, 200, 267, 268, 277] {
            let phys = reader.resolve(&inode, logical).unwrap().unwrap();
            let block = reader.read_block(phys as u64).unwrap();
            assert_eq!(block[0], logical as u8);
        }
    }

    #[test]
    fn test_resolved_blocks_stay_in_range() {
        let mut builder = ImageBuilder::new(1024, 2, 1024, 32);
        let data = vec![1u8; 300 * 1024 + 17];
        let inode = builder.add_file(3, &data);
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();
        let blocks_count = reader.superblock().blocks_count;

        let map = reader.block_map(&inode).unwrap();
        assert_eq!(map.len(), 301);
        for phys in map {
            let phys = phys.unwrap();
            assert!(phys != 0 && phys < blocks_count);
        }
    }

    #[test]
    fn test_resolve_triple_indirect() {
        let mut builder = ImageBuilder::new(1024, 2, 1024, 32);
        let logical = 12 + 256 + 65_536 + 300;
        let size = ((logical + 1) * 1024) as u32;
        let inode = builder.add_sparse_file(4, size, &[(logical, vec![0xEE; 1024])]);
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();

        assert_ne!(inode.indirect_3, 0);
        let phys = reader.resolve(&inode, logical).unwrap().unwrap();
        assert_eq!(reader.read_block(phys as u64).unwrap(), vec![0xEE; 1024]);

        // Neighbours in the same triple tree are holes
        assert_eq!(reader.resolve(&inode, logical - 1).unwrap(), None);
        assert_eq!(reader.resolve(&inode, 12 + 256 + 65_536).unwrap(), None);
    }

    #[test]
    fn test_holes_are_not_block_zero() {
        let mut builder = ImageBuilder::new(1024, 2, 1024, 32);
        let inode = builder.add_sparse_file(
            6,
            400 * 1024,
            &[(3, vec![3; 1024]), (20, vec![20; 1024]), (300, vec![44; 1024])],
        );
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();

        assert_eq!(reader.resolve(&inode, 0).unwrap(), None);
        assert!(reader.resolve(&inode, 3).unwrap().is_some());
        // Indirect block exists but this entry is empty
        assert_eq!(reader.resolve(&inode, 21).unwrap(), None);
        assert!(reader.resolve(&inode, 20).unwrap().is_some());
        assert!(reader.resolve(&inode, 300).unwrap().is_some());
        // No triple tree at all
        assert_eq!(reader.resolve(&inode, 12 + 256 + 65_536).unwrap(), None);
    }

    #[test]
    fn test_out_of_range_and_bad_pointers() {
        let mut builder = ImageBuilder::new(1024, 1, 1024, 32);
        let mut inode = builder.add_file(2, &[9u8; 2048]);
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();

        let max = reader.superblock().max_file_blocks();
        assert!(matches!(
            reader.resolve(&inode, max).unwrap_err(),
            E2Error::OutOfRange { .. }
        ));

        inode.direct_blocks[1] = 50_000;
        assert!(matches!(
            reader.resolve(&inode, 1).unwrap_err(),
            E2Error::InvalidBlock { block: 50_000, .. }
        ));

        inode.indirect_1 = 70_000;
        assert!(matches!(
            reader.resolve(&inode, 12).unwrap_err(),
            E2Error::InvalidBlock { .. }
        ));
    }

    #[test]
    fn test_resolve_is_repeatable() {
        let mut builder = ImageBuilder::new(1024, 2, 1024, 32);
        let inode = builder.add_file(8, &vec![7u8; 280 * 1024]);
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();

        let first = reader.block_map(&inode).unwrap();
        let second = reader.block_map(&inode).unwrap();
        assert_eq!(first, second);
    }
}
