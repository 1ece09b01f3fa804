// Block bitmap queries
// A set bit marks a block as allocated.

use super::*;

/// Test bit `index` of an on-disk bitmap (LSB first within each byte)
pub(crate) fn bit_is_set(bitmap: &[u8], index: u32) -> bool {
    let byte_index = (index / 8) as usize;
    let bit_index = index % 8;
    bitmap
        .get(byte_index)
        .map(|byte| byte & (1 << bit_index) != 0)
        .unwrap_or(false)
}

impl<D: ImageDevice> Ext2Reader<D> {
    /// Group holding `block` and the block's index inside it
    pub fn block_group_of(&self, block: u32) -> E2Result<(u32, u32)> {
        let sb = &self.superblock;
        if !sb.contains_block(block as u64) {
            return Err(E2Error::InvalidBlock {
                block: block as u64,
                first_data_block: sb.first_data_block,
                block_count: sb.blocks_count,
            });
        }

        let relative = block - sb.first_data_block;
        let group = relative / sb.blocks_per_group;
        let index = relative - group * sb.blocks_per_group;
        Ok((group, index))
    }

    /// Raw block bitmap of `group`
    pub(crate) fn read_block_bitmap(&self, group: u32) -> E2Result<Vec<u8>> {
        let desc = self.group_descriptor(group)?;
        self.read_block(desc.block_bitmap as u64)
    }

    /// Whether the group's block bitmap marks `block` as free
    pub fn is_block_free(&self, block: u32) -> E2Result<bool> {
        let (group, index) = self.block_group_of(block)?;
        let bitmap = self.read_block_bitmap(group)?;

        let allocated = bit_is_set(&bitmap, index);
        debug!(
            "Block {} (group {}, bit {}) is {}",
            block,
            group,
            index,
            if allocated { "allocated" } else { "free" }
        );
        Ok(!allocated)
    }

    /// Free blocks counted from the bitmaps of every group
    pub fn count_free_blocks(&self) -> E2Result<u64> {
        let sb = &self.superblock;
        let mut free = 0u64;

        for group in 0..sb.group_count() {
            let bitmap = self.read_block_bitmap(group)?;

            // The last group may be shorter than blocks_per_group
            let group_start = sb.first_data_block as u64 + group as u64 * sb.blocks_per_group as u64;
            let in_group = (sb.blocks_count as u64 - group_start).min(sb.blocks_per_group as u64);

            free += (0..in_group as u32)
                .filter(|&index| !bit_is_set(&bitmap, index))
                .count() as u64;
        }

        Ok(free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ImageBuilder;

    #[test]
    fn test_bit_is_set() {
        let bitmap = [0b1000_0001u8, 0b0000_0010];
        assert!(bit_is_set(&bitmap, 0));
        assert!(!bit_is_set(&bitmap, 1));
        assert!(bit_is_set(&bitmap, 7));
        assert!(bit_is_set(&bitmap, 9));
        assert!(!bit_is_set(&bitmap, 100));
    }

    #[test]
    fn test_is_block_free_negates_bitmap() {
        let mut builder = ImageBuilder::new(1024, 2, 1024, 32);
        builder.add_file(2, &vec![1u8; 40 * 1024]);
        builder.mark_allocated(1500);
        let reader = Ext2Reader::with_defaults(builder.clone().build()).unwrap();

        let sb = *reader.superblock();
        for block in sb.first_data_block..sb.blocks_count {
            assert_eq!(
                reader.is_block_free(block).unwrap(),
                !builder.is_allocated(block),
                "block {}",
                block
            );
        }
        assert!(!reader.is_block_free(1500).unwrap());
        assert!(reader.is_block_free(1501).unwrap());
    }

    #[test]
    fn test_is_block_free_rejects_out_of_range() {
        let builder = ImageBuilder::new(1024, 1, 1024, 32);
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();

        assert!(matches!(
            reader.is_block_free(0).unwrap_err(),
            E2Error::InvalidBlock { block: 0, .. }
        ));
        assert!(matches!(
            reader.is_block_free(1025).unwrap_err(),
            E2Error::InvalidBlock { block: 1025, .. }
        ));
        assert!(reader.is_block_free(1024).is_ok());
    }

    #[test]
    fn test_block_group_of() {
        let reader =
            Ext2Reader::with_defaults(ImageBuilder::new(1024, 3, 512, 16).build()).unwrap();
        assert_eq!(reader.block_group_of(1).unwrap(), (0, 0));
        assert_eq!(reader.block_group_of(512).unwrap(), (0, 511));
        assert_eq!(reader.block_group_of(513).unwrap(), (1, 0));
        assert_eq!(reader.block_group_of(1536).unwrap(), (2, 511));
    }

    #[test]
    fn test_count_free_blocks() {
        let mut builder = ImageBuilder::new(1024, 2, 1024, 32);
        builder.add_file(2, &vec![0u8; 10 * 1024]);
        let expected = (1..2049).filter(|&b| !builder.is_allocated(b)).count() as u64;
        let reader = Ext2Reader::with_defaults(builder.build()).unwrap();
        assert_eq!(reader.count_free_blocks().unwrap(), expected);
    }
}
