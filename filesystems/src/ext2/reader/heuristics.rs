// Content-only classification of pointer blocks
// Used when inode metadata is gone and raw blocks must be judged by what they
// hold. Bad data yields `false`, never an error; only I/O failures propagate.

use super::*;
use crate::ext2::endian::decode_pointers;

/// Whether `raw` plausibly is a singly-indirect block of `sb`.
///
/// The first entry must be populated, and every entry must be either zero or
/// a block number below `blocks_count`. One out-of-range entry anywhere
/// rejects the whole block.
pub fn looks_like_indirect_block(sb: &Superblock, raw: &[u8]) -> bool {
    if raw.len() != sb.block_size() as usize {
        return false;
    }

    let pointers = decode_pointers(raw);
    match pointers.first() {
        Some(0) | None => return false,
        Some(_) => {}
    }

    pointers.iter().all(|&pointer| pointer < sb.blocks_count)
}

impl<D: ImageDevice> Ext2Reader<D> {
    /// See [`looks_like_indirect_block`]
    pub fn looks_like_indirect_block(&self, raw: &[u8]) -> bool {
        looks_like_indirect_block(&self.superblock, raw)
    }

    /// Whether `raw` plausibly is a doubly-indirect block.
    ///
    /// Every entry must be in range, and every populated entry must point at a
    /// block that itself looks singly-indirect. Zero entries are unused slots
    /// and are skipped. At least one referenced block has to pass.
    ///
    /// Like the singly-indirect check, a zero first entry rejects the block
    /// outright. This is stricter than a scan that only skips zero entries:
    /// a table whose populated slots start later is never reported.
    pub fn looks_like_doubly_indirect_block(&self, raw: &[u8]) -> E2Result<bool> {
        let sb = &self.superblock;
        if raw.len() != sb.block_size() as usize {
            return Ok(false);
        }

        let pointers = decode_pointers(raw);
        if pointers.first().copied().unwrap_or(0) == 0 {
            return Ok(false);
        }
        if pointers.iter().any(|&pointer| pointer >= sb.blocks_count) {
            return Ok(false);
        }

        let mut passed = 0usize;
        let mut inner = vec![0u8; sb.block_size() as usize];
        for &pointer in pointers.iter().filter(|&&p| p != 0) {
            self.read_block_into(pointer as u64, &mut inner)?;
            if !looks_like_indirect_block(sb, &inner) {
                return Ok(false);
            }
            passed += 1;
        }

        Ok(passed > 0)
    }
}
