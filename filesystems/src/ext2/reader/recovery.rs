// Recovery scanning
// Sweeps a block range looking for pointer blocks of files whose inodes are
// lost. Large ranges are sharded across scoped worker threads; every worker
// issues its own positioned reads against the shared read-only image.

use super::bitmap::bit_is_set;
use super::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndirectKind {
    Single,
    Double,
}

/// A block whose content looks like block pointers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndirectCandidate {
    pub block: u32,
    pub kind: IndirectKind,
}

/// Blocks `[start, end)` to examine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRange {
    pub start: u32,
    pub end: u32,
    /// Skip blocks the bitmap reports as allocated
    pub free_only: bool,
}

impl ScanRange {
    /// Every data block of the filesystem
    pub fn whole(sb: &Superblock) -> Self {
        ScanRange {
            start: sb.first_data_block,
            end: sb.blocks_count,
            free_only: false,
        }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split into at most `parts` contiguous, non-empty shards
    fn shards(&self, parts: usize) -> Vec<ScanRange> {
        let len = self.len() as usize;
        if len == 0 {
            return Vec::new();
        }
        let parts = parts.clamp(1, len);
        let step = (len + parts - 1) / parts;

        (0..parts)
            .map(|i| self.start as usize + i * step)
            .take_while(|&start| start < self.end as usize)
            .map(|start| ScanRange {
                start: start as u32,
                end: (start + step).min(self.end as usize) as u32,
                free_only: self.free_only,
            })
            .collect()
    }
}

impl<D: ImageDevice> Ext2Reader<D> {
    /// Classify one raw block, doubly-indirect taking precedence
    pub fn classify_block(&self, raw: &[u8]) -> E2Result<Option<IndirectKind>> {
        if !self.looks_like_indirect_block(raw) {
            return Ok(None);
        }
        if self.looks_like_doubly_indirect_block(raw)? {
            return Ok(Some(IndirectKind::Double));
        }
        Ok(Some(IndirectKind::Single))
    }

    /// Find every block in `range` that looks like an indirect block.
    ///
    /// Uses `scan_workers` threads from the session options. Results are
    /// sorted by block number and do not depend on the worker count.
    pub fn scan_indirect_blocks(&self, range: ScanRange) -> E2Result<Vec<IndirectCandidate>> {
        let sb = &self.superblock;
        let range = ScanRange {
            start: range.start.max(sb.first_data_block),
            end: range.end.min(sb.blocks_count),
            free_only: range.free_only,
        };
        let workers = self.options.workers();

        info!(
            "Scanning blocks {}..{} for indirect blocks with {} worker(s)",
            range.start, range.end, workers
        );

        let mut found = if workers == 1 {
            self.scan_shard(range)?
        } else {
            let shards = range.shards(workers);
            let results: Vec<E2Result<Vec<IndirectCandidate>>> = std::thread::scope(|s| {
                let handles: Vec<_> = shards
                    .iter()
                    .map(|&shard| s.spawn(move || self.scan_shard(shard)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| match handle.join() {
                        Ok(result) => result,
                        Err(payload) => std::panic::resume_unwind(payload),
                    })
                    .collect()
            });

            let mut merged = Vec::new();
            for result in results {
                merged.extend(result?);
            }
            merged
        };

        found.sort_by_key(|candidate| candidate.block);
        info!("Found {} indirect block candidates", found.len());
        Ok(found)
    }

    fn scan_shard(&self, range: ScanRange) -> E2Result<Vec<IndirectCandidate>> {
        let mut found = Vec::new();
        let mut raw = vec![0u8; self.block_size() as usize];
        // Bitmap of the group the shard is currently in
        let mut bitmap: Option<(u32, Vec<u8>)> = None;

        for block in range.start..range.end {
            if range.free_only {
                let (group, index) = self.block_group_of(block)?;
                let loaded = match bitmap.take() {
                    Some((cached, bits)) if cached == group => bits,
                    _ => self.read_block_bitmap(group)?,
                };
                let allocated = bit_is_set(&loaded, index);
                bitmap = Some((group, loaded));
                if allocated {
                    continue;
                }
            }

            self.read_block_into(block as u64, &mut raw)?;
            if let Some(kind) = self.classify_block(&raw)? {
                debug!("Block {} looks {:?}-indirect", block, kind);
                found.push(IndirectCandidate { block, kind });
            }
        }

        Ok(found)
    }
}
