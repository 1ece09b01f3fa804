// File materialization
// Streams a file's logical extent block by block through the resolver.

use super::*;
use std::io::Write;

/// Lazy, block-at-a-time view of an inode's content.
///
/// Each item is the content of one logical block: full blocks except for the
/// final partial block, zero-filled for holes. The first error ends the
/// sequence. Building a new `FileContent` from the same inode restarts it.
pub struct FileContent<'r, D: ImageDevice> {
    reader: &'r Ext2Reader<D>,
    inode: Inode,
    next: u64,
    total: u64,
    failed: bool,
}

impl<'r, D: ImageDevice> FileContent<'r, D> {
    fn new(reader: &'r Ext2Reader<D>, inode: Inode) -> Self {
        let total = inode.block_count(reader.block_size());
        FileContent {
            reader,
            inode,
            next: 0,
            total,
            failed: false,
        }
    }

    /// Bytes of logical block `logical` that belong to the file
    fn block_len(&self, logical: u64) -> usize {
        let block_size = self.reader.block_size() as u64;
        let remaining = self.inode.size as u64 - logical * block_size;
        remaining.min(block_size) as usize
    }

    fn read_logical(&self, logical: u64) -> E2Result<Vec<u8>> {
        let len = self.block_len(logical);
        match self.reader.resolve(&self.inode, logical)? {
            Some(block) => {
                let mut data = self.reader.read_block(block as u64)?;
                data.truncate(len);
                Ok(data)
            }
            None => Ok(vec![0u8; len]),
        }
    }
}

impl<'r, D: ImageDevice> Iterator for FileContent<'r, D> {
    type Item = E2Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next >= self.total {
            return None;
        }

        let logical = self.next;
        self.next += 1;

        let result = self.read_logical(logical);
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let left = (self.total - self.next) as usize;
        (0, Some(left))
    }
}

impl<D: ImageDevice> Ext2Reader<D> {
    /// Lazy sequence of the file's content, one logical block per item
    pub fn file_content(&self, inode: &Inode) -> FileContent<'_, D> {
        FileContent::new(self, *inode)
    }

    /// Whole file content in memory
    pub fn read_file(&self, inode: &Inode) -> E2Result<Vec<u8>> {
        let mut data = Vec::with_capacity(inode.size as usize);
        for chunk in self.file_content(inode) {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }

    /// Stream the file content into `out`, returning the number of bytes written
    pub fn copy_file_to<W: Write>(&self, inode: &Inode, out: &mut W) -> E2Result<u64> {
        let mut written = 0u64;
        for chunk in self.file_content(inode) {
            let chunk = chunk?;
            out.write_all(&chunk).map_err(|e| E2Error::io(e, written, chunk.len()))?;
            written += chunk.len() as u64;
        }
        debug!("Copied {} bytes of file content", written);
        Ok(written)
    }
}
