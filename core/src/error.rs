use thiserror::Error;

/// Errors raised while decoding an ext2 image.
///
/// `Io` is always fatal to the operation that hit it. The index variants mean
/// the caller asked for something outside the structurally valid range of the
/// opened filesystem.
#[derive(Debug, Error)]
pub enum E2Error {
    #[error("IO error reading {length} bytes at offset {offset}: {source}")]
    Io {
        offset: u64,
        length: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt superblock: {0}")]
    CorruptSuperblock(String),

    #[error("Invalid block group {group} (filesystem has {group_count} groups)")]
    InvalidGroup { group: u64, group_count: u32 },

    #[error("Invalid inode number {inode}, valid range is 1..={inode_count}")]
    InvalidInode { inode: u32, inode_count: u32 },

    #[error("Invalid block {block}, valid range is {first_data_block}..{block_count}")]
    InvalidBlock {
        block: u64,
        first_data_block: u32,
        block_count: u32,
    },

    #[error("Logical block {index} out of range (maximum addressable is {max})")]
    OutOfRange { index: u64, max: u64 },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl E2Error {
    /// Wrap an I/O failure with the span that was being read.
    pub fn io(source: std::io::Error, offset: u64, length: usize) -> Self {
        E2Error::Io { offset, length, source }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        E2Error::CorruptSuperblock(message.into())
    }

    /// True for failures of the backing image rather than bad caller input.
    pub fn is_io(&self) -> bool {
        matches!(self, E2Error::Io { .. })
    }
}

impl From<std::io::Error> for E2Error {
    fn from(source: std::io::Error) -> Self {
        E2Error::Io { offset: 0, length: 0, source }
    }
}

pub type E2Result<T> = Result<T, E2Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_flagged() {
        let err = E2Error::io(
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read"),
            4096,
            1024,
        );
        assert!(err.is_io());
        assert!(err.to_string().contains("offset 4096"));

        let err = E2Error::InvalidInode { inode: 0, inode_count: 128 };
        assert!(!err.is_io());
        assert_eq!(err.to_string(), "Invalid inode number 0, valid range is 1..=128");
    }
}
