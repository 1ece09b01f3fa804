// Little-endian field access for ext2 metadata
// Fields are decoded from byte buffers at fixed offsets; raw blocks are never
// reinterpreted as typed arrays.

use super::constants::POINTER_SIZE;
use byteorder::{ByteOrder, LittleEndian};

/// Read a 16-bit on-disk field as a host integer
#[inline]
pub fn le_u16(buf: &[u8], offset: usize) -> u16 {
    LittleEndian::read_u16(&buf[offset..offset + 2])
}

/// Read a 32-bit on-disk field as a host integer
#[inline]
pub fn le_u32(buf: &[u8], offset: usize) -> u32 {
    LittleEndian::read_u32(&buf[offset..offset + 4])
}

#[inline]
pub fn put_le_u16(buf: &mut [u8], offset: usize, value: u16) {
    LittleEndian::write_u16(&mut buf[offset..offset + 2], value);
}

#[inline]
pub fn put_le_u32(buf: &mut [u8], offset: usize, value: u32) {
    LittleEndian::write_u32(&mut buf[offset..offset + 4], value);
}

/// Decode a raw block as its sequence of 32-bit block pointers.
/// Trailing bytes that do not form a whole pointer are ignored.
pub fn decode_pointers(raw: &[u8]) -> Vec<u32> {
    raw.chunks_exact(POINTER_SIZE)
        .map(LittleEndian::read_u32)
        .collect()
}

/// Pointer at `index` of a raw pointer block, if the block is long enough
#[inline]
pub fn pointer_at(raw: &[u8], index: usize) -> Option<u32> {
    let start = index.checked_mul(POINTER_SIZE)?;
    raw.get(start..start + POINTER_SIZE).map(LittleEndian::read_u32)
}

/// Encode block pointers into a raw block of `block_size` bytes
pub fn encode_pointers(pointers: &[u32], block_size: usize) -> Vec<u8> {
    let mut raw = vec![0u8; block_size];
    for (slot, pointer) in raw.chunks_exact_mut(POINTER_SIZE).zip(pointers) {
        LittleEndian::write_u32(slot, *pointer);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_fields() {
        let buf = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        assert_eq!(le_u16(&buf, 0), 0x1234);
        assert_eq!(le_u32(&buf, 2), 0x1234_5678);

        let mut out = [0u8; 6];
        put_le_u16(&mut out, 0, 0x1234);
        put_le_u32(&mut out, 2, 0x1234_5678);
        assert_eq!(out, buf);
    }

    #[test]
    fn test_pointer_block_decoding() {
        let raw = encode_pointers(&[4850, 0, 3522], 16);
        assert_eq!(raw.len(), 16);
        assert_eq!(&raw[0..4], &[0xF2, 0x12, 0x00, 0x00]);
        assert_eq!(decode_pointers(&raw), vec![4850, 0, 3522, 0]);

        assert_eq!(pointer_at(&raw, 2), Some(3522));
        assert_eq!(pointer_at(&raw, 4), None);

        // A ragged tail is not a pointer
        assert_eq!(decode_pointers(&raw[..7]), vec![4850]);
    }
}
