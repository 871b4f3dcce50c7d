//! Growable byte buffer with byte-aligned and bit-packed access.
//!
//! Integers are little-endian. Bit-packed values are written MSB-first into a
//! partial byte that only reaches the backing store once eight bits have been
//! written or [`ByteBuffer::flush_bits`] pads it with zeros. Reading mirrors
//! this: [`ByteBuffer::reset_bits`] discards whatever remains of the current
//! partial byte.
//!
//! Mixing the two access modes without an explicit flush/reset is treated as
//! a programming error and fails with [`BitStreamFault::UnflushedBits`]
//! rather than silently misaligning the stream.

use crate::error::{BitStreamFault, ProtocolError, ProtocolResult};

/// A value that can be assembled from a bit-packed field.
pub trait BitField: Copy {
    /// Width of the type in bits.
    const BITS: u32;

    fn from_bits(raw: u64) -> Self;
}

macro_rules! impl_bit_field {
    ($($ty:ty),*) => {
        $(
            impl BitField for $ty {
                const BITS: u32 = <$ty>::BITS;

                fn from_bits(raw: u64) -> Self {
                    raw as $ty
                }
            }
        )*
    };
}

impl_bit_field!(u8, u16, u32, u64, i8, i16, i32, i64);

impl BitField for bool {
    const BITS: u32 = 1;

    fn from_bits(raw: u64) -> Self {
        raw != 0
    }
}

/// Append-only byte store with a read cursor and independent bit cursors.
///
/// The buffer is a plain `&mut self` structure and is never shared between
/// threads; each connection task and each encode call owns its own buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    storage: Vec<u8>,
    rpos: usize,
    /// Bits already written into `wbit_val`, 0 when byte-aligned.
    wbit_pos: u8,
    wbit_val: u8,
    /// Bits still unread in `rbit_val`, 0 when byte-aligned.
    rbit_pos: u8,
    rbit_val: u8,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Size of the stored data in bytes, excluding any pending partial byte.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn rpos(&self) -> usize {
        self.rpos
    }

    /// Write position, i.e. the size counter of committed bytes.
    pub fn wpos(&self) -> usize {
        self.storage.len()
    }

    /// Bytes left to read after the read cursor.
    pub fn remaining(&self) -> usize {
        self.storage.len().saturating_sub(self.rpos)
    }

    /// Bit position on the write side, 0 when byte-aligned.
    pub fn write_bit_pos(&self) -> u8 {
        self.wbit_pos
    }

    /// Bits left unread in the current partial byte, 0 when byte-aligned.
    pub fn read_bit_pos(&self) -> u8 {
        self.rbit_pos
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.storage
    }

    pub fn clear(&mut self) {
        self.storage.clear();
        self.rpos = 0;
        self.wbit_pos = 0;
        self.wbit_val = 0;
        self.rbit_pos = 0;
        self.rbit_val = 0;
    }

    // ------------------------------------------------------------------
    // Bit-packed writes
    // ------------------------------------------------------------------

    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.wbit_val |= 0x80 >> self.wbit_pos;
        }
        self.wbit_pos += 1;
        if self.wbit_pos == 8 {
            self.storage.push(self.wbit_val);
            self.wbit_pos = 0;
            self.wbit_val = 0;
        }
    }

    /// Packs the low-order `count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u64, count: u32) -> ProtocolResult<()> {
        if count > u64::BITS {
            return Err(BitStreamFault::WidthOverflow {
                requested: count,
                width: u64::BITS,
            }
            .into());
        }
        for shift in (0..count).rev() {
            self.write_bit((value >> shift) & 1 == 1);
        }
        Ok(())
    }

    /// Pads the pending partial byte with zero bits and realigns the writer.
    pub fn flush_bits(&mut self) {
        if self.wbit_pos == 0 {
            return;
        }
        self.storage.push(self.wbit_val);
        self.wbit_pos = 0;
        self.wbit_val = 0;
    }

    // ------------------------------------------------------------------
    // Byte-aligned writes
    // ------------------------------------------------------------------

    fn ensure_write_aligned(&self) -> ProtocolResult<()> {
        if self.wbit_pos != 0 {
            return Err(BitStreamFault::UnflushedBits {
                pending: self.wbit_pos,
            }
            .into());
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        self.ensure_write_aligned()?;
        self.storage.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> ProtocolResult<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes the raw UTF-8 bytes of `value` with no terminator or length.
    pub fn write_string(&mut self, value: &str) -> ProtocolResult<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a GUID as a presence mask followed by its non-zero bytes.
    pub fn write_packed_guid(&mut self, guid: u64) -> ProtocolResult<()> {
        self.ensure_write_aligned()?;
        let bytes = guid.to_le_bytes();
        let mut mask = 0u8;
        let mut packed = [0u8; 8];
        let mut len = 0;
        for (index, byte) in bytes.iter().enumerate() {
            if *byte != 0 {
                mask |= 1 << index;
                packed[len] = *byte;
                len += 1;
            }
        }
        self.storage.push(mask);
        self.storage.extend_from_slice(&packed[..len]);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bit-packed reads
    // ------------------------------------------------------------------

    pub fn has_bit(&mut self) -> ProtocolResult<bool> {
        if self.rbit_pos == 0 {
            let start = self.consume(1)?;
            self.rbit_val = self.storage[start];
            self.rbit_pos = 8;
        }
        self.rbit_pos -= 1;
        Ok((self.rbit_val >> self.rbit_pos) & 1 == 1)
    }

    /// Reads `count` bits MSB-first into `T`.
    ///
    /// Fails with [`BitStreamFault::WidthOverflow`] when `count` exceeds the
    /// bit width of `T`.
    pub fn read_bits<T: BitField>(&mut self, count: u32) -> ProtocolResult<T> {
        if count > T::BITS {
            return Err(BitStreamFault::WidthOverflow {
                requested: count,
                width: T::BITS,
            }
            .into());
        }
        let mut raw = 0u64;
        for _ in 0..count {
            raw = (raw << 1) | u64::from(self.has_bit()?);
        }
        Ok(T::from_bits(raw))
    }

    /// Discards the unread remainder of the current partial byte.
    pub fn reset_bits(&mut self) {
        self.rbit_pos = 0;
        self.rbit_val = 0;
    }

    // ------------------------------------------------------------------
    // Byte-aligned reads
    // ------------------------------------------------------------------

    /// Advances the read cursor by `needed` bytes and returns the old offset.
    fn consume(&mut self, needed: usize) -> ProtocolResult<usize> {
        let available = self.remaining();
        if needed > available {
            return Err(ProtocolError::Truncated {
                offset: self.rpos,
                needed,
                available,
            });
        }
        let start = self.rpos;
        self.rpos += needed;
        Ok(start)
    }

    fn read_array<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        self.ensure_read_aligned()?;
        let start = self.consume(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.storage[start..start + N]);
        Ok(out)
    }

    fn ensure_read_aligned(&self) -> ProtocolResult<()> {
        if self.rbit_pos != 0 {
            return Err(BitStreamFault::UnflushedBits {
                pending: self.rbit_pos,
            }
            .into());
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> ProtocolResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> ProtocolResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> ProtocolResult<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> ProtocolResult<Vec<u8>> {
        self.ensure_read_aligned()?;
        let start = self.consume(len)?;
        Ok(self.storage[start..start + len].to_vec())
    }

    /// Reads `len` raw bytes and validates them as UTF-8.
    pub fn read_string(&mut self, len: usize) -> ProtocolResult<String> {
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidString { len })
    }

    pub fn read_packed_guid(&mut self) -> ProtocolResult<u64> {
        let mask = self.read_u8()?;
        let mut bytes = [0u8; 8];
        for (index, byte) in bytes.iter_mut().enumerate() {
            if mask & (1 << index) != 0 {
                *byte = self.read_u8()?;
            }
        }
        Ok(u64::from_le_bytes(bytes))
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(storage: Vec<u8>) -> Self {
        Self {
            storage,
            ..Self::default()
        }
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator so the round-trip test covers many widths
    /// without pulling a randomness crate into the protocol crate.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0 >> 11
        }
    }

    #[test]
    fn bit_sequences_round_trip() {
        let mut rng = Lcg(7);
        let fields: Vec<(u64, u32)> = (0..500)
            .map(|_| {
                let width = (rng.next() % 32 + 1) as u32;
                let value = rng.next() & ((1u64 << width) - 1);
                (value, width)
            })
            .collect();

        let mut buffer = ByteBuffer::new();
        for (value, width) in &fields {
            buffer.write_bits(*value, *width).unwrap();
        }
        buffer.flush_bits();

        let mut reader = ByteBuffer::from(buffer.into_vec());
        for (value, width) in &fields {
            let read: u32 = reader.read_bits(*width).unwrap();
            assert_eq!(u64::from(read), *value, "width {width}");
        }
    }

    #[test]
    fn bits_are_packed_msb_first() {
        let mut buffer = ByteBuffer::new();
        buffer.write_bit(true);
        buffer.write_bits(0b01, 2).unwrap();
        buffer.flush_bits();
        assert_eq!(buffer.as_slice(), &[0b1010_0000]);
    }

    #[test]
    fn flush_after_full_byte_adds_nothing() {
        let mut buffer = ByteBuffer::new();
        buffer.write_bits(0xAB, 8).unwrap();
        assert_eq!(buffer.write_bit_pos(), 0);
        buffer.flush_bits();
        assert_eq!(buffer.as_slice(), &[0xAB]);
    }

    #[test]
    fn aligned_write_with_pending_bits_fails_fast() {
        let mut buffer = ByteBuffer::new();
        buffer.write_bits(0b101, 3).unwrap();
        let err = buffer.write_u32(7).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MalformedBitStream(BitStreamFault::UnflushedBits { pending: 3 })
        );
        assert!(err.is_fatal());

        buffer.flush_bits();
        buffer.write_u32(7).unwrap();
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn aligned_read_with_pending_bits_fails_fast() {
        let mut reader = ByteBuffer::from(vec![0xFF, 0x01, 0x00, 0x00, 0x00]);
        assert!(reader.has_bit().unwrap());
        assert!(matches!(
            reader.read_u32(),
            Err(ProtocolError::MalformedBitStream(BitStreamFault::UnflushedBits { pending: 7 }))
        ));
        reader.reset_bits();
        assert_eq!(reader.read_u32().unwrap(), 1);
    }

    #[test]
    fn read_bits_rejects_width_beyond_target() {
        let mut reader = ByteBuffer::from(vec![0xFF, 0xFF]);
        let err = reader.read_bits::<u8>(9).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MalformedBitStream(BitStreamFault::WidthOverflow {
                requested: 9,
                width: 8
            })
        );
        assert!(reader.read_bits::<bool>(2).is_err());
        assert!(reader.read_bits::<u16>(9).is_ok());
    }

    #[test]
    fn reading_past_end_is_truncated() {
        let mut reader = ByteBuffer::from(vec![1, 2, 3]);
        assert_eq!(
            reader.read_u32().unwrap_err(),
            ProtocolError::Truncated {
                offset: 0,
                needed: 4,
                available: 3
            }
        );
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
        assert!(matches!(reader.read_bits::<u16>(9), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn primitives_round_trip() {
        let mut buffer = ByteBuffer::new();
        buffer.write_u8(0x12).unwrap();
        buffer.write_u16(0x3456).unwrap();
        buffer.write_u32(0x789A_BCDE).unwrap();
        buffer.write_u64(u64::MAX - 1).unwrap();
        buffer.write_i32(-42).unwrap();
        buffer.write_f32(1.5).unwrap();
        buffer.write_string("héllo").unwrap();

        let mut reader = ByteBuffer::from(buffer.as_slice());
        assert_eq!(reader.read_u8().unwrap(), 0x12);
        assert_eq!(reader.read_u16().unwrap(), 0x3456);
        assert_eq!(reader.read_u32().unwrap(), 0x789A_BCDE);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(reader.read_i32().unwrap(), -42);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_string("héllo".len()).unwrap(), "héllo");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut reader = ByteBuffer::from(vec![0xC3, 0x28]);
        assert_eq!(
            reader.read_string(2).unwrap_err(),
            ProtocolError::InvalidString { len: 2 }
        );
    }

    #[test]
    fn packed_guid_skips_zero_bytes() {
        let mut buffer = ByteBuffer::new();
        buffer.write_packed_guid(0x0100_0000_0000_002A).unwrap();
        assert_eq!(buffer.as_slice(), &[0b1000_0001, 0x2A, 0x01]);

        let mut reader = ByteBuffer::from(buffer.into_vec());
        assert_eq!(reader.read_packed_guid().unwrap(), 0x0100_0000_0000_002A);
    }
}
