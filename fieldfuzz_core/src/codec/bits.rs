use super::CodecError;

/// Packs unsigned values MSB-first into a growing byte buffer.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    /// Creates an empty writer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the lowest `bits` bits of `value`, most significant bit first.
    /// Higher bits of `value` are discarded.
    pub fn write(&mut self, value: u64, bits: u8) {
        for i in (0..bits).rev() {
            let bit = (value >> i) & 1 == 1;
            if self.bit_len % 8 == 0 {
                self.bytes.push(0);
            }
            if bit && let Some(last) = self.bytes.last_mut() {
                *last |= 0x80 >> (self.bit_len % 8);
            }
            self.bit_len += 1;
        }
    }

    /// Number of bits written so far
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Number of set bits written so far
    #[must_use]
    pub fn count_ones(&self) -> u32 {
        self.bytes.iter().map(|b| b.count_ones()).sum()
    }

    /// Returns the packed bytes.
    /// # Errors
    /// Fails if the written bits do not fill the last byte.
    pub fn into_bytes(self) -> Result<Vec<u8>, CodecError> {
        if self.bit_len % 8 != 0 {
            return Err(CodecError::Unaligned { bits: self.bit_len });
        }
        Ok(self.bytes)
    }
}

/// Reads unsigned values MSB-first from a byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader positioned at the first bit of `buf`
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Reads `bits` bits as an unsigned value.
    /// # Errors
    /// Fails with `Truncated` if fewer than `bits` bits remain.
    pub fn read(&mut self, bits: u8, field: &'static str) -> Result<u64, CodecError> {
        if self.remaining_bits() < usize::from(bits) {
            return Err(CodecError::Truncated { field });
        }
        let mut value = 0u64;
        for _ in 0..bits {
            let byte = self.buf[self.pos / 8];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | u64::from(bit);
            self.pos += 1;
        }
        Ok(value)
    }

    /// Current position in bits
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bits left until the end of the buffer
    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.buf.len() * 8 - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_msb_first_across_byte_boundaries() {
        let mut w = BitWriter::new();
        w.write(0b10101, 5);
        w.write(1, 1);
        w.write(0b00010, 5);
        w.write(0b11111, 5);
        assert_eq!(w.bit_len(), 16);
        assert_eq!(w.into_bytes().expect("aligned"), vec![0xAC, 0x5F]);
    }

    #[test]
    fn rejects_unaligned_output() {
        let mut w = BitWriter::new();
        w.write(1, 3);
        assert_eq!(w.into_bytes(), Err(CodecError::Unaligned { bits: 3 }));
    }

    #[test]
    fn discards_bits_above_the_width() {
        let mut w = BitWriter::new();
        w.write(0x1FF, 8);
        assert_eq!(w.into_bytes().expect("aligned"), vec![0xFF]);
    }

    #[test]
    fn reader_returns_what_writer_packed() {
        let mut r = BitReader::new(&[0xAC, 0x5F]);
        assert_eq!(r.read(5, "a"), Ok(0b10101));
        assert_eq!(r.read(1, "b"), Ok(1));
        assert_eq!(r.read(10, "c"), Ok(0b00010_11111));
        assert_eq!(r.read(1, "d"), Err(CodecError::Truncated { field: "d" }));
    }
}
