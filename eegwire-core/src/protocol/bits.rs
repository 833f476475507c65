//! Big-endian, most-significant-bit-first bit field access.
//!
//! Every numeric field on the wire is packed this way, including fields
//! that straddle byte boundaries (12-bit EEG samples).

pub(crate) struct BitReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() * 8 - self.position
    }

    /// Reads an unsigned field of `bits` width (at most 32).
    ///
    /// Callers check the payload length up front, so running past the end
    /// is a programming error.
    pub fn read(&mut self, bits: u32) -> u32 {
        debug_assert!(bits <= 32);
        debug_assert!(bits as usize <= self.remaining());

        let mut value = 0u32;
        for _ in 0..bits {
            let byte = self.bytes[self.position / 8];
            let bit = (byte >> (7 - self.position % 8)) & 1;
            value = (value << 1) | u32::from(bit);
            self.position += 1;
        }
        value
    }

    pub fn read_u16(&mut self) -> u16 {
        self.read(16) as u16
    }

    /// Two's complement 16-bit field.
    pub fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }
}

#[derive(Default)]
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    position: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `bits` bits of `value`, most significant first.
    pub fn write(&mut self, value: u32, bits: u32) {
        debug_assert!(bits <= 32);

        for shift in (0..bits).rev() {
            if self.position % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> shift) & 1) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= bit << (7 - self.position % 8);
            }
            self.position += 1;
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}
