//! MSB-first bit reader over a data section.

use crate::error::{BufrError, BufrResult};

/// Sequential reader of big-endian bit fields.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset in bits.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }

    /// Read `width` bits (at most 64) as an unsigned integer.
    pub fn read(&mut self, width: u32) -> BufrResult<u64> {
        if width > 64 {
            return Err(BufrError::malformed(format!(
                "cannot read {} bits into one value",
                width
            )));
        }
        let value = extract_bits(self.data, self.pos, width as usize)?;
        self.pos += width as usize;
        Ok(value)
    }

    /// Read `count` bytes of character data.
    pub fn read_bytes(&mut self, count: usize) -> BufrResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(count);
        for _ in 0..count {
            bytes.push(self.read(8)? as u8);
        }
        Ok(bytes)
    }

    pub fn skip(&mut self, bits: usize) -> BufrResult<()> {
        if bits > self.remaining() {
            return Err(BufrError::malformed(format!(
                "cannot skip {} bits at bit {}: only {} remain",
                bits,
                self.pos,
                self.remaining()
            )));
        }
        self.pos += bits;
        Ok(())
    }
}

/// True when `raw` is the all-ones pattern BUFR uses for missing values.
///
/// Single-bit fields have no missing representation.
pub fn is_missing(raw: u64, width: u32) -> bool {
    if width < 2 {
        return false;
    }
    raw == all_ones(width)
}

/// Largest value a field of `width` bits can hold.
pub fn all_ones(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> BufrResult<u64> {
    if start_bit + num_bits > data.len() * 8 {
        return Err(BufrError::malformed(format!(
            "read of {} bits at bit {} overruns the data section ({} bits)",
            num_bits,
            start_bit,
            data.len() * 8
        )));
    }

    let mut result = 0u64;
    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let byte_idx = absolute_bit / 8;
        let bit_idx = 7 - (absolute_bit % 8); // MSB first

        let bit = (data[byte_idx] >> bit_idx) & 1;
        result = (result << 1) | bit as u64;
    }

    Ok(result)
}
