//! Synthetic BUFR message generator.
//!
//! Creates bit-exact BUFR messages (editions 3 and 4) so decoder and query
//! tests do not depend on real data files.

/// MSB-first bit writer for building data sections.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `width` bits of `value`.
    pub fn write(&mut self, value: u64, width: u32) -> &mut Self {
        for i in (0..width).rev() {
            let bit = ((value >> i) & 1) as u8;
            if self.bit_len % 8 == 0 {
                self.bytes.push(0);
            }
            if bit == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 1 << (7 - (self.bit_len % 8));
            }
            self.bit_len += 1;
        }
        self
    }

    /// Append an all-ones (missing) field.
    pub fn write_missing(&mut self, width: u32) -> &mut Self {
        let value = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
        self.write(value, width)
    }

    /// Append a numeric value encoded as `round(v * 10^scale) - reference`.
    pub fn write_scaled(&mut self, value: Option<f64>, scale: i32, reference: i64, width: u32) -> &mut Self {
        match value {
            Some(v) => {
                let raw = (v * 10f64.powi(scale)).round() as i64 - reference;
                self.write(raw as u64, width)
            }
            None => self.write_missing(width),
        }
    }

    /// Append `text` as `chars` bytes, space padded.
    pub fn write_str(&mut self, text: &str, chars: usize) -> &mut Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(chars, b' ');
        for b in bytes.into_iter().take(chars) {
            self.write(b as u64, 8);
        }
        self
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Build a single BUFR message with the specified parameters
pub struct BufrBuilder {
    edition: u8,
    center: u16,
    data_category: u8,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    subsets: u16,
    compressed: bool,
    descriptors: Vec<(u8, u8, u8)>,
    data: Vec<u8>,
}

impl Default for BufrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BufrBuilder {
    /// Edition 4, NCEP centre, one uncompressed subset.
    pub fn new() -> Self {
        Self {
            edition: 4,
            center: 7,
            data_category: 21,
            year: 2020,
            month: 10,
            day: 26,
            hour: 21,
            minute: 0,
            subsets: 1,
            compressed: false,
            descriptors: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn edition(mut self, edition: u8) -> Self {
        self.edition = edition;
        self
    }

    pub fn data_category(mut self, category: u8) -> Self {
        self.data_category = category;
        self
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8, minute: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self.minute = minute;
        self
    }

    pub fn subsets(mut self, subsets: u16) -> Self {
        self.subsets = subsets;
        self
    }

    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn descriptor(mut self, f: u8, x: u8, y: u8) -> Self {
        self.descriptors.push((f, x, y));
        self
    }

    pub fn data(mut self, writer: BitWriter) -> Self {
        self.data = writer.into_bytes();
        self
    }

    /// Assemble sections 0-5.
    pub fn build(&self) -> Vec<u8> {
        let section1 = self.identification_section();
        let section3 = self.description_section();
        let section4 = self.data_section();

        let total = 8 + section1.len() + section3.len() + section4.len() + 4;
        let mut msg = Vec::with_capacity(total);
        msg.extend_from_slice(b"BUFR");
        msg.extend_from_slice(&u24(total));
        msg.push(self.edition);
        msg.extend_from_slice(&section1);
        msg.extend_from_slice(&section3);
        msg.extend_from_slice(&section4);
        msg.extend_from_slice(b"7777");
        msg
    }

    fn identification_section(&self) -> Vec<u8> {
        if self.edition >= 4 {
            let mut s = vec![0u8; 22];
            s[..3].copy_from_slice(&u24(22));
            s[4..6].copy_from_slice(&self.center.to_be_bytes());
            s[10] = self.data_category;
            s[13] = 35; // master table version
            s[15..17].copy_from_slice(&self.year.to_be_bytes());
            s[17] = self.month;
            s[18] = self.day;
            s[19] = self.hour;
            s[20] = self.minute;
            s
        } else {
            let mut s = vec![0u8; 18];
            s[..3].copy_from_slice(&u24(18));
            s[5] = self.center as u8;
            s[8] = self.data_category;
            s[10] = 13;
            s[12] = (self.year % 100) as u8;
            s[13] = self.month;
            s[14] = self.day;
            s[15] = self.hour;
            s[16] = self.minute;
            s
        }
    }

    fn description_section(&self) -> Vec<u8> {
        let mut len = 7 + 2 * self.descriptors.len();
        if self.edition < 4 && len % 2 == 1 {
            len += 1;
        }
        let mut s = vec![0u8; len];
        s[..3].copy_from_slice(&u24(len));
        s[4..6].copy_from_slice(&self.subsets.to_be_bytes());
        s[6] = 0x80 | if self.compressed { 0x40 } else { 0 };
        for (i, (f, x, y)) in self.descriptors.iter().enumerate() {
            let packed = ((*f as u16) << 14) | ((*x as u16) << 8) | *y as u16;
            s[7 + 2 * i..9 + 2 * i].copy_from_slice(&packed.to_be_bytes());
        }
        s
    }

    fn data_section(&self) -> Vec<u8> {
        let mut len = 4 + self.data.len();
        if self.edition < 4 && len % 2 == 1 {
            len += 1;
        }
        let mut s = vec![0u8; len];
        s[..3].copy_from_slice(&u24(len));
        s[4..4 + self.data.len()].copy_from_slice(&self.data);
        s
    }
}

fn u24(value: usize) -> [u8; 3] {
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_writer() {
        let mut w = BitWriter::new();
        w.write(0b10, 2).write(0b11, 2).write(0b0101, 4).write(1, 1);
        assert_eq!(w.bit_len(), 9);
        assert_eq!(w.into_bytes(), vec![0b1011_0101, 0b1000_0000]);
    }

    #[test]
    fn test_message_layout() {
        let mut data = BitWriter::new();
        data.write(2020, 12);
        let msg = BufrBuilder::new().descriptor(0, 4, 1).data(data).build();

        assert_eq!(&msg[..4], b"BUFR");
        assert_eq!(&msg[msg.len() - 4..], b"7777");
        let declared = ((msg[4] as usize) << 16) | ((msg[5] as usize) << 8) | msg[6] as usize;
        assert_eq!(declared, msg.len());
        assert_eq!(msg[7], 4);
    }
}
