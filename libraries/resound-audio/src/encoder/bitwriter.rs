/// MSB-first bit writer used by the FLAC encoder
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    acc: u64,
    bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the low `count` bits of `value`, `count` <= 32
    pub fn write(&mut self, value: u64, count: u32) {
        debug_assert!(count <= 32);
        if count == 0 {
            return;
        }
        let mask = (1u64 << count) - 1;
        self.acc = (self.acc << count) | (value & mask);
        self.bits += count;
        while self.bits >= 8 {
            self.bits -= 8;
            self.bytes.push((self.acc >> self.bits) as u8);
        }
        self.acc &= (1u64 << self.bits) - 1;
    }

    /// Two's complement in `count` bits
    pub fn write_signed(&mut self, value: i64, count: u32) {
        self.write(value as u64, count);
    }

    /// `zeros` zero bits followed by a one
    pub fn write_unary(&mut self, mut zeros: u64) {
        while zeros >= 32 {
            self.write(0, 32);
            zeros -= 32;
        }
        self.write(1, zeros as u32 + 1);
    }

    /// Pad with zero bits to the next byte boundary
    pub fn align(&mut self) {
        if self.bits > 0 {
            let pad = 8 - self.bits;
            self.write(0, pad);
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Aligns, then hands over the bytes
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.align();
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_msb_first() {
        let mut w = BitWriter::new();
        w.write(0b101, 3);
        w.write(0b11111, 5);
        w.write(0xABCD, 16);
        assert_eq!(w.into_bytes(), vec![0b1011_1111, 0xAB, 0xCD]);
    }

    #[test]
    fn unary_and_signed() {
        let mut w = BitWriter::new();
        w.write_unary(3); // 0001
        w.write_signed(-1, 4); // 1111
        assert_eq!(w.into_bytes(), vec![0b0001_1111]);

        let mut long = BitWriter::new();
        long.write_unary(40);
        let bytes = long.into_bytes();
        assert_eq!(bytes.len(), 6);
        assert_eq!(bytes[5], 0b1000_0000);
    }
}
