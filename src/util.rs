use crate::builder::MphError;

/// Occupancy table over `n` bins.
#[derive(Debug)]
pub struct BitSet {
    bits: Vec<u64>,
}
impl BitSet {
    pub fn new(n: usize) -> Self {
        let words = n.div_ceil(64);
        Self { bits: vec![0; words] }
    }
    #[inline]
    pub fn test(&self, idx: usize) -> bool {
        let (w, b) = (idx / 64, idx % 64);
        (self.bits[w] >> b) & 1 == 1
    }
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let (w, b) = (idx / 64, idx % 64);
        self.bits[w] |= 1u64 << b;
    }
    #[inline]
    pub fn clear(&mut self, idx: usize) {
        let (w, b) = (idx / 64, idx % 64);
        self.bits[w] &= !(1u64 << b);
    }
}

/// Mask with the low `len` bits set (`len` may be 32).
#[inline]
pub fn low_mask(len: u32) -> u32 {
    if len >= u32::BITS { u32::MAX } else { (1u32 << len) - 1 }
}

/// floor(log2(x)), with log2(0) == log2(1) == 0.
#[inline]
pub fn floor_log2(x: u32) -> u32 {
    if x <= 1 { 0 } else { u32::BITS - 1 - x.leading_zeros() }
}

/// Write the low `len` bits of `value` at bit offset `pos`. The code may straddle two words.
#[inline]
pub fn set_bits_at_pos(table: &mut [u32], pos: u32, value: u32, len: u32) {
    let word = (pos >> 5) as usize;
    let shift1 = pos & 0x1f;
    let shift2 = 32 - shift1;
    let mask = low_mask(len);
    let value = value & mask;

    table[word] &= !(mask << shift1);
    table[word] |= value << shift1;
    if shift2 < len {
        table[word + 1] &= !(mask >> shift2);
        table[word + 1] |= value >> shift2;
    }
}

/// Read `len` bits starting at bit offset `pos`.
#[inline]
pub fn get_bits_at_pos(table: &[u32], pos: u32, len: u32) -> u32 {
    let word = (pos >> 5) as usize;
    let shift1 = pos & 0x1f;
    let shift2 = 32 - shift1;
    let mask = low_mask(len);

    let mut bits = (table[word] >> shift1) & mask;
    if shift2 < len {
        bits |= (table[word + 1] << shift2) & mask;
    }
    bits
}

/// Fixed-width slot write: slot `index` of width `len`.
#[inline]
pub fn set_bits_value(table: &mut [u32], index: u32, value: u32, len: u32) {
    set_bits_at_pos(table, index * len, value, len);
}

/// Fixed-width slot read: slot `index` of width `len`.
#[inline]
pub fn get_bits_value(table: &[u32], index: u32, len: u32) -> u32 {
    get_bits_at_pos(table, index * len, len)
}

/// Read word `index` (native endianness) from a byte buffer.
#[inline]
pub fn read_word(buf: &[u8], index: usize) -> Option<u32> {
    let start = index.checked_mul(4)?;
    let bytes = buf.get(start..start.checked_add(4)?)?;
    Some(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Write word `index` (native endianness) into a byte buffer. `None` when out of bounds.
#[inline]
pub fn write_word(buf: &mut [u8], index: usize, word: u32) -> Option<()> {
    let start = index.checked_mul(4)?;
    buf.get_mut(start..start.checked_add(4)?)?
        .copy_from_slice(&word.to_ne_bytes());
    Some(())
}

/// Sequential word writer over a caller-sized byte buffer.
pub struct WordWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WordWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub fn put(&mut self, word: u32) {
        let written = write_word(self.buf, self.pos, word);
        debug_assert!(written.is_some(), "word buffer smaller than the dump");
        self.pos += 1;
    }

    /// Length-prefixed array.
    pub fn put_array(&mut self, words: &[u32]) {
        self.put(words.len() as u32);
        for &w in words {
            self.put(w);
        }
    }

    /// Words written so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// Sequential, bounds-checked word reader.
pub struct WordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WordReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub fn next_word(&mut self) -> Result<u32, MphError> {
        let w = read_word(self.buf, self.pos).ok_or(MphError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(w)
    }

    /// Length-prefixed array. The length is checked against the remaining input before allocating.
    pub fn array(&mut self) -> Result<Vec<u32>, MphError> {
        let len = self.next_word()? as usize;
        let remaining = self.buf.len() / 4 - self.pos;
        if len > remaining {
            return Err(MphError::Truncated(self.pos + remaining));
        }
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.next_word()?);
        }
        Ok(out)
    }

    /// Words consumed so far.
    #[cfg(test)]
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// Deterministic Miller-Rabin, exact over the whole u32 range (witnesses 2, 7, 61).
pub fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    for p in [2u32, 3, 5, 7, 11, 13, 61] {
        if n == p {
            return true;
        }
        if n % p == 0 {
            return false;
        }
    }

    let n64 = n as u64;
    let mut d = n64 - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for a in [2u64, 7, 61] {
        let mut x = pow_mod(a, d, n64);
        if x == 1 || x == n64 - 1 {
            continue;
        }
        for _ in 1..s {
            x = x * x % n64;
            if x == n64 - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[inline]
fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut acc = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc * base % m;
        }
        base = base * base % m;
        exp >>= 1;
    }
    acc
}
