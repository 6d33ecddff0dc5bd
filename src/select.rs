//! Select over a unary-coded non-decreasing sequence.
//!
//! The bit vector stores `n` ones and `m` zeros: the k-th one is preceded by exactly
//! `keys[k]` zeros. `select(k)` therefore equals `keys[k] + k`. Every 128th one is
//! sampled into `sel_table`; a query scans bytes forward from the nearest sample using
//! the 8-bit rank and select lookup tables.
//!
//! Words are read as little-endian bytes regardless of host order, so the layout of
//! `bits` is identical on every platform.

use crate::builder::MphError;
use crate::util::{WordReader, WordWriter};
#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, de};

const SAMPLE_SHIFT: u32 = 7;
const SAMPLE_MASK: u32 = (1 << SAMPLE_SHIFT) - 1;

/// Popcount of every byte value.
pub(crate) static RANK_TABLE: [u8; 256] = rank_table();

/// `SELECT_TABLE[b][r]`: offset of the r-th set bit of byte `b`, 255 when absent.
pub(crate) static SELECT_TABLE: [[u8; 8]; 256] = select_table();

const fn rank_table() -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut b = 0;
    while b < 256 {
        t[b] = (b as u8).count_ones() as u8;
        b += 1;
    }
    t
}

const fn select_table() -> [[u8; 8]; 256] {
    let mut t = [[255u8; 8]; 256];
    let mut b = 0;
    while b < 256 {
        let mut rank = 0;
        let mut bit = 0;
        while bit < 8 {
            if (b >> bit) & 1 == 1 {
                t[b][rank] = bit as u8;
                rank += 1;
            }
            bit += 1;
        }
        b += 1;
    }
    t
}

#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    bits: Vec<u32>,
    sel_table: Vec<u32>,
}

impl Select {
    /// Build from a non-decreasing sequence whose values do not exceed `m`.
    pub fn generate(keys: &[u32], m: u32) -> Self {
        let n = keys.len() as u32;
        let nbits = n + m;
        let mut bits = vec![0u32; nbits.div_ceil(32) as usize];

        // Shift register: new bits enter at bit 31, each full word is flushed.
        let mut buffer = 0u32;
        let mut idx = 0u32;
        let mut push = |one: bool, bits: &mut [u32]| {
            buffer >>= 1;
            if one {
                buffer |= 0x8000_0000;
            }
            idx += 1;
            if idx & 0x1f == 0 {
                bits[((idx >> 5) - 1) as usize] = buffer;
            }
        };

        let mut zeros = 0u32;
        for &key in keys {
            debug_assert!(key >= zeros && key <= m, "sequence must be non-decreasing and <= m");
            while zeros < key {
                push(false, &mut bits);
                zeros += 1;
            }
            push(true, &mut bits);
        }
        while zeros < m {
            push(false, &mut bits);
            zeros += 1;
        }
        if idx & 0x1f != 0 {
            bits[((idx - 1) >> 5) as usize] = buffer >> (32 - (idx & 0x1f));
        }

        let mut sel = Self { bits, sel_table: Vec::new() };
        sel.sel_table = sel.sample(n);
        sel
    }

    /// Position of every 128th one.
    fn sample(&self, n: u32) -> Vec<u32> {
        let mut table = vec![0u32; ((n >> SAMPLE_SHIFT) + 1) as usize];
        let mut one_idx = 0u32;
        let mut byte_idx = 0u32;
        let mut part_sum = 0u32;
        for slot in table.iter_mut() {
            if one_idx >= n {
                break;
            }
            let mut old_part_sum;
            loop {
                old_part_sum = part_sum;
                part_sum += RANK_TABLE[self.byte(byte_idx) as usize] as u32;
                byte_idx += 1;
                if part_sum > one_idx {
                    break;
                }
            }
            *slot = self.select_in_byte(byte_idx - 1, one_idx - old_part_sum);
            one_idx += 1 << SAMPLE_SHIFT;
        }
        table
    }

    #[inline(always)]
    fn byte(&self, byte_idx: u32) -> u8 {
        (self.bits[(byte_idx >> 2) as usize] >> ((byte_idx & 3) * 8)) as u8
    }

    #[inline(always)]
    fn select_in_byte(&self, byte_idx: u32, rank: u32) -> u32 {
        SELECT_TABLE[self.byte(byte_idx) as usize][rank as usize] as u32 + (byte_idx << 3)
    }

    /// Rank, within its byte, of the first bit at or after `bit_idx`.
    #[inline(always)]
    fn rank_in_byte(&self, bit_idx: u32) -> u32 {
        let low = self.byte(bit_idx >> 3) & ((1u32 << (bit_idx & 7)) - 1) as u8;
        RANK_TABLE[low as usize] as u32
    }

    /// Scan forward from `byte_idx` to the `rank`-th one counted from the start of that byte.
    #[inline(always)]
    fn scan(&self, mut byte_idx: u32, rank: u32) -> u32 {
        let mut part_sum = 0u32;
        let mut old_part_sum;
        loop {
            old_part_sum = part_sum;
            part_sum += RANK_TABLE[self.byte(byte_idx) as usize] as u32;
            byte_idx += 1;
            if part_sum > rank {
                break;
            }
        }
        self.select_in_byte(byte_idx - 1, rank - old_part_sum)
    }

    /// Bit position of the `one_idx`-th set bit (0-based).
    #[inline]
    pub fn query(&self, one_idx: u32) -> u32 {
        let bit_idx = self.sel_table[(one_idx >> SAMPLE_SHIFT) as usize];
        let rank = (one_idx & SAMPLE_MASK) + self.rank_in_byte(bit_idx);
        self.scan(bit_idx >> 3, rank)
    }

    /// Bit position of the first set bit after the set bit at `bit_idx`.
    #[inline]
    pub fn next_query(&self, bit_idx: u32) -> u32 {
        let rank = self.rank_in_byte(bit_idx) + 1;
        self.scan(bit_idx >> 3, rank)
    }

    /// Serialized size in bytes.
    pub fn size_in_bytes(&self) -> usize {
        4 * (2 + self.bits.len() + self.sel_table.len())
    }

    pub(crate) fn dump(&self, w: &mut WordWriter<'_>) {
        w.put_array(&self.bits);
        w.put_array(&self.sel_table);
    }

    pub(crate) fn load(r: &mut WordReader<'_>) -> Result<Self, MphError> {
        let bits = r.array()?;
        let sel_table = r.array()?;
        Ok(Self { bits, sel_table })
    }

    /// Check against the `n` ones and `m` zeros the owner expects.
    pub(crate) fn validate(&self, n: u32, m: u32) -> Result<(), MphError> {
        if self.bits.len() as u64 != (n as u64 + m as u64).div_ceil(32) {
            return Err(MphError::Malformed("select bit vector length"));
        }
        self.check_samples(n)
    }

    /// Exactly `n` ones, and every sample points at its one.
    fn check_samples(&self, n: u32) -> Result<(), MphError> {
        if self.count_ones() != n as u64 {
            return Err(MphError::Malformed("select popcount"));
        }
        if self.sel_table.len() != ((n >> SAMPLE_SHIFT) + 1) as usize || self.sel_table != self.sample(n) {
            return Err(MphError::Malformed("select sample table"));
        }
        Ok(())
    }

    fn count_ones(&self) -> u64 {
        self.bits.iter().map(|w| w.count_ones() as u64).sum()
    }
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct SelectParts {
    bits: Vec<u32>,
    sel_table: Vec<u32>,
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Select {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let SelectParts { bits, sel_table } = SelectParts::deserialize(deserializer)?;
        let sel = Self { bits, sel_table };
        let n = u32::try_from(sel.count_ones())
            .map_err(|_| <D::Error as de::Error>::custom("select popcount exceeds u32"))?;
        sel.check_samples(n).map_err(<D::Error as de::Error>::custom)?;
        Ok(sel)
    }
}
