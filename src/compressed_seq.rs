//! Random-access compressed integer sequence.
//!
//! Value `v` is coded in `L = floor(log2(v + 1))` bits as `v - (2^L - 1)`; zero takes no
//! bits. Codes are concatenated in `store`. The end offset of each code is split into
//! `rem_r` low bits (packed in `length_rems`) and high bits (unary-coded in a
//! [`Select`]), so both ends of code `i` are found without decoding its neighbours.

use crate::builder::MphError;
use crate::select::Select;
use crate::util::{
    WordReader, WordWriter, floor_log2, get_bits_at_pos, get_bits_value, low_mask,
    set_bits_at_pos, set_bits_value,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, de};

#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedSeq {
    length_rems: Vec<u32>,
    n: u32,
    rem_r: u32,
    sel: Select,
    store: Vec<u32>,
    total_length: u32,
}

impl CompressedSeq {
    /// Compress `values`. Fails on an empty slice, or when the codes together exceed
    /// what a 32-bit bit offset addresses.
    pub fn generate(values: &[u32]) -> Result<Self, MphError> {
        if values.is_empty() {
            return Err(MphError::EmptyKeySet);
        }
        let n = u32::try_from(values.len()).map_err(|_| MphError::TooManyKeys(values.len()))?;

        // u32::MAX takes a full 32-bit code
        let mut lengths: Vec<u32> = values.iter().map(|&v| (v as u64 + 1).ilog2()).collect();
        let total_bits: u64 = lengths.iter().map(|&l| l as u64).sum();
        let total = u32::try_from(total_bits).map_err(|_| MphError::CodesTooLong(total_bits))?;

        let mut store = vec![0u32; total.div_ceil(32) as usize];
        let mut pos = 0u32;
        for (&v, &len) in values.iter().zip(&lengths) {
            if len == 0 {
                continue;
            }
            set_bits_at_pos(&mut store, pos, v - low_mask(len), len);
            pos += len;
        }

        let rem_r = floor_log2(total / n).max(1);
        let rems_mask = low_mask(rem_r);
        let mut length_rems = vec![0u32; (n as u64 * rem_r as u64).div_ceil(32) as usize];

        // lengths becomes the high part of each running end offset
        let mut end = 0u32;
        for (i, len) in lengths.iter_mut().enumerate() {
            end += *len;
            set_bits_value(&mut length_rems, i as u32, end & rems_mask, rem_r);
            *len = end >> rem_r;
        }

        let sel = Select::generate(&lengths, end >> rem_r);

        Ok(Self {
            length_rems,
            n,
            rem_r,
            sel,
            store,
            total_length: end,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.n as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Value at `idx` (< len).
    #[inline]
    pub fn get(&self, idx: u32) -> u32 {
        debug_assert!(idx < self.n);
        let (start, one_pos) = if idx == 0 {
            (0, self.sel.query(0))
        } else {
            let prev = self.sel.query(idx - 1);
            let start = ((prev - (idx - 1)) << self.rem_r)
                + get_bits_value(&self.length_rems, idx - 1, self.rem_r);
            (start, self.sel.next_query(prev))
        };

        let end = ((one_pos - idx) << self.rem_r) + get_bits_value(&self.length_rems, idx, self.rem_r);
        let len = end - start;
        if len == 0 {
            return 0;
        }
        get_bits_at_pos(&self.store, start, len) + low_mask(len)
    }

    /// Serialized size in bytes.
    pub fn size_in_bytes(&self) -> usize {
        4 * (5 + self.length_rems.len() + self.store.len()) + self.sel.size_in_bytes()
    }

    pub(crate) fn dump(&self, w: &mut WordWriter<'_>) {
        w.put_array(&self.length_rems);
        w.put(self.n);
        w.put(self.rem_r);
        self.sel.dump(w);
        w.put_array(&self.store);
        w.put(self.total_length);
    }

    pub(crate) fn load(r: &mut WordReader<'_>) -> Result<Self, MphError> {
        let length_rems = r.array()?;
        let n = r.next_word()?;
        let rem_r = r.next_word()?;
        let sel = Select::load(r)?;
        let store = r.array()?;
        let total_length = r.next_word()?;

        let seq = Self {
            length_rems,
            n,
            rem_r,
            sel,
            store,
            total_length,
        };
        seq.validate()?;
        Ok(seq)
    }

    pub(crate) fn validate(&self) -> Result<(), MphError> {
        if self.n == 0 {
            return Err(MphError::Malformed("empty displacement sequence"));
        }
        if !(1..32).contains(&self.rem_r) {
            return Err(MphError::Malformed("remainder width out of range"));
        }
        if self.length_rems.len() != (self.n as u64 * self.rem_r as u64).div_ceil(32) as usize {
            return Err(MphError::Malformed("remainder table length"));
        }
        if self.store.len() != self.total_length.div_ceil(32) as usize {
            return Err(MphError::Malformed("store table length"));
        }
        self.sel.validate(self.n, self.total_length >> self.rem_r)?;
        self.check_codes()
    }

    /// Code offsets never go backwards, no code is wider than 32 bits, and the last one
    /// ends at `total_length`.
    fn check_codes(&self) -> Result<(), MphError> {
        let mut start = 0u64;
        let mut one_pos = self.sel.query(0);
        for idx in 0..self.n {
            if idx > 0 {
                one_pos = self.sel.next_query(one_pos);
            }
            let end = (((one_pos - idx) as u64) << self.rem_r)
                + get_bits_value(&self.length_rems, idx, self.rem_r) as u64;
            if end < start || end - start > 32 || end > self.total_length as u64 {
                return Err(MphError::Malformed("code offsets"));
            }
            // a full-width code only encodes u32::MAX
            if end - start == 32 && get_bits_at_pos(&self.store, start as u32, 32) != 0 {
                return Err(MphError::Malformed("32-bit code out of range"));
            }
            start = end;
        }
        if start != self.total_length as u64 {
            return Err(MphError::Malformed("total code length"));
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct CompressedSeqParts {
    length_rems: Vec<u32>,
    n: u32,
    rem_r: u32,
    sel: Select,
    store: Vec<u32>,
    total_length: u32,
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for CompressedSeq {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let p = CompressedSeqParts::deserialize(deserializer)?;
        let seq = Self {
            length_rems: p.length_rems,
            n: p.n,
            rem_r: p.rem_r,
            sel: p.sel,
            store: p.store,
            total_length: p.total_length,
        };
        seq.validate().map_err(<D::Error as de::Error>::custom)?;
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{read_word, write_word};
    use proptest::prelude::*;

    #[test]
    fn code_lengths() {
        // 0 -> 0 bits, 1..=2 -> 1 bit, 3..=6 -> 2 bits, 7 -> 3 bits
        let seq = CompressedSeq::generate(&[0, 1, 2, 3, 6, 7]).unwrap();
        assert_eq!(seq.total_length, 0 + 1 + 1 + 2 + 2 + 3);
        assert_eq!(seq.rem_r, 1);
        for (i, v) in [0, 1, 2, 3, 6, 7].into_iter().enumerate() {
            assert_eq!(seq.get(i as u32), v);
        }
    }

    #[test]
    fn all_zero() {
        let seq = CompressedSeq::generate(&[0; 300]).unwrap();
        assert!(seq.store.is_empty());
        assert_eq!(seq.len(), 300);
        assert!((0..300).all(|i| seq.get(i) == 0));
    }

    #[test]
    fn single_value() {
        let seq = CompressedSeq::generate(&[123_456]).unwrap();
        assert_eq!(seq.get(0), 123_456);
        let seq = CompressedSeq::generate(&[0]).unwrap();
        assert_eq!(seq.get(0), 0);
    }

    #[test]
    fn wide_values_and_wide_remainders() {
        let values: Vec<u32> = (0..2_000u32)
            .map(|i| if i % 5 == 0 { 0 } else { i.wrapping_mul(2_654_435_761) >> 2 })
            .collect();
        let seq = CompressedSeq::generate(&values).unwrap();
        assert!(seq.rem_r > 1);
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(seq.get(i as u32), v, "i = {i}");
        }
    }

    #[test]
    fn dump_load_round_trip() {
        let values: Vec<u32> = (0..517u32).map(|i| (i * 37) % 1001).collect();
        let seq = CompressedSeq::generate(&values).unwrap();
        let mut buf = vec![0u8; seq.size_in_bytes()];
        let mut w = WordWriter::new(&mut buf);
        seq.dump(&mut w);
        assert_eq!(w.position() * 4, seq.size_in_bytes());

        let back = CompressedSeq::load(&mut WordReader::new(&buf)).unwrap();
        assert_eq!(back, seq);
    }

    #[test]
    fn load_rejects_inconsistent_tables() {
        let seq = CompressedSeq::generate(&[5, 0, 9]).unwrap();
        let mut buf = vec![0u8; seq.size_in_bytes()];
        seq.dump(&mut WordWriter::new(&mut buf));
        // rem_r lives right after the remainder table and n
        let rem_r_word = 1 + seq.length_rems.len() + 1;
        write_word(&mut buf, rem_r_word, 40);
        assert!(matches!(
            CompressedSeq::load(&mut WordReader::new(&buf)),
            Err(MphError::Malformed(_))
        ));
        assert!(matches!(
            CompressedSeq::load(&mut WordReader::new(&buf[..8])),
            Err(MphError::Truncated(_))
        ));
    }

    #[test]
    fn full_width_values() {
        let values = [u32::MAX, 5, 0, u32::MAX - 1, u32::MAX];
        let seq = CompressedSeq::generate(&values).unwrap();
        assert_eq!(seq.total_length, 32 + 2 + 0 + 31 + 32);
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(seq.get(i as u32), v);
        }
        assert!(seq.validate().is_ok());
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(CompressedSeq::generate(&[]), Err(MphError::EmptyKeySet)));
    }

    fn dumped(seq: &CompressedSeq) -> Vec<u8> {
        let mut buf = vec![0u8; seq.size_in_bytes()];
        seq.dump(&mut WordWriter::new(&mut buf));
        buf
    }

    #[test]
    fn load_rejects_corrupted_contents() {
        // lengths 2, 0, 3: ends 2, 2, 5 with a one-bit remainder
        let seq = CompressedSeq::generate(&[5, 0, 9]).unwrap();
        assert_eq!(seq.rem_r, 1);
        let buf = dumped(&seq);
        let rems_word = 1;
        let bits_start = 1 + seq.length_rems.len() + 3;

        let mut zeroed = buf.clone();
        write_word(&mut zeroed, bits_start, 0);
        assert!(matches!(
            CompressedSeq::load(&mut WordReader::new(&zeroed)),
            Err(MphError::Malformed(_))
        ));

        // last end becomes 4 instead of 5
        let mut short = buf.clone();
        write_word(&mut short, rems_word, 0b011);
        assert!(matches!(
            CompressedSeq::load(&mut WordReader::new(&short)),
            Err(MphError::Malformed(_))
        ));
    }

    #[test]
    fn loaded_sequences_never_panic() {
        let values: Vec<u32> = (0..400u32).map(|i| if i % 3 == 0 { 0 } else { i * 977 }).collect();
        let seq = CompressedSeq::generate(&values).unwrap();
        let buf = dumped(&seq);
        for word in 0..buf.len() / 4 {
            let orig = read_word(&buf, word).unwrap();
            for pattern in [0, u32::MAX, orig ^ 1, orig ^ 0x8000_0000, orig.wrapping_add(1)] {
                let mut bad = buf.clone();
                write_word(&mut bad, word, pattern);
                if let Ok(back) = CompressedSeq::load(&mut WordReader::new(&bad)) {
                    for i in 0..back.len() as u32 {
                        back.get(i);
                    }
                }
            }
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_validates() {
        let seq = CompressedSeq::generate(&[5, 0, 9, 1_000]).unwrap();
        let back: CompressedSeq = bincode::deserialize(&bincode::serialize(&seq).unwrap()).unwrap();
        assert_eq!(back, seq);

        let mut bad = seq.clone();
        bad.total_length += 1;
        assert!(bincode::deserialize::<CompressedSeq>(&bincode::serialize(&bad).unwrap()).is_err());
    }

    proptest! {
        #[test]
        fn get_recovers_every_value(values in prop::collection::vec(
            prop_oneof![Just(0u32), 0u32..16, 0u32..100_000, any::<u32>(), Just(u32::MAX)], 1..600)) {
            let seq = CompressedSeq::generate(&values).unwrap();
            for (i, &v) in values.iter().enumerate() {
                prop_assert_eq!(seq.get(i as u32), v);
            }
        }
    }
}
