use crate::builder::{BuildConfig, Builder, MphError};
use crate::compressed_seq::CompressedSeq;
use crate::hash::{Jenkins, KeyHash, LaneHasher};
use crate::util::{WordReader, WordWriter};
#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, de};
use std::borrow::Borrow;
use std::marker::PhantomData;

/// Final MPH structure: seed, range, bucket count and the compressed displacement of
/// every bucket.
///
/// Query: disp = D[g]; pos = (f + h * (disp % range) + disp / range) % range
///
/// Word dump layout (native endianness):
/// `seed, max_value, buckets, <compressed displacements>`
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mphf<H = Jenkins> {
    seed: u32,
    max_value: u32, // prime bin count, >= number of keys
    buckets: u32,
    disps: CompressedSeq,
    #[cfg_attr(feature = "serde", serde(skip))]
    _hasher: PhantomData<H>,
}

impl Mphf {
    /// Build with the default hasher and configuration, overriding only the load factor.
    pub fn from_keys<K, I>(keys: I, load_factor: f64) -> Result<Self, MphError>
    where
        K: Borrow<[u8]>,
        I: IntoIterator<Item = K>,
    {
        Builder::new()
            .with_config(BuildConfig {
                load_factor,
                ..Default::default()
            })
            .build(keys)
    }
}

impl<H: LaneHasher> Mphf<H> {
    pub(crate) fn from_parts(seed: u32, max_value: u32, buckets: u32, disps: CompressedSeq) -> Self {
        Self {
            seed,
            max_value,
            buckets,
            disps,
            _hasher: PhantomData,
        }
    }

    /// O(1) lookup. Distinct for every key of the build set; any other key lands
    /// somewhere in `[0, max_value)`.
    #[inline]
    pub fn index(&self, key: &[u8]) -> u32 {
        let kh = KeyHash::from_key::<H>(key, self.seed, self.buckets, self.max_value);
        let disp = self.disps.get(kh.g);
        kh.place(disp % self.max_value, disp / self.max_value, self.max_value)
    }

    #[inline]
    pub fn index_str(&self, s: &str) -> u32 {
        self.index(s.as_bytes())
    }

    /// Exclusive upper bound of `index`.
    pub fn max_value(&self) -> u32 {
        self.max_value
    }

    pub fn bucket_count(&self) -> u32 {
        self.buckets
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Exact length of the word dump.
    pub fn size_in_bytes(&self) -> usize {
        4 * 3 + self.disps.size_in_bytes()
    }

    pub fn dump(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.size_in_bytes()];
        self.write_words(&mut buf);
        buf
    }

    /// Dump into a caller buffer; returns the number of bytes written. Nothing is
    /// written when the buffer is too small.
    pub fn dump_into(&self, buf: &mut [u8]) -> Result<usize, MphError> {
        let needed = self.size_in_bytes();
        if buf.len() < needed {
            return Err(MphError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        self.write_words(&mut buf[..needed]);
        Ok(needed)
    }

    fn write_words(&self, buf: &mut [u8]) {
        let mut w = WordWriter::new(buf);
        w.put(self.seed);
        w.put(self.max_value);
        w.put(self.buckets);
        self.disps.dump(&mut w);
        debug_assert_eq!(w.position() * 4, self.size_in_bytes());
    }

    /// Rebuild from a word dump. Must be loaded with the hasher it was built with.
    pub fn load(bytes: &[u8]) -> Result<Self, MphError> {
        let mut r = WordReader::new(bytes);
        let seed = r.next_word()?;
        let max_value = r.next_word()?;
        let buckets = r.next_word()?;
        let disps = CompressedSeq::load(&mut r)?;

        let mphf = Self::from_parts(seed, max_value, buckets, disps);
        mphf.check_header()?;
        Ok(mphf)
    }

    /// Header fields must agree with the displacement table. The table itself is
    /// checked when it is read.
    fn check_header(&self) -> Result<(), MphError> {
        if self.max_value < 2 {
            return Err(MphError::Malformed("range below 2"));
        }
        if self.buckets as usize != self.disps.len() {
            return Err(MphError::Malformed("bucket count differs from displacement count"));
        }
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn to_bytes(&self) -> Result<Vec<u8>, MphError> {
        Ok(bincode::serialize(self)?)
    }

    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MphError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct MphfParts {
    seed: u32,
    max_value: u32,
    buckets: u32,
    disps: CompressedSeq,
}

#[cfg(feature = "serde")]
impl<'de, H: LaneHasher> Deserialize<'de> for Mphf<H> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let p = MphfParts::deserialize(deserializer)?;
        let mphf = Self::from_parts(p.seed, p.max_value, p.buckets, p.disps);
        mphf.check_header().map_err(<D::Error as de::Error>::custom)?;
        Ok(mphf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{read_word, write_word};

    fn sample() -> (Vec<Vec<u8>>, Mphf) {
        let keys: Vec<Vec<u8>> = (0..1_500).map(|i| format!("KEY-{i}").into_bytes()).collect();
        let mphf = Mphf::from_keys(keys.iter().map(|k| k.as_slice()), 0.9).unwrap();
        (keys, mphf)
    }

    #[test]
    fn dump_has_exact_size_and_header() {
        let (_, mphf) = sample();
        let bytes = mphf.dump();
        assert_eq!(bytes.len(), mphf.size_in_bytes());
        assert_eq!(read_word(&bytes, 0), Some(mphf.seed()));
        assert_eq!(read_word(&bytes, 1), Some(mphf.max_value()));
        assert_eq!(read_word(&bytes, 2), Some(mphf.bucket_count()));
    }

    #[test]
    fn dump_into_checks_capacity() {
        let (_, mphf) = sample();
        let size = mphf.size_in_bytes();

        let mut small = vec![0xAAu8; size - 1];
        let err = mphf.dump_into(&mut small).unwrap_err();
        assert!(matches!(err, MphError::BufferTooSmall { needed, available } if needed == size && available == size - 1));
        assert!(small.iter().all(|&b| b == 0xAA));

        let mut big = vec![0xAAu8; size + 8];
        assert_eq!(mphf.dump_into(&mut big).unwrap(), size);
        assert_eq!(&big[..size], mphf.dump().as_slice());
        assert!(big[size..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn load_round_trips_byte_for_byte() {
        let (keys, mphf) = sample();
        let bytes = mphf.dump();
        let back: Mphf = Mphf::load(&bytes).unwrap();
        assert_eq!(back, mphf);
        assert_eq!(back.dump(), bytes);
        for k in &keys {
            assert_eq!(back.index(k), mphf.index(k));
        }
    }

    #[test]
    fn load_rejects_bad_input() {
        let (_, mphf) = sample();
        let bytes = mphf.dump();
        for cut in [0, 4, 11, 12, 40, bytes.len() - 4] {
            assert!(Mphf::<Jenkins>::load(&bytes[..cut]).is_err(), "cut = {cut}");
        }

        let mut bad = bytes.clone();
        write_word(&mut bad, 2, mphf.bucket_count() + 1);
        assert!(matches!(Mphf::<Jenkins>::load(&bad), Err(MphError::Malformed(_))));

        let mut bad = bytes;
        write_word(&mut bad, 1, 1);
        assert!(matches!(Mphf::<Jenkins>::load(&bad), Err(MphError::Malformed(_))));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn bincode_round_trip() {
        let (keys, mphf) = sample();
        let back: Mphf = Mphf::from_bytes(&mphf.to_bytes().unwrap()).unwrap();
        assert_eq!(back, mphf);
        assert!(keys.iter().all(|k| back.index(k) == mphf.index(k)));
    }

    /// Word index of the select bit vector and of its sample table inside a dump.
    fn select_words(bytes: &[u8]) -> (usize, usize) {
        let rems = read_word(bytes, 3).unwrap() as usize;
        let bits_len_at = 4 + rems + 2;
        let bits = read_word(bytes, bits_len_at).unwrap() as usize;
        (bits_len_at + 1, bits_len_at + 1 + bits + 1)
    }

    #[test]
    fn load_rejects_corrupted_select() {
        let (_, mphf) = sample();
        let bytes = mphf.dump();
        let (bits_at, samples_at) = select_words(&bytes);

        let mut zeroed = bytes.clone();
        for w in bits_at..samples_at - 1 {
            write_word(&mut zeroed, w, 0);
        }
        assert!(matches!(Mphf::<Jenkins>::load(&zeroed), Err(MphError::Malformed(_))));

        let mut far = bytes.clone();
        write_word(&mut far, samples_at, 0xFFFF_FF00);
        assert!(matches!(Mphf::<Jenkins>::load(&far), Err(MphError::Malformed(_))));

        let mut moved = bytes;
        let w = read_word(&moved, bits_at).unwrap();
        write_word(&mut moved, bits_at, w.rotate_left(1));
        if let Ok(back) = Mphf::<Jenkins>::load(&moved) {
            for i in 0..2_000 {
                assert!(back.index(format!("KEY-{i}").as_bytes()) < back.max_value());
            }
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn bincode_rejects_tampered_header() {
        let (_, mphf) = sample();
        let bytes = mphf.to_bytes().unwrap();

        // fixed-width little-endian: seed, max_value, buckets
        let mut narrow = bytes.clone();
        narrow[4..8].copy_from_slice(&1u32.to_le_bytes());
        let err = Mphf::<Jenkins>::from_bytes(&narrow).unwrap_err();
        assert!(matches!(err, MphError::Serde(_)));
        assert!(err.to_string().contains("range below 2"));

        let mut no_buckets = bytes;
        no_buckets[8..12].copy_from_slice(&0u32.to_le_bytes());
        let err = Mphf::<Jenkins>::from_bytes(&no_buckets).unwrap_err();
        assert!(err.to_string().contains("bucket count"));
    }
}
