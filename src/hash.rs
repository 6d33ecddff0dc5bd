use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Mixing hash: three well-dispersed 32-bit lanes from a seed and the key bytes.
///
/// The hasher is not recorded in a dump. A dumped function must be loaded with the
/// same `LaneHasher` it was built with.
pub trait LaneHasher {
    fn lanes(seed: u32, key: &[u8]) -> [u32; 3];
}

/// Bob Jenkins' lookup2 vector hash. Default hasher and the one the word dump format
/// is defined against.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Jenkins;

/// Lanes taken from two seeded xxh3 calls.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Xxh3Lanes;

/// Lanes taken from two seeded wyhash calls.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WyLanes;

const GOLDEN: u32 = 0x9e37_79b9;

#[inline(always)]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 13);
    *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 8);
    *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 13);
    *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 12);
    *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 16);
    *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 5);
    *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 3);
    *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 10);
    *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 15);
}

#[inline(always)]
fn le_word(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, &b)| acc.wrapping_add((b as u32) << (8 * i)))
}

impl LaneHasher for Jenkins {
    #[inline]
    fn lanes(seed: u32, key: &[u8]) -> [u32; 3] {
        let (mut a, mut b, mut c) = (GOLDEN, GOLDEN, seed);

        let mut blocks = key.chunks_exact(12);
        for block in &mut blocks {
            a = a.wrapping_add(le_word(&block[0..4]));
            b = b.wrapping_add(le_word(&block[4..8]));
            c = c.wrapping_add(le_word(&block[8..12]));
            mix(&mut a, &mut b, &mut c);
        }

        // Tail: the low byte of c is reserved for the length.
        let tail = blocks.remainder();
        c = c.wrapping_add(key.len() as u32);
        let (ta, rest) = tail.split_at(tail.len().min(4));
        let (tb, tc) = rest.split_at(rest.len().min(4));
        a = a.wrapping_add(le_word(ta));
        b = b.wrapping_add(le_word(tb));
        c = c.wrapping_add(le_word(tc) << 8);
        mix(&mut a, &mut b, &mut c);

        [a, b, c]
    }
}

impl LaneHasher for Xxh3Lanes {
    #[inline]
    fn lanes(seed: u32, key: &[u8]) -> [u32; 3] {
        let lo = xxh3_64_with_seed(key, seed as u64);
        let hi = xxh3_64_with_seed(key, (seed as u64) ^ 0x9E37_79B9_7F4A_7C15);
        [lo as u32, (lo >> 32) as u32, hi as u32]
    }
}

impl LaneHasher for WyLanes {
    #[inline]
    fn lanes(seed: u32, key: &[u8]) -> [u32; 3] {
        let lo = wyhash::wyhash(key, seed as u64);
        let hi = wyhash::wyhash(key, (seed as u64) ^ 0x853C_49E6_0A6C_9D39);
        [lo as u32, (lo >> 32) as u32, hi as u32]
    }
}

/// Per-key hash triple: bucket `g`, first bin `f` and probe stride `h`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyHash {
    pub g: u32, // bucket selector, [0, buckets)
    pub f: u32, // base bin, [0, bins)
    pub h: u32, // stride, [1, bins)
}

impl KeyHash {
    #[inline]
    pub fn from_key<H: LaneHasher>(key: &[u8], seed: u32, buckets: u32, bins: u32) -> Self {
        let [l0, l1, l2] = H::lanes(seed, key);
        Self {
            g: l0 % buckets,
            f: l1 % bins,
            h: l2 % (bins - 1) + 1,
        }
    }

    /// Bin for the probe pair `(probe0, probe1)`:
    /// pos = (f + h * probe0 + probe1) % bins
    #[inline]
    pub fn place(&self, probe0: u32, probe1: u32, bins: u32) -> u32 {
        let mixed = self.f as u64 + self.h as u64 * probe0 as u64 + probe1 as u64;
        (mixed % bins as u64) as u32
    }
}
