//! Bucket placement: the three construction phases.
//!
//! 1) mapping: hash every key into a bucket `g` and an `(f, h)` pair, rejecting seeds
//!    that give two keys of one bucket the same pair
//! 2) ordering: counting sort of buckets by size
//! 3) searching: from the largest size class down, find for each bucket the first probe
//!    pair `(p0, p1)` that sends all of its items to free bins

use crate::builder::MphError;
use crate::hash::{KeyHash, LaneHasher};
use crate::util::{BitSet, is_prime};
use log::debug;
use rand::Rng;

const KEYS_PER_BUCKET: u32 = 4;
const MAX_PROBES_BASE: f64 = (1u32 << 20) as f64;

/// Loads outside [0.5, 0.99] are clamped; NaN counts as 0.5.
pub fn clamp_load_factor(c: f64) -> f64 {
    if c >= 0.99 {
        0.99
    } else if c >= 0.5 {
        c
    } else {
        0.5
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Item {
    pub f: u32,
    pub h: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Bucket {
    offset: u32,
    size: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PlacedBucket {
    pub offset: u32, // into Ordered::items
    pub id: u32,     // bucket number before ordering
}

/// Contiguous run of buckets sharing one size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SizeClass {
    pub start: u32,
    pub len: u32,
}

/// Result of the mapping phase.
#[derive(Debug)]
pub(crate) struct Mapping {
    pub seed: u32,
    buckets: Vec<Bucket>,
    items: Vec<Item>,
    pub max_bucket_size: u32,
}

/// Buckets and items laid out by decreasing bucket size.
#[derive(Debug)]
pub(crate) struct Ordered {
    pub seed: u32,
    pub buckets: Vec<PlacedBucket>,
    pub items: Vec<Item>,
    /// Indexed by bucket size; entry 0 is unused.
    pub classes: Vec<SizeClass>,
}

#[derive(Debug, Clone)]
pub(crate) struct BucketPlacer {
    pub key_count: u32,
    pub bucket_count: u32,
    pub bin_count: u32,
}

impl BucketPlacer {
    pub fn new(key_count: u32, load_factor: f64) -> Self {
        let c = clamp_load_factor(load_factor);
        let bucket_count = key_count.div_ceil(KEYS_PER_BUCKET) + 1;

        let mut bin_count = (key_count as f64 / c) as u32 + 1;
        if bin_count % 2 == 0 {
            bin_count += 1;
        }
        // only odd candidates; the smallest result is 3
        while !is_prime(bin_count) {
            bin_count += 2;
        }

        Self {
            key_count,
            bucket_count,
            bin_count,
        }
    }

    /// log2(n) / 20 * 2^20 probe pairs per size class, at least one.
    pub fn max_probes(&self) -> u32 {
        let budget = (self.key_count as f64).log2() / 20.0 * MAX_PROBES_BASE;
        (budget as u32).max(1)
    }

    fn hash_keys<H: LaneHasher>(&self, keys: &[&[u8]], seed: u32) -> Vec<KeyHash> {
        let (buckets, bins) = (self.bucket_count, self.bin_count);
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            keys.par_iter()
                .map(|k| KeyHash::from_key::<H>(k, seed, buckets, bins))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            keys.iter()
                .map(|k| KeyHash::from_key::<H>(k, seed, buckets, bins))
                .collect()
        }
    }

    /// Mapping phase. Draws up to `attempts` seeds from `rng`.
    pub fn map<H: LaneHasher, R: Rng>(
        &self,
        keys: &[&[u8]],
        rng: &mut R,
        attempts: u32,
    ) -> Result<Mapping, MphError> {
        debug_assert_eq!(keys.len(), self.key_count as usize);

        for attempt in 0..attempts {
            let seed: u32 = rng.r#gen();
            let hashed = self.hash_keys::<H>(keys, seed);

            let mut buckets = vec![Bucket::default(); self.bucket_count as usize];
            let mut max_bucket_size = 0;
            for kh in &hashed {
                let b = &mut buckets[kh.g as usize];
                b.size += 1;
                max_bucket_size = max_bucket_size.max(b.size);
            }

            let mut offset = 0;
            for b in buckets.iter_mut() {
                b.offset = offset;
                offset += b.size;
                b.size = 0;
            }

            let mut items = vec![Item::default(); self.key_count as usize];
            if hashed.iter().all(|kh| insert(&mut buckets, &mut items, kh)) {
                return Ok(Mapping {
                    seed,
                    buckets,
                    items,
                    max_bucket_size,
                });
            }
            debug!("mapping attempt {attempt}: seed {seed:#010x} repeats an (f, h) pair inside a bucket");
        }
        Err(MphError::ConstructionExhausted(attempts))
    }

    /// Ordering phase: counting sort by size, largest class first.
    pub fn order(&self, mapping: Mapping) -> Ordered {
        let max = mapping.max_bucket_size as usize;
        let mut classes = vec![SizeClass::default(); max + 1];
        for b in &mapping.buckets {
            if b.size > 0 {
                classes[b.size as usize].len += 1;
            }
        }

        let mut start = 0;
        for size in (1..=max).rev() {
            classes[size].start = start;
            start += classes[size].len;
        }

        let mut buckets = vec![PlacedBucket::default(); start as usize];
        let mut filled = vec![0u32; max + 1];
        for (id, b) in mapping.buckets.iter().enumerate() {
            if b.size == 0 {
                continue;
            }
            let size = b.size as usize;
            buckets[(classes[size].start + filled[size]) as usize] = PlacedBucket {
                offset: b.offset,
                id: id as u32,
            };
            filled[size] += 1;
        }

        // Re-lay items in the new bucket order.
        let mut items = Vec::with_capacity(mapping.items.len());
        for size in (1..=max).rev() {
            let class = classes[size];
            for placed in &mut buckets[class.start as usize..(class.start + class.len) as usize] {
                let from = placed.offset as usize;
                placed.offset = items.len() as u32;
                items.extend_from_slice(&mapping.items[from..from + size]);
            }
        }

        Ordered {
            seed: mapping.seed,
            buckets,
            items,
            classes,
        }
    }

    /// Searching phase. Returns one displacement `p0 + p1 * bins` per bucket, or `None`
    /// when some size class runs out of probes.
    pub fn search(&self, ordered: &mut Ordered) -> Option<Vec<u32>> {
        let bins = self.bin_count;
        let max_probes = self.max_probes();
        let mut occupied = BitSet::new(bins as usize);
        let mut disps = vec![0u32; self.bucket_count as usize];

        for size in (1..ordered.classes.len()).rev() {
            let class = ordered.classes[size];
            let start = class.start as usize;
            let mut pending = class.len as usize;
            let (mut probe0, mut probe1, mut probes) = (0u32, 0u32, 0u32);

            while pending != 0 {
                if probes >= max_probes || probe1 >= bins {
                    debug!(
                        "searching: {pending} buckets of size {size} unplaced after {probes} probes"
                    );
                    return None;
                }

                let mut kept = 0;
                for cur in start..start + pending {
                    let bucket = ordered.buckets[cur];
                    let items = &ordered.items[bucket.offset as usize..bucket.offset as usize + size];
                    if place_bucket(items, probe0, probe1, bins, &mut occupied) {
                        disps[bucket.id as usize] = probe0 + probe1 * bins;
                    } else {
                        ordered.buckets[start + kept] = bucket;
                        kept += 1;
                    }
                }
                pending = kept;

                probe0 += 1;
                if probe0 >= bins {
                    probe0 -= bins;
                    probe1 += 1;
                }
                probes += 1;
            }
        }
        Some(disps)
    }
}

/// Append `kh` to its bucket unless an item with the same `(f, h)` is already there.
fn insert(buckets: &mut [Bucket], items: &mut [Item], kh: &KeyHash) -> bool {
    let bucket = &mut buckets[kh.g as usize];
    let start = bucket.offset as usize;
    let end = start + bucket.size as usize;
    if items[start..end].iter().any(|it| it.f == kh.f && it.h == kh.h) {
        return false;
    }
    items[end] = Item { f: kh.f, h: kh.h };
    bucket.size += 1;
    true
}

/// Claim the bins of every item for `(probe0, probe1)`, or leave `occupied` untouched.
fn place_bucket(items: &[Item], probe0: u32, probe1: u32, bins: u32, occupied: &mut BitSet) -> bool {
    let position = |it: &Item| KeyHash { g: 0, f: it.f, h: it.h }.place(probe0, probe1, bins) as usize;

    for (i, it) in items.iter().enumerate() {
        let p = position(it);
        if occupied.test(p) {
            for done in &items[..i] {
                occupied.clear(position(done));
            }
            return false;
        }
        occupied.set(p);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Jenkins;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn keys(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("KEY-{i}").into_bytes()).collect()
    }

    #[test]
    fn table_sizes() {
        let p = BucketPlacer::new(20_000, 1.0);
        assert_eq!(p.bucket_count, 5_001);
        assert!(p.bin_count >= 20_000 && is_prime(p.bin_count));
        // 20000 / 0.99 = 20202.02 -> 20203 is the first odd candidate
        assert!(p.bin_count >= 20_203);

        assert_eq!(BucketPlacer::new(0, 0.9).bin_count, 3);
        assert_eq!(BucketPlacer::new(1, 0.9).bin_count, 3);
        assert_eq!(BucketPlacer::new(1, 0.9).bucket_count, 2);
        assert_eq!(BucketPlacer::new(1, 0.9).max_probes(), 1);
    }

    #[test]
    fn load_factor_is_clamped() {
        assert_eq!(clamp_load_factor(0.1), 0.5);
        assert_eq!(clamp_load_factor(1.5), 0.99);
        assert_eq!(clamp_load_factor(0.75), 0.75);
        assert_eq!(clamp_load_factor(f64::NAN), 0.5);
        assert_eq!(BucketPlacer::new(1000, 0.0).bin_count, BucketPlacer::new(1000, 0.5).bin_count);
    }

    #[test]
    fn mapping_groups_items_by_bucket() {
        let owned = keys(1_000);
        let refs: Vec<&[u8]> = owned.iter().map(|k| k.as_slice()).collect();
        let placer = BucketPlacer::new(1_000, 0.9);
        let mut rng = StdRng::seed_from_u64(111);
        let m = placer.map::<Jenkins, _>(&refs, &mut rng, 10).unwrap();

        let total: u32 = m.buckets.iter().map(|b| b.size).sum();
        assert_eq!(total, 1_000);
        assert_eq!(m.max_bucket_size, m.buckets.iter().map(|b| b.size).max().unwrap());
        for b in &m.buckets {
            for it in &m.items[b.offset as usize..(b.offset + b.size) as usize] {
                assert!(it.f < placer.bin_count && it.h >= 1 && it.h < placer.bin_count);
            }
        }
        for k in &refs {
            let kh = KeyHash::from_key::<Jenkins>(k, m.seed, placer.bucket_count, placer.bin_count);
            let b = m.buckets[kh.g as usize];
            let slice = &m.items[b.offset as usize..(b.offset + b.size) as usize];
            assert!(slice.contains(&Item { f: kh.f, h: kh.h }));
        }
    }

    #[test]
    fn duplicate_keys_exhaust_mapping() {
        let refs: Vec<&[u8]> = vec![b"same".as_slice(), b"other".as_slice(), b"same".as_slice()];
        let placer = BucketPlacer::new(3, 0.9);
        let mut rng = StdRng::seed_from_u64(1);
        let err = placer.map::<Jenkins, _>(&refs, &mut rng, 25).unwrap_err();
        assert!(matches!(err, MphError::ConstructionExhausted(25)));
    }

    #[test]
    fn ordering_is_largest_first_and_keeps_items() {
        let owned = keys(2_000);
        let refs: Vec<&[u8]> = owned.iter().map(|k| k.as_slice()).collect();
        let placer = BucketPlacer::new(2_000, 0.99);
        let mut rng = StdRng::seed_from_u64(7);
        let m = placer.map::<Jenkins, _>(&refs, &mut rng, 10).unwrap();
        let mut before: Vec<Vec<Item>> = m
            .buckets
            .iter()
            .map(|b| m.items[b.offset as usize..(b.offset + b.size) as usize].to_vec())
            .collect();
        let non_empty = before.iter().filter(|b| !b.is_empty()).count();

        let o = placer.order(m);
        assert_eq!(o.buckets.len(), non_empty);
        assert_eq!(o.items.len(), 2_000);

        let mut last_size = usize::MAX;
        for size in (1..o.classes.len()).rev() {
            let class = o.classes[size];
            for placed in &o.buckets[class.start as usize..(class.start + class.len) as usize] {
                assert!(size <= last_size);
                last_size = size;
                let after = &o.items[placed.offset as usize..placed.offset as usize + size];
                assert_eq!(after, before[placed.id as usize].as_slice());
                before[placed.id as usize].clear();
            }
        }
        assert!(before.iter().all(|b| b.is_empty()));
    }

    #[test]
    fn search_places_every_key_once() {
        let owned = keys(5_000);
        let refs: Vec<&[u8]> = owned.iter().map(|k| k.as_slice()).collect();
        let placer = BucketPlacer::new(5_000, 0.99);
        let mut rng = StdRng::seed_from_u64(111);
        let mut disps = None;
        let mut seed = 0;
        for _ in 0..100 {
            let m = placer.map::<Jenkins, _>(&refs, &mut rng, 1_000).unwrap();
            let mut o = placer.order(m);
            seed = o.seed;
            disps = placer.search(&mut o);
            if disps.is_some() {
                break;
            }
        }
        let disps = disps.expect("search should succeed");

        let mut used = BitSet::new(placer.bin_count as usize);
        for k in &refs {
            let kh = KeyHash::from_key::<Jenkins>(k, seed, placer.bucket_count, placer.bin_count);
            let d = disps[kh.g as usize];
            let p = kh.place(d % placer.bin_count, d / placer.bin_count, placer.bin_count) as usize;
            assert!(!used.test(p), "collision at {p}");
            used.set(p);
        }
    }

    #[test]
    fn failed_probe_undoes_partial_placement() {
        let mut occupied = BitSet::new(11);
        occupied.set(5);
        // first item lands on 2, second on 5 (taken)
        let items = [Item { f: 2, h: 1 }, Item { f: 5, h: 1 }];
        assert!(!place_bucket(&items, 0, 0, 11, &mut occupied));
        assert!(!occupied.test(2));
        assert!(occupied.test(5));

        // probe0 = 1 shifts both by their stride
        assert!(place_bucket(&items, 1, 0, 11, &mut occupied));
        assert!(occupied.test(3) && occupied.test(6));
    }

    #[test]
    fn items_colliding_within_a_bucket_are_rejected() {
        let mut occupied = BitSet::new(7);
        // distinct (f, h) but the same bin for probe0 = 0
        let items = [Item { f: 4, h: 1 }, Item { f: 4, h: 2 }];
        assert!(!place_bucket(&items, 0, 0, 7, &mut occupied));
        assert!((0..7).all(|i| !occupied.test(i)));
        assert!(place_bucket(&items, 1, 0, 7, &mut occupied));
    }
}
