use crate::buckets::BucketPlacer;
use crate::compressed_seq::CompressedSeq;
use crate::hash::{Jenkins, LaneHasher};
use crate::mphf::Mphf;
use ahash::RandomState;
use hashbrown::HashSet;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::borrow::Borrow;
use std::marker::PhantomData;
use thiserror::Error;

/// Build parameters.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Keys per bin. Clamped to [0.5, 0.99]; higher means a smaller range and a slower search.
    pub load_factor: f64,
    /// Seeds the RNG that draws mapping seeds. Same keys + same config -> same function.
    pub seed: u64,
    /// Seeds tried by one mapping phase before giving up (a failure almost always means duplicate keys).
    pub mapping_attempts: u32,
    /// Full mapping + search rounds before giving up.
    pub search_attempts: u32,
    /// Reject byte-identical keys up front instead of exhausting the mapping seeds.
    pub check_duplicates: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            load_factor: 0.99,
            seed: 111,
            mapping_attempts: 1_000,
            search_attempts: 100,
            check_duplicates: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum MphError {
    #[error("duplicate key detected during build")]
    DuplicateKey,
    #[error("empty key set is not supported")]
    EmptyKeySet,
    #[error("{0} keys do not fit a 32-bit index")]
    TooManyKeys(usize),
    #[error("mapping failed for {0} seeds, verify keys are distinct")]
    ConstructionExhausted(u32),
    #[error("could not place all buckets after {0} attempts")]
    SearchExhausted(u32),
    #[error("compressed codes need {0} bits, beyond a 32-bit offset")]
    CodesTooLong(u64),
    #[error("output buffer holds {available} bytes, {needed} required")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("dump truncated at word {0}")]
    Truncated(usize),
    #[error("malformed dump: {0}")]
    Malformed(&'static str),
    #[cfg(feature = "serde")]
    #[error("serialization error: {0}")]
    Serde(#[from] Box<bincode::ErrorKind>),
}

pub struct Builder<H = Jenkins> {
    cfg: BuildConfig,
    _hasher: PhantomData<H>,
}

impl Builder {
    pub fn new() -> Self {
        Self::with_hasher()
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: LaneHasher> Builder<H> {
    /// Builder for a non-default mixing hash, e.g. `Builder::<Xxh3Lanes>::with_hasher()`.
    pub fn with_hasher() -> Self {
        Self {
            cfg: BuildConfig::default(),
            _hasher: PhantomData,
        }
    }

    pub fn with_config(mut self, cfg: BuildConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.cfg
    }

    /// Build the MPH. Keys must be distinct.
    pub fn build<K, I>(&self, keys: I) -> Result<Mphf<H>, MphError>
    where
        K: Borrow<[u8]>,
        I: IntoIterator<Item = K>,
    {
        let owned: Vec<K> = keys.into_iter().collect();
        let keys: Vec<&[u8]> = owned.iter().map(|k| k.borrow()).collect();
        self.build_from_slices(&keys)
    }

    fn build_from_slices(&self, keys: &[&[u8]]) -> Result<Mphf<H>, MphError> {
        let n = keys.len();
        if n == 0 {
            return Err(MphError::EmptyKeySet);
        }
        let key_count = u32::try_from(n).map_err(|_| MphError::TooManyKeys(n))?;

        // Exact bytes, no probabilistic dedup.
        if self.cfg.check_duplicates {
            let mut seen = HashSet::with_capacity_and_hasher(n, RandomState::new());
            if !keys.iter().all(|k| seen.insert(*k)) {
                return Err(MphError::DuplicateKey);
            }
        }

        let placer = BucketPlacer::new(key_count, self.cfg.load_factor);
        let mut rng = StdRng::seed_from_u64(self.cfg.seed);

        for round in 0..self.cfg.search_attempts {
            let mapping = placer.map::<H, _>(keys, &mut rng, self.cfg.mapping_attempts)?;
            let mut ordered = placer.order(mapping);
            let Some(disps) = placer.search(&mut ordered) else {
                debug!("round {round}: search failed for seed {:#010x}", ordered.seed);
                continue;
            };

            if round > 0 {
                warn!("placement needed {} rounds for {n} keys", round + 1);
            }
            let mphf = Mphf::from_parts(
                ordered.seed,
                placer.bin_count,
                placer.bucket_count,
                CompressedSeq::generate(&disps)?,
            );
            info!(
                "built mphf: {n} keys -> {} bins, {} buckets, {} bytes",
                placer.bin_count,
                placer.bucket_count,
                mphf.size_in_bytes()
            );
            return Ok(mphf);
        }
        Err(MphError::SearchExhausted(self.cfg.search_attempts))
    }
}
