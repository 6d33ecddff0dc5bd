//! chd_mphf — CHD (compress, hash, displace) minimal perfect hashing.
//!
//! - Build once on a set of **unique** keys (bytes/str).
//! - O(1) lookups: key -> unique index in `[0..max_value)`, `max_value` the first prime
//!   above `n / load_factor`.
//! - Per-bucket displacements stored in a succinct compressed sequence, dumped as a flat
//!   sequence of 32-bit words.
//! - Robust: a seed that maps two keys of one bucket to the same pair is redrawn; a
//!   search that runs out of probes restarts from a fresh mapping.
//!
//! ```
//! use chd_mphf::Mphf;
//!
//! let keys = ["apple", "banana", "cherry"];
//! let mphf = Mphf::from_keys(keys.iter().map(|k| k.as_bytes()), 0.99).unwrap();
//! let mut seen: Vec<u32> = keys.iter().map(|k| mphf.index_str(k)).collect();
//! seen.sort_unstable();
//! seen.dedup();
//! assert_eq!(seen.len(), 3);
//!
//! let loaded: Mphf = Mphf::load(&mphf.dump()).unwrap();
//! assert_eq!(loaded.index_str("banana"), mphf.index_str("banana"));
//! ```

mod buckets;
mod builder;
pub mod compressed_seq;
mod dict;
mod hash;
mod mphf;
pub mod select;
mod util;

pub use buckets::clamp_load_factor;
pub use builder::{BuildConfig, Builder, MphError};
pub use compressed_seq::CompressedSeq;
pub use dict::{KeyBytes, StaticDictionary};
pub use hash::{Jenkins, KeyHash, LaneHasher, WyLanes, Xxh3Lanes};
pub use mphf::Mphf;
pub use select::Select;
pub use util::is_prime;
