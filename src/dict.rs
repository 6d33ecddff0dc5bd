//! Read-only map over a fixed key set, indexed by an [`Mphf`].
//!
//! The function is only collision-free on the build set, so every lookup compares the
//! stored key before answering.

use crate::builder::{BuildConfig, Builder, MphError};
use crate::hash::{Jenkins, LaneHasher};
use crate::mphf::Mphf;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::borrow::{Borrow, Cow};
use std::ops::Index;

/// Byte view of a key, as fed to the mixing hash.
pub trait KeyBytes {
    fn key_bytes(&self) -> Cow<'_, [u8]>;
}

impl KeyBytes for [u8] {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl KeyBytes for Vec<u8> {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl KeyBytes for str {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl KeyBytes for String {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl<T: KeyBytes + ?Sized> KeyBytes for &T {
    fn key_bytes(&self) -> Cow<'_, [u8]> {
        (**self).key_bytes()
    }
}

macro_rules! int_key_bytes {
    ($($t:ty),*) => {$(
        impl KeyBytes for $t {
            fn key_bytes(&self) -> Cow<'_, [u8]> {
                Cow::Owned(self.to_le_bytes().to_vec())
            }
        }
    )*};
}
int_key_bytes!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "K: Serialize, V: Serialize",
        deserialize = "K: Deserialize<'de>, V: Deserialize<'de>, H: LaneHasher"
    ))
)]
#[derive(Debug, Clone)]
pub struct StaticDictionary<K, V, H = Jenkins> {
    mphf: Mphf<H>,
    slots: Vec<Option<(K, V)>>, // len == mphf.max_value()
    len: usize,
}

impl<K: KeyBytes + Eq, V> StaticDictionary<K, V> {
    /// Build with load factor 0.99.
    pub fn new<I>(entries: I) -> Result<Self, MphError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        Self::build_with(entries, &Builder::new())
    }

    pub fn with_load_factor<I>(entries: I, load_factor: f64) -> Result<Self, MphError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let builder = Builder::new().with_config(BuildConfig {
            load_factor,
            ..Default::default()
        });
        Self::build_with(entries, &builder)
    }
}

impl<K: KeyBytes + Eq, V, H: LaneHasher> StaticDictionary<K, V, H> {
    /// Build with an explicit builder (hasher and configuration).
    pub fn build_with<I>(entries: I, builder: &Builder<H>) -> Result<Self, MphError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(K, V)> = entries.into_iter().collect();
        let (mphf, positions) = {
            let bytes: Vec<Cow<'_, [u8]>> = entries.iter().map(|(k, _)| k.key_bytes()).collect();
            let mphf = builder.build(bytes.iter().map(|b| b.as_ref()))?;
            let positions: Vec<u32> = bytes.iter().map(|b| mphf.index(b)).collect();
            (mphf, positions)
        };

        let mut slots: Vec<Option<(K, V)>> = (0..mphf.max_value()).map(|_| None).collect();
        let len = entries.len();
        for (pos, entry) in positions.into_iter().zip(entries) {
            slots[pos as usize] = Some(entry);
        }

        Ok(Self { mphf, slots, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value for `key`, or `None` when the key was not in the build set.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: KeyBytes + Eq + ?Sized,
    {
        let pos = self.mphf.index(&key.key_bytes()) as usize;
        match self.slots.get(pos)? {
            Some((k, v)) if k.borrow() == key => Some(v),
            _ => None,
        }
    }

    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: KeyBytes + Eq + ?Sized,
    {
        let pos = self.mphf.index(&key.key_bytes()) as usize;
        match self.slots.get(pos)? {
            Some((k, v)) if k.borrow() == key => Some((k, v)),
            _ => None,
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: KeyBytes + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref().map(|(k, v)| (k, v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// The index function.
    pub fn mphf(&self) -> &Mphf<H> {
        &self.mphf
    }

    #[cfg(feature = "serde")]
    pub fn to_bytes(&self) -> Result<Vec<u8>, MphError>
    where
        K: Serialize,
        V: Serialize,
    {
        Ok(bincode::serialize(self)?)
    }

    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MphError>
    where
        K: for<'de> Deserialize<'de>,
        V: for<'de> Deserialize<'de>,
    {
        let dict: Self = bincode::deserialize(bytes)?;
        let occupied = dict.slots.iter().filter(|s| s.is_some()).count();
        if dict.slots.len() != dict.mphf.max_value() as usize || occupied != dict.len {
            return Err(MphError::Malformed("dictionary slot table"));
        }
        Ok(dict)
    }
}

impl<K, V, H, Q> Index<&Q> for StaticDictionary<K, V, H>
where
    K: KeyBytes + Eq + Borrow<Q>,
    Q: KeyBytes + Eq + ?Sized,
    H: LaneHasher,
{
    type Output = V;

    /// Panics when `key` is absent.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("key not found")
    }
}
