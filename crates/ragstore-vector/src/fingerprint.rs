//! Content fingerprints for exact-duplicate detection.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// blake3 digest of a chunk's UTF-8 text. Serialized as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(text: &str) -> Self { Self(*blake3::hash(text.as_bytes()).as_bytes()) }

    pub fn to_hex(&self) -> String { blake3::Hash::from(self.0).to_hex().to_string() }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_hex()) }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(hex: String) -> Result<Self, Self::Error> {
        blake3::Hash::from_hex(hex.as_str())
            .map(|h| Self(*h.as_bytes()))
            .map_err(|e| format!("invalid fingerprint '{hex}': {e}"))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self { fp.to_hex() }
}

/// Every fingerprint ever accepted into a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintSet(HashSet<Fingerprint>);

impl FingerprintSet {
    pub fn new() -> Self { Self::default() }

    pub fn contains(&self, fp: &Fingerprint) -> bool { self.0.contains(fp) }

    /// `false` when the fingerprint was already present.
    pub fn insert(&mut self, fp: Fingerprint) -> bool { self.0.insert(fp) }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Sorted, so saved artifacts are stable across runs.
    pub fn sorted(&self) -> Vec<Fingerprint> {
        let mut out: Vec<Fingerprint> = self.0.iter().copied().collect();
        out.sort_unstable();
        out
    }
}

impl FromIterator<Fingerprint> for FingerprintSet {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self { Self(iter.into_iter().collect()) }
}

impl Extend<Fingerprint> for FingerprintSet {
    fn extend<I: IntoIterator<Item = Fingerprint>>(&mut self, iter: I) { self.0.extend(iter) }
}
