use serde::{Deserialize, Serialize};

use ragstore_core::types::{Chunk, Meta};

/// Text and metadata stored for one vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub text: String,
    #[serde(default)]
    pub meta: Meta,
}

impl From<Chunk> for Record {
    fn from(chunk: Chunk) -> Self { Self { text: chunk.text, meta: chunk.meta } }
}

/// Append-only records; offset `i` describes vector `i` of the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataStore(Vec<Record>);

impl MetadataStore {
    pub fn new() -> Self { Self::default() }

    /// Store a record and return its offset.
    pub fn append(&mut self, record: Record) -> usize {
        self.0.push(record);
        self.0.len() - 1
    }

    pub fn get(&self, offset: usize) -> Option<&Record> { self.0.get(offset) }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &Record> { self.0.iter() }

    pub(crate) fn as_slice(&self) -> &[Record] { &self.0 }
}

impl From<Vec<Record>> for MetadataStore {
    fn from(records: Vec<Record>) -> Self { Self(records) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_dense_and_stable() {
        let mut store = MetadataStore::new();
        assert_eq!(store.append(Chunk::new("a").into()), 0);
        assert_eq!(store.append(Chunk::new("b").with_meta("page", 4_i64).into()), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).map(|r| r.text.as_str()), Some("b"));
        assert!(store.get(2).is_none());
    }
}
