use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use ragstore_core::config::IndexConfig;
use ragstore_core::error::Error;
use ragstore_core::types::{Chunk, MetaValue, Topology};
use ragstore_embed::{BatchEmbedder, HashingEmbedder};
use ragstore_vector::persist::{self, FINGERPRINTS_FILE, INDEX_FILE, METADATA_FILE};
use ragstore_vector::{Fingerprint, FingerprintSet, IndexSpec, MetadataStore, Record, VectorIndex, VectorStore};

fn embedder() -> BatchEmbedder { BatchEmbedder::new(Arc::new(HashingEmbedder::new(16)), 8).expect("batcher") }

fn chunks(n: usize) -> Vec<Chunk> {
    (0..n)
        .map(|i| {
            Chunk::new(format!("section {i} describes procedure {}", i * 3))
                .with_meta("document", format!("doc{}.pdf", i % 3))
                .with_meta("page", i as i64)
        })
        .collect()
}

fn populated(spec: IndexSpec, n: usize) -> VectorStore {
    let mut store = VectorStore::new(spec);
    store.ingest(chunks(n), &embedder()).expect("ingest");
    store
}

#[test]
fn round_trip_preserves_records_vectors_and_fingerprints() {
    let tmp = TempDir::new().unwrap();
    let store = populated(IndexSpec::new(Topology::FlatL2), 12);
    persist::save(&store, tmp.path()).expect("save");

    let loaded = persist::load(tmp.path()).expect("load");
    assert_eq!(loaded.len(), 12);
    assert_eq!(loaded.metadata(), store.metadata());
    assert_eq!(loaded.fingerprints(), store.fingerprints());
    assert_eq!(loaded.index(), store.index());
    assert_eq!(loaded.embedder_id(), Some("hashing:d16"));
    assert_eq!(loaded.get(5).map(|r| &r.meta["page"]), Some(&MetaValue::Int(5)));
}

#[test]
fn restored_store_rejects_the_same_duplicates() {
    let tmp = TempDir::new().unwrap();
    persist::save(&populated(IndexSpec::new(Topology::FlatL2), 6), tmp.path()).expect("save");

    let mut loaded = persist::load(tmp.path()).expect("load");
    let report = loaded.ingest(chunks(8), &embedder()).expect("ingest");
    assert_eq!((report.accepted, report.duplicates), (2, 6));
    assert_eq!(report.first_offset, Some(6));
}

#[test]
fn trained_ivf_indexes_survive_a_round_trip() {
    let tmp = TempDir::new().unwrap();
    for topology in [Topology::IvfFlat, Topology::IvfPq] {
        let spec = IndexSpec { n_list: 4, n_probe: 2, pq_m: 4, ..IndexSpec::new(topology) };
        let store = populated(spec, 20);
        let dir = tmp.path().join(topology.tag());
        persist::save(&store, &dir).expect("save");

        let loaded = persist::load(&dir).expect("load");
        assert_eq!(loaded.topology(), topology);
        assert!(loaded.is_trained());
        assert_eq!(loaded.spec(), store.spec());
        let q = store.index().unwrap().reconstruct_all().remove(3);
        assert_eq!(loaded.search_vector(&q, 5).unwrap(), store.search_vector(&q, 5).unwrap());
    }
}

#[test]
fn empty_directory_is_absent_not_corrupt() {
    let tmp = TempDir::new().unwrap();
    assert!(matches!(persist::load(tmp.path()), Err(Error::NotFound(_))));

    let cfg = IndexConfig { topology: Topology::FlatIp, ..IndexConfig::default() };
    let fresh = persist::load_or_create(tmp.path(), &cfg).expect("fresh");
    assert!(fresh.is_empty());
    assert_eq!(fresh.topology(), Topology::FlatIp);
}

#[test]
fn missing_artifact_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    persist::save(&populated(IndexSpec::new(Topology::FlatL2), 3), tmp.path()).expect("save");
    fs::remove_file(tmp.path().join(FINGERPRINTS_FILE)).unwrap();

    assert!(matches!(persist::load(tmp.path()), Err(Error::CorruptState(_))));
    let cfg = IndexConfig::default();
    assert!(matches!(persist::load_or_create(tmp.path(), &cfg), Err(Error::CorruptState(_))));
}

#[test]
fn misaligned_index_and_metadata_are_corrupt() {
    let tmp = TempDir::new().unwrap();
    let small = TempDir::new().unwrap();
    persist::save(&populated(IndexSpec::new(Topology::FlatL2), 4), tmp.path()).expect("save");
    persist::save(&populated(IndexSpec::new(Topology::FlatL2), 3), small.path()).expect("save");

    // Metadata and fingerprints from a smaller store next to the larger index.
    fs::copy(small.path().join(METADATA_FILE), tmp.path().join(METADATA_FILE)).unwrap();
    fs::copy(small.path().join(FINGERPRINTS_FILE), tmp.path().join(FINGERPRINTS_FILE)).unwrap();

    let err = persist::load(tmp.path()).expect_err("misaligned");
    assert!(matches!(err, Error::CorruptState(_)), "got {err:?}");
}

#[test]
fn tampered_counts_and_garbage_are_corrupt() {
    let tmp = TempDir::new().unwrap();
    persist::save(&populated(IndexSpec::new(Topology::FlatL2), 2), tmp.path()).expect("save");

    let path = tmp.path().join(METADATA_FILE);
    let mut doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    doc["count"] = serde_json::json!(7);
    fs::write(&path, doc.to_string()).unwrap();
    assert!(matches!(persist::load(tmp.path()), Err(Error::CorruptState(_))));

    fs::write(tmp.path().join(INDEX_FILE), "{ not json").unwrap();
    assert!(matches!(persist::load(tmp.path()), Err(Error::CorruptState(_))));
}

#[test]
fn save_replaces_previous_artifacts() {
    let tmp = TempDir::new().unwrap();
    let mut store = populated(IndexSpec::new(Topology::FlatL2), 2);
    persist::save(&store, tmp.path()).expect("first save");
    store.ingest(chunks(5), &embedder()).expect("ingest");
    persist::save(&store, tmp.path()).expect("second save");

    assert_eq!(persist::load(tmp.path()).expect("load").len(), 5);
    let leftovers = fs::read_dir(tmp.path()).unwrap().count();
    assert_eq!(leftovers, 3, "temporary files are renamed, not left behind");
}

#[test]
fn foreign_fingerprint_file_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let mut a = VectorStore::new(IndexSpec::new(Topology::FlatL2));
    a.ingest(vec![Chunk::new("alpha"), Chunk::new("beta")], &embedder()).expect("ingest a");
    let mut b = VectorStore::new(IndexSpec::new(Topology::FlatL2));
    b.ingest(vec![Chunk::new("gamma"), Chunk::new("delta")], &embedder()).expect("ingest b");
    persist::save(&a, tmp.path()).expect("save a");
    persist::save(&b, other.path()).expect("save b");

    fs::copy(other.path().join(FINGERPRINTS_FILE), tmp.path().join(FINGERPRINTS_FILE)).unwrap();

    let err = persist::load(tmp.path()).expect_err("fingerprints do not cover the records");
    assert!(matches!(err, Error::CorruptState(_)), "got {err:?}");
}

#[test]
fn non_finite_metadata_never_reaches_disk() {
    let tmp = TempDir::new().unwrap();
    let mut store = populated(IndexSpec::new(Topology::FlatL2), 3);
    persist::save(&store, tmp.path()).expect("save");

    let err = store.ingest(vec![Chunk::new("weighted").with_meta("w", f64::NAN)], &embedder()).expect_err("nan meta");
    assert!(matches!(err, Error::InvalidInput(_)));
    persist::save(&store, tmp.path()).expect("save again");
    assert_eq!(persist::load(tmp.path()).expect("load").len(), 3);
}

#[test]
fn save_refuses_state_that_would_not_load() {
    let tmp = TempDir::new().unwrap();
    persist::save(&populated(IndexSpec::new(Topology::FlatL2), 3), tmp.path()).expect("good save");

    // VectorIndex::add alone does not screen values; the store does.
    let mut index = VectorIndex::new(&IndexSpec::new(Topology::FlatL2), 2).unwrap();
    index.add(&[vec![f32::NAN, 1.0]]).unwrap();
    let mut metadata = MetadataStore::new();
    metadata.append(Record::from(Chunk::new("nan")));
    let fingerprints: FingerprintSet = std::iter::once(Fingerprint::of("nan")).collect();
    let bad = VectorStore::from_parts(IndexSpec::new(Topology::FlatL2), Some(index), metadata, fingerprints, None)
        .expect("parts align");

    let err = persist::save(&bad, tmp.path()).expect_err("nan vector");
    assert!(matches!(err, Error::CorruptState(_)), "got {err:?}");
    let previous = persist::load(tmp.path()).expect("previous artifacts intact");
    assert_eq!(previous.len(), 3);
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 3);
}
