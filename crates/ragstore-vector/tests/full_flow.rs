use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use ragstore_core::error::Error;
use ragstore_core::traits::Embedder;
use ragstore_core::types::{Chunk, ScoreMode, Topology};
use ragstore_embed::{BatchEmbedder, HashingEmbedder};
use ragstore_vector::{format_context_grouped, ContextOptions, IndexSpec, RetrievalEngine, VectorStore};

/// Maps known texts to fixed vectors.
struct TableEmbedder(HashMap<String, Vec<f32>>);

impl TableEmbedder {
    fn abc() -> Self {
        let mut table = HashMap::new();
        table.insert("A".to_string(), vec![1.0, 0.0]);
        table.insert("B".to_string(), vec![0.0, 1.0]);
        table.insert("C".to_string(), vec![1.0, 0.0]);
        table.insert("q".to_string(), vec![1.0, 0.0]);
        Self(table)
    }
}

impl Embedder for TableEmbedder {
    fn embedder_id(&self) -> &str { "table" }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.0.get(t).cloned().ok_or_else(|| anyhow::anyhow!("no vector for '{t}'"))).collect()
    }
}

fn abc_store() -> (VectorStore, BatchEmbedder) {
    let embedder = BatchEmbedder::new(Arc::new(TableEmbedder::abc()), 2).expect("batcher");
    let mut store = VectorStore::new(IndexSpec::new(Topology::FlatL2));
    let report = store
        .ingest(vec![Chunk::new("A"), Chunk::new("B"), Chunk::new("C")], &embedder)
        .expect("ingest");
    assert_eq!((report.accepted, report.duplicates), (3, 0));
    (store, embedder)
}

#[test]
fn identical_vectors_rank_first_and_tie_by_offset() {
    let (store, embedder) = abc_store();
    let engine = RetrievalEngine::new(&store, &embedder);

    let top2 = engine.search("q", 2, ScoreMode::Reciprocal, 0.0).expect("search");
    let texts: Vec<&str> = top2.iter().map(|r| r.text).collect();
    assert_eq!(texts, vec!["A", "C"]);
    for r in &top2 {
        assert!(r.distance.abs() < 1e-6);
        assert!((r.score - 1.0).abs() < 1e-6);
    }

    let all = engine.search("q", 3, ScoreMode::Reciprocal, 0.0).expect("search");
    assert_eq!(all[2].text, "B");
    assert!((all[2].distance - 2.0).abs() < 1e-6);
    assert!((all[2].score - 1.0 / 3.0).abs() < 1e-3);
}

#[test]
fn reingesting_known_text_counts_a_duplicate() {
    let (mut store, embedder) = abc_store();
    let report = store.ingest(vec![Chunk::new("A").with_meta("page", 9_i64)], &embedder).expect("ingest");
    assert_eq!(report.accepted, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.first_offset, None);
    assert_eq!(store.len(), 3);
    assert_eq!(store.index().map(|i| i.len()), Some(3));
}

#[test]
fn min_score_drops_results_without_padding() {
    let (store, embedder) = abc_store();
    let engine = RetrievalEngine::new(&store, &embedder);
    let kept = engine.search("q", 3, ScoreMode::Reciprocal, 0.5).expect("search");
    assert_eq!(kept.len(), 2);
    let none = engine.search("q", 3, ScoreMode::Reciprocal, 2.0).expect("search");
    assert!(none.is_empty());
}

#[test]
fn failed_embedding_leaves_store_untouched() {
    let (mut store, embedder) = abc_store();
    let err = store.ingest(vec![Chunk::new("unknown")], &embedder).expect_err("embedder fails");
    assert!(matches!(err, Error::Embedding(_)));
    assert!(err.is_recoverable());
    assert_eq!(store.len(), 3);
    assert_eq!(store.fingerprints().len(), 3);
}

#[test]
fn dimension_change_is_rejected_atomically() {
    let (mut store, _) = abc_store();
    let wide = BatchEmbedder::new(Arc::new(HashingEmbedder::new(8)), 4).expect("batcher");
    let err = store.ingest(vec![Chunk::new("D"), Chunk::new("E")], &wide).expect_err("mismatch");
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 8 }));
    assert_eq!(store.len(), 3);
    assert_eq!(store.index().map(|i| i.len()), Some(3));
    assert_eq!(store.fingerprints().len(), 3);
}

#[test]
fn ivfpq_needs_training_before_add() {
    let dim = 8;
    let spec = IndexSpec { n_list: 4, n_probe: 2, pq_m: 4, ..IndexSpec::new(Topology::IvfPq) };
    let embedder = BatchEmbedder::new(Arc::new(HashingEmbedder::new(dim)), 16).expect("batcher");
    let chunks: Vec<Chunk> = (0..32).map(|i| Chunk::new(format!("chunk {i} about topic {}", i % 5))).collect();
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_all(&texts).expect("embed");

    let mut store = VectorStore::new(spec).with_auto_train(false);
    let err = store.ingest(chunks.clone(), &embedder).expect_err("untrained");
    assert!(matches!(err, Error::NotTrained(Topology::IvfPq)));
    assert!(store.is_empty());

    store.train(&vectors).expect("train");
    let report = store.ingest(chunks, &embedder).expect("ingest after training");
    assert_eq!(report.accepted, 32);
    assert_eq!(store.describe().vectors, 32);
    assert!(store.describe().trained);
}

#[test]
fn batch_queries_return_one_list_each() {
    let embedder = BatchEmbedder::new(Arc::new(HashingEmbedder::new(64)), 2).expect("batcher");
    let mut store = VectorStore::new(IndexSpec::new(Topology::FlatL2));
    let docs = ["the uplink grant schedules PUSCH", "downlink control uses PDCCH", "random access preamble on PRACH"];
    store.ingest(docs.iter().map(|d| Chunk::new(*d)).collect(), &embedder).expect("ingest");

    let engine = RetrievalEngine::new(&store, &embedder);
    let queries: Vec<String> = docs.iter().map(|d| d.to_string()).collect();
    let lists = engine.search_batch(&queries, 1, ScoreMode::Reciprocal, 0.0).expect("batch");
    assert_eq!(lists.len(), 3);
    for (i, hits) in lists.iter().enumerate() {
        assert_eq!(hits[0].offset, i, "each document is its own nearest neighbor");
    }
}

#[test]
fn grouped_context_from_live_results() {
    let embedder = BatchEmbedder::new(Arc::new(HashingEmbedder::new(32)), 8).expect("batcher");
    let mut store = VectorStore::new(IndexSpec::new(Topology::FlatL2));
    store
        .ingest(
            vec![
                Chunk::new("alpha beta").with_meta("document", "manual.pdf").with_meta("page", 2_i64),
                Chunk::new("alpha gamma").with_meta("document", "manual.pdf").with_meta("page", 2_i64),
                Chunk::new("delta").with_meta("document", "notes.pdf").with_meta("page", 1_i64),
            ],
            &embedder,
        )
        .expect("ingest");
    let engine = RetrievalEngine::new(&store, &embedder);
    let results = engine.search("alpha", 3, ScoreMode::Reciprocal, 0.0).expect("search");
    let context = format_context_grouped(&results, &ContextOptions::default());
    assert!(context.starts_with("[Document: manual.pdf, Page: 2]\n"));
    assert!(context.ends_with("[Document: notes.pdf, Page: 1]\ndelta"));
    assert_eq!(context.matches("---").count(), 1);
}

#[test]
fn nan_embedding_is_rejected_before_storing() {
    let (mut store, _) = abc_store();
    let mut table = TableEmbedder::abc();
    table.0.insert("D".to_string(), vec![f32::NAN, 1.0]);
    let embedder = BatchEmbedder::new(Arc::new(table), 2).expect("batcher");

    let err = store.ingest(vec![Chunk::new("D")], &embedder).expect_err("nan");
    assert!(matches!(err, Error::Embedding(_)));
    assert_eq!(store.len(), 3);
    assert_eq!(store.fingerprints().len(), 3);
}

#[test]
fn readers_share_a_store_across_threads() {
    let embedder = BatchEmbedder::new(Arc::new(HashingEmbedder::new(32)), 8).expect("batcher");
    let mut store = VectorStore::new(IndexSpec::new(Topology::FlatL2));
    let docs: Vec<Chunk> = (0..40).map(|i| Chunk::new(format!("note {i} on subject {}", i % 7))).collect();
    store.ingest(docs, &embedder).expect("ingest");

    let store = &store;
    let embedder = &embedder;
    let expected = RetrievalEngine::new(store, embedder).search("note 3 on subject 3", 5, ScoreMode::Reciprocal, 0.0).expect("search");
    let expected: Vec<usize> = expected.iter().map(|r| r.offset).collect();

    thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(move || {
                    let engine = RetrievalEngine::new(store, embedder);
                    let hits = engine.search("note 3 on subject 3", 5, ScoreMode::Reciprocal, 0.0).expect("search");
                    hits.iter().map(|r| r.offset).collect::<Vec<usize>>()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().expect("reader thread"), expected);
        }
    });
}
