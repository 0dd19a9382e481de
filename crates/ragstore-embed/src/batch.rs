use indicatif::{ProgressBar, ProgressStyle};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

use ragstore_core::error::{Error, Result};
use ragstore_core::traits::Embedder;

/// Drives an [`Embedder`] in bounded batches with an optional per-call timeout.
///
/// Output is validated: one vector per input, all of the same non-zero
/// dimension, every component finite. Any failure leaves nothing half-done for the caller to undo,
/// because nothing is returned until every batch has succeeded.
#[derive(Clone)]
pub struct BatchEmbedder {
    inner: Arc<dyn Embedder>,
    batch_size: usize,
    timeout: Option<Duration>,
    progress: bool,
}

impl BatchEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("embedding batch size must be at least 1".into()));
        }
        Ok(Self { inner, batch_size, timeout: None, progress: false })
    }

    /// Bound each embedder call by `timeout`.
    ///
    /// A timed-out call keeps running on its own detached thread until the
    /// embedder returns; its result is discarded. An embedder that hangs for
    /// good therefore leaks one thread per timed-out batch.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn embedder_id(&self) -> &str { self.inner.embedder_id() }

    pub fn batch_size(&self) -> usize { self.batch_size }

    pub fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let pb = self.progress_bar(texts.len());
        let mut out: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for (n, batch) in texts.chunks(self.batch_size).enumerate() {
            let vectors = self.call(batch.to_vec())?;
            if vectors.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            let dim = out.first().or(vectors.first()).map_or(0, Vec::len);
            if dim == 0 {
                return Err(Error::Embedding("embedder returned empty vectors".into()));
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
                return Err(Error::Embedding(format!("inconsistent embedding dimension: {} vs {}", bad.len(), dim)));
            }
            if let Some(i) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
                return Err(Error::Embedding(format!("non-finite component in vector {i} of batch {n}")));
            }
            debug!(batch = n, size = batch.len(), dim, "embedded batch");
            out.extend(vectors);
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();
        Ok(out)
    }

    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_all(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::Embedding("embedder returned no vector".into()))
    }

    fn call(&self, batch: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let Some(timeout) = self.timeout else {
            return self.inner.embed_batch(&batch).map_err(|e| Error::Embedding(format!("{e:#}")));
        };
        // The worker owns its inputs so a timed-out call can be abandoned.
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        thread::Builder::new().name("ragstore-embed".into()).spawn(move || {
            let _ = tx.send(inner.embed_batch(&batch));
        })?;
        match rx.recv_timeout(timeout) {
            Ok(res) => res.map_err(|e| Error::Embedding(format!("{e:#}"))),
            Err(RecvTimeoutError::Timeout) => Err(Error::EmbeddingTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Embedding("embedder worker exited without a result".into())),
        }
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("embedding");
        pb
    }
}
