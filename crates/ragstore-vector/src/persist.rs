//! On-disk layout of a store directory.
//!
//! - `index.json`: topology tag, dimension, vectors or codes, trained state
//! - `metadata.json`: records in offset order
//! - `fingerprints.json`: every accepted fingerprint, sorted
//!
//! The three files are one unit. `save` encodes all of them and checks each
//! parses back, then writes them to temporary files in the target directory
//! before renaming any into place. `load` refuses a directory where only some
//! exist or where their counts disagree.
//!
//! Both are plain blocking file I/O with no timeout of their own.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use ragstore_core::config::IndexConfig;
use ragstore_core::error::{Error, Result};

use crate::fingerprint::{Fingerprint, FingerprintSet};
use crate::index::{IndexSpec, VectorIndex};
use crate::metadata::{MetadataStore, Record};
use crate::store::VectorStore;

pub const INDEX_FILE: &str = "index.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const FINGERPRINTS_FILE: &str = "fingerprints.json";

const ARTIFACTS: [&str; 3] = [INDEX_FILE, METADATA_FILE, FINGERPRINTS_FILE];
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexArtifact<'a> {
    version: u32,
    count: usize,
    spec: IndexSpec,
    embedder_id: Option<Cow<'a, str>>,
    index: Option<Cow<'a, VectorIndex>>,
}

#[derive(Serialize, Deserialize)]
struct MetadataArtifact<'a> {
    version: u32,
    count: usize,
    records: Cow<'a, [Record]>,
}

#[derive(Serialize, Deserialize)]
struct FingerprintArtifact {
    version: u32,
    count: usize,
    fingerprints: Vec<Fingerprint>,
}

/// Write the store's three artifacts into `dir`, creating it if needed.
///
/// Call after a full ingestion batch. Nothing is written unless every artifact
/// encodes to JSON that [`load`] accepts. If this fails midway, the files
/// already in `dir` are untouched unless the failure hits between the renames.
pub fn save(store: &VectorStore, dir: &Path) -> Result<()> {
    let index = IndexArtifact {
        version: FORMAT_VERSION,
        count: store.index().map_or(0, VectorIndex::len),
        spec: *store.spec(),
        embedder_id: store.embedder_id().map(Cow::Borrowed),
        index: store.index().map(Cow::Borrowed),
    };
    let metadata = MetadataArtifact {
        version: FORMAT_VERSION,
        count: store.metadata().len(),
        records: Cow::Borrowed(store.metadata().as_slice()),
    };
    let fingerprints = store.fingerprints().sorted();
    let fingerprints = FingerprintArtifact { version: FORMAT_VERSION, count: fingerprints.len(), fingerprints };

    let encoded = [
        (encode::<_, IndexArtifact<'static>>(INDEX_FILE, &index)?, INDEX_FILE),
        (encode::<_, MetadataArtifact<'static>>(METADATA_FILE, &metadata)?, METADATA_FILE),
        (encode::<_, FingerprintArtifact>(FINGERPRINTS_FILE, &fingerprints)?, FINGERPRINTS_FILE),
    ];

    fs::create_dir_all(dir)?;
    let mut staged = Vec::with_capacity(encoded.len());
    for (bytes, name) in &encoded {
        staged.push((write_temp(dir, bytes)?, *name));
    }
    for (tmp, name) in staged {
        tmp.persist(dir.join(name)).map_err(|e| Error::Io(e.error))?;
    }
    info!(dir = %dir.display(), vectors = index.count, fingerprints = fingerprints.count, "saved store");
    Ok(())
}

/// Load a store saved by [`save`].
///
/// `NotFound` when `dir` holds none of the artifacts; `CorruptState` when only
/// some exist, any fails to parse, or their lengths disagree.
pub fn load(dir: &Path) -> Result<VectorStore> {
    let present: Vec<&str> = ARTIFACTS.iter().copied().filter(|name| dir.join(name).is_file()).collect();
    if present.is_empty() {
        return Err(Error::NotFound(format!("no store artifacts in {}", dir.display())));
    }
    if present.len() != ARTIFACTS.len() {
        return Err(Error::CorruptState(format!("incomplete store in {}: only {} present", dir.display(), present.join(", "))));
    }

    let index: IndexArtifact<'static> = read_artifact(dir, INDEX_FILE)?;
    let metadata: MetadataArtifact<'static> = read_artifact(dir, METADATA_FILE)?;
    let fingerprints: FingerprintArtifact = read_artifact(dir, FINGERPRINTS_FILE)?;
    for (name, version) in [(INDEX_FILE, index.version), (METADATA_FILE, metadata.version), (FINGERPRINTS_FILE, fingerprints.version)] {
        if version != FORMAT_VERSION {
            return Err(Error::CorruptState(format!("{name}: unsupported format version {version}")));
        }
    }

    let vector_index = index.index.map(Cow::into_owned);
    if let Some(vi) = &vector_index {
        vi.validate()?;
    }
    check_count(INDEX_FILE, index.count, vector_index.as_ref().map_or(0, VectorIndex::len))?;
    check_count(METADATA_FILE, metadata.count, metadata.records.len())?;
    check_count(FINGERPRINTS_FILE, fingerprints.count, fingerprints.fingerprints.len())?;
    let set: FingerprintSet = fingerprints.fingerprints.into_iter().collect();
    check_count(FINGERPRINTS_FILE, fingerprints.count, set.len())?;

    let store = VectorStore::from_parts(
        index.spec,
        vector_index,
        MetadataStore::from(metadata.records.into_owned()),
        set,
        index.embedder_id.map(Cow::into_owned),
    )?;
    info!(dir = %dir.display(), topology = %store.topology(), vectors = store.len(), "loaded store");
    Ok(store)
}

/// Load `dir`, or start an empty store from `cfg` when nothing was saved there.
pub fn load_or_create(dir: &Path, cfg: &IndexConfig) -> Result<VectorStore> {
    match load(dir) {
        Ok(store) => {
            if store.topology() != cfg.topology {
                warn!(stored = %store.topology(), configured = %cfg.topology, "keeping stored topology; rebuild to change it");
            }
            Ok(store.with_auto_train(cfg.auto_train))
        }
        Err(Error::NotFound(_)) => {
            info!(dir = %dir.display(), topology = %cfg.topology, "starting empty store");
            Ok(VectorStore::from_config(cfg))
        }
        Err(e) => Err(e),
    }
}

/// Serialize `value` and parse it back as `R`, the type [`load`] reads.
///
/// serde_json writes non-finite floats as `null`, which would not load.
fn encode<T: Serialize, R: DeserializeOwned>(name: &str, value: &T) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec(value)?;
    serde_json::from_slice::<R>(&bytes)
        .map_err(|e| Error::CorruptState(format!("{name}: refusing to save state that would not load: {e}")))?;
    Ok(bytes)
}

fn write_temp(dir: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

fn read_artifact<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let file = File::open(dir.join(name))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::CorruptState(format!("{name}: {e}")))
}

fn check_count(name: &str, declared: usize, actual: usize) -> Result<()> {
    if declared == actual {
        Ok(())
    } else {
        Err(Error::CorruptState(format!("{name}: declares {declared} entries but holds {actual}")))
    }
}
