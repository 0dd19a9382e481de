//! Domain types shared by the embedding, indexing and retrieval crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type Meta = HashMap<String, MetaValue>;

/// A scalar metadata value attached to a chunk (source path, page number, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON has no NaN or infinity, so only finite values survive a save.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(x) => x.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self { Self::Text(s.to_string()) }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self { Self::Int(i) }
}

impl From<f64> for MetaValue {
    fn from(x: f64) -> Self { Self::Float(x) }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self { Self::Bool(b) }
}

/// A chunk of a source document handed to the engine for indexing.
///
/// - `text`: the normalized text payload; its bytes define the chunk's fingerprint
/// - `meta`: free-form scalar metadata (e.g. `document`, `page`, `chunk_idx`)
///
/// Chunks are never mutated once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    #[serde(default)]
    pub meta: Meta,
}

impl Chunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), meta: Meta::new() }
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Index topology, fixed when the index is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    FlatL2,
    FlatIp,
    IvfFlat,
    IvfPq,
}

impl Topology {
    pub fn tag(self) -> &'static str {
        match self {
            Self::FlatL2 => "flatl2",
            Self::FlatIp => "flatip",
            Self::IvfFlat => "ivfflat",
            Self::IvfPq => "ivfpq",
        }
    }

    /// IVF variants need `train` before vectors can be added.
    pub fn requires_training(self) -> bool {
        matches!(self, Self::IvfFlat | Self::IvfPq)
    }

    pub fn metric(self) -> Metric {
        match self {
            Self::FlatIp => Metric::InnerProduct,
            Self::FlatL2 | Self::IvfFlat | Self::IvfPq => Metric::L2,
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.tag()) }
}

impl FromStr for Topology {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flatl2" => Ok(Self::FlatL2),
            "flatip" => Ok(Self::FlatIp),
            "ivfflat" => Ok(Self::IvfFlat),
            "ivfpq" => Ok(Self::IvfPq),
            other => Err(Error::UnsupportedTopology(other.to_string())),
        }
    }
}

/// Distance semantics of a topology.
///
/// `L2` distances are squared Euclidean (smaller is closer); `InnerProduct`
/// values are similarities (larger is closer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    L2,
    InnerProduct,
}

impl Metric {
    pub fn higher_is_better(self) -> bool { matches!(self, Self::InnerProduct) }
}

/// Conversion from raw index distance to a caller-facing relevance score.
///
/// The mode must agree with the topology's [`Metric`]; it is not inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMode {
    #[default]
    Reciprocal,
    Negative,
    Linear,
}

impl ScoreMode {
    pub fn score(self, distance: f32) -> f32 {
        match self {
            Self::Reciprocal => 1.0 / (1.0 + distance),
            Self::Negative => -distance,
            Self::Linear => (1.0 - distance).max(0.0),
        }
    }
}

impl FromStr for ScoreMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reciprocal" => Ok(Self::Reciprocal),
            "negative" => Ok(Self::Negative),
            "linear" => Ok(Self::Linear),
            other => Err(Error::InvalidConfig(format!("unknown score mode '{other}'"))),
        }
    }
}
