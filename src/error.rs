use serde::Serialize;
use std::fmt;

/// Failure raised by one step of a block ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("chain request failed: {0:#}")]
    Chain(#[source] anyhow::Error),

    #[error("decoding failed: {0:#}")]
    Decode(#[source] anyhow::Error),

    #[error("store operation failed: {0:#}")]
    Store(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Chain,
    Decode,
    Store,
}

impl IngestError {
    pub fn chain(err: impl Into<anyhow::Error>) -> Self {
        IngestError::Chain(err.into())
    }

    pub fn decode(err: impl Into<anyhow::Error>) -> Self {
        IngestError::Decode(err.into())
    }

    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        IngestError::Store(err.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::Chain(_) => FailureKind::Chain,
            IngestError::Decode(_) => FailureKind::Decode,
            IngestError::Store(_) => FailureKind::Store,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Chain => "chain",
            FailureKind::Decode => "decode",
            FailureKind::Store => "store",
        };
        f.write_str(name)
    }
}
