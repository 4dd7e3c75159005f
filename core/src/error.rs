//! Error and diagnostic types for the analysis pipeline.
//!
//! Hard failures (`Error`) abort a run; everything an individual object can
//! get wrong is a `Diagnostic`, collected per run and reported at the end.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures that abort a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("metadata source unavailable: {0}")]
    Metadata(String),

    #[error("invalid SQL type name `{0}`")]
    TypeName(String),

    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}

/// Per-object findings that never abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// The routine definition could not be parsed; an empty shape was recorded.
    ParseFailure,
    /// A column stayed untyped after the resolution chain (ambiguous binding
    /// skips the chain entirely; this is distinct from the nvarchar(max)
    /// fallback, which is a resolution).
    TypeUnresolved,
    /// A single-part column reference matched more than one table in scope.
    AmbiguousBinding,
    /// A bound source column was not found in the physical metadata.
    MetadataLookupMiss,
    /// A wrapper's EXEC target could not be resolved to a known routine.
    ForwardingUnresolvable,
    /// A snapshot file could not be written; the prior file stays authoritative.
    SnapshotIo,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::ParseFailure => "parse failure",
            DiagnosticKind::TypeUnresolved => "type unresolved",
            DiagnosticKind::AmbiguousBinding => "ambiguous binding",
            DiagnosticKind::MetadataLookupMiss => "metadata lookup miss",
            DiagnosticKind::ForwardingUnresolvable => "forwarding unresolvable",
            DiagnosticKind::SnapshotIo => "snapshot i/o",
        };
        f.write_str(s)
    }
}

/// One finding, tied to the object (`schema.name`) it occurred on.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub object: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, object: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            object: object.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.object, self.message)
    }
}
