//! sprocket-core: T-SQL routine analysis for code generation.
//!
//! Ingests stored-procedure and function definitions plus physical schema
//! metadata and produces a structurally-typed, versioned snapshot of each
//! routine's parameters and result shape, including nested JSON projections.
//!
//! The pipeline: the extractor walks parsed statements into
//! `ResultSet`/`Column` trees; the resolver fills in SQL types through a
//! staged rule chain; the forwarding resolver gives wrapper procedures their
//! target's shape; the snapshot store persists everything content-addressed
//! and incremental.
//!
//! # Example
//! ```
//! use sprocket_core::source::MemorySource;
//! use sprocket_core::{PipelineOptions, run_snapshot};
//!
//! let source = MemorySource::new("demo").with_procedure(
//!     "dbo",
//!     "Ping",
//!     1,
//!     "CREATE PROC dbo.Ping AS SELECT 1 AS Alive;",
//! );
//! let out = tempfile::tempdir().unwrap();
//! let report = run_snapshot(
//!     &source,
//!     out.path(),
//!     None,
//!     &PipelineOptions::default(),
//!     |_, _, _| {},
//! )
//! .unwrap();
//! assert_eq!(report.files_created, 1);
//! ```

pub mod cache;
pub mod context;
pub mod error;
pub mod extract;
pub mod forward;
pub mod model;
pub mod pipeline;
pub mod resolve;
pub mod snapshot;
pub mod source;
pub mod typename;

pub use context::{CancelFlag, RunContext};
pub use error::{Diagnostic, DiagnosticKind, Error, Result};
pub use pipeline::{PipelineOptions, PipelineReport, RoutineAnalysis, run_snapshot};
