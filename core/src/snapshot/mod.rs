//! The content-addressed snapshot store.
//!
//! Layout: one file per object under `procedures/`, `functions/`,
//! `tabletypes/`, `types/`, `tables/` and `views/`, plus the `index.json`
//! manifest carrying per-object hashes and the aggregate Fingerprint.

mod canonical;
mod hash;
mod index;
mod store;

pub use self::canonical::canonical_json;
pub use self::hash::{HASH_LEN, content_hash, fingerprint};
pub use self::index::{
    FUNCTIONS_VERSION, IndexEntry, ParserInfo, SCHEMA_VERSION, SnapshotIndex, SnapshotStats,
};
pub use self::store::{Category, INDEX_FILE, ObjectFilter, SnapshotStore, WriteOutcome};
