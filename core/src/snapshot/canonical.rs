//! Canonical serialization: the byte form all hashes are computed over.
//!
//! Indented UTF-8 JSON, PascalCase keys in declaration order, defaults
//! omitted, trailing newline. Structurally-equal values always produce
//! identical bytes, so they always hash equal.

use serde::Serialize;

use crate::error::Result;

pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, ResultSet};

    #[test]
    fn test_structural_equality_means_byte_equality() {
        let a = ResultSet {
            returns_json: true,
            columns: vec![Column::named("Id")],
            ..ResultSet::default()
        };
        let b = a.clone();
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn test_defaults_are_pruned() {
        let rs = ResultSet::default();
        let text = String::from_utf8(canonical_json(&rs).unwrap()).unwrap();
        assert_eq!(text, "{}\n");
    }
}
