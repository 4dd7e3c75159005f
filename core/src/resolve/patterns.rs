//! Name-pattern heuristics, the next-to-last resolution stage. Ordered;
//! first match wins.

pub(crate) struct PatternType {
    pub sql_type: &'static str,
    pub max_length: i32,
}

const fn pattern(sql_type: &'static str, max_length: i32) -> PatternType {
    PatternType {
        sql_type,
        max_length,
    }
}

pub(crate) fn name_pattern_type(name: &str) -> Option<PatternType> {
    let lower = name.to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if lower.ends_with("id") {
        return Some(pattern("int", 0));
    }
    if lower.starts_with("is") || lower.starts_with("has") {
        return Some(pattern("bit", 0));
    }
    if lower.ends_with("date") || lower.ends_with("utc") {
        return Some(pattern("datetime2", 0));
    }
    if lower.contains("rowversion") {
        return Some(pattern("rowversion", 0));
    }
    if lower.ends_with("code") {
        return Some(pattern("nvarchar(50)", 50));
    }
    if lower.ends_with("name") {
        return Some(pattern("nvarchar(200)", 200));
    }
    if lower.ends_with("description") {
        return Some(pattern("nvarchar(1000)", 1000));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_order() {
        assert_eq!(name_pattern_type("CustomerId").unwrap().sql_type, "int");
        assert_eq!(name_pattern_type("IsActive").unwrap().sql_type, "bit");
        assert_eq!(name_pattern_type("hasChildren").unwrap().sql_type, "bit");
        assert_eq!(name_pattern_type("CreatedUtc").unwrap().sql_type, "datetime2");
        assert_eq!(name_pattern_type("OrderDate").unwrap().sql_type, "datetime2");
        assert_eq!(
            name_pattern_type("RowVersionStamp").unwrap().sql_type,
            "rowversion"
        );
        assert_eq!(
            name_pattern_type("CountryCode").unwrap().sql_type,
            "nvarchar(50)"
        );
        assert_eq!(
            name_pattern_type("DisplayName").unwrap().sql_type,
            "nvarchar(200)"
        );
        assert_eq!(
            name_pattern_type("LongDescription").unwrap().sql_type,
            "nvarchar(1000)"
        );
        assert!(name_pattern_type("Quantity").is_none());
    }

    #[test]
    fn test_id_beats_is_prefix() {
        // `IsolationId` matches both; *Id is checked first.
        assert_eq!(name_pattern_type("IsolationId").unwrap().sql_type, "int");
    }
}
