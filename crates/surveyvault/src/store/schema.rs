//! `SQLite` schema for the record store.
//!
//! Records are kept as whole JSON documents keyed by identity. The schema
//! has no column that could order or time-stamp submissions.

/// Table holding one row per anonymized record.
pub const CREATE_RECORDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS records (
    identity TEXT PRIMARY KEY NOT NULL CHECK (length(identity) = 32),
    document TEXT NOT NULL
) WITHOUT ROWID
";

/// Key-value table for store bookkeeping such as the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[CREATE_RECORDS_TABLE, CREATE_METADATA_TABLE];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_records_table_has_no_timestamp_column() {
        assert!(CREATE_RECORDS_TABLE.contains("identity TEXT PRIMARY KEY"));
        assert!(CREATE_RECORDS_TABLE.contains("document TEXT NOT NULL"));
        assert!(!CREATE_RECORDS_TABLE.contains("timestamp"));
        assert!(!CREATE_RECORDS_TABLE.contains("created_at"));
    }
}
