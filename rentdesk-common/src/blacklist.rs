//! Customer blacklist matching
//!
//! Identifiers (national ID, passport, licence or phone numbers) are typed in
//! many shapes: `A12-345678`, `a12345678`, `A12 345 678`. Matching is done on
//! a normalized form so every spelling hits the same entry.

use crate::db::models::BlacklistEntry;
use crate::Result;
use sqlx::SqlitePool;

/// Strip separators and uppercase ASCII letters
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | '_' | '.' | '/') && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Whether two identifiers denote the same person
pub fn identifiers_match(a: &str, b: &str) -> bool {
    let a = normalize_identifier(a);
    !a.is_empty() && a == normalize_identifier(b)
}

/// Blacklist entry matching `identifier`, if any
pub async fn find_match(pool: &SqlitePool, identifier: &str) -> Result<Option<BlacklistEntry>> {
    let normalized = normalize_identifier(identifier);
    if normalized.is_empty() {
        return Ok(None);
    }

    let entry = sqlx::query_as::<_, BlacklistEntry>(
        "SELECT id, identifier, identifier_normalized, reason, created_at
         FROM blacklist WHERE identifier_normalized = ?",
    )
    .bind(normalized)
    .fetch_optional(pool)
    .await?;

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashed_and_undashed_match() {
        assert!(identifiers_match("A12-3456", "A123456"));
        assert!(identifiers_match("a123456", "A12-3456"));
        assert!(identifiers_match("0912-345-678", "0912 345 678"));
    }

    #[test]
    fn test_different_identifiers_do_not_match() {
        assert!(!identifiers_match("A123456", "A123457"));
    }

    #[test]
    fn test_blank_never_matches() {
        assert!(!identifiers_match("--", ""));
        assert!(!identifiers_match("", ""));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_identifier(" ab-12.c_d/9 "), "AB12CD9");
    }
}
