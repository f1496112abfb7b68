// SPDX-License-Identifier: Apache-2.0

//! DML statement classification
//!
//! Recognizes single INSERT/UPDATE/DELETE statements, optionally preceded by
//! a `WITH ... )` prologue, using text-level patterns only. There is no SQL
//! grammar here: unrecognized statements are simply not classified.
//!
//! RETURNING detection is a word search over the whole statement, so a
//! literal such as `note = 'returning soon'` also counts as a RETURNING
//! clause. Callers then re-issue the statement as a query and capture
//! whatever it returns.

use std::sync::OnceLock;

use regex::Regex;

use super::ident::strip_alias;
use super::types::DmlOperation;

/// A recognized data-changing statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmlStatement {
    pub operation: DmlOperation,
    /// Target table, alias removed, quoting preserved
    pub table: String,
    pub has_returning: bool,
}

struct Patterns {
    insert: Regex,
    update: Regex,
    delete: Regex,
    returning: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        insert: Regex::new(r"(?is)^\s*(?:with\b.*?\)\s*)?insert\s+into\s+([^\s(]+)")
            .expect("valid insert pattern"),
        update: Regex::new(
            r"(?is)^\s*(?:with\b.*?\)\s*)?update\s+([^\s]+(?:\s+(?:as\s+)?[^\s]+)?)\s+set\b",
        )
        .expect("valid update pattern"),
        delete: Regex::new(
            r"(?is)^\s*(?:with\b.*?\)\s*)?delete\s+from\s+([^\s]+(?:\s+(?:as\s+)?[^\s]+)?)",
        )
        .expect("valid delete pattern"),
        returning: Regex::new(r"(?is)\breturning\b").expect("valid returning pattern"),
    })
}

/// Attempts to recognize a single top-level DML statement
pub fn parse_dml(sql: &str) -> Option<DmlStatement> {
    let sql = sql.trim();
    let p = patterns();

    let (operation, target) = [
        (DmlOperation::Insert, &p.insert),
        (DmlOperation::Update, &p.update),
        (DmlOperation::Delete, &p.delete),
    ]
    .into_iter()
    .find_map(|(op, re)| re.captures(sql).and_then(|c| c.get(1)).map(|m| (op, m.as_str())))?;

    Some(DmlStatement {
        operation,
        table: strip_alias(target).to_string(),
        has_returning: p.returning.is_match(sql),
    })
}

/// Appends `RETURNING *` to a statement, keeping a trailing semicolon
///
/// Returns `None` for an empty statement.
pub fn append_returning_all(sql: &str) -> Option<String> {
    let trimmed = sql.trim();
    let body = trimmed.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if body.is_empty() {
        return None;
    }
    let had_semicolon = trimmed.ends_with(';');

    let mut out = String::with_capacity(body.len() + 13);
    out.push_str(body);
    out.push_str("\nRETURNING *");
    if had_semicolon {
        out.push(';');
    }
    Some(out)
}
