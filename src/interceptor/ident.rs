// SPDX-License-Identifier: Apache-2.0

//! Qualified identifier handling
//!
//! Splits, quotes and re-joins possibly schema-qualified, possibly quoted
//! PostgreSQL identifiers. Inside a `"..."` segment a dot is literal and a
//! doubled `""` stands for one quote character.

/// Splits a potentially schema-qualified identifier into its parts
pub fn split_qualified(ident: &str) -> Vec<String> {
    let ident = ident.trim();
    if ident.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = ident.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    buf.push('"');
                    chars.next();
                    continue;
                }
                in_quotes = !in_quotes;
            }
            '.' if !in_quotes => {
                parts.push(buf.trim().to_string());
                buf.clear();
            }
            _ => buf.push(c),
        }
    }
    parts.push(buf.trim().to_string());

    parts
}

/// Quotes a single identifier part, doubling embedded quotes
pub fn quote(part: &str) -> String {
    format!("\"{}\"", part.replace('"', "\"\""))
}

/// Renders qualified identifier parts as a SQL identifier
pub fn quote_qualified<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| quote(p.as_ref()))
        .collect::<Vec<_>>()
        .join(".")
}

/// Returns qualified identifier parts with `suffix` applied to the table name
pub fn history_parts(base: &str, suffix: &str) -> Vec<String> {
    let mut parts = split_qualified(base);
    match parts.last_mut() {
        Some(table) => table.push_str(suffix),
        None if !suffix.is_empty() => parts.push(suffix.to_string()),
        None => {}
    }
    parts
}

/// Produces a string literal of the quoted identifier, for `to_regclass`
pub fn regclass_literal<S: AsRef<str>>(parts: &[S]) -> String {
    if parts.is_empty() {
        return "''".to_string();
    }
    format!("'{}'", quote_qualified(parts).replace('\'', "''"))
}

/// Returns the last segment of a qualified identifier
pub fn base_table_name(ident: &str) -> String {
    split_qualified(ident)
        .pop()
        .unwrap_or_else(|| ident.trim().to_string())
}

/// Removes a trailing alias from a table reference while preserving quotes
///
/// `orders o` becomes `orders`; `"Order Detail" d` keeps the quoted space.
pub fn strip_alias(s: &str) -> &str {
    let s = s.trim();
    let s = s.strip_suffix(',').unwrap_or(s);

    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes && c.is_whitespace() {
            return s[..i].trim();
        }
    }
    s
}
