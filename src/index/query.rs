//! Search query language.
//!
//! # Supported syntax
//!
//! - `word`: the word appears in the default field (`body`)
//! - `subject:word`, `from:word`, `to:word`, `date:word`, `body:word`
//! - `"exact phrase"` / `subject:"two words"`: every word must appear
//! - `~label`: the document carries the label (labels are case-sensitive)
//! - `-term`: NOT
//! - `term1 term2`: implicit AND
//! - `term1 OR term2`: OR between AND-groups
//!
//! Words are lower-cased; labels are matched exactly.

use std::fmt;

use super::{is_valid_label, words, DEFAULT_FIELD, FIELDS};
use crate::error::{ArchiveError, Result};

/// A parsed query. Composable with [`Query::and`] and [`Query::negate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// A single lower-cased word in a field.
    Term { field: String, word: String },
    /// Presence of a label tag.
    Label(String),
    /// All sub-queries match. The empty conjunction matches every document.
    And(Vec<Query>),
    /// Any sub-query matches.
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    /// Parse a query string, with bare words searching `default_field`.
    pub fn parse(default_field: &str, input: &str) -> Result<Query> {
        let err = |reason: &str| ArchiveError::QueryParse {
            query: input.to_string(),
            reason: reason.to_string(),
        };

        let tokens = tokenize(input).map_err(|r| err(&r))?;
        if tokens.is_empty() {
            return Err(err("empty query"));
        }

        let mut groups: Vec<Vec<Query>> = vec![Vec::new()];
        for token in &tokens {
            if token == "OR" {
                if groups.last().is_some_and(|g| g.is_empty()) {
                    return Err(err("OR without a left-hand term"));
                }
                groups.push(Vec::new());
                continue;
            }
            let clause = parse_token(default_field, token).map_err(|r| err(&r))?;
            if let Some(group) = groups.last_mut() {
                group.push(clause);
            }
        }
        if groups.last().is_some_and(|g| g.is_empty()) {
            return Err(err("OR without a right-hand term"));
        }

        let mut alternatives: Vec<Query> = groups.into_iter().map(conjoin).collect();
        Ok(if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            Query::Or(alternatives)
        })
    }

    /// Shorthand for [`Query::parse`] on the default field.
    pub fn parse_default(input: &str) -> Result<Query> {
        Self::parse(DEFAULT_FIELD, input)
    }

    pub fn label(label: &str) -> Query {
        Query::Label(label.to_string())
    }

    #[cfg(test)]
    pub(crate) fn everything() -> Query {
        Query::And(Vec::new())
    }

    /// Conjoin, flattening nested conjunctions.
    pub fn and(self, other: Query) -> Query {
        let mut parts = match self {
            Query::And(v) => v,
            q => vec![q],
        };
        match other {
            Query::And(v) => parts.extend(v),
            q => parts.push(q),
        }
        Query::And(parts)
    }

    pub fn negate(self) -> Query {
        Query::Not(Box::new(self))
    }
}

fn conjoin(mut clauses: Vec<Query>) -> Query {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        Query::And(clauses)
    }
}

fn parse_token(default_field: &str, token: &str) -> std::result::Result<Query, String> {
    let (negated, token) = match token.strip_prefix('-') {
        Some("") => return Err("dangling '-'".into()),
        Some(rest) => (true, rest),
        None => (false, token),
    };

    let clause = if let Some(label) = token.strip_prefix('~') {
        if !is_valid_label(label) {
            return Err(format!("invalid label {label:?}"));
        }
        Query::label(label)
    } else {
        let (field, value) = match token.split_once(':') {
            Some((f, v)) if !token.starts_with('"') => {
                let f = f.to_lowercase();
                if !FIELDS.contains(&f.as_str()) {
                    return Err(format!("unknown field {f:?}"));
                }
                (f, v)
            }
            _ => (default_field.to_string(), token),
        };
        let unquoted = value.trim_matches('"');
        let terms: Vec<Query> = words(unquoted)
            .into_iter()
            .map(|word| Query::Term {
                field: field.clone(),
                word,
            })
            .collect();
        if terms.is_empty() {
            return Err(format!("no searchable words in {token:?}"));
        }
        conjoin(terms)
    };

    Ok(if negated { clause.negate() } else { clause })
}

/// Tokenize input respecting quoted strings.
fn tokenize(input: &str) -> std::result::Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.trim().chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if in_quotes {
        return Err("unterminated quote".into());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term { field, word } => write!(f, "{field}:\"{word}\""),
            Query::Label(l) => write!(f, "~{l}"),
            Query::Not(q) => write!(f, "-{q}"),
            Query::And(parts) if parts.is_empty() => f.write_str("*"),
            Query::And(parts) | Query::Or(parts) => {
                let op = if matches!(self, Query::And(_)) { " AND " } else { " OR " };
                f.write_str("(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(op)?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(field: &str, word: &str) -> Query {
        Query::Term {
            field: field.into(),
            word: word.into(),
        }
    }

    #[test]
    fn test_parse_simple_query() {
        assert_eq!(Query::parse_default("Hello").unwrap(), term("body", "hello"));
    }

    #[test]
    fn test_parse_field_and_label() {
        let q = Query::parse_default("subject:budget ~work").unwrap();
        assert_eq!(
            q,
            Query::And(vec![term("subject", "budget"), Query::label("work")])
        );
    }

    #[test]
    fn test_parse_negation() {
        let q = Query::parse_default("-~deleted").unwrap();
        assert_eq!(q, Query::label("deleted").negate());
    }

    #[test]
    fn test_parse_or_groups() {
        let q = Query::parse_default("from:alice OR from:bob ~urgent").unwrap();
        assert_eq!(
            q,
            Query::Or(vec![
                term("from", "alice"),
                Query::And(vec![term("from", "bob"), Query::label("urgent")]),
            ])
        );
    }

    #[test]
    fn test_parse_quoted_phrase_requires_all_words() {
        let q = Query::parse_default("subject:\"Hello World\"").unwrap();
        assert_eq!(
            q,
            Query::And(vec![term("subject", "hello"), term("subject", "world")])
        );
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "   ", "\"open", "OR x", "x OR", "nope:x", "~", "~a:b", "-", "!!!"] {
            let err = Query::parse_default(bad).unwrap_err();
            assert!(err.is_caller_error(), "{bad:?} should be a caller error");
        }
    }

    #[test]
    fn test_and_flattens() {
        let q = Query::parse_default("a b")
            .unwrap()
            .and(Query::label("deleted").negate());
        match q {
            Query::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_display() {
        let q = Query::parse_default("hello -~spam").unwrap();
        assert_eq!(q.to_string(), "(body:\"hello\" AND -~spam)");
        assert_eq!(Query::everything().to_string(), "*");
    }
}
