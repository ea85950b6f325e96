//! Correspondents: parsing `From:`/`To:` style strings into people.

use serde::{Deserialize, Serialize};

/// A sender or recipient.
///
/// # Examples
/// - `"Egg Zample <egg@example.com>"` → name `Egg Zample`, email `egg@example.com`
/// - `"egg@example.com"` → no name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Human-readable name, if the header carried one.
    pub name: Option<String>,
    /// The bare address (`user@domain`).
    pub email: String,
}

impl Person {
    pub fn new(name: Option<&str>, email: &str) -> Self {
        Self {
            name: name.map(str::to_string).filter(|n| !n.is_empty()),
            email: email.trim().to_string(),
        }
    }

    /// Parse a single address.
    ///
    /// Supported formats:
    /// - `"user@domain.com"`
    /// - `"<user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"\"Display, Name\" <user@domain.com>"`
    ///
    /// Anything else is kept verbatim as the email.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let (Some(start), Some(end)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if end > start {
                let email = trimmed[start + 1..end].trim();
                let name = strip_quotes(&trimmed[..start]);
                return Self::new(Some(&name), email);
            }
        }
        Self::new(None, trimmed)
    }

    /// Local part of the address (`egg` for `egg@example.com`).
    pub fn handle(&self) -> Option<&str> {
        self.email.split_once('@').map(|(h, _)| h)
    }

    /// `Name <addr>` form used in stored records; names containing quotes are quoted.
    pub fn to_email_address(&self) -> String {
        match &self.name {
            Some(n) if n.contains('"') => format!("{n:?} <{}>", self.email),
            Some(n) => format!("{n} <{}>", self.email),
            None => format!("<{}>", self.email),
        }
    }

    /// Text offered to the search index for this person.
    pub fn indexable_text(&self) -> String {
        [self.name.as_deref(), Some(self.email.as_str()), self.handle()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_email_address())
    }
}
