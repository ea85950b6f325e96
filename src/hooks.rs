//! Text-transform hook applied to indexable text before indexing.
//!
//! A transform may rewrite the text offered to the index (stemming, stripping
//! quoted replies, transliteration...). It never blocks ingestion: an error
//! or an empty result falls back to the original text.

use tracing::warn;

/// Rewrites text on its way into the inverted index.
pub trait TextTransform: Send {
    /// Return `Ok(None)` to keep the text unchanged.
    fn transform(&self, text: &str) -> anyhow::Result<Option<String>>;
}

impl<F> TextTransform for F
where
    F: Fn(&str) -> anyhow::Result<Option<String>> + Send,
{
    fn transform(&self, text: &str) -> anyhow::Result<Option<String>> {
        self(text)
    }
}

/// Run `hook` over `text`, falling back to `text` on no, empty or failed output.
pub fn apply(hook: Option<&dyn TextTransform>, text: &str) -> String {
    let Some(hook) = hook else {
        return text.to_string();
    };
    match hook.transform(text) {
        Ok(Some(out)) if !out.trim().is_empty() => out,
        Ok(_) => text.to_string(),
        Err(e) => {
            warn!(error = %e, "Text transform failed; indexing original text");
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_hook_is_identity() {
        assert_eq!(apply(None, "hello"), "hello");
    }

    #[test]
    fn test_hook_output_is_used() {
        let upper = |t: &str| -> anyhow::Result<Option<String>> { Ok(Some(t.to_uppercase())) };
        assert_eq!(apply(Some(&upper), "hello"), "HELLO");
    }

    #[test]
    fn test_empty_and_failed_output_fall_back() {
        let empty = |_: &str| -> anyhow::Result<Option<String>> { Ok(Some("  ".into())) };
        let none = |_: &str| -> anyhow::Result<Option<String>> { Ok(None) };
        let failing = |_: &str| -> anyhow::Result<Option<String>> { anyhow::bail!("boom") };
        assert_eq!(apply(Some(&empty), "hello"), "hello");
        assert_eq!(apply(Some(&none), "hello"), "hello");
        assert_eq!(apply(Some(&failing), "hello"), "hello");
    }
}
