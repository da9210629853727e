//! Command extraction from free-text model output.

use regex_lite::Regex;

/// Finds the command wrapped in `<tag>…</tag>` inside assistant text.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    tag: String,
    pattern: Regex,
}

impl CommandExtractor {
    pub fn new(tag: &str) -> Result<Self, regex_lite::Error> {
        let escaped = regex_lite::escape(tag);
        // Lazy body, dot matches newline: first opening tag, first closing tag after it
        let pattern = Regex::new(&format!(r"(?s)<{escaped}>(.*?)</{escaped}>"))?;
        Ok(Self {
            tag: tag.to_string(),
            pattern,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The trimmed body of the first complete tag pair, if any.
    ///
    /// An empty pair yields `Some("")`; callers decide what that means.
    pub fn extract(&self, text: &str) -> Option<String> {
        self.pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    }
}
