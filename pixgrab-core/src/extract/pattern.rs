use regex::Regex;

use crate::config::DetectionSection;

/// Recognizes BR Code candidates in arbitrary text. Pure string work, no
/// I/O: every detection channel funnels through this.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    prefix: String,
    regex: Regex,
    min_length: usize,
}

impl PatternMatcher {
    pub fn new(detection: &DetectionSection) -> Self {
        let pattern = format!(
            r"{}[A-Za-z0-9\s.\-*@:]+",
            regex::escape(&detection.token_prefix)
        );
        let regex = Regex::new(&pattern).expect("token pattern is a valid regex");
        Self {
            prefix: detection.token_prefix.clone(),
            regex,
            min_length: detection.min_token_length,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether the text carries the token prefix anywhere. Channels that
    /// surface a whole field value (inputs, clipboard) use this and defer
    /// cleanup to `sanitize`.
    pub fn matches_prefix(&self, text: &str) -> bool {
        text.contains(&self.prefix)
    }

    /// Extracts a candidate from free-form text (network dumps, page
    /// text). Whitespace is collapsed before the length gate: a short
    /// prefix echo in markup is a false positive, not a token.
    pub fn find(&self, text: &str) -> Option<String> {
        let found = self.regex.find(text)?;
        let compact: String = found.as_str().chars().filter(|c| !c.is_whitespace()).collect();
        if compact.len() > self.min_length {
            Some(compact)
        } else {
            None
        }
    }

    /// Final cleanup applied to whichever channel won: strip whitespace,
    /// cut trailing markup, drop stray quotes from JSON dumps.
    pub fn sanitize(&self, raw: &str) -> String {
        let compact: String = raw.trim().chars().filter(|c| !c.is_whitespace()).collect();
        let truncated = compact.split('<').next().unwrap_or_default();
        truncated.replace(['"', '\''], "")
    }
}
