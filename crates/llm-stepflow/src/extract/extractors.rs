use super::error::ParseError;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a JSON block is located inside free-form agent text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BraceScan {
    /// From the first `{` to the last `}` in the text.
    ///
    /// A response containing two separate objects yields a span covering
    /// both of them (plus whatever text sits between), which then fails to
    /// decode. Callers fall back to their default value in that case.
    #[default]
    Greedy,

    /// The first brace-balanced object, honouring string literals and escapes.
    Balanced,
}

/// Locates the JSON object an agent embedded in its free-text response.
#[derive(Debug, Clone, Default)]
pub struct JsonBlockExtractor {
    scan: BraceScan,
}

impl JsonBlockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan(mut self, scan: BraceScan) -> Self {
        self.scan = scan;
        self
    }

    /// Extracts the JSON-like block according to the configured scan.
    pub fn extract(&self, text: &str) -> Result<String, ParseError> {
        let result = match self.scan {
            BraceScan::Greedy => self.extract_greedy(text),
            BraceScan::Balanced => self.extract_first_balanced(text),
        };

        if result.is_none() {
            debug!("No JSON block found ({:?} scan)", self.scan);
        }

        result.ok_or(ParseError::NoJsonBlock)
    }

    fn extract_greedy(&self, text: &str) -> Option<String> {
        // Leftmost-first with a greedy `.*` spans first `{` to last `}`.
        let regex = Regex::new(r"(?s)\{.*\}").ok()?;
        regex.find(text).map(|m| m.as_str().to_string())
    }

    fn extract_first_balanced(&self, text: &str) -> Option<String> {
        let mut depth = 0usize;
        let mut start_pos = None;
        let mut in_string = false;
        let mut escape_next = false;

        for (i, ch) in text.char_indices() {
            if escape_next {
                escape_next = false;
                continue;
            }

            match ch {
                '\\' if in_string => escape_next = true,
                '"' if start_pos.is_some() => in_string = !in_string,
                '{' if !in_string => {
                    if depth == 0 {
                        start_pos = Some(i);
                    }
                    depth += 1;
                }
                '}' if !in_string && depth > 0 => {
                    depth -= 1;
                    if depth == 0
                        && let Some(p) = start_pos
                    {
                        return Some(text[p..=i].to_string());
                    }
                }
                _ => {}
            }
        }

        None
    }
}
