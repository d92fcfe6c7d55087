use super::error::ParseError;
use super::extractors::{BraceScan, JsonBlockExtractor};
use log::{debug, warn};
use serde::de::DeserializeOwned;

/// Decodes structured data from agent text, tolerating surrounding prose.
///
/// Decoding is total when used through [`LenientDecoder::decode_or`]: any
/// extraction or deserialization failure produces the caller's fallback.
#[derive(Debug, Clone, Default)]
pub struct LenientDecoder {
    extractor: JsonBlockExtractor,
    repair: bool,
}

impl LenientDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan(mut self, scan: BraceScan) -> Self {
        self.extractor = self.extractor.with_scan(scan);
        self
    }

    /// Retries a failed decode after fixing trailing commas and unclosed
    /// brackets in the extracted block.
    pub fn with_repair(mut self, repair: bool) -> Self {
        self.repair = repair;
        self
    }

    pub fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ParseError> {
        let block = self.extractor.extract(text)?;

        match serde_json::from_str::<T>(&block) {
            Ok(value) => Ok(value),
            Err(first_err) if self.repair => {
                let repaired = fuzzy_parser::sanitize_json(&block);
                debug!("Retrying decode with sanitized JSON: {}", repaired);
                serde_json::from_str::<T>(&repaired).map_err(|e| {
                    ParseError::JsonParsingFailed(format!("{first_err}; after repair: {e}"))
                })
            }
            Err(e) => Err(ParseError::JsonParsingFailed(e.to_string())),
        }
    }

    /// Decodes `text`, substituting `fallback()` on any failure.
    pub fn decode_or<T, F>(&self, text: &str, fallback: F) -> T
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        match self.decode(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("Falling back to default value: {}", e);
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        score: f64,
        #[serde(default)]
        notes: Vec<String>,
    }

    #[test]
    fn test_decode_with_prose_around() {
        let decoder = LenientDecoder::new();
        let verdict: Verdict = decoder
            .decode(r#"Evaluation: {"score": 0.85, "notes": ["tight"]} end"#)
            .unwrap();
        assert_eq!(verdict.score, 0.85);
        assert_eq!(verdict.notes, vec!["tight".to_string()]);
    }

    #[test]
    fn test_decode_reports_invalid_json() {
        let decoder = LenientDecoder::new();
        let result = decoder.decode::<Verdict>("{not json}");
        assert!(matches!(result, Err(ParseError::JsonParsingFailed(_))));
    }

    #[test]
    fn test_decode_or_uses_fallback() {
        let decoder = LenientDecoder::new();
        let verdict = decoder.decode_or("nothing structured", || Verdict {
            score: 0.5,
            notes: vec![],
        });
        assert_eq!(verdict.score, 0.5);
    }

    #[test]
    fn test_two_blocks_fall_back_under_greedy_scan() {
        let decoder = LenientDecoder::new();
        let text = r#"{"score": 0.9} and also {"score": 0.1}"#;
        let verdict = decoder.decode_or(text, || Verdict {
            score: 0.7,
            notes: vec![],
        });
        assert_eq!(verdict.score, 0.7);
    }

    #[test]
    fn test_two_blocks_take_first_under_balanced_scan() {
        let decoder = LenientDecoder::new().with_scan(BraceScan::Balanced);
        let text = r#"{"score": 0.9} and also {"score": 0.1}"#;
        let verdict: Verdict = decoder.decode(text).unwrap();
        assert_eq!(verdict.score, 0.9);
    }

    #[test]
    fn test_repair_fixes_trailing_comma() {
        let text = r#"{"score": 0.9, "notes": ["ok"],}"#;
        assert!(LenientDecoder::new().decode::<Verdict>(text).is_err());

        let verdict: Verdict = LenientDecoder::new().with_repair(true).decode(text).unwrap();
        assert_eq!(verdict.score, 0.9);
    }
}
