//! Lenient extraction of structured data from agent responses.
//!
//! Agents answer scoring and synthesis prompts with free text that is
//! expected to contain one JSON object. This module locates that object and
//! decodes it, leaving the fallback policy to the caller.
//!
//! # Examples
//!
//! ```rust
//! use llm_stepflow::extract::LenientDecoder;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Verdict {
//!     score: f64,
//! }
//!
//! let decoder = LenientDecoder::new();
//! let verdict: Verdict = decoder
//!     .decode(r#"Sure! {"score": 0.75} Hope that helps."#)
//!     .unwrap();
//! assert_eq!(verdict.score, 0.75);
//! ```

pub mod decoder;
pub mod error;
pub mod extractors;

pub use self::decoder::LenientDecoder;
pub use self::error::ParseError;
pub use self::extractors::{BraceScan, JsonBlockExtractor};
