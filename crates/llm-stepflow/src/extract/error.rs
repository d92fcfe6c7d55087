/// Response parsing errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("No JSON-like block found in response")]
    NoJsonBlock,

    #[error("Failed to decode JSON block: {0}")]
    JsonParsingFailed(String),
}
