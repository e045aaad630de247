use thiserror::Error;

use super::EvalResult;

/// Error when encoding or decoding a stored result record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("result codec error: {message}")]
pub struct CodecError {
    pub message: String,
}

/// Serialize a result into its stored record bytes.
pub fn encode(result: &EvalResult) -> Result<Vec<u8>, CodecError> {
    bitcode::serialize(result).map_err(|e| CodecError {
        message: e.to_string(),
    })
}

/// Deserialize stored record bytes back into a result.
pub fn decode(bytes: &[u8]) -> Result<EvalResult, CodecError> {
    bitcode::deserialize(bytes).map_err(|e| CodecError {
        message: e.to_string(),
    })
}
