use crate::models::AcceptedCode;
use crate::services::ScanError;

/// Validate a typed code.
///
/// Surrounding whitespace is trimmed; blank input is [`ScanError::EmptyInput`].
pub fn submit(text: &str) -> Result<AcceptedCode, ScanError> {
    AcceptedCode::parse(text).ok_or(ScanError::EmptyInput)
}
